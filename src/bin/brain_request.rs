//! Send one request to a Brain API server and print the decoded response.
//!
//! ```sh
//! export BRAIN_BASE_URL='https://sas.sdss.org/marvin/api/'
//! cargo run --bin brain-request -- cubes/8485-1901/ release=DR17 --auth netrc
//! ```
//!
//! Logging is controlled with `RUST_LOG`.

use brain_api::client::{Interaction, Payload, SessionConfig};
use clap::Parser;
use std::io::Write;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "brain-request",
    version,
    about = "Send one request to a Brain API server and print the decoded response."
)]
struct Args {
    /// Route, relative to BRAIN_BASE_URL.
    route: String,

    /// Request params.
    #[arg(value_name = "KEY=VALUE", value_parser = parse_param)]
    params: Vec<(String, String)>,

    /// Send a GET instead of a POST.
    #[arg(long)]
    get: bool,

    /// Auth mode: none, token, netrc, http or oauth.
    #[arg(long, value_name = "MODE")]
    auth: Option<String>,

    /// Read the response body in chunks.
    #[arg(long)]
    stream: bool,

    /// The response is a row-delimited stream.
    #[arg(long)]
    datastream: bool,
}

fn parse_param(arg: &str) -> Result<(String, String), String> {
    arg.split_once('=')
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got {arg:?}"))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = SessionConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });
    let config = Arc::new(config);

    let mut builder = Interaction::builder(&config, args.route)
        .params(args.params)
        .stream(args.stream)
        .datastream(args.datastream);
    if args.get {
        builder = builder.method("get");
    }
    if let Some(auth) = args.auth {
        builder = builder.auth(auth);
    }

    let result = match builder.build() {
        Ok(interaction) => interaction.send().await,
        Err(e) => Err(e),
    };

    match result {
        Ok(result) => {
            tracing::info!(
                status = result.status_code,
                elapsed_ms = result.response_time.as_millis() as u64,
                "request complete"
            );
            match result.results {
                Payload::Json(value) => match serde_json::to_string_pretty(&value) {
                    Ok(text) => println!("{text}"),
                    Err(e) => {
                        eprintln!("Error: {e}");
                        std::process::exit(1);
                    }
                },
                Payload::Raw(bytes) => {
                    if let Err(e) = std::io::stdout().write_all(&bytes) {
                        eprintln!("Error: {e}");
                        std::process::exit(1);
                    }
                }
            }
        }
        Err(e) => {
            eprintln!("Error: {e}");
            if let Some(traceback) = e.traceback().map(str::to_string).or_else(|| config.last_traceback()) {
                eprintln!("\nServer traceback:\n{traceback}");
            }
            std::process::exit(1);
        }
    }
}
