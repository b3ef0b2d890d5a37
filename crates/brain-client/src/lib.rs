//! # brain-client
//!
//! Client side of the Brain REST API.
//!
//! This crate provides:
//! - [`SessionConfig`]: process-wide server settings and the pooled HTTP
//!   session shared by every request
//! - [`Interaction`]: one request/response exchange, with URL resolution,
//!   authentication, payload decoding and error classification
//! - [`NetrcStore`]: host-keyed basic-auth credentials
//! - [`UrlMap`]: the server-published route map
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                 Interaction                   │
//! │  - resolves route against base_url            │
//! │  - attaches one Authenticator                 │
//! │  - decodes json / msgpack / row streams       │
//! │  - classifies failures into ErrorKind         │
//! └───────────────────────────────────────────────┘
//!                        │ Arc
//!                        ▼
//! ┌───────────────────────────────────────────────┐
//! │                SessionConfig                  │
//! │  - base_url, token, compression, mode, access │
//! │  - shared reqwest::Client (generation-tagged) │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use brain_client::{Interaction, SessionConfig};
//!
//! # async fn run() -> Result<(), brain_client::Error> {
//! let config = Arc::new(SessionConfig::new("https://sas.sdss.org/marvin/api/")?);
//! config.update("compression", "msgpack")?;
//!
//! let result = Interaction::builder(&config, "cubes/8485-1901/")
//!     .param("release", "DR17")
//!     .build()?
//!     .send()
//!     .await?;
//!
//! println!("{:?}", result.data());
//! # Ok(())
//! # }
//! ```

mod auth;
mod classify;
mod config;
mod decode;
mod error;
mod interaction;
mod netrc;
mod resolve;
mod session;
mod urlmap;

pub use auth::{
    authenticator_for, AuthMode, Authenticator, HttpChallengeAuth, NetrcAuth, NoAuth, TokenAuth,
};
pub use classify::{classify, server_failure, status_text};
pub use config::{
    Access, ClientConfig, ClientConfigBuilder, Mode, Timeout, DEFAULT_CHUNK_SIZE,
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT,
};
pub use decode::{
    decode_body, decode_response, decode_rows, BodyKind, DecodeOptions, Payload, RowSplitter,
    ROW_DELIMITER,
};
pub use error::{Error, ErrorKind, Result, TransportFailure};
pub use interaction::{
    BodyEncoding, Interaction, InteractionBuilder, InteractionResult, InteractionState,
    RequestMethod,
};
pub use netrc::{NetrcEntry, NetrcStore};
pub use resolve::resolve;
pub use session::{ConfigKey, SessionConfig, SessionLease, DEFAULT_BASE_URL};
pub use urlmap::UrlMap;

pub use brain_codec::Codec;

/// User-Agent sent by the shared session.
pub const USER_AGENT: &str = concat!("brain-client/", env!("CARGO_PKG_VERSION"));
