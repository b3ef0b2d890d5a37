//! # brain-api
//!
//! Client glue for the Brain scientific-data REST API.
//!
//! ## Crates
//!
//! - **brain-codec** - JSON/msgpack payload codecs, with numeric-array support
//! - **brain-client** - Shared session, request/response interactions,
//!   authentication, credential store and error classification
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use brain_api::client::{Interaction, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), brain_api::client::Error> {
//!     let config = Arc::new(SessionConfig::from_env()?);
//!
//!     let result = Interaction::builder(&config, "general/getroutemap/")
//!         .method("get")
//!         .build()?
//!         .send()
//!         .await?;
//!
//!     let routes = result.route_map();
//!     println!("{}", routes.url_for("api", "getCube")?);
//!     Ok(())
//! }
//! ```
//!
//! ## Logging
//!
//! The libraries emit `tracing` events and never install a subscriber.
//! Credentials are redacted from Debug output and from error messages.

pub use brain_client as client;
pub use brain_codec as codec;
