//! # brain-codec
//!
//! Payload codecs shared by the Brain API client and server.
//!
//! Every body that crosses the wire goes through [`compress`] and
//! [`uncompress`], so both sides agree on the encoding:
//!
//! - **json** - UTF-8 JSON text
//! - **msgpack** - compact binary, with support for numeric arrays
//!   (see [`NdArray`])
//!
//! The msgpack backend is behind the default `msgpack` feature. When the
//! feature is disabled, msgpack requests fall back to JSON and a warning
//! is logged.
//!
//! ## Example
//!
//! ```rust
//! use brain_codec::{compress, uncompress, Codec};
//! use serde_json::json;
//!
//! let data = json!({"a": 1, "b": 2, "c": 3});
//! let packed = compress(&data, Codec::Msgpack).unwrap();
//! assert_eq!(uncompress(&packed, Codec::Msgpack).unwrap(), data);
//! ```

mod codec;
mod error;
#[cfg(feature = "msgpack")]
mod ndarray;

pub use codec::{compress, uncompress, uncompress_into, Codec};
pub use error::{Error, ErrorKind, Result};
#[cfg(feature = "msgpack")]
pub use ndarray::{DType, DTypeKind, NdArray};
