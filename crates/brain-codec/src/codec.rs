//! Codec selection and the compress/uncompress entry points.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, ErrorKind, Result};

/// Wire serialization format for request and response bodies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    /// UTF-8 JSON text.
    #[default]
    Json,
    /// Binary msgpack.
    Msgpack,
}

impl Codec {
    /// All allowed codecs.
    pub const ALL: [Codec; 2] = [Codec::Json, Codec::Msgpack];

    /// The lowercase codec name as used in configuration and request params.
    pub fn as_str(&self) -> &'static str {
        match self {
            Codec::Json => "json",
            Codec::Msgpack => "msgpack",
        }
    }

    /// The Content-Type a server uses for bodies in this codec.
    pub fn content_type(&self) -> &'static str {
        match self {
            Codec::Json => "application/json",
            Codec::Msgpack => "application/octet-stream",
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Codec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Codec::Json),
            "msgpack" => Ok(Codec::Msgpack),
            _ => Err(Error::new(ErrorKind::UnknownCodec(s.to_string()))),
        }
    }
}

/// Serialize `data` with the given codec.
pub fn compress<T: Serialize + ?Sized>(data: &T, codec: Codec) -> Result<Vec<u8>> {
    match codec {
        Codec::Json => Ok(serde_json::to_vec(data)?),
        Codec::Msgpack => compress_msgpack(data),
    }
}

/// Deserialize a body produced by [`compress`] into a JSON value tree.
///
/// Numeric arrays embedded in msgpack bodies come back as nested arrays.
pub fn uncompress(data: &[u8], codec: Codec) -> Result<Value> {
    match codec {
        Codec::Json => Ok(serde_json::from_slice(data)?),
        Codec::Msgpack => uncompress_msgpack(data),
    }
}

/// Deserialize a body straight into a typed value.
pub fn uncompress_into<T: DeserializeOwned>(data: &[u8], codec: Codec) -> Result<T> {
    let value = uncompress(data, codec)?;
    Ok(serde_json::from_value(value)?)
}

#[cfg(feature = "msgpack")]
fn compress_msgpack<T: Serialize + ?Sized>(data: &T) -> Result<Vec<u8>> {
    Ok(rmp_serde::to_vec_named(data)?)
}

#[cfg(feature = "msgpack")]
fn uncompress_msgpack(data: &[u8]) -> Result<Value> {
    let mut cursor = data;
    let value = rmpv::decode::read_value(&mut cursor)?;
    if !cursor.is_empty() {
        return Err(Error::new(ErrorKind::Msgpack(format!(
            "{} trailing bytes after value",
            cursor.len()
        ))));
    }
    crate::ndarray::to_json(value)
}

#[cfg(not(feature = "msgpack"))]
fn compress_msgpack<T: Serialize + ?Sized>(data: &T) -> Result<Vec<u8>> {
    tracing::warn!("msgpack support not compiled in, compressing with json instead");
    Ok(serde_json::to_vec(data)?)
}

#[cfg(not(feature = "msgpack"))]
fn uncompress_msgpack(data: &[u8]) -> Result<Value> {
    tracing::warn!("msgpack support not compiled in, uncompressing with json instead");
    Ok(serde_json::from_slice(data)?)
}
