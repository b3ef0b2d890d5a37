//! Error types for brain-codec.

/// Result type alias for codec operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for codec operations.
#[derive(Debug, thiserror::Error)]
#[error("{kind}")]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
    /// Optional source error.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Create a new error with the given kind.
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind, source: None }
    }

    /// Create a new error with the given kind and source.
    pub fn with_source(
        kind: ErrorKind,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            source: Some(Box::new(source)),
        }
    }
}

/// The kind of error that occurred.
#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    /// Codec name outside the allowed set.
    #[error("Unknown codec {0:?}: must be \"json\" or \"msgpack\"")]
    UnknownCodec(String),

    /// Malformed JSON text, or a value JSON cannot represent.
    #[error("JSON error: {0}")]
    Json(String),

    /// Malformed msgpack data.
    #[error("msgpack error: {0}")]
    Msgpack(String),

    /// Invalid numeric-array payload.
    #[error("Array error: {0}")]
    Array(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::with_source(ErrorKind::Json(err.to_string()), err)
    }
}

#[cfg(feature = "msgpack")]
impl From<rmp_serde::encode::Error> for Error {
    fn from(err: rmp_serde::encode::Error) -> Self {
        Error::with_source(ErrorKind::Msgpack(err.to_string()), err)
    }
}

#[cfg(feature = "msgpack")]
impl From<rmpv::decode::Error> for Error {
    fn from(err: rmpv::decode::Error) -> Self {
        Error::with_source(ErrorKind::Msgpack(err.to_string()), err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_display_messages() {
        let cases: Vec<(ErrorKind, &str)> = vec![
            (
                ErrorKind::UnknownCodec("donut".into()),
                "Unknown codec \"donut\"",
            ),
            (ErrorKind::Json("EOF".into()), "JSON error: EOF"),
            (ErrorKind::Msgpack("bad marker".into()), "msgpack error: bad marker"),
            (ErrorKind::Array("short".into()), "Array error: short"),
        ];

        for (kind, expected_substring) in cases {
            let display = kind.to_string();
            assert!(
                display.contains(expected_substring),
                "Expected '{display}' to contain '{expected_substring}'"
            );
        }
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err.kind, ErrorKind::Json(_)));
        assert!(err.source.is_some());
    }
}
