//! Error types for brain-client.
//!
//! Every failure surfaced by an [`Interaction`](crate::Interaction) is one of
//! the kinds below. None of them are retried by the library.

use serde_json::Value;
use std::fmt;

/// Result type alias for brain-client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for brain-client operations.
///
/// Carries the HTTP status and resolved URL when the failure happened after
/// a request was built.
#[derive(Debug, thiserror::Error)]
#[error("{kind}")]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
    /// HTTP status of the response, if one was received.
    pub status: Option<u16>,
    /// Resolved request URL, if one was built.
    pub url: Option<String>,
    /// Optional source error.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Create a new error with the given kind.
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            status: None,
            url: None,
            source: None,
        }
    }

    /// Create a new error with the given kind and source.
    pub fn with_source(
        kind: ErrorKind,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            source: Some(Box::new(source)),
            ..Self::new(kind)
        }
    }

    /// Attach the HTTP status.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Attach the resolved URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Returns true for network-level failures.
    pub fn is_transport(&self) -> bool {
        matches!(self.kind, ErrorKind::Transport { .. })
    }

    /// Returns true if this is an authentication error.
    pub fn is_auth_error(&self) -> bool {
        matches!(self.kind, ErrorKind::Auth(_))
    }

    /// Server-supplied traceback, if the server sent one.
    pub fn traceback(&self) -> Option<&str> {
        match &self.kind {
            ErrorKind::ServerSide { traceback, .. } | ErrorKind::Request { traceback, .. } => {
                traceback.as_deref()
            }
            _ => None,
        }
    }
}

/// Network-level failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFailure {
    /// Connect or read timeout elapsed.
    Timeout,
    /// Connection refused, reset or unreachable.
    Connection,
    /// The request URL could not be built.
    InvalidUrl,
    /// Any other transport failure.
    Other,
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransportFailure::Timeout => "timeout",
            TransportFailure::Connection => "connection",
            TransportFailure::InvalidUrl => "invalid url",
            TransportFailure::Other => "transport",
        })
    }
}

/// The kind of error that occurred.
#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    /// Request method other than GET or POST.
    #[error("Invalid request method {0:?}: valid request types are \"get\" and \"post\"")]
    InvalidMethod(String),

    /// Interaction built without a route.
    #[error("No route specified")]
    MissingRoute,

    /// Timeout, connection failure, bad URL or other transport failure.
    #[error("Transport error ({failure}): {message}")]
    Transport {
        failure: TransportFailure,
        message: String,
    },

    /// HTTP 401, missing token, or unsupported auth mode.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// HTTP 422 with the server's validation payload.
    #[error("Validation error: {message}")]
    Validation { message: String, payload: Value },

    /// Any other non-success HTTP status.
    #[error("Request error: {status} {message}")]
    Request {
        status: u16,
        message: String,
        traceback: Option<String>,
    },

    /// Success status but the body was empty or unparseable.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Success status but the envelope reported a failure.
    #[error("Server-side error: {message}")]
    ServerSide {
        message: String,
        traceback: Option<String>,
    },

    /// Payload compression/uncompression failure.
    #[error("Codec error: {0}")]
    Codec(String),

    /// Invalid configuration key or value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Credential file missing, unreadable or unsafe.
    #[error("Credential store error: {0}")]
    Credentials(String),

    /// Route map lookup failure.
    #[error("{0}")]
    RouteMap(String),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let message = crate::classify::sanitize_message(&err.to_string());
        let kind = if err.is_decode() && !err.is_timeout() {
            ErrorKind::MalformedResponse(message)
        } else {
            let failure = if err.is_timeout() {
                TransportFailure::Timeout
            } else if err.is_connect() {
                TransportFailure::Connection
            } else if err.is_builder() {
                TransportFailure::InvalidUrl
            } else {
                TransportFailure::Other
            };
            ErrorKind::Transport { failure, message }
        };

        let url = err.url().map(|u| u.to_string());
        let mut error = Error::with_source(kind, err);
        error.url = url;
        error
    }
}

impl From<brain_codec::Error> for Error {
    fn from(err: brain_codec::Error) -> Self {
        Error::with_source(ErrorKind::Codec(err.to_string()), err)
    }
}

impl From<serde_urlencoded::ser::Error> for Error {
    fn from(err: serde_urlencoded::ser::Error) -> Self {
        Error::with_source(ErrorKind::Codec(err.to_string()), err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::with_source(ErrorKind::MalformedResponse(err.to_string()), err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::with_source(
            ErrorKind::Transport {
                failure: TransportFailure::Other,
                message: err.to_string(),
            },
            err,
        )
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::with_source(ErrorKind::Config(format!("Invalid URL: {}", err)), err)
    }
}
