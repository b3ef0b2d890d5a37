//! Request authenticators.
//!
//! Exactly one [`Authenticator`] is attached to each interaction and it is
//! the only code that writes an `Authorization` header. The shared HTTP
//! client never injects credentials on its own.

use reqwest::RequestBuilder;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, ErrorKind, Result};
use crate::netrc::NetrcStore;
use crate::session::SessionConfig;

/// Message for token mode without a token.
pub(crate) const MISSING_TOKEN: &str =
    "You must have a valid token set to use the API.  Please login.";

/// How an interaction authenticates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthMode {
    #[default]
    None,
    /// Bearer token from the session configuration.
    Token,
    /// Basic auth from the netrc credential file.
    Netrc,
    /// Empty basic-auth challenge.
    Http,
    /// Not implemented.
    OAuth,
}

impl AuthMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMode::None => "none",
            AuthMode::Token => "token",
            AuthMode::Netrc => "netrc",
            AuthMode::Http => "http",
            AuthMode::OAuth => "oauth",
        }
    }
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "" | "none" => Ok(AuthMode::None),
            "token" => Ok(AuthMode::Token),
            "netrc" => Ok(AuthMode::Netrc),
            "http" => Ok(AuthMode::Http),
            "oauth" => Ok(AuthMode::OAuth),
            _ => Err(Error::new(ErrorKind::Auth(format!(
                "unknown auth mode {s:?}: valid modes are none, token, netrc, http and oauth"
            )))),
        }
    }
}

/// Attaches credentials to an outgoing request.
pub trait Authenticator: Send + Sync + fmt::Debug {
    /// The mode this authenticator implements.
    fn mode(&self) -> AuthMode;

    /// Add credentials for a request to `url`.
    fn authorize(&self, request: RequestBuilder, url: &Url) -> Result<RequestBuilder>;
}

/// Select the authenticator for `mode`.
///
/// Token mode fails here, before any network call, when no token is set.
pub fn authenticator_for(mode: AuthMode, config: &SessionConfig) -> Result<Box<dyn Authenticator>> {
    Ok(match mode {
        AuthMode::None => Box::new(NoAuth),
        AuthMode::Token => {
            let token = config
                .token()
                .ok_or_else(|| Error::new(ErrorKind::Auth(MISSING_TOKEN.to_string())))?;
            Box::new(TokenAuth { token })
        }
        AuthMode::Netrc => Box::new(NetrcAuth {
            path: config.netrc_path(),
        }),
        AuthMode::Http => Box::new(HttpChallengeAuth),
        AuthMode::OAuth => {
            return Err(Error::new(ErrorKind::Auth(
                "OAuth authentication is not implemented yet.".to_string(),
            )))
        }
    })
}

/// Sends no credentials.
#[derive(Debug, Clone, Copy)]
pub struct NoAuth;

impl Authenticator for NoAuth {
    fn mode(&self) -> AuthMode {
        AuthMode::None
    }

    fn authorize(&self, request: RequestBuilder, _url: &Url) -> Result<RequestBuilder> {
        Ok(request)
    }
}

/// Sends `Authorization: Bearer <token>`.
///
/// The token is redacted in Debug output.
#[derive(Clone)]
pub struct TokenAuth {
    token: String,
}

impl TokenAuth {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl fmt::Debug for TokenAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenAuth")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl Authenticator for TokenAuth {
    fn mode(&self) -> AuthMode {
        AuthMode::Token
    }

    fn authorize(&self, request: RequestBuilder, _url: &Url) -> Result<RequestBuilder> {
        Ok(request.bearer_auth(&self.token))
    }
}

/// Sends basic auth for the request host from the netrc file, if listed.
///
/// A missing file or host sends nothing and leaves the server to answer 401.
/// A file with unsafe permissions is an error.
#[derive(Debug, Clone)]
pub struct NetrcAuth {
    path: Option<PathBuf>,
}

impl NetrcAuth {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }
}

impl Authenticator for NetrcAuth {
    fn mode(&self) -> AuthMode {
        AuthMode::Netrc
    }

    fn authorize(&self, request: RequestBuilder, url: &Url) -> Result<RequestBuilder> {
        let Some(path) = &self.path else {
            warn!("no home directory, sending request without netrc credentials");
            return Ok(request);
        };
        if !path.is_file() {
            warn!(path = %path.display(), "netrc file not found, sending request without credentials");
            return Ok(request);
        }

        let store = NetrcStore::open(path)?;
        let host = url.host_str().unwrap_or_default();
        match store.lookup(host) {
            Some(entry) => {
                debug!(host, login = %entry.login, "attaching netrc credentials");
                Ok(request.basic_auth(&entry.login, Some(&entry.password)))
            }
            None => {
                debug!(host, "host not in netrc, sending request without credentials");
                Ok(request)
            }
        }
    }
}

/// Sends an empty basic-auth challenge.
#[derive(Debug, Clone, Copy)]
pub struct HttpChallengeAuth;

impl Authenticator for HttpChallengeAuth {
    fn mode(&self) -> AuthMode {
        AuthMode::Http
    }

    fn authorize(&self, request: RequestBuilder, _url: &Url) -> Result<RequestBuilder> {
        Ok(request.basic_auth("", None::<&str>))
    }
}
