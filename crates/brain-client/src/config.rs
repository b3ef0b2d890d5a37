//! Client configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, ErrorKind, Result};

/// Default connect timeout (slightly above a multiple of the 3s TCP retransmit window).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(3050);

/// Default read timeout.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(300);

/// Default buffer size for streamed response bodies.
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

/// Connect and read timeouts for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeout {
    pub connect: Duration,
    pub read: Duration,
}

impl Timeout {
    pub fn new(connect: Duration, read: Duration) -> Self {
        Self { connect, read }
    }
}

impl Default for Timeout {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT)
    }
}

/// Configuration for the shared HTTP session.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Connect/read timeouts applied to every request.
    pub timeout: Timeout,
    /// Pool idle timeout.
    pub pool_idle_timeout: Duration,
    /// Maximum idle connections per host.
    pub pool_max_idle_per_host: usize,
    /// User-Agent header value.
    pub user_agent: String,
    /// Accept gzip/deflate encoded responses.
    pub accept_compressed: bool,
    /// Initial buffer size for streamed bodies.
    pub chunk_size: usize,
    /// Whether to enable request/response tracing.
    pub enable_tracing: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Timeout::default(),
            pool_idle_timeout: Duration::from_secs(90),
            pool_max_idle_per_host: 10,
            user_agent: crate::USER_AGENT.to_string(),
            accept_compressed: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
            enable_tracing: true,
        }
    }
}

impl ClientConfig {
    /// Create a new client config builder.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }
}

/// Builder for ClientConfig.
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Set both timeouts.
    pub fn with_timeout(mut self, timeout: Timeout) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set connection timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout.connect = timeout;
        self
    }

    /// Set read timeout.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout.read = timeout;
        self
    }

    /// Set pool idle timeout.
    pub fn with_pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.pool_idle_timeout = timeout;
        self
    }

    /// Set maximum idle connections per host.
    pub fn with_pool_max_idle(mut self, max: usize) -> Self {
        self.config.pool_max_idle_per_host = max;
        self
    }

    /// Set custom User-Agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Accept or refuse transfer-compressed responses.
    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.config.accept_compressed = enabled;
        self
    }

    /// Set the buffer size used when streaming bodies. Zero selects the default.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.config.chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        self
    }

    /// Enable or disable request/response tracing.
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.config.enable_tracing = enabled;
        self
    }

    /// Build the client configuration.
    pub fn build(self) -> ClientConfig {
        self.config
    }
}

/// Where data requests are served from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Local,
    Remote,
    #[default]
    Auto,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Local => "local",
            Mode::Remote => "remote",
            Mode::Auto => "auto",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "local" => Ok(Mode::Local),
            "remote" => Ok(Mode::Remote),
            "auto" => Ok(Mode::Auto),
            _ => Err(Error::new(ErrorKind::Config(format!(
                "config.mode must be \"local\", \"remote\" or \"auto\", not {s:?}"
            )))),
        }
    }
}

/// Data access level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Access {
    #[default]
    Public,
    /// Collaboration access, requires credentials in the netrc file.
    Collab,
}

impl Access {
    pub fn as_str(&self) -> &'static str {
        match self {
            Access::Public => "public",
            Access::Collab => "collab",
        }
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Access {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "public" => Ok(Access::Public),
            "collab" => Ok(Access::Collab),
            _ => Err(Error::new(ErrorKind::Config(format!(
                "config.access must be \"public\" or \"collab\", not {s:?}"
            )))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.timeout.connect, Duration::from_millis(3050));
        assert_eq!(config.timeout.read, Duration::from_secs(300));
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
        assert!(config.user_agent.contains("brain-client"));
    }

    #[test]
    fn test_builder() {
        let config = ClientConfig::builder()
            .with_connect_timeout(Duration::from_secs(1))
            .with_read_timeout(Duration::from_secs(20))
            .with_compression(false)
            .with_chunk_size(0)
            .with_user_agent("custom-agent/1.0")
            .build();

        assert_eq!(
            config.timeout,
            Timeout::new(Duration::from_secs(1), Duration::from_secs(20))
        );
        assert!(!config.accept_compressed);
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(config.user_agent, "custom-agent/1.0");
    }

    #[test]
    fn test_mode_and_access_parsing() {
        assert_eq!("remote".parse::<Mode>().unwrap(), Mode::Remote);
        assert_eq!("collab".parse::<Access>().unwrap(), Access::Collab);

        let err = "super".parse::<Mode>().unwrap_err();
        assert!(err.to_string().contains("config.mode must be"));

        let err = "always".parse::<Access>().unwrap_err();
        assert!(err.to_string().contains("config.access must be"));
    }

    #[test]
    fn test_mode_and_access_serde() {
        assert_eq!(serde_json::to_string(&Mode::Local).unwrap(), "\"local\"");
        let access: Access = serde_json::from_str("\"collab\"").unwrap();
        assert_eq!(access, Access::Collab);
    }
}
