//! Shared session configuration.
//!
//! One [`SessionConfig`] is created per process (wrap it in an `Arc`) and
//! handed to every [`Interaction`](crate::Interaction). It holds the server
//! settings and the pooled HTTP client the interactions share.
//!
//! ## Session ownership
//!
//! Interactions check out a [`SessionLease`] tagged with the generation of
//! the client it wraps. A failing interaction may only clear the shared
//! client if the generation still matches, so a client that a concurrent
//! caller already replaced is never closed twice.

use serde_json::Value;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

use brain_codec::Codec;

use crate::config::{Access, ClientConfig, Mode, Timeout};
use crate::error::{Error, ErrorKind, Result};
use crate::netrc::NetrcStore;

/// Base URL used when none is configured.
pub const DEFAULT_BASE_URL: &str = "https://sas.sdss.org/";

/// Configuration keys that may be updated by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    BaseUrl,
    Token,
    Compression,
    Mode,
    Access,
}

impl ConfigKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigKey::BaseUrl => "base_url",
            ConfigKey::Token => "token",
            ConfigKey::Compression => "compression",
            ConfigKey::Mode => "mode",
            ConfigKey::Access => "access",
        }
    }

    /// Whether the key may be echoed to the server in request params.
    fn is_mirrorable(&self) -> bool {
        matches!(self, ConfigKey::Compression | ConfigKey::Mode | ConfigKey::Access)
    }
}

impl FromStr for ConfigKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "base_url" => Ok(ConfigKey::BaseUrl),
            "token" => Ok(ConfigKey::Token),
            "compression" => Ok(ConfigKey::Compression),
            "mode" => Ok(ConfigKey::Mode),
            "access" => Ok(ConfigKey::Access),
            _ => Err(Error::new(ErrorKind::Config(format!(
                "unknown configuration key {s:?}"
            )))),
        }
    }
}

/// A validated configuration change.
#[derive(Debug, Clone, PartialEq)]
enum ConfigValue {
    BaseUrl(String),
    Token(Option<String>),
    Compression(Codec),
    Mode(Mode),
    Access(Access),
}

#[derive(Debug)]
struct ConfigState {
    base_url: String,
    token: Option<String>,
    compression: Codec,
    mode: Mode,
    access: Access,
    netrc_path: Option<PathBuf>,
    mirrored_keys: Vec<ConfigKey>,
    last_traceback: Option<String>,
}

#[derive(Debug, Default)]
struct SessionSlot {
    generation: u64,
    client: Option<reqwest::Client>,
    /// Clients for per-request timeouts, torn down with `client`.
    tuned: Vec<(Timeout, reqwest::Client)>,
}

impl SessionSlot {
    fn clear(&mut self) {
        self.client = None;
        self.tuned.clear();
    }
}

/// Checked-out handle on the shared HTTP client.
#[derive(Debug, Clone)]
pub struct SessionLease {
    client: reqwest::Client,
    generation: u64,
}

impl SessionLease {
    /// Generation of the shared client this lease wraps.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

/// Process-wide settings and pooled session shared by all interactions.
///
/// The token is redacted in Debug output.
pub struct SessionConfig {
    client_config: ClientConfig,
    state: RwLock<ConfigState>,
    session: Mutex<SessionSlot>,
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.read();
        f.debug_struct("SessionConfig")
            .field("base_url", &state.base_url)
            .field("token", &state.token.as_ref().map(|_| "[REDACTED]"))
            .field("compression", &state.compression)
            .field("mode", &state.mode)
            .field("access", &state.access)
            .field("session_generation", &self.session_generation())
            .finish_non_exhaustive()
    }
}

impl SessionConfig {
    /// Create a configuration for the given server root.
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_client_config(base_url, ClientConfig::default())
    }

    /// Create a configuration with custom HTTP settings.
    pub fn with_client_config(base_url: &str, client_config: ClientConfig) -> Result<Self> {
        let base_url = validate_base_url(base_url)?;
        Ok(Self {
            client_config,
            state: RwLock::new(ConfigState {
                base_url,
                token: None,
                compression: Codec::default(),
                mode: Mode::default(),
                access: Access::default(),
                netrc_path: NetrcStore::default_path(),
                mirrored_keys: vec![ConfigKey::Compression],
                last_traceback: None,
            }),
            session: Mutex::new(SessionSlot::default()),
        })
    }

    /// Build from `BRAIN_BASE_URL` (or `SAS_URL`), `BRAIN_TOKEN` and
    /// `BRAIN_COMPRESSION`.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("BRAIN_BASE_URL")
            .or_else(|_| std::env::var("SAS_URL"))
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let config = Self::new(&base_url)?;

        if let Ok(token) = std::env::var("BRAIN_TOKEN") {
            config.update("token", &token)?;
        }
        if let Ok(compression) = std::env::var("BRAIN_COMPRESSION") {
            config.update("compression", &compression)?;
        }
        Ok(config)
    }

    pub fn client_config(&self) -> &ClientConfig {
        &self.client_config
    }

    pub fn base_url(&self) -> String {
        self.read().base_url.clone()
    }

    pub fn token(&self) -> Option<String> {
        self.read().token.clone()
    }

    pub fn compression(&self) -> Codec {
        self.read().compression
    }

    pub fn mode(&self) -> Mode {
        self.read().mode
    }

    pub fn access(&self) -> Access {
        self.read().access
    }

    /// Path of the netrc credential file, if any.
    pub fn netrc_path(&self) -> Option<PathBuf> {
        self.read().netrc_path.clone()
    }

    /// Traceback from the last server-reported failure.
    pub fn last_traceback(&self) -> Option<String> {
        self.read().last_traceback.clone()
    }

    pub fn set_base_url(&self, base_url: &str) -> Result<()> {
        let base_url = validate_base_url(base_url)?;
        self.write().base_url = base_url;
        Ok(())
    }

    pub fn set_token(&self, token: Option<String>) {
        self.write().token = token.filter(|t| !t.is_empty());
    }

    pub fn set_compression(&self, codec: Codec) {
        self.write().compression = codec;
    }

    pub fn set_mode(&self, mode: Mode) {
        self.write().mode = mode;
    }

    /// Change the access level. `Collab` requires a valid netrc file.
    pub fn set_access(&self, access: Access) -> Result<()> {
        let value = self.validate_access(access)?;
        self.write_values(vec![value]);
        Ok(())
    }

    pub fn set_netrc_path(&self, path: Option<PathBuf>) {
        self.write().netrc_path = path;
    }

    /// Keys whose values are copied into every request's params.
    pub fn mirrored_keys(&self) -> Vec<ConfigKey> {
        self.read().mirrored_keys.clone()
    }

    /// Select which keys are mirrored to the server. Credentials and the
    /// base URL are never mirrored.
    pub fn set_mirrored_keys(&self, keys: &[ConfigKey]) -> Result<()> {
        if let Some(key) = keys.iter().find(|k| !k.is_mirrorable()) {
            return Err(Error::new(ErrorKind::Config(format!(
                "{} cannot be mirrored to the server",
                key.as_str()
            ))));
        }
        self.write().mirrored_keys = keys.to_vec();
        Ok(())
    }

    /// Current values of the mirrored keys, as request params.
    pub fn mirrored_params(&self) -> Vec<(String, Value)> {
        let state = self.read();
        state
            .mirrored_keys
            .iter()
            .filter_map(|key| {
                let value = match key {
                    ConfigKey::Compression => state.compression.as_str(),
                    ConfigKey::Mode => state.mode.as_str(),
                    ConfigKey::Access => state.access.as_str(),
                    ConfigKey::BaseUrl | ConfigKey::Token => return None,
                };
                Some((key.as_str().to_string(), Value::from(value)))
            })
            .collect()
    }

    /// Update one setting by name. Invalid keys or values leave the
    /// configuration untouched.
    pub fn update(&self, key: &str, value: &str) -> Result<()> {
        self.apply([(key, value)])
    }

    /// Update several settings by name. Every entry is validated before
    /// any of them is applied.
    pub fn apply<K, V>(&self, entries: impl IntoIterator<Item = (K, V)>) -> Result<()>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let values = entries
            .into_iter()
            .map(|(key, value)| self.validate(key.as_ref().parse()?, value.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        self.write_values(values);
        Ok(())
    }

    fn validate(&self, key: ConfigKey, value: &str) -> Result<ConfigValue> {
        Ok(match key {
            ConfigKey::BaseUrl => ConfigValue::BaseUrl(validate_base_url(value)?),
            ConfigKey::Token => {
                ConfigValue::Token(Some(value.to_string()).filter(|t| !t.is_empty()))
            }
            ConfigKey::Compression => ConfigValue::Compression(value.parse().map_err(|e| {
                Error::with_source(
                    ErrorKind::Config(format!(
                        "config.compression must be \"json\" or \"msgpack\", not {value:?}"
                    )),
                    e,
                )
            })?),
            ConfigKey::Mode => ConfigValue::Mode(value.parse()?),
            ConfigKey::Access => self.validate_access(value.parse()?)?,
        })
    }

    fn validate_access(&self, access: Access) -> Result<ConfigValue> {
        if access == Access::Collab {
            let path = self.netrc_path().ok_or_else(|| {
                Error::new(ErrorKind::Credentials(
                    "No .netrc file found in your HOME directory!".to_string(),
                ))
            })?;
            let store = NetrcStore::open(path)?;
            if let Some(host) = url::Url::parse(&self.base_url())
                .ok()
                .and_then(|u| u.host_str().map(str::to_string))
            {
                store.check(&[host.as_str()]);
            }
        }
        Ok(ConfigValue::Access(access))
    }

    fn write_values(&self, values: Vec<ConfigValue>) {
        let mut state = self.write();
        for value in values {
            match value {
                ConfigValue::BaseUrl(v) => state.base_url = v,
                ConfigValue::Token(v) => state.token = v,
                ConfigValue::Compression(v) => state.compression = v,
                ConfigValue::Mode(v) => state.mode = v,
                ConfigValue::Access(v) => state.access = v,
            }
        }
    }

    pub(crate) fn set_last_traceback(&self, traceback: Option<String>) {
        self.write().last_traceback = traceback;
    }

    /// Check out the shared HTTP client, creating it if none is live.
    pub fn acquire_session(&self) -> Result<SessionLease> {
        self.acquire_session_with(self.client_config.timeout)
    }

    /// Check out a client that enforces `timeout`.
    ///
    /// Timeouts other than the configured ones get their own client, which
    /// belongs to the current generation and is closed along with it.
    pub fn acquire_session_with(&self, timeout: Timeout) -> Result<SessionLease> {
        let mut slot = self.lock_session();
        let shared = match slot.client.clone() {
            Some(client) => client,
            None => {
                let client = build_http_client(&self.client_config, self.client_config.timeout)?;
                slot.generation += 1;
                slot.client = Some(client.clone());
                slot.tuned.clear();
                debug!(generation = slot.generation, "opened shared HTTP session");
                client
            }
        };

        if timeout == self.client_config.timeout {
            return Ok(SessionLease {
                client: shared,
                generation: slot.generation,
            });
        }

        let existing = slot
            .tuned
            .iter()
            .find(|(t, _)| *t == timeout)
            .map(|(_, client)| client.clone());
        let client = match existing {
            Some(client) => client,
            None => {
                let client = build_http_client(&self.client_config, timeout)?;
                slot.tuned.push((timeout, client.clone()));
                debug!(generation = slot.generation, ?timeout, "opened client for request timeout");
                client
            }
        };

        Ok(SessionLease {
            client,
            generation: slot.generation,
        })
    }

    /// Close the shared client if it is still the one `lease` was taken
    /// from. Returns true if this call closed it.
    pub fn invalidate_session(&self, lease: &SessionLease) -> bool {
        let mut slot = self.lock_session();
        if slot.generation == lease.generation && slot.client.is_some() {
            slot.clear();
            debug!(generation = lease.generation, "closed shared HTTP session");
            true
        } else {
            false
        }
    }

    /// Close the shared client unconditionally.
    pub fn close_session(&self) {
        self.lock_session().clear();
    }

    /// Generation of the live shared client, if one is open.
    pub fn session_generation(&self) -> Option<u64> {
        let slot = self.lock_session();
        slot.client.as_ref().map(|_| slot.generation)
    }

    fn read(&self) -> RwLockReadGuard<'_, ConfigState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ConfigState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_session(&self) -> MutexGuard<'_, SessionSlot> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn validate_base_url(base_url: &str) -> Result<String> {
    let parsed = url::Url::parse(base_url)?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(Error::new(ErrorKind::Config(format!(
            "base_url must be an http(s) URL with a host, not {base_url:?}"
        ))));
    }
    Ok(base_url.to_string())
}

/// Build the pooled client. Credentials are never attached here; the
/// per-request authenticator is the only source of Authorization headers.
fn build_http_client(config: &ClientConfig, timeout: Timeout) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(timeout.connect)
        .read_timeout(timeout.read)
        .pool_idle_timeout(config.pool_idle_timeout)
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .user_agent(&config.user_agent)
        .gzip(config.accept_compressed)
        .deflate(config.accept_compressed)
        .build()
        .map_err(|e| Error::with_source(ErrorKind::Config(e.to_string()), e))
}
