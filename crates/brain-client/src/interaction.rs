//! One client-to-server request/response exchange.
//!
//! An [`Interaction`] is built with [`Interaction::builder`], validated by
//! [`InteractionBuilder::build`], and consumed by [`Interaction::send`]:
//!
//! ```text
//! Built -> SessionAcquired -> AuthAttached -> Sent -> Decoded
//!                                                   \-> Failed
//! ```
//!
//! Any failure after the session was acquired closes the shared HTTP client
//! (if no one else has replaced it yet) before the error is returned, so the
//! next interaction starts on a fresh connection pool.

use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::de::{Deserialize, DeserializeOwned};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument};
use url::Url;

use brain_codec::Codec;

use crate::auth::{authenticator_for, AuthMode, Authenticator};
use crate::classify::{classify, server_failure, traceback};
use crate::config::Timeout;
use crate::decode::{self, decode_diagnostic, decode_response, DecodeOptions, Payload};
use crate::error::{Error, ErrorKind, Result, TransportFailure};
use crate::resolve::resolve;
use crate::session::{SessionConfig, SessionLease};
use crate::urlmap::UrlMap;

/// HTTP method of an interaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RequestMethod {
    Get,
    #[default]
    Post,
}

impl RequestMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestMethod::Get => "get",
            RequestMethod::Post => "post",
        }
    }

    /// Convert to reqwest::Method.
    pub fn to_reqwest(&self) -> reqwest::Method {
        match self {
            RequestMethod::Get => reqwest::Method::GET,
            RequestMethod::Post => reqwest::Method::POST,
        }
    }
}

impl fmt::Display for RequestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "get" => Ok(RequestMethod::Get),
            "post" => Ok(RequestMethod::Post),
            _ => Err(Error::new(ErrorKind::InvalidMethod(s.to_string()))),
        }
    }
}

/// Lifecycle state of an interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionState {
    Built,
    SessionAcquired,
    AuthAttached,
    Sent,
    Decoded,
    Failed,
}

/// How POST params are carried.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BodyEncoding {
    /// `application/x-www-form-urlencoded`
    #[default]
    Form,
    /// `application/json`
    Json,
}

/// Collects the settings of an [`Interaction`].
#[derive(Debug)]
pub struct InteractionBuilder {
    config: Arc<SessionConfig>,
    route: String,
    params: Map<String, Value>,
    method: String,
    auth: String,
    timeout: Option<Timeout>,
    stream: bool,
    datastream: bool,
    chunk_size: Option<usize>,
    headers: Vec<(String, String)>,
    body_encoding: BodyEncoding,
}

impl InteractionBuilder {
    /// Add one request param.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Add several request params.
    pub fn params<K, V>(mut self, params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.params
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Request method name, `"get"` or `"post"` (default).
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    /// Auth mode name: `none` (default), `token`, `netrc`, `http` or `oauth`.
    pub fn auth(mut self, mode: impl Into<String>) -> Self {
        self.auth = mode.into();
        self
    }

    /// Override the session's connect/read timeouts. The read timeout
    /// bounds the wait for the response headers and for each body chunk.
    pub fn timeout(mut self, timeout: Timeout) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Read the response body in chunks.
    pub fn stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// The response is a row-delimited stream. Implies `stream`.
    pub fn datastream(mut self, datastream: bool) -> Self {
        self.datastream = datastream;
        self
    }

    /// Buffer size for streamed bodies.
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = Some(chunk_size);
        self
    }

    /// Add an extra request header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Send POST params as a JSON body instead of a form.
    pub fn json_body(mut self, json: bool) -> Self {
        self.body_encoding = if json {
            BodyEncoding::Json
        } else {
            BodyEncoding::Form
        };
        self
    }

    /// Validate and produce the interaction. No network traffic happens here.
    pub fn build(self) -> Result<Interaction> {
        if self.route.trim().is_empty() {
            return Err(Error::new(ErrorKind::MissingRoute));
        }
        let method: RequestMethod = self.method.parse()?;
        let auth_mode: AuthMode = self.auth.parse()?;
        let auth = authenticator_for(auth_mode, &self.config)?;

        if self
            .headers
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case(AUTHORIZATION.as_str()))
        {
            return Err(Error::new(ErrorKind::Config(
                "the Authorization header is set by the auth mode, not as an extra header"
                    .to_string(),
            )));
        }

        let mut params = self.params;
        for (key, value) in self.config.mirrored_params() {
            params.entry(key).or_insert(value);
        }

        let codec = match params.get("compression") {
            Some(Value::String(name)) => name.parse::<Codec>()?,
            Some(Value::Null) | None => self.config.compression(),
            Some(other) => other.to_string().parse::<Codec>()?,
        };

        let url = resolve(&self.config.base_url(), &self.route);
        let client_config = self.config.client_config();
        let timeout = self.timeout.unwrap_or(client_config.timeout);
        let chunk_size = self.chunk_size.unwrap_or(client_config.chunk_size);

        debug!(%url, %method, auth = %auth_mode, %codec, "interaction built");

        Ok(Interaction {
            config: self.config,
            route: self.route,
            url,
            params,
            method,
            auth,
            codec,
            timeout,
            stream: self.stream || self.datastream,
            datastream: self.datastream,
            chunk_size,
            headers: self.headers,
            body_encoding: self.body_encoding,
            state: InteractionState::Built,
        })
    }
}

/// A single validated request, ready to send.
#[derive(Debug)]
pub struct Interaction {
    config: Arc<SessionConfig>,
    route: String,
    url: String,
    params: Map<String, Value>,
    method: RequestMethod,
    auth: Box<dyn Authenticator>,
    codec: Codec,
    timeout: Timeout,
    stream: bool,
    datastream: bool,
    chunk_size: usize,
    headers: Vec<(String, String)>,
    body_encoding: BodyEncoding,
    state: InteractionState,
}

impl Interaction {
    /// Start building an interaction for `route` on the given session.
    pub fn builder(config: &Arc<SessionConfig>, route: impl Into<String>) -> InteractionBuilder {
        InteractionBuilder {
            config: Arc::clone(config),
            route: route.into(),
            params: Map::new(),
            method: RequestMethod::default().as_str().to_string(),
            auth: AuthMode::default().as_str().to_string(),
            timeout: None,
            stream: false,
            datastream: false,
            chunk_size: None,
            headers: Vec::new(),
            body_encoding: BodyEncoding::default(),
        }
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    /// The route resolved against the session base URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Request params, including mirrored configuration keys.
    pub fn params(&self) -> &Map<String, Value> {
        &self.params
    }

    pub fn method(&self) -> RequestMethod {
        self.method
    }

    pub fn auth_mode(&self) -> AuthMode {
        self.auth.mode()
    }

    /// Codec used for row-delimited responses.
    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub fn timeout(&self) -> Timeout {
        self.timeout
    }

    pub fn state(&self) -> InteractionState {
        self.state
    }

    /// Send the request and decode the response.
    #[instrument(skip(self), fields(method = %self.method, url = %self.url, auth = %self.auth.mode()))]
    pub async fn send(mut self) -> Result<InteractionResult> {
        let lease = match self.config.acquire_session_with(self.timeout) {
            Ok(lease) => lease,
            Err(err) => {
                self.transition(InteractionState::Failed);
                return Err(err);
            }
        };
        self.transition(InteractionState::SessionAcquired);

        match self.exchange(&lease).await {
            Ok(result) => {
                self.transition(InteractionState::Decoded);
                Ok(result)
            }
            Err(mut err) => {
                self.transition(InteractionState::Failed);
                if self.config.invalidate_session(&lease) {
                    debug!(generation = lease.generation(), "shared session cleared after failure");
                }
                if err.url.is_none() {
                    err.url = Some(self.url.clone());
                }
                Err(err)
            }
        }
    }

    async fn exchange(&mut self, lease: &SessionLease) -> Result<InteractionResult> {
        let mut url = Url::parse(&self.url).map_err(|e| {
            Error::with_source(
                ErrorKind::Transport {
                    failure: TransportFailure::InvalidUrl,
                    message: format!("invalid request URL {}: {e}", self.url),
                },
                e,
            )
        })?;

        let client = lease.client();
        let mut request = match self.method {
            RequestMethod::Get => {
                let pairs = param_pairs(&self.params);
                if !pairs.is_empty() {
                    url.query_pairs_mut().extend_pairs(pairs);
                }
                client.get(url.clone())
            }
            RequestMethod::Post => {
                let request = client.post(url.clone());
                match self.body_encoding {
                    BodyEncoding::Form => {
                        let body = serde_urlencoded::to_string(param_pairs(&self.params))?;
                        request
                            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                            .body(body)
                    }
                    BodyEncoding::Json => request.json(&self.params),
                }
            }
        };

        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        request = request.header(ACCEPT, self.codec.content_type());

        request = self.auth.authorize(request, &url)?;
        self.transition(InteractionState::AuthAttached);

        let started = Instant::now();
        let response = request.send().await?;
        let response_time = started.elapsed();
        self.transition(InteractionState::Sent);

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let enable_tracing = self.config.client_config().enable_tracing;

        if !response.status().is_success() {
            if enable_tracing {
                info!(status, content_length = response.content_length(), "Non-success response");
            }
            let content_type = decode::content_type(&response);
            let body = match response.bytes().await {
                Ok(body) => body,
                Err(e) => {
                    debug!(status, error = %e, "could not read error response body");
                    bytes::Bytes::new()
                }
            };
            let diagnostic = decode_diagnostic(content_type.as_deref(), &body);
            if let Some(tb) = diagnostic.as_ref().and_then(traceback) {
                self.config.set_last_traceback(Some(tb));
            }
            let kind = classify(status, diagnostic.as_ref(), self.auth.mode(), &final_url);
            return Err(Error::new(kind).with_status(status).with_url(final_url));
        }

        if enable_tracing {
            debug!(status, content_length = response.content_length(), "Response received");
        }

        let options = DecodeOptions {
            stream: self.stream,
            row_delimited: self.datastream,
            codec: self.codec,
            chunk_size: self.chunk_size,
        };
        let results = decode_response(response, &options)
            .await
            .map_err(|e| e.with_status(status))?;

        if results.is_falsy() {
            return Err(Error::new(ErrorKind::MalformedResponse(format!(
                "empty response from {final_url}"
            )))
            .with_status(status)
            .with_url(final_url));
        }

        if let Some((message, tb)) = results.as_json().and_then(server_failure) {
            self.config.set_last_traceback(tb.clone());
            return Err(Error::new(ErrorKind::ServerSide {
                message,
                traceback: tb,
            })
            .with_status(status)
            .with_url(final_url));
        }

        Ok(InteractionResult {
            status_code: status,
            url: final_url,
            results,
            response_time,
        })
    }

    fn transition(&mut self, state: InteractionState) {
        debug!(from = ?self.state, to = ?state, "interaction state");
        self.state = state;
    }
}

/// Flatten params into string pairs. Null values are dropped and arrays
/// repeat their key.
fn param_pairs(params: &Map<String, Value>) -> Vec<(String, String)> {
    let mut pairs = Vec::with_capacity(params.len());
    for (key, value) in params {
        match value {
            Value::Null => {}
            Value::Array(items) => pairs.extend(
                items
                    .iter()
                    .filter(|item| !item.is_null())
                    .map(|item| (key.clone(), param_text(item))),
            ),
            other => pairs.push((key.clone(), param_text(other))),
        }
    }
    pairs
}

fn param_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Outcome of a successful interaction.
#[derive(Debug, Clone)]
pub struct InteractionResult {
    pub status_code: u16,
    /// Final URL, after redirects.
    pub url: String,
    pub results: Payload,
    /// Time until the response headers arrived.
    pub response_time: Duration,
}

impl InteractionResult {
    /// The envelope's `data` member.
    pub fn data(&self) -> Option<&Value> {
        self.results.as_json().and_then(|v| v.get("data"))
    }

    /// The envelope's `data` member converted to `T`.
    ///
    /// ```no_run
    /// # async fn run(result: brain_client::InteractionResult) -> brain_client::Result<()> {
    /// let cubes: Vec<String> = result.data_as()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T> {
        let data = self.data().ok_or_else(|| {
            Error::new(ErrorKind::MalformedResponse(format!(
                "response from {} carries no data",
                self.url
            )))
        })?;
        Ok(T::deserialize(data)?)
    }

    /// The `urlmap` member, at the top level or under `data`.
    ///
    /// A response without one yields an empty map.
    pub fn route_map(&self) -> UrlMap {
        self.results
            .as_json()
            .and_then(|v| v.get("urlmap").or_else(|| v.get("data")?.get("urlmap")))
            .cloned()
            .map(UrlMap::new)
            .unwrap_or_default()
    }

    /// Consume the result, keeping the decoded JSON if there is any.
    pub fn into_json(self) -> Option<Value> {
        self.results.into_json()
    }
}
