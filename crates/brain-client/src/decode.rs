//! Response body decoding.
//!
//! The body format is picked from the Content-Type header:
//!
//! | Content-Type contains | Decoded as             |
//! |-----------------------|------------------------|
//! | `json`                | JSON value             |
//! | `octet-stream`        | msgpack value          |
//! | anything else         | raw bytes, unmodified  |
//!
//! Row-delimited streams ignore the header: the body is a series of rows
//! joined by [`ROW_DELIMITER`], each encoded on its own with the session
//! codec, and the result is `{"data": [row, ...]}`.

use bytes::{Buf, Bytes, BytesMut};
use reqwest::header::CONTENT_TYPE;
use reqwest::Response;
use serde_json::{json, Value};
use tracing::debug;

use brain_codec::Codec;

use crate::config::DEFAULT_CHUNK_SIZE;
use crate::error::{Error, ErrorKind, Result};

/// Separator between independently encoded rows.
pub const ROW_DELIMITER: &[u8] = b";\n";

/// A decoded response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    Raw(Bytes),
}

impl Payload {
    /// True for bodies that carry nothing: null, false, zero, and empty
    /// strings, arrays, objects or byte buffers.
    pub fn is_falsy(&self) -> bool {
        match self {
            Payload::Raw(bytes) => bytes.is_empty(),
            Payload::Json(value) => match value {
                Value::Null => true,
                Value::Bool(b) => !b,
                Value::Number(n) => n.as_f64() == Some(0.0),
                Value::String(s) => s.is_empty(),
                Value::Array(a) => a.is_empty(),
                Value::Object(o) => o.is_empty(),
            },
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(value) => Some(value),
            Payload::Raw(_) => None,
        }
    }

    pub fn into_json(self) -> Option<Value> {
        match self {
            Payload::Json(value) => Some(value),
            Payload::Raw(_) => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Payload::Raw(bytes) => Some(bytes),
            Payload::Json(_) => None,
        }
    }
}

/// How the body of a successful response should be read.
#[derive(Debug, Clone, Copy)]
pub struct DecodeOptions {
    /// Accumulate the body chunk by chunk instead of in one read.
    pub stream: bool,
    /// Body is a row-delimited stream.
    pub row_delimited: bool,
    /// Codec of each row in a row-delimited stream.
    pub codec: Codec,
    /// Initial buffer capacity for streamed bodies.
    pub chunk_size: usize,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            stream: false,
            row_delimited: false,
            codec: Codec::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Body format selected from the Content-Type header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Json,
    Binary,
    Raw,
}

impl BodyKind {
    pub fn sniff(content_type: Option<&str>) -> Self {
        let content_type = content_type.unwrap_or_default().to_ascii_lowercase();
        if content_type.contains("json") {
            BodyKind::Json
        } else if content_type.contains("octet-stream") {
            BodyKind::Binary
        } else {
            BodyKind::Raw
        }
    }
}

/// Content-Type header of a response, if it is valid text.
pub(crate) fn content_type(response: &Response) -> Option<String> {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Decode the body of a successful response.
pub async fn decode_response(response: Response, options: &DecodeOptions) -> Result<Payload> {
    let content_type = content_type(&response);

    if options.row_delimited {
        return decode_row_stream(response, options).await;
    }

    let kind = BodyKind::sniff(content_type.as_deref());
    debug!(?kind, stream = options.stream, "decoding response body");

    match (kind, options.stream) {
        (BodyKind::Json, false) => {
            let value = response.json::<Value>().await?;
            Ok(Payload::Json(value))
        }
        (_, true) => {
            let body = read_chunked(response, options.chunk_size).await?;
            decode_body(kind, body)
        }
        (_, false) => {
            let body = response.bytes().await?;
            decode_body(kind, body)
        }
    }
}

/// Decode a fully read body of the given kind.
pub fn decode_body(kind: BodyKind, body: Bytes) -> Result<Payload> {
    match kind {
        BodyKind::Json => brain_codec::uncompress(&body, Codec::Json)
            .map(Payload::Json)
            .map_err(|e| malformed("response is not valid JSON", e)),
        BodyKind::Binary => brain_codec::uncompress(&body, Codec::Msgpack)
            .map(Payload::Json)
            .map_err(|e| malformed("response is not valid msgpack", e)),
        BodyKind::Raw => Ok(Payload::Raw(body)),
    }
}

/// Decode a fully read row-delimited body into `{"data": [...]}`.
pub fn decode_rows(body: &[u8], codec: Codec) -> Result<Value> {
    let mut splitter = RowSplitter::default();
    let mut rows = Vec::new();
    for row in splitter.push(body).into_iter().chain(splitter.finish()) {
        rows.push(decode_row(&row, codec)?);
    }
    Ok(json!({ "data": rows }))
}

/// Best-effort decode of an error response body, for diagnostics only.
pub(crate) fn decode_diagnostic(content_type: Option<&str>, body: &[u8]) -> Option<Value> {
    if body.is_empty() {
        return None;
    }
    let decoded = match BodyKind::sniff(content_type) {
        BodyKind::Json => serde_json::from_slice(body).ok(),
        BodyKind::Binary => brain_codec::uncompress(body, Codec::Msgpack).ok(),
        BodyKind::Raw => serde_json::from_slice(body).ok(),
    };
    decoded.or_else(|| {
        let text = String::from_utf8_lossy(body).trim().to_string();
        (!text.is_empty()).then_some(Value::String(text))
    })
}

async fn decode_row_stream(mut response: Response, options: &DecodeOptions) -> Result<Payload> {
    let mut splitter = RowSplitter::with_capacity(options.chunk_size);
    let mut rows = Vec::new();

    while let Some(chunk) = response.chunk().await? {
        for row in splitter.push(&chunk) {
            rows.push(decode_row(&row, options.codec)?);
        }
    }
    if let Some(row) = splitter.finish() {
        rows.push(decode_row(&row, options.codec)?);
    }

    debug!(rows = rows.len(), codec = %options.codec, "decoded row-delimited stream");
    Ok(Payload::Json(json!({ "data": rows })))
}

fn decode_row(row: &[u8], codec: Codec) -> Result<Value> {
    brain_codec::uncompress(row, codec).map_err(|e| malformed("could not decode stream row", e))
}

async fn read_chunked(mut response: Response, chunk_size: usize) -> Result<Bytes> {
    let chunk_size = chunk_size.max(1);
    let mut buffer = BytesMut::with_capacity(chunk_size);
    while let Some(chunk) = response.chunk().await? {
        if buffer.capacity() - buffer.len() < chunk.len() {
            buffer.reserve(chunk.len().max(chunk_size));
        }
        buffer.extend_from_slice(&chunk);
    }
    Ok(buffer.freeze())
}

fn malformed(context: &str, err: brain_codec::Error) -> Error {
    Error::with_source(
        ErrorKind::MalformedResponse(format!("{context}: {err}")),
        err,
    )
}

/// Splits a byte stream on [`ROW_DELIMITER`], across chunk boundaries.
///
/// Empty rows are dropped.
#[derive(Debug, Default)]
pub struct RowSplitter {
    pending: BytesMut,
}

impl RowSplitter {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            pending: BytesMut::with_capacity(capacity),
        }
    }

    /// Feed one chunk and return every row it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        // A delimiter may straddle the previous chunk, so rescan from just
        // before the old end.
        let mut from = self.pending.len().saturating_sub(ROW_DELIMITER.len() - 1);
        self.pending.extend_from_slice(chunk);

        let mut rows = Vec::new();
        while let Some(pos) = find(&self.pending[from..], ROW_DELIMITER) {
            let row = self.pending.split_to(from + pos).freeze();
            self.pending.advance(ROW_DELIMITER.len());
            if !row.is_empty() {
                rows.push(row);
            }
            from = 0;
        }
        rows
    }

    /// The trailing row after the last delimiter, if any.
    pub fn finish(&mut self) -> Option<Bytes> {
        let rest = self.pending.split().freeze();
        (!rest.is_empty()).then_some(rest)
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
