//! Mapping of HTTP failures onto [`ErrorKind`].
//!
//! [`classify`] is pure: it looks at the status, the decoded diagnostic body
//! and the auth mode, and returns the kind the interaction raises.

use regex_lite::Regex;
use serde_json::Value;
use std::sync::LazyLock;

use crate::auth::AuthMode;
use crate::error::ErrorKind;

const MAX_MESSAGE_LENGTH: usize = 500;

/// Human-readable text for the status codes the server commonly returns.
pub fn status_text(status: u16) -> &'static str {
    match status {
        200 => "Ok",
        400 => "Bad Request",
        401 => "Authentication Required",
        404 => "URL Not Found",
        405 => "Method Not Allowed",
        422 => "Unprocessable Entity",
        429 => "Rate Limit Exceeded",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        504 => "Gateway Timeout",
        _ => "Unknown Status",
    }
}

/// Classify a non-success response.
///
/// `body` is whatever could be decoded from the response, if anything.
pub fn classify(status: u16, body: Option<&Value>, auth_mode: AuthMode, url: &str) -> ErrorKind {
    match status {
        401 => {
            let mut message = auth_hint(auth_mode).to_string();
            if let Some(detail) = body.and_then(detail_message) {
                message.push_str(": ");
                message.push_str(&detail);
            }
            ErrorKind::Auth(message)
        }
        422 => {
            let payload = body
                .and_then(|b| b.get("validation_errors"))
                .or(body)
                .cloned()
                .unwrap_or(Value::Null);
            let message = body
                .and_then(detail_message)
                .unwrap_or_else(|| "invalid input parameters".to_string());
            ErrorKind::Validation { message, payload }
        }
        _ => {
            let message = body.and_then(detail_message).unwrap_or_else(|| {
                format!("Error accessing {url}: {status}-{}", status_text(status))
            });
            ErrorKind::Request {
                status,
                message,
                traceback: body.and_then(traceback),
            }
        }
    }
}

/// Detect a failure reported inside a success envelope (`"status": -1`).
///
/// Returns the error message and the server traceback.
pub fn server_failure(body: &Value) -> Option<(String, Option<String>)> {
    if body.get("status").and_then(Value::as_i64) != Some(-1) {
        return None;
    }
    let message = body
        .get("error")
        .and_then(Value::as_str)
        .map(sanitize_message)
        .unwrap_or_else(|| "the server reported a failure".to_string());
    Some((message, traceback(body)))
}

/// Server-supplied traceback, if present.
pub fn traceback(body: &Value) -> Option<String> {
    body.get("traceback").and_then(|tb| match tb {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    })
}

fn auth_hint(mode: AuthMode) -> &'static str {
    match mode {
        AuthMode::Netrc => {
            "Please ensure your .netrc file is set up correctly with valid credentials for this host"
        }
        AuthMode::Token => "Your token is invalid or has expired. Please login again",
        AuthMode::Http => "HTTP basic authentication was rejected by the server",
        AuthMode::OAuth => "OAuth authentication was rejected by the server",
        AuthMode::None => "This route requires authentication",
    }
}

fn detail_message(body: &Value) -> Option<String> {
    if let Value::String(text) = body {
        let text = text.trim();
        return (!text.is_empty()).then(|| sanitize_message(text));
    }
    ["error", "detail", "message"]
        .iter()
        .filter_map(|key| body.get(key))
        .find_map(|value| match value {
            Value::String(s) if !s.is_empty() => Some(sanitize_message(s)),
            Value::Null | Value::String(_) => None,
            other => Some(sanitize_message(&other.to_string())),
        })
}

static BEARER_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)bearer\s+[A-Za-z0-9._~+/=-]+").ok());

static BASIC_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)basic\s+[A-Za-z0-9+/=]{8,}").ok());

/// Redact credentials from a message copied out of a response or transport
/// error and cap its length.
pub(crate) fn sanitize_message(message: &str) -> String {
    let mut sanitized = message.to_string();

    if let Some(pattern) = BEARER_PATTERN.as_ref() {
        sanitized = pattern
            .replace_all(&sanitized, "Bearer [REDACTED]")
            .to_string();
    }
    if let Some(pattern) = BASIC_PATTERN.as_ref() {
        sanitized = pattern
            .replace_all(&sanitized, "Basic [REDACTED]")
            .to_string();
    }

    if sanitized.len() > MAX_MESSAGE_LENGTH {
        let mut end = MAX_MESSAGE_LENGTH;
        while !sanitized.is_char_boundary(end) {
            end -= 1;
        }
        sanitized.truncate(end);
        sanitized.push_str("...[truncated]");
    }

    sanitized
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const URL: &str = "https://api.sdss.org/cubes/";

    #[test]
    fn test_401_netrc_mentions_credential_file() {
        let kind = classify(401, None, AuthMode::Netrc, URL);
        match kind {
            ErrorKind::Auth(message) => assert!(message.contains(".netrc")),
            other => panic!("Expected Auth, got {other:?}"),
        }
    }

    #[test]
    fn test_401_includes_server_detail() {
        let body = json!({"detail": "token expired"});
        let kind = classify(401, Some(&body), AuthMode::Token, URL);
        match kind {
            ErrorKind::Auth(message) => {
                assert!(message.contains("login again"));
                assert!(message.ends_with(": token expired"));
            }
            other => panic!("Expected Auth, got {other:?}"),
        }
    }

    #[test]
    fn test_401_hint_differs_by_mode() {
        let hints: Vec<String> = [AuthMode::Netrc, AuthMode::Token, AuthMode::Http, AuthMode::OAuth]
            .into_iter()
            .map(|mode| classify(401, None, mode, URL).to_string())
            .collect();
        for (i, a) in hints.iter().enumerate() {
            for b in &hints[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_422_carries_validation_payload() {
        let body = json!({
            "error": "invalid input",
            "validation_errors": {"release": ["Not a valid choice."]}
        });
        match classify(422, Some(&body), AuthMode::None, URL) {
            ErrorKind::Validation { message, payload } => {
                assert_eq!(message, "invalid input");
                assert_eq!(payload, json!({"release": ["Not a valid choice."]}));
            }
            other => panic!("Expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn test_422_without_validation_key_keeps_body() {
        let body = json!({"release": ["required"]});
        match classify(422, Some(&body), AuthMode::None, URL) {
            ErrorKind::Validation { payload, .. } => assert_eq!(payload, body),
            other => panic!("Expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn test_other_status_uses_status_table() {
        match classify(404, None, AuthMode::None, URL) {
            ErrorKind::Request {
                status,
                message,
                traceback,
            } => {
                assert_eq!(status, 404);
                assert_eq!(message, format!("Error accessing {URL}: 404-URL Not Found"));
                assert!(traceback.is_none());
            }
            other => panic!("Expected Request, got {other:?}"),
        }

        let kind = classify(418, None, AuthMode::None, URL);
        assert!(kind.to_string().contains("418-Unknown Status"));
    }

    #[test]
    fn test_other_status_extracts_body_message() {
        let body = json!({"error": "boom", "traceback": "File \"x.py\", line 1"});
        match classify(500, Some(&body), AuthMode::None, URL) {
            ErrorKind::Request {
                message, traceback, ..
            } => {
                assert_eq!(message, "boom");
                assert_eq!(traceback.as_deref(), Some("File \"x.py\", line 1"));
            }
            other => panic!("Expected Request, got {other:?}"),
        }

        let text = Value::String("Internal Server Error\n".into());
        let kind = classify(500, Some(&text), AuthMode::None, URL);
        assert!(kind.to_string().contains("Internal Server Error"));
    }

    #[test]
    fn test_server_failure_envelope() {
        let body = json!({"status": -1, "error": "bad query", "traceback": "tb"});
        let (message, tb) = server_failure(&body).unwrap();
        assert_eq!(message, "bad query");
        assert_eq!(tb.as_deref(), Some("tb"));

        assert!(server_failure(&json!({"status": 1, "data": []})).is_none());
        assert!(server_failure(&json!([1, 2])).is_none());
    }

    #[test]
    fn test_sanitize_redacts_credentials() {
        let sanitized = sanitize_message("header was Bearer abc.def-123 and Basic dGVzdDp0ZXN0");
        assert!(!sanitized.contains("abc.def-123"));
        assert!(!sanitized.contains("dGVzdDp0ZXN0"));
        assert!(sanitized.contains("Bearer [REDACTED]"));
        assert!(sanitized.contains("Basic [REDACTED]"));
    }

    #[test]
    fn test_sanitize_truncates() {
        let long = "é".repeat(400);
        let sanitized = sanitize_message(&long);
        assert!(sanitized.ends_with("...[truncated]"));
        assert!(sanitized.len() <= MAX_MESSAGE_LENGTH + "...[truncated]".len());
    }
}
