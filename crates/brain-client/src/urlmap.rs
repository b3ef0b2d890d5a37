//! Server-published route map.
//!
//! The server answers its route-map endpoint with a nested object of
//! `blueprint -> endpoint -> {"url": ..., ...}`. Clients look routes up here
//! instead of hard-coding paths.

use serde_json::Value;

use crate::error::{Error, ErrorKind, Result};

/// Nested route map returned by the server.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UrlMap(Value);

impl UrlMap {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn is_empty(&self) -> bool {
        match &self.0 {
            Value::Object(map) => map.is_empty(),
            Value::Null => true,
            _ => false,
        }
    }

    /// Walk `path` through the nested map.
    pub fn get(&self, path: &[&str]) -> Result<&Value> {
        let mut current = &self.0;
        for key in path {
            let level = match current {
                Value::Object(map) => map,
                Value::Null => return Err(no_map()),
                _ => return Err(missing_key(key)),
            };
            if level.is_empty() {
                return Err(no_map());
            }
            current = level.get(*key).ok_or_else(|| missing_key(key))?;
        }
        Ok(current)
    }

    /// The `url` of `endpoint` in `blueprint`.
    pub fn url_for(&self, blueprint: &str, endpoint: &str) -> Result<&str> {
        let url = self.get(&[blueprint, endpoint, "url"])?;
        url.as_str().ok_or_else(|| {
            Error::new(ErrorKind::RouteMap(format!(
                "Key url of {blueprint}.{endpoint} is not a string in urlmap."
            )))
        })
    }

    pub fn into_inner(self) -> Value {
        self.0
    }
}

impl From<Value> for UrlMap {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

fn no_map() -> Error {
    Error::new(ErrorKind::RouteMap(
        "No URL Map found. Cannot make remote call".to_string(),
    ))
}

fn missing_key(key: &str) -> Error {
    Error::new(ErrorKind::RouteMap(format!("Key {key} not found in urlmap.")))
}
