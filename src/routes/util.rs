//! Shared request parsing and JSON response helpers for route handlers.

use serde::Serialize;
use serde_json::json;
use std::str::FromStr;

/// Decoded `key=value&key2=value2` pairs from a query string or form body.
#[derive(Debug, Default)]
pub struct Params(Vec<(String, String)>);

impl Params {
    /// Parse a URL-encoded form body.
    pub fn from_form(body: &str) -> Self {
        if body.is_empty() {
            return Self::default();
        }
        Self(
            body.split('&')
                .filter(|pair| !pair.is_empty())
                .map(|pair| {
                    let (key, val) = pair.split_once('=').unwrap_or((pair, ""));
                    (percent_decode(key), percent_decode(val))
                })
                .collect(),
        )
    }

    /// Parse a query string, with or without the leading `?`.
    pub fn from_query(query: &str) -> Self {
        Self::from_form(query.strip_prefix('?').unwrap_or(query))
    }

    /// First value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Non-blank value for `key`, or an error message naming it.
    pub fn require(&self, key: &str) -> Result<&str, String> {
        match self.get(key) {
            Some(v) if !v.trim().is_empty() => Ok(v),
            _ => Err(format!("missing {} parameter", key)),
        }
    }

    /// Parse a required value.
    pub fn parse<T: FromStr>(&self, key: &str) -> Result<T, String> {
        self.require(key)?
            .trim()
            .parse()
            .map_err(|_| format!("invalid {} parameter", key))
    }

    /// Parse an optional value; absent or unparsable values give `None`.
    pub fn parse_opt<T: FromStr>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| v.trim().parse().ok())
    }
}

/// Percent-decode a URL-encoded value; `+` is a space. Invalid escapes
/// pass through unchanged and invalid UTF-8 is replaced.
pub fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => match (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                (Some(hi), Some(lo)) => {
                    out.push(hi << 4 | lo);
                    i += 3;
                }
                _ => {
                    out.push(b'%');
                    i += 1;
                }
            },
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(b: u8) -> Option<u8> {
    (b as char).to_digit(16).map(|d| d as u8)
}

/// Serialize a response body. Serialization of engine types cannot fail in
/// practice; if it does, the failure is reported as an error body.
pub fn json_ok<T: Serialize>(body: &T) -> String {
    serde_json::to_string(body).unwrap_or_else(|e| json_error(&format!("serialization failed: {}", e)))
}

pub fn json_error(message: &str) -> String {
    json!({ "error": message }).to_string()
}
