//! Remote document store adapter — per-user documents that accept partial
//! merge writes and stamp every write with a store-assigned timestamp.
//!
//! [`YrsDocumentStore`] is the in-browser implementation. Each document is
//! a root `YMap` named by its [`DocumentKey`]; nested records are flattened
//! into dotted field paths so a merge write touches exactly the leaves it
//! carries and nothing else.
//!
//! ## Doc Structure
//!
//! ```text
//! yrs::Doc
//! ├── "users/user:42" (YMap)
//! │   ├── "activities.spelling.totalPoints" (number)
//! │   └── "updatedAt" (number)
//! └── "users/user:42/activities/spelling" (YMap)
//!     ├── "totalPoints" (number)
//!     ├── "completedLevels.1" (bool)
//!     ├── "levelScores.1" (number)
//!     └── "updatedAt" (number)
//! ```

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use tracing::debug;
use yrs::updates::decoder::Decode;
use yrs::{Any, Doc, Map, ReadTxn, StateVector, Transact, Update};

use crate::config::EngineConfig;
use crate::engine::clock::Clock;
use crate::engine::identity::Namespace;
use crate::error::{EngineError, Result};

/// A structured document body, or a partial one for a merge write.
pub type Record = serde_json::Map<String, Value>;

/// Field the store stamps on every merge write.
pub const UPDATED_AT: &str = "updatedAt";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentKey(String);

impl DocumentKey {
    /// Per-user summary document: `<users>/<namespace>`.
    pub fn user(config: &EngineConfig, namespace: &Namespace) -> Self {
        Self(format!(
            "{}/{}",
            config.users_collection,
            escape_segment(&namespace.segment(config))
        ))
    }

    /// Per-activity progress document: `<users>/<namespace>/<activities>/<activity>`.
    pub fn activity(config: &EngineConfig, namespace: &Namespace, activity: &str) -> Self {
        let user = Self::user(config, namespace);
        Self(format!(
            "{}/{}/{}",
            user.0,
            config.activities_collection,
            escape_segment(activity)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Async document store. Single-threaded, so futures need not be `Send`.
#[async_trait(?Send)]
pub trait DocumentStore {
    /// Fetch a document. `Ok(None)` when nothing has been written to it.
    async fn get(&self, key: &DocumentKey) -> Result<Option<Record>>;

    /// Merge `partial` into the document, leaving untouched fields intact.
    async fn merge_write(&self, key: &DocumentKey, partial: Record) -> Result<()>;
}

// ── Yrs-backed store ───────────────────────────────────────────────

pub struct YrsDocumentStore {
    doc: RefCell<Doc>,
    clock: Rc<dyn Clock>,
}

impl YrsDocumentStore {
    pub fn new(clock: Rc<dyn Clock>) -> Self {
        Self {
            doc: RefCell::new(Doc::new()),
            clock,
        }
    }

    /// Encode the full store as a URL-safe base64 string.
    pub fn encode_state(&self) -> String {
        let doc = self.doc.borrow();
        let state = doc.transact().encode_diff_v1(&StateVector::default());
        URL_SAFE_NO_PAD.encode(&state)
    }

    /// Replace the store with a previously encoded state. Empty input is a no-op.
    pub fn restore_state(&self, state_b64: &str) -> Result<()> {
        if state_b64.is_empty() {
            return Ok(());
        }
        let bytes = URL_SAFE_NO_PAD
            .decode(state_b64)
            .map_err(|e| EngineError::Storage(format!("base64 decode error: {}", e)))?;
        let update = Update::decode_v1(&bytes)
            .map_err(|e| EngineError::Storage(format!("state decode error: {}", e)))?;
        let doc = Doc::new();
        {
            let mut txn = doc.transact_mut();
            txn.apply_update(update)
                .map_err(|e| EngineError::Storage(format!("restore error: {}", e)))?;
        }
        *self.doc.borrow_mut() = doc;
        Ok(())
    }

    fn read(&self, key: &DocumentKey) -> Option<Record> {
        let doc = self.doc.borrow();
        let map = doc.get_or_insert_map(key.as_str());
        let txn = doc.transact();
        let paths: Vec<String> = map.keys(&txn).map(|k| k.to_string()).collect();
        if paths.is_empty() {
            return None;
        }
        let mut record = Record::new();
        for path in paths {
            if let Some(yrs::Out::Any(value)) = map.get(&txn, &path) {
                insert_path(&mut record, &path, any_to_json(&value));
            }
        }
        Some(record)
    }

    fn write(&self, key: &DocumentKey, partial: &Record) {
        let mut leaves = Vec::new();
        flatten_into("", partial, &mut leaves);
        leaves.push((UPDATED_AT.to_string(), Any::Number(self.clock.now_ms() as f64)));

        let doc = self.doc.borrow();
        let map = doc.get_or_insert_map(key.as_str());
        let mut txn = doc.transact_mut();
        let existing: Vec<String> = map.keys(&txn).map(|k| k.to_string()).collect();
        for (path, value) in leaves {
            // A leaf replaces any subtree below it and any leaf above it.
            let below = format!("{}.", path);
            for old in &existing {
                if old.starts_with(&below) || path.starts_with(&format!("{}.", old)) {
                    map.remove(&mut txn, old);
                }
            }
            map.insert(&mut txn, path, value);
        }
    }
}

#[async_trait(?Send)]
impl DocumentStore for YrsDocumentStore {
    async fn get(&self, key: &DocumentKey) -> Result<Option<Record>> {
        Ok(self.read(key))
    }

    async fn merge_write(&self, key: &DocumentKey, partial: Record) -> Result<()> {
        self.write(key, &partial);
        debug!(document = %key, fields = partial.len(), "merge write applied");
        Ok(())
    }
}

// ── Field paths ────────────────────────────────────────────────────

/// Escape the characters that carry structure in keys and field paths.
pub(crate) fn escape_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for c in segment.chars() {
        match c {
            '%' => out.push_str("%25"),
            '.' => out.push_str("%2E"),
            '/' => out.push_str("%2F"),
            _ => out.push(c),
        }
    }
    out
}

pub(crate) fn unescape_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    let mut rest = segment;
    while let Some(idx) = rest.find('%') {
        out.push_str(&rest[..idx]);
        let code = rest.get(idx + 1..idx + 3);
        match code {
            Some("25") => out.push('%'),
            Some("2E") => out.push('.'),
            Some("2F") => out.push('/'),
            _ => {
                out.push('%');
                rest = &rest[idx + 1..];
                continue;
            }
        }
        rest = &rest[idx + 3..];
    }
    out.push_str(rest);
    out
}

fn flatten_into(prefix: &str, record: &Record, out: &mut Vec<(String, Any)>) {
    for (field, value) in record {
        let path = if prefix.is_empty() {
            escape_segment(field)
        } else {
            format!("{}.{}", prefix, escape_segment(field))
        };
        match value {
            Value::Object(inner) => flatten_into(&path, inner, out),
            other => out.push((path, json_to_any(other))),
        }
    }
}

fn insert_path(record: &mut Record, path: &str, value: Value) {
    let segments: Vec<String> = path.split('.').map(unescape_segment).collect();
    let Some((leaf, parents)) = segments.split_last() else {
        return;
    };
    let mut node = record;
    for parent in parents {
        let entry = node
            .entry(parent.clone())
            .or_insert_with(|| Value::Object(Record::new()));
        if !entry.is_object() {
            *entry = Value::Object(Record::new());
        }
        let Value::Object(inner) = entry else {
            return;
        };
        node = inner;
    }
    node.insert(leaf.clone(), value);
}

// ── Value conversion ───────────────────────────────────────────────

const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

fn json_to_any(value: &Value) -> Any {
    match value {
        Value::Null => Any::Null,
        Value::Bool(b) => Any::Bool(*b),
        Value::Number(n) => match (n.as_i64(), n.as_u64()) {
            (Some(i), _) if (i as f64).abs() > MAX_SAFE_INTEGER => Any::BigInt(i),
            // Above i64::MAX there is no lossless number type; kept as text.
            (None, Some(u)) => Any::String(Arc::from(u.to_string().as_str())),
            _ => Any::Number(n.as_f64().unwrap_or(0.0)),
        },
        Value::String(s) => Any::String(Arc::from(s.as_str())),
        Value::Array(items) => {
            let items: Vec<Any> = items.iter().map(json_to_any).collect();
            Any::Array(Arc::from(items))
        }
        Value::Object(fields) => {
            let fields: HashMap<String, Any> = fields
                .iter()
                .map(|(k, v)| (k.clone(), json_to_any(v)))
                .collect();
            Any::Map(Arc::new(fields))
        }
    }
}

/// Read a stored non-negative integer, including values above `i64::MAX`,
/// which the store keeps as decimal text.
pub fn read_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn any_to_json(any: &Any) -> Value {
    match any {
        Any::Bool(b) => Value::Bool(*b),
        Any::Number(n) => number_to_json(*n),
        Any::BigInt(i) => Value::from(*i),
        Any::String(s) => Value::String(s.to_string()),
        Any::Array(items) => Value::Array(items.iter().map(any_to_json).collect()),
        Any::Map(fields) => Value::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), any_to_json(v)))
                .collect(),
        ),
        _ => Value::Null,
    }
}

fn number_to_json(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        if n >= 0.0 {
            return Value::from(n as u64);
        }
        return Value::from(n as i64);
    }
    serde_json::Number::from_f64(n)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}
