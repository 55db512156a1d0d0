//! Key-value persistence adapter — the local, string-keyed store that holds
//! cart and owned-item sequences.
//!
//! In the browser the durable store is `localStorage`, which only the main
//! thread can touch. [`MemoryStore`] mirrors it inside WASM memory: JS seeds
//! it on page load ([`MemoryStore::hydrate`]) and drains the writes made
//! since the last drain ([`MemoryStore::take_pending`]).

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::cell::RefCell;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::error::{EngineError, Result};

/// Synchronous string-keyed store. Reads never fail; a missing or
/// unreadable value is simply `None`.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn clear(&self, key: &str) -> Result<()>;
}

/// A write waiting to be flushed to the durable store. `None` means the key was cleared.
pub type PendingWrite = (String, Option<String>);

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RefCell<BTreeMap<String, String>>,
    pending: RefCell<BTreeMap<String, Option<String>>>,
    /// Total bytes (keys + values) the store accepts, like a browser quota.
    quota: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(bytes: usize) -> Self {
        Self {
            quota: Some(bytes),
            ..Self::default()
        }
    }

    /// Seed a value read from the durable store. Not recorded as pending.
    pub fn hydrate(&self, key: &str, value: &str) {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
    }

    /// Drain the writes made since the last drain, in key order.
    pub fn take_pending(&self) -> Vec<PendingWrite> {
        std::mem::take(&mut *self.pending.borrow_mut())
            .into_iter()
            .collect()
    }

    fn used_bytes_without(&self, key: &str) -> usize {
        self.entries
            .borrow()
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(k, v)| k.len() + v.len())
            .sum()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        if let Some(quota) = self.quota {
            let needed = key.len() + value.len();
            let available = quota.saturating_sub(self.used_bytes_without(key));
            if needed > available {
                return Err(EngineError::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    available,
                });
            }
        }
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        self.pending
            .borrow_mut()
            .insert(key.to_string(), Some(value.to_string()));
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<()> {
        self.entries.borrow_mut().remove(key);
        self.pending.borrow_mut().insert(key.to_string(), None);
        Ok(())
    }
}

// ── Sequence codec ─────────────────────────────────────────────────

/// Read a JSON array stored under `key`.
///
/// Absent values, malformed text, and non-array JSON all read as an empty
/// sequence. Elements that do not decode as `T` are skipped.
pub fn read_sequence<T: DeserializeOwned>(store: &impl KeyValueStore, key: &str) -> Vec<T> {
    let Some(raw) = store.get(key) else {
        return Vec::new();
    };
    let values = match serde_json::from_str::<serde_json::Value>(&raw) {
        Ok(serde_json::Value::Array(values)) => values,
        Ok(_) => {
            warn!(key, "stored value is not a sequence, starting empty");
            return Vec::new();
        }
        Err(e) => {
            warn!(key, error = %e, "stored value is malformed, starting empty");
            return Vec::new();
        }
    };
    let total = values.len();
    let items: Vec<T> = values
        .into_iter()
        .filter_map(|v| serde_json::from_value(v).ok())
        .collect();
    if items.len() < total {
        warn!(key, skipped = total - items.len(), "skipped malformed stored elements");
    }
    items
}

/// Serialize `items` as a JSON array and store it under `key`.
pub fn write_sequence<T: Serialize>(
    store: &impl KeyValueStore,
    key: &str,
    items: &[T],
) -> Result<()> {
    let json = serde_json::to_string(items)?;
    store.set(key, &json)?;
    debug!(key, count = items.len(), "sequence persisted");
    Ok(())
}
