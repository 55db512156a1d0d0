//! `/api/storage/*` and `/api/remote/*` routes — the bridge between the
//! engine's in-memory stores and the browser's durable storage.
//!
//! On page load JS asks for the keys of the current namespace, reads them
//! from `localStorage`, and hydrates them here. After each mutation it
//! drains the pending writes and applies them to `localStorage`. The
//! progress document store is persisted whole as a base64 snapshot.

use serde_json::json;

use crate::engine::state;
use crate::routes::util::{json_error, json_ok, Params};

// ── GET /api/storage/keys ──────────────────────────────────────────

pub fn handle_keys_get(_query: &str) -> String {
    state::with_engine(|engine| {
        json_ok(&json!([
            engine.storefront.cart_key(),
            engine.storefront.owned_key()
        ]))
    })
}

// ── POST /api/storage/hydrate ──────────────────────────────────────

/// Body params: key={key}&value={stored text}
/// Seeds a key without scheduling a write back, then reloads the cart and
/// owned ledger so the hydrated value takes effect.
pub fn handle_hydrate_post(body: &str) -> String {
    let params = Params::from_form(body);
    let key = match params.require("key") {
        Ok(k) => k,
        Err(e) => return json_error(&e),
    };
    let value = params.get("value").unwrap_or("");
    state::with_engine_mut(|engine| {
        engine.storefront.store().hydrate(key, value);
        engine.storefront.reload();
        json_ok(&json!({ "hydrated": key }))
    })
}

// ── GET /api/storage/pending ───────────────────────────────────────

/// Drain writes not yet flushed to `localStorage`.
/// `value: null` means the key should be removed.
pub fn handle_pending_get(_query: &str) -> String {
    state::with_engine(|engine| {
        let pending: Vec<serde_json::Value> = engine
            .storefront
            .store()
            .take_pending()
            .into_iter()
            .map(|(key, value)| json!({ "key": key, "value": value }))
            .collect();
        json_ok(&pending)
    })
}

// ── GET /api/remote/state ──────────────────────────────────────────

pub fn handle_remote_state_get(_query: &str) -> String {
    state::with_engine(|engine| {
        json_ok(&json!({ "state": engine.tracker.store().encode_state() }))
    })
}

// ── POST /api/remote/restore ───────────────────────────────────────

/// Body params: state={base64}
/// Replaces the document store and drops cached ledgers.
pub fn handle_remote_restore_post(body: &str) -> String {
    let params = Params::from_form(body);
    let snapshot = params.get("state").unwrap_or("").trim();
    state::with_engine_mut(|engine| {
        match engine.tracker.store().restore_state(snapshot) {
            Ok(()) => {
                engine.tracker.forget();
                json_ok(&json!({ "restored": true }))
            }
            Err(e) => json_error(&e.to_string()),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::{cart, progress};

    fn value(json: &str) -> serde_json::Value {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn keys_follow_namespace() {
        state::reset();
        assert_eq!(value(&handle_keys_get("")), json!(["cart:guest", "owned:guest"]));
    }

    #[test]
    fn hydrate_then_pending_roundtrip() {
        state::reset();
        let stored = r#"[{"id":"a","price":4}]"#;
        handle_hydrate_post(&format!("key=cart:guest&value={}", stored));
        let cart_body = value(&cart::handle_get(""));
        assert_eq!(cart_body["total"], 4.0);
        assert_eq!(value(&handle_pending_get("")), json!([]));

        cart::handle_post("action=remove&id=a");
        let pending = value(&handle_pending_get(""));
        assert_eq!(pending, json!([{ "key": "cart:guest", "value": "[]" }]));
        assert_eq!(value(&handle_pending_get("")), json!([]));
        state::reset();
    }

    #[test]
    fn hydrate_requires_key() {
        state::reset();
        assert!(handle_hydrate_post("value=x").contains("missing key"));
    }

    #[test]
    fn remote_snapshot_roundtrip() {
        state::reset();
        progress::handle_complete_post("activity=math&level=1&points=9");
        let snapshot = value(&handle_remote_state_get(""))["state"]
            .as_str()
            .unwrap()
            .to_string();

        state::reset();
        let restored = handle_remote_restore_post(&format!("state={}", snapshot));
        assert!(restored.contains("true"));
        let body = value(&progress::handle_get("?activity=math"));
        assert_eq!(body["ledger"]["totalPoints"], 9);
        state::reset();
    }

    #[test]
    fn remote_restore_rejects_garbage() {
        state::reset();
        assert!(handle_remote_restore_post("state=***").contains("error"));
    }
}
