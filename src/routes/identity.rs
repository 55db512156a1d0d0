//! `/api/identity` and `/api/config` routes — namespace binding.

use serde_json::json;

use crate::config::EngineConfig;
use crate::engine::identity::Identity;
use crate::engine::state::{self, Engine};
use crate::routes::util::{json_error, json_ok, Params};

fn describe(engine: &Engine) -> String {
    let namespace = engine.namespace();
    json_ok(&json!({
        "namespace": namespace.to_string(),
        "guest": namespace.is_guest(),
        "loading": engine.identity.loading,
        "keys": [engine.storefront.cart_key(), engine.storefront.owned_key()],
    }))
}

// ── GET /api/identity ──────────────────────────────────────────────

pub fn handle_get(_query: &str) -> String {
    state::with_engine(describe)
}

// ── POST /api/identity ─────────────────────────────────────────────

/// Body params:
///   - user={id}        → signed in (empty or absent = guest)
///   - loading=true     → provider still resolving; namespaces stay put
///
/// Returns the namespace in effect and the local keys JS should hydrate.
pub fn handle_post(body: &str) -> String {
    let params = Params::from_form(body);
    let identity = Identity {
        user_id: params.get("user").map(str::to_string),
        loading: params.get("loading") == Some("true"),
    };
    state::with_engine_mut(|engine| {
        engine.set_identity(identity);
        describe(engine)
    })
}

// ── POST /api/config ───────────────────────────────────────────────

/// Body is a JSON `EngineConfig`. Replaces the engine; all in-memory state
/// is dropped and must be re-hydrated.
pub fn handle_config_post(body: &str) -> String {
    match EngineConfig::from_json(body) {
        Ok(config) => {
            state::replace_engine(config.clone());
            json_ok(&config)
        }
        Err(e) => json_error(&e.to_string()),
    }
}
