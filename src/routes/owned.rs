//! `/api/owned` routes — confirmed purchases of the current namespace.
//!
//! Checkout happens outside the engine; on success JS posts the purchased
//! items here and then clears or trims the cart itself.

use serde_json::json;

use crate::engine::cart::CourseItem;
use crate::engine::state::{self, Engine};
use crate::routes::util::{json_error, json_ok, Params};

fn owned_json(engine: &Engine) -> String {
    json_ok(&json!({
        "namespace": engine.namespace().to_string(),
        "items": engine.storefront.owned().items(),
    }))
}

// ── GET /api/owned ─────────────────────────────────────────────────

/// Handle GET /api/owned[?id={item}]
pub fn handle_get(query: &str) -> String {
    let params = Params::from_query(query);
    state::with_engine(|engine| match params.get("id") {
        Some(id) => json_ok(&json!({ "id": id, "owned": engine.storefront.is_owned(id) })),
        None => owned_json(engine),
    })
}

// ── POST /api/owned ────────────────────────────────────────────────

/// Handle POST /api/owned
/// Body params:
///   - action=purchase&items={json array}[&now={ms}] → record purchases
///   - action=clear                                   → reset ownership
///
/// Purchase responses include the ids that were newly added.
pub fn handle_post(body: &str) -> String {
    let params = Params::from_form(body);
    match params.get("action").unwrap_or("") {
        "purchase" => {
            let items: Vec<CourseItem> = match params
                .require("items")
                .and_then(|raw| serde_json::from_str(raw).map_err(|e| format!("invalid items: {}", e)))
            {
                Ok(items) => items,
                Err(e) => return json_error(&e),
            };
            state::with_engine_mut(|engine| {
                engine.observe_time(params.parse_opt("now").unwrap_or(0));
                let added = engine.storefront.add_purchased(items);
                json_ok(&json!({
                    "added": added,
                    "items": engine.storefront.owned().items(),
                }))
            })
        }
        "clear" => state::with_engine_mut(|engine| {
            engine.storefront.clear_owned();
            owned_json(engine)
        }),
        _ => json_error("unknown owned action"),
    }
}
