//! `/api/cart` routes — the entitlement cart of the current namespace.

use serde_json::json;

use crate::engine::cart::CourseItem;
use crate::engine::state::{self, Engine};
use crate::routes::util::{json_error, json_ok, Params};

fn cart_json(engine: &Engine) -> String {
    let cart = engine.storefront.cart();
    json_ok(&json!({
        "namespace": engine.namespace().to_string(),
        "items": cart.items(),
        "count": cart.len(),
        "total": cart.total(),
    }))
}

// ── GET /api/cart ──────────────────────────────────────────────────

/// Handle GET /api/cart[?id={item}]
/// Returns the cart, or `{"id", "inCart"}` when an id is given.
pub fn handle_get(query: &str) -> String {
    let params = Params::from_query(query);
    state::with_engine(|engine| match params.get("id") {
        Some(id) => json_ok(&json!({ "id": id, "inCart": engine.storefront.in_cart(id) })),
        None => cart_json(engine),
    })
}

// ── POST /api/cart ─────────────────────────────────────────────────

/// Handle POST /api/cart
/// Body params:
///   - action=add&item={json}   → add an item (no-op if already present)
///   - action=remove&id={item}  → remove an item (no-op if absent)
///   - action=clear             → empty the cart
///
/// Returns the updated cart.
pub fn handle_post(body: &str) -> String {
    let params = Params::from_form(body);
    let action = params.get("action").unwrap_or("");

    match action {
        "add" => {
            let item: CourseItem = match params
                .require("item")
                .and_then(|raw| serde_json::from_str(raw).map_err(|e| format!("invalid item: {}", e)))
            {
                Ok(item) => item,
                Err(e) => return json_error(&e),
            };
            state::with_engine_mut(|engine| match engine.storefront.add_to_cart(item) {
                Ok(_) => cart_json(engine),
                Err(e) => json_error(&e.to_string()),
            })
        }
        "remove" => {
            let id = match params.require("id") {
                Ok(id) => id,
                Err(e) => return json_error(&e),
            };
            state::with_engine_mut(|engine| {
                engine.storefront.remove_from_cart(id);
                cart_json(engine)
            })
        }
        "clear" => state::with_engine_mut(|engine| {
            engine.storefront.clear_cart();
            cart_json(engine)
        }),
        _ => json_error("unknown cart action"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::identity;

    fn value(json: &str) -> serde_json::Value {
        serde_json::from_str(json).unwrap()
    }

    fn add(id: &str, price: f64) -> serde_json::Value {
        let item = json!({ "id": id, "price": price }).to_string();
        value(&handle_post(&format!("action=add&item={}", item)))
    }

    #[test]
    fn adding_twice_keeps_one_entry() {
        state::reset();
        add("a", 10.0);
        let body = add("a", 10.0);
        assert_eq!(body["count"], 1);
        assert_eq!(body["total"], 10.0);
        state::reset();
    }

    #[test]
    fn remove_recomputes_total() {
        state::reset();
        add("a", 10.0);
        add("b", 5.0);
        let body = value(&handle_post("action=remove&id=a"));
        assert_eq!(body["total"], 5.0);
        assert_eq!(value(&handle_get("?id=a"))["inCart"], false);
        assert_eq!(value(&handle_get("?id=b"))["inCart"], true);
        state::reset();
    }

    #[test]
    fn clear_empties() {
        state::reset();
        add("a", 10.0);
        let body = value(&handle_post("action=clear"));
        assert_eq!(body["count"], 0);
        state::reset();
    }

    #[test]
    fn rejects_bad_input() {
        state::reset();
        assert!(handle_post("action=add").contains("missing item"));
        assert!(handle_post("action=add&item=nope").contains("invalid item"));
        assert!(handle_post(r#"action=add&item={"id":"x","price":-1}"#).contains("error"));
        assert!(handle_post("action=remove").contains("missing id"));
        assert!(handle_post("action=explode").contains("unknown cart action"));
    }

    #[test]
    fn guest_cart_stays_with_guest() {
        state::reset();
        add("a", 10.0);
        identity::handle_post("user=u1");
        let body = value(&handle_get(""));
        assert_eq!(body["namespace"], "user:u1");
        assert_eq!(body["count"], 0);
        state::reset();
    }
}
