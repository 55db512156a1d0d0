//! Progress and entitlement engine, served in-browser over WASM.
//!
//! Exports `handle_request(method, path, query, body)` for the Service Worker
//! bridge to call. Uses `matchit` for URL routing — the same router
//! engine that powers Axum. Every response is a JSON string.
//!
//! The engine itself lives in [`engine`] and has no dependency on the
//! bridge; hosts other than the browser can use it directly.

use wasm_bindgen::prelude::*;

pub mod config;
pub mod engine;
pub mod error;
pub mod routes;

pub use config::EngineConfig;
pub use error::{EngineError, Result};

/// Process an HTTP-like request and return a JSON body.
///
/// Called from JavaScript (Web Worker) via wasm-bindgen.
///
/// # Arguments
/// * `method` — HTTP method ("GET" or "POST")
/// * `path`   — URL path (e.g., "/api/progress")
/// * `query`  — Query string (e.g., "?activity=spelling")
/// * `body`   — URL-encoded form body. Empty string for GET requests.
#[wasm_bindgen]
pub fn handle_request(method: &str, path: &str, query: &str, body: &str) -> String {
    let mut router = matchit::Router::new();

    router.insert("/api/identity", "identity").ok();
    router.insert("/api/config", "config").ok();

    router.insert("/api/progress", "progress").ok();
    router.insert("/api/progress/complete", "progress_complete").ok();
    router.insert("/api/progress/unlocked", "progress_unlocked").ok();
    router.insert("/api/progress/total", "progress_total").ok();

    router.insert("/api/cart", "cart").ok();
    router.insert("/api/owned", "owned").ok();

    router.insert("/api/storage/keys", "storage_keys").ok();
    router.insert("/api/storage/hydrate", "storage_hydrate").ok();
    router.insert("/api/storage/pending", "storage_pending").ok();
    router.insert("/api/remote/state", "remote_state").ok();
    router.insert("/api/remote/restore", "remote_restore").ok();

    match router.at(path) {
        Ok(matched) => match (*matched.value, method) {
            ("identity", "GET") => routes::identity::handle_get(query),
            ("identity", "POST") => routes::identity::handle_post(body),
            ("config", "POST") => routes::identity::handle_config_post(body),

            ("progress", "GET") => routes::progress::handle_get(query),
            ("progress_complete", "POST") => routes::progress::handle_complete_post(body),
            ("progress_unlocked", "GET") => routes::progress::handle_unlocked_get(query),
            ("progress_total", "GET") => routes::progress::handle_total_get(query),

            ("cart", "GET") => routes::cart::handle_get(query),
            ("cart", "POST") => routes::cart::handle_post(body),
            ("owned", "GET") => routes::owned::handle_get(query),
            ("owned", "POST") => routes::owned::handle_post(body),

            ("storage_keys", "GET") => routes::storage::handle_keys_get(query),
            ("storage_hydrate", "POST") => routes::storage::handle_hydrate_post(body),
            ("storage_pending", "GET") => routes::storage::handle_pending_get(query),
            ("remote_state", "GET") => routes::storage::handle_remote_state_get(query),
            ("remote_restore", "POST") => routes::storage::handle_remote_restore_post(body),

            _ => method_not_allowed(),
        },
        Err(_) => not_found(),
    }
}

fn not_found() -> String {
    routes::util::json_error("not found")
}

fn method_not_allowed() -> String {
    routes::util::json_error("method not allowed")
}
