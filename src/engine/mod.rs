//! Progress and entitlement engine — progress ledgers, the unlock policy,
//! and the cart/owned ledgers, all partitioned by identity namespace.
//!
//! Local sequences persist through [`kv::KeyValueStore`]; progress persists
//! through the async [`document::DocumentStore`]. The bridge keeps one
//! [`state::Engine`] per Web Worker in a `thread_local!`.

pub mod cart;
pub mod clock;
pub mod document;
pub mod identity;
pub mod kv;
pub mod owned;
pub mod progress;
pub mod state;
pub mod storefront;
pub mod tracker;
pub mod unlock;
