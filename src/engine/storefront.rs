//! Storefront — the cart and owned ledger for the current namespace,
//! persisted through a [`KeyValueStore`].
//!
//! Every mutation writes the full resulting sequence under the
//! namespace-scoped key. Write failures are logged and swallowed: the
//! in-memory state stays authoritative for the session.

use std::rc::Rc;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::engine::cart::{Cart, CourseItem};
use crate::engine::clock::Clock;
use crate::engine::identity::Namespace;
use crate::engine::kv::{read_sequence, write_sequence, KeyValueStore};
use crate::engine::owned::{OwnedItem, OwnedLedger};
use crate::error::Result;

pub struct Storefront<K: KeyValueStore> {
    store: K,
    config: EngineConfig,
    clock: Rc<dyn Clock>,
    namespace: Namespace,
    cart: Cart,
    owned: OwnedLedger,
}

impl<K: KeyValueStore> Storefront<K> {
    /// Open the storefront in the guest namespace.
    pub fn new(store: K, config: EngineConfig, clock: Rc<dyn Clock>) -> Self {
        let mut storefront = Self {
            store,
            config,
            clock,
            namespace: Namespace::Guest,
            cart: Cart::new(),
            owned: OwnedLedger::new(),
        };
        storefront.reload();
        storefront
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn store(&self) -> &K {
        &self.store
    }

    pub fn cart(&self) -> &Cart {
        &self.cart
    }

    pub fn owned(&self) -> &OwnedLedger {
        &self.owned
    }

    pub fn cart_key(&self) -> String {
        self.namespace
            .storage_key(&self.config.cart_key_prefix, &self.config)
    }

    pub fn owned_key(&self) -> String {
        self.namespace
            .storage_key(&self.config.owned_key_prefix, &self.config)
    }

    /// Rebind to `namespace` and reload both sequences from its keys.
    /// Returns whether the namespace changed.
    pub fn switch_namespace(&mut self, namespace: Namespace) -> bool {
        if namespace == self.namespace {
            return false;
        }
        debug!(from = %self.namespace, to = %namespace, "storefront namespace switch");
        self.namespace = namespace;
        self.reload();
        true
    }

    /// Re-read both sequences from the store, e.g. after hydration.
    pub fn reload(&mut self) {
        self.cart = Cart::from_items(read_sequence(&self.store, &self.cart_key()));
        self.owned = OwnedLedger::from_items(read_sequence::<OwnedItem>(
            &self.store,
            &self.owned_key(),
        ));
    }

    // ── Cart ───────────────────────────────────────────────────────

    /// Add an item to the cart. `Err` only for an invalid item; a present
    /// id is `Ok(false)`.
    pub fn add_to_cart(&mut self, item: CourseItem) -> Result<bool> {
        let added = self.cart.add_item(item)?;
        if added {
            self.persist_cart();
        }
        Ok(added)
    }

    pub fn remove_from_cart(&mut self, id: &str) -> bool {
        let removed = self.cart.remove_item(id);
        if removed {
            self.persist_cart();
        }
        removed
    }

    pub fn clear_cart(&mut self) {
        self.cart.clear();
        self.persist_cart();
    }

    pub fn cart_total(&self) -> f64 {
        self.cart.total()
    }

    pub fn in_cart(&self, id: &str) -> bool {
        self.cart.contains(id)
    }

    // ── Owned ──────────────────────────────────────────────────────

    /// Land a successful checkout. Purchase time is taken from the clock now.
    pub fn add_purchased(&mut self, items: impl IntoIterator<Item = CourseItem>) -> Vec<String> {
        let added = self.owned.add_purchased(items, self.clock.now_ms());
        if !added.is_empty() {
            self.persist_owned();
        }
        added
    }

    pub fn clear_owned(&mut self) {
        self.owned.clear();
        self.persist_owned();
    }

    pub fn is_owned(&self, id: &str) -> bool {
        self.owned.is_owned(id)
    }

    // ── Persistence ────────────────────────────────────────────────

    fn persist_cart(&self) {
        let key = self.cart_key();
        if let Err(e) = write_sequence(&self.store, &key, self.cart.items()) {
            warn!(key = %key, error = %e, "cart not persisted, keeping in-memory state");
        }
    }

    fn persist_owned(&self) {
        let key = self.owned_key();
        if let Err(e) = write_sequence(&self.store, &key, self.owned.items()) {
            warn!(key = %key, error = %e, "owned items not persisted, keeping in-memory state");
        }
    }
}
