//! Engine instance for the request bridge.
//!
//! Uses `thread_local!` + `RefCell` for safe mutable access in single-threaded
//! WASM. The Web Worker keeps the module alive, so the engine lives for the
//! whole browser session and is rebuilt only when the config changes.

use std::cell::RefCell;
use std::rc::Rc;
use tracing::debug;

use crate::config::EngineConfig;
use crate::engine::clock::ManualClock;
use crate::engine::document::YrsDocumentStore;
use crate::engine::identity::{Identity, Namespace};
use crate::engine::kv::MemoryStore;
use crate::engine::storefront::Storefront;
use crate::engine::tracker::ProgressTracker;

pub struct Engine {
    pub config: EngineConfig,
    /// Set from the `now` parameter JS sends with time-sensitive requests.
    pub clock: Rc<ManualClock>,
    pub identity: Identity,
    pub storefront: Storefront<MemoryStore>,
    pub tracker: ProgressTracker<YrsDocumentStore>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let clock = Rc::new(ManualClock::new(0));
        let documents = Rc::new(YrsDocumentStore::new(clock.clone()));
        Self {
            storefront: Storefront::new(MemoryStore::new(), config.clone(), clock.clone()),
            tracker: ProgressTracker::new(documents, config.clone()),
            identity: Identity::guest(),
            clock,
            config,
        }
    }

    pub fn namespace(&self) -> &Namespace {
        self.storefront.namespace()
    }

    /// Record what the identity provider reports and rebind every ledger
    /// once it has settled. Returns the namespace now in effect.
    pub fn set_identity(&mut self, identity: Identity) -> Namespace {
        if let Some(namespace) = identity.namespace() {
            debug!(namespace = %namespace, "identity settled");
            self.storefront.switch_namespace(namespace.clone());
            self.tracker.switch_namespace(namespace);
        }
        self.identity = identity;
        self.namespace().clone()
    }

    /// Advance the clock to a JS-supplied timestamp. Zero is ignored.
    pub fn observe_time(&self, now_ms: u64) {
        if now_ms > 0 {
            self.clock.set(now_ms);
        }
    }
}

thread_local! {
    static ENGINE: RefCell<Engine> = RefCell::new(Engine::new(EngineConfig::default()));
}

/// Execute a closure with read access to the engine.
pub fn with_engine<F, R>(f: F) -> R
where
    F: FnOnce(&Engine) -> R,
{
    ENGINE.with(|e| f(&e.borrow()))
}

/// Execute a closure with mutable access to the engine.
pub fn with_engine_mut<F, R>(f: F) -> R
where
    F: FnOnce(&mut Engine) -> R,
{
    ENGINE.with(|e| f(&mut e.borrow_mut()))
}

/// Replace the engine with a fresh one built from `config`.
pub fn replace_engine(config: EngineConfig) {
    ENGINE.with(|e| {
        *e.borrow_mut() = Engine::new(config);
    });
}

/// Fresh engine with the default config.
pub fn reset() {
    replace_engine(EngineConfig::default());
}
