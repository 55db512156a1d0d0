//! Identity namespaces and the liveness guard used to discard stale loads.
//!
//! Every ledger is partitioned by a [`Namespace`]. Signed-out callers share
//! the guest namespace; signed-in callers get `user:<id>`, so guest state
//! and user state never share a storage key.

use std::cell::Cell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::config::EngineConfig;

/// What the identity provider currently reports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Option<String>,
    /// The provider is still resolving; namespaces are not rebound until it settles.
    pub loading: bool,
}

impl Identity {
    pub fn guest() -> Self {
        Self::default()
    }

    pub fn user(id: impl Into<String>) -> Self {
        Self {
            user_id: Some(id.into()),
            loading: false,
        }
    }

    pub fn loading() -> Self {
        Self {
            user_id: None,
            loading: true,
        }
    }

    /// Resolve the namespace, or `None` while the provider is still loading.
    pub fn namespace(&self) -> Option<Namespace> {
        if self.loading {
            return None;
        }
        match self.user_id.as_deref() {
            Some(id) if !id.is_empty() => Some(Namespace::User(id.to_string())),
            _ => Some(Namespace::Guest),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Namespace {
    #[default]
    Guest,
    User(String),
}

impl Namespace {
    /// Storage segment for this namespace: the configured guest label, or `user:<id>`.
    pub fn segment(&self, config: &EngineConfig) -> String {
        match self {
            Namespace::Guest => config.guest_namespace.clone(),
            Namespace::User(id) => format!("user:{}", id),
        }
    }

    /// Local key for a prefixed sequence in this namespace.
    pub fn storage_key(&self, prefix: &str, config: &EngineConfig) -> String {
        format!("{}:{}", prefix, self.segment(config))
    }

    pub fn is_guest(&self) -> bool {
        matches!(self, Namespace::Guest)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Namespace::Guest => write!(f, "guest"),
            Namespace::User(id) => write!(f, "user:{}", id),
        }
    }
}

// ── Liveness guard ─────────────────────────────────────────────────

/// Generation counter owned by whoever applies async results.
///
/// Tickets hold a weak reference, so dropping the owner kills every
/// outstanding ticket too.
#[derive(Debug, Default)]
pub struct Liveness {
    generation: Rc<Cell<u64>>,
}

impl Liveness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ticket(&self) -> Ticket {
        Ticket {
            generation: Rc::downgrade(&self.generation),
            issued: self.generation.get(),
        }
    }

    /// Kill all tickets issued so far.
    pub fn invalidate(&self) {
        self.generation.set(self.generation.get().wrapping_add(1));
    }
}

#[derive(Debug, Clone)]
pub struct Ticket {
    generation: Weak<Cell<u64>>,
    issued: u64,
}

impl Ticket {
    pub fn is_live(&self) -> bool {
        self.generation
            .upgrade()
            .map(|g| g.get() == self.issued)
            .unwrap_or(false)
    }
}
