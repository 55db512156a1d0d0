//! Progress tracker — the progress ledgers of the current namespace, backed
//! by a [`DocumentStore`].
//!
//! ## Write path
//!
//! `complete_level` reads the stored ledger when the activity is not cached,
//! updates the cached ledger immediately and hands back a [`SaveTask`] for
//! the caller to run (spawned or awaited). The task merge
//! writes the changed level into the activity document and the new total
//! into the user summary document, then reports a [`SaveOutcome`] on a
//! oneshot channel. A failed save never rolls the in-memory ledger back.
//!
//! ## Read path
//!
//! `begin_load` produces a [`LoadTask`] carrying a liveness ticket. Results
//! are applied with `apply_load`, which discards anything loaded for a
//! namespace that has since been switched away from.

use serde_json::{json, Value};
use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::engine::document::{read_u64, DocumentKey, DocumentStore, Record};
use crate::engine::identity::{Liveness, Namespace, Ticket};
use crate::engine::progress::{LevelCompletion, LevelId, ProgressLedger};
use crate::engine::unlock;
use crate::error::{EngineError, Result};

pub struct ProgressTracker<S: DocumentStore> {
    store: Rc<S>,
    config: EngineConfig,
    namespace: Namespace,
    liveness: Liveness,
    ledgers: HashMap<String, ProgressLedger>,
}

impl<S: DocumentStore> ProgressTracker<S> {
    pub fn new(store: Rc<S>, config: EngineConfig) -> Self {
        Self {
            store,
            config,
            namespace: Namespace::Guest,
            liveness: Liveness::new(),
            ledgers: HashMap::new(),
        }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn store(&self) -> &Rc<S> {
        &self.store
    }

    /// Rebind to `namespace`, dropping cached ledgers and invalidating
    /// in-flight loads. Returns whether the namespace changed.
    pub fn switch_namespace(&mut self, namespace: Namespace) -> bool {
        if namespace == self.namespace {
            return false;
        }
        debug!(from = %self.namespace, to = %namespace, "progress namespace switch");
        self.namespace = namespace;
        self.liveness.invalidate();
        self.ledgers.clear();
        true
    }

    /// Drop every cached ledger and invalidate in-flight loads, e.g. after
    /// the backing store was restored from a snapshot.
    pub fn forget(&mut self) {
        self.liveness.invalidate();
        self.ledgers.clear();
    }

    pub fn is_loaded(&self, activity: &str) -> bool {
        self.ledgers.contains_key(activity)
    }

    /// Cached ledger for `activity`, or the empty ledger if none is loaded.
    pub fn ledger(&self, activity: &str) -> ProgressLedger {
        self.ledgers.get(activity).cloned().unwrap_or_default()
    }

    pub fn is_unlocked(&self, activity: &str, level: LevelId) -> bool {
        self.ledgers
            .get(activity)
            .map(|ledger| unlock::is_unlocked(ledger, level))
            .unwrap_or(level == LevelId::FIRST)
    }

    // ── Loading ────────────────────────────────────────────────────

    pub fn begin_load(&self, activity: &str) -> LoadTask<S> {
        LoadTask {
            store: Rc::clone(&self.store),
            key: DocumentKey::activity(&self.config, &self.namespace, activity),
            activity: activity.to_string(),
            ticket: self.liveness.ticket(),
        }
    }

    /// Apply a finished load. Stale results are dropped and `None` returned.
    pub fn apply_load(&mut self, outcome: LoadOutcome) -> Option<&ProgressLedger> {
        let LoadOutcome::Loaded(loaded) = outcome else {
            return None;
        };
        if !loaded.ticket.is_live() {
            debug!(activity = %loaded.activity, "discarding stale progress load");
            return None;
        }
        self.ledgers.insert(loaded.activity.clone(), loaded.ledger);
        self.ledgers.get(&loaded.activity)
    }

    /// Load and apply in one step. Never fails: unreadable documents load
    /// as the empty ledger, and nothing is written.
    pub async fn load(&mut self, activity: &str) -> ProgressLedger {
        let outcome = self.begin_load(activity).run().await;
        self.apply_load(outcome);
        self.ledger(activity)
    }

    // ── Completing levels ──────────────────────────────────────────

    /// Merge a completion into the activity's ledger and return the new
    /// state together with the save task that persists it.
    ///
    /// An activity that is not cached is read from the store first, so the
    /// merge always starts from the stored best scores. If that read fails
    /// nothing changes and the error is returned.
    pub async fn complete_level(
        &mut self,
        activity: &str,
        level: LevelId,
        points_earned: u64,
    ) -> Result<(Completion, SaveTask<S>)> {
        if !self.is_loaded(activity) {
            let key = DocumentKey::activity(&self.config, &self.namespace, activity);
            let stored = match self.store.get(&key).await? {
                Some(record) => ProgressLedger::from_record(&record),
                None => ProgressLedger::default(),
            };
            self.ledgers.insert(activity.to_string(), stored);
        }

        let previous = self.ledger(activity);
        let completion = previous.complete_level(level, points_earned);
        let changed = !completion.is_noop(&previous);
        let LevelCompletion {
            ledger,
            delta,
            best_score,
        } = completion;

        debug!(
            activity,
            level = level.get(),
            points_earned,
            delta,
            total = ledger.total_points,
            "level completed"
        );
        self.ledgers.insert(activity.to_string(), ledger.clone());

        let writes = if changed {
            vec![
                (
                    DocumentKey::activity(&self.config, &self.namespace, activity),
                    ledger.level_record(level),
                ),
                (
                    DocumentKey::user(&self.config, &self.namespace),
                    summary_record(activity, ledger.total_points),
                ),
            ]
        } else {
            Vec::new()
        };

        let (sender, receiver) = oneshot::channel();
        let aborted = Rc::new(Cell::new(false));
        let task = SaveTask {
            store: Rc::clone(&self.store),
            writes,
            aborted: Rc::clone(&aborted),
            sender,
        };
        let completion = Completion {
            ledger,
            delta,
            best_score,
            save: SaveHandle { aborted, receiver },
        };
        Ok((completion, task))
    }

    // ── Aggregates ─────────────────────────────────────────────────

    /// Sum of total points over every activity stored for this namespace.
    /// Missing or partial summary documents count what they can, else 0.
    pub async fn total_across_activities(&self) -> u64 {
        let key = DocumentKey::user(&self.config, &self.namespace);
        match self.store.get(&key).await {
            Ok(Some(record)) => sum_activity_totals(&record),
            Ok(None) => 0,
            Err(e) => {
                warn!(document = %key, error = %e, "summary unreadable, reporting 0");
                0
            }
        }
    }
}

fn summary_record(activity: &str, total_points: u64) -> Record {
    let mut activities = serde_json::Map::new();
    activities.insert(activity.to_string(), json!({ "totalPoints": total_points }));
    let mut record = Record::new();
    record.insert("activities".to_string(), Value::Object(activities));
    record
}

fn sum_activity_totals(record: &Record) -> u64 {
    let Some(Value::Object(activities)) = record.get("activities") else {
        return 0;
    };
    activities
        .values()
        .filter_map(|entry| entry.get("totalPoints").and_then(read_u64))
        .fold(0u64, u64::saturating_add)
}

// ── Load task ──────────────────────────────────────────────────────

pub struct LoadTask<S: DocumentStore> {
    store: Rc<S>,
    key: DocumentKey,
    activity: String,
    ticket: Ticket,
}

pub struct Loaded {
    pub activity: String,
    pub ledger: ProgressLedger,
    ticket: Ticket,
}

pub enum LoadOutcome {
    Loaded(Loaded),
    /// The requester went away before the read started.
    Discarded,
}

impl<S: DocumentStore> LoadTask<S> {
    pub async fn run(self) -> LoadOutcome {
        if !self.ticket.is_live() {
            return LoadOutcome::Discarded;
        }
        let ledger = match self.store.get(&self.key).await {
            Ok(Some(record)) => ProgressLedger::from_record(&record),
            Ok(None) => ProgressLedger::default(),
            Err(e) => {
                warn!(document = %self.key, error = %e, "progress unreadable, using empty ledger");
                ProgressLedger::default()
            }
        };
        LoadOutcome::Loaded(Loaded {
            activity: self.activity,
            ledger,
            ticket: self.ticket,
        })
    }
}

// ── Save task ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    Saved,
    /// The completion changed nothing, so nothing was written.
    Unchanged,
    Cancelled,
    Failed(EngineError),
}

impl SaveOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SaveOutcome::Saved | SaveOutcome::Unchanged)
    }
}

/// Optimistic result of a level completion.
#[derive(Debug)]
pub struct Completion {
    pub ledger: ProgressLedger,
    pub delta: u64,
    pub best_score: u64,
    pub save: SaveHandle,
}

#[derive(Debug)]
pub struct SaveHandle {
    aborted: Rc<Cell<bool>>,
    receiver: oneshot::Receiver<SaveOutcome>,
}

impl SaveHandle {
    /// Abort the save if it has not started yet.
    pub fn cancel(&self) {
        self.aborted.set(true);
    }

    pub async fn outcome(self) -> SaveOutcome {
        self.receiver.await.unwrap_or(SaveOutcome::Cancelled)
    }

    /// Non-blocking check; `None` while the save is still pending.
    pub fn try_outcome(&mut self) -> Option<SaveOutcome> {
        match self.receiver.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(SaveOutcome::Cancelled),
        }
    }
}

pub struct SaveTask<S: DocumentStore> {
    store: Rc<S>,
    writes: Vec<(DocumentKey, Record)>,
    aborted: Rc<Cell<bool>>,
    sender: oneshot::Sender<SaveOutcome>,
}

impl<S: DocumentStore> SaveTask<S> {
    pub async fn run(self) -> SaveOutcome {
        let outcome = self.execute().await;
        // The handle may already be gone; the outcome is still returned.
        let _ = self.sender.send(outcome.clone());
        outcome
    }

    async fn execute(&self) -> SaveOutcome {
        if self.aborted.get() {
            return SaveOutcome::Cancelled;
        }
        if self.writes.is_empty() {
            return SaveOutcome::Unchanged;
        }
        for (key, record) in &self.writes {
            if let Err(e) = self.store.merge_write(key, record.clone()).await {
                warn!(document = %key, error = %e, "progress save failed");
                return SaveOutcome::Failed(e);
            }
        }
        SaveOutcome::Saved
    }
}
