//! Progress ledger — total points, completed levels, and best score per
//! level for one (user, activity) pair.
//!
//! The only mutation is [`ProgressLedger::complete_level`]. It merges a new
//! score with the stored best and credits the total with the improvement
//! only, so replaying a completion never inflates the total.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::num::NonZeroU32;
use tracing::warn;

use crate::engine::document::{read_u64, Record};
use crate::error::{EngineError, Result};

/// Positive level identifier. Level 1 is the first level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LevelId(NonZeroU32);

impl LevelId {
    pub const FIRST: LevelId = LevelId(NonZeroU32::MIN);

    pub fn new(id: u32) -> Option<Self> {
        NonZeroU32::new(id).map(Self)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }

    /// The level after this one, saturating at `u32::MAX`.
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl TryFrom<u32> for LevelId {
    type Error = EngineError;

    fn try_from(id: u32) -> Result<Self> {
        Self::new(id).ok_or_else(|| EngineError::InvalidLevel(id.to_string()))
    }
}

impl std::str::FromStr for LevelId {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<u32>()
            .ok()
            .and_then(Self::new)
            .ok_or_else(|| EngineError::InvalidLevel(s.to_string()))
    }
}

impl fmt::Display for LevelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressLedger {
    pub total_points: u64,
    pub completed_levels: BTreeSet<LevelId>,
    pub level_scores: BTreeMap<LevelId, u64>,
}

/// Result of merging one level completion into a ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelCompletion {
    pub ledger: ProgressLedger,
    /// Points credited to the total by this completion (0 on replays and lower scores).
    pub delta: u64,
    pub best_score: u64,
}

impl LevelCompletion {
    /// True when the completion changed nothing in the ledger.
    pub fn is_noop(&self, previous: &ProgressLedger) -> bool {
        self.ledger == *previous
    }
}

impl ProgressLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a freshly completed level's score into the ledger.
    ///
    /// The stored score for the level becomes the max of old and new, and
    /// the total grows by exactly that improvement.
    pub fn complete_level(&self, level: LevelId, points_earned: u64) -> LevelCompletion {
        let previous_score = self.level_scores.get(&level).copied().unwrap_or(0);
        let best_score = previous_score.max(points_earned);
        let delta = best_score - previous_score;

        let mut ledger = self.clone();
        ledger.total_points = ledger.total_points.saturating_add(delta);
        ledger.completed_levels.insert(level);
        ledger.level_scores.insert(level, best_score);

        LevelCompletion {
            ledger,
            delta,
            best_score,
        }
    }

    pub fn score(&self, level: LevelId) -> Option<u64> {
        self.level_scores.get(&level).copied()
    }

    pub fn is_completed(&self, level: LevelId) -> bool {
        self.completed_levels.contains(&level)
    }

    /// Highest completed level id, if any.
    pub fn max_completed(&self) -> Option<LevelId> {
        self.completed_levels.iter().next_back().copied()
    }

    // ── Record codec ───────────────────────────────────────────────

    /// Decode a stored activity document. Missing or malformed fields read
    /// as empty; a completed level without a score is repaired with score 0.
    pub fn from_record(record: &Record) -> Self {
        let mut ledger = ProgressLedger {
            total_points: record
                .get("totalPoints")
                .and_then(read_u64)
                .unwrap_or(0),
            ..Default::default()
        };

        if let Some(Value::Object(levels)) = record.get("completedLevels") {
            for (id, flag) in levels {
                if flag.as_bool() == Some(true) {
                    if let Ok(level) = id.parse::<LevelId>() {
                        ledger.completed_levels.insert(level);
                    }
                }
            }
        }

        if let Some(Value::Object(scores)) = record.get("levelScores") {
            for (id, score) in scores {
                if let (Ok(level), Some(score)) = (id.parse::<LevelId>(), read_u64(score)) {
                    ledger.level_scores.insert(level, score);
                }
            }
        }

        for level in &ledger.completed_levels {
            if !ledger.level_scores.contains_key(level) {
                warn!(level = level.get(), "completed level has no score, repairing with 0");
                ledger.level_scores.insert(*level, 0);
            }
        }

        ledger
    }

    /// Partial record for a per-level merge write: the new total plus the
    /// one level that changed.
    pub fn level_record(&self, level: LevelId) -> Record {
        let single = |value: Value| {
            let mut map = serde_json::Map::new();
            map.insert(level.to_string(), value);
            Value::Object(map)
        };
        let mut record = Record::new();
        record.insert("totalPoints".to_string(), json!(self.total_points));
        if self.is_completed(level) {
            record.insert("completedLevels".to_string(), single(Value::Bool(true)));
        }
        if let Some(score) = self.score(level) {
            record.insert("levelScores".to_string(), single(json!(score)));
        }
        record
    }

    /// Full record for this ledger.
    pub fn to_record(&self) -> Record {
        let completed: serde_json::Map<String, Value> = self
            .completed_levels
            .iter()
            .map(|l| (l.to_string(), Value::Bool(true)))
            .collect();
        let scores: serde_json::Map<String, Value> = self
            .level_scores
            .iter()
            .map(|(l, s)| (l.to_string(), json!(s)))
            .collect();
        let mut record = Record::new();
        record.insert("totalPoints".to_string(), json!(self.total_points));
        record.insert("completedLevels".to_string(), Value::Object(completed));
        record.insert("levelScores".to_string(), Value::Object(scores));
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(id: u32) -> LevelId {
        LevelId::new(id).unwrap()
    }

    #[test]
    fn level_zero_is_rejected() {
        assert!(LevelId::new(0).is_none());
        assert!(LevelId::try_from(0).is_err());
        assert!("0".parse::<LevelId>().is_err());
        assert!("abc".parse::<LevelId>().is_err());
        assert_eq!("3".parse::<LevelId>().unwrap(), level(3));
    }

    #[test]
    fn first_completion_credits_full_score() {
        let c = ProgressLedger::new().complete_level(level(1), 40);
        assert_eq!(c.delta, 40);
        assert_eq!(c.best_score, 40);
        assert_eq!(c.ledger.total_points, 40);
        assert!(c.ledger.is_completed(level(1)));
        assert_eq!(c.ledger.score(level(1)), Some(40));
    }

    #[test]
    fn replay_is_idempotent() {
        let once = ProgressLedger::new().complete_level(level(2), 50);
        let twice = once.ledger.complete_level(level(2), 50);
        assert_eq!(twice.delta, 0);
        assert_eq!(twice.ledger, once.ledger);
        assert!(twice.is_noop(&once.ledger));
    }

    #[test]
    fn lower_score_never_decreases_anything() {
        let high = ProgressLedger::new().complete_level(level(1), 90);
        let low = high.ledger.complete_level(level(1), 10);
        assert_eq!(low.delta, 0);
        assert_eq!(low.best_score, 90);
        assert_eq!(low.ledger.total_points, 90);
        assert_eq!(low.ledger.score(level(1)), Some(90));
    }

    #[test]
    fn improvement_credits_only_the_difference() {
        let first = ProgressLedger::new().complete_level(level(1), 30);
        let better = first.ledger.complete_level(level(1), 45);
        assert_eq!(better.delta, 15);
        assert_eq!(better.ledger.total_points, 45);
    }

    #[test]
    fn zero_score_still_marks_complete() {
        let c = ProgressLedger::new().complete_level(level(1), 0);
        assert_eq!(c.delta, 0);
        assert!(c.ledger.is_completed(level(1)));
        assert_eq!(c.ledger.score(level(1)), Some(0));
    }

    #[test]
    fn totals_and_scores_never_decrease_over_sequence() {
        let calls = [(1, 10), (2, 5), (1, 3), (3, 70), (2, 20), (3, 0), (1, 10)];
        let mut ledger = ProgressLedger::new();
        for (id, points) in calls {
            let next = ledger.complete_level(level(id), points).ledger;
            assert!(next.total_points >= ledger.total_points);
            for (l, s) in &ledger.level_scores {
                assert!(next.level_scores[l] >= *s);
            }
            ledger = next;
        }
        assert_eq!(ledger.total_points, 10 + 20 + 70);
        let sum: u64 = ledger.level_scores.values().sum();
        assert_eq!(ledger.total_points, sum);
    }

    #[test]
    fn out_of_order_completion_scenario() {
        let after_two = ProgressLedger::new().complete_level(level(2), 50).ledger;
        assert_eq!(after_two.completed_levels, BTreeSet::from([level(2)]));
        assert_eq!(after_two.total_points, 50);

        let after_one = after_two.complete_level(level(1), 30).ledger;
        assert_eq!(after_one.completed_levels, BTreeSet::from([level(1), level(2)]));
        assert_eq!(after_one.total_points, 80);
    }

    #[test]
    fn record_roundtrip_preserves_ledger() {
        let ledger = ProgressLedger::new()
            .complete_level(level(1), 30)
            .ledger
            .complete_level(level(4), 12)
            .ledger;
        assert_eq!(ProgressLedger::from_record(&ledger.to_record()), ledger);
    }

    #[test]
    fn from_record_tolerates_partial_documents() {
        let record = match json!({
            "totalPoints": "many",
            "completedLevels": {"1": true, "2": false, "0": true, "x": true, "3": true},
            "levelScores": {"1": 20, "2": "bad"}
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let ledger = ProgressLedger::from_record(&record);
        assert_eq!(ledger.total_points, 0);
        assert_eq!(ledger.completed_levels, BTreeSet::from([level(1), level(3)]));
        assert_eq!(ledger.score(level(1)), Some(20));
        assert_eq!(ledger.score(level(3)), Some(0));
        assert_eq!(ledger.score(level(2)), None);
    }

    #[test]
    fn level_record_touches_one_level() {
        let ledger = ProgressLedger::new()
            .complete_level(level(1), 30)
            .ledger
            .complete_level(level(2), 50)
            .ledger;
        let record = ledger.level_record(level(2));
        assert_eq!(record["totalPoints"], json!(80));
        assert_eq!(record["completedLevels"], json!({"2": true}));
        assert_eq!(record["levelScores"], json!({"2": 50}));
    }
}
