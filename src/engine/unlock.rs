//! Level unlock policy — sequential progression derived from the ledger.
//!
//! A level is reachable when it is level 1 or at most one past the highest
//! completed level. The policy trusts the stored maximum: a ledger holding
//! only level 5 unlocks level 6 even though 1–4 were never played.

use crate::engine::progress::{LevelId, ProgressLedger};

pub fn is_unlocked(ledger: &ProgressLedger, level: LevelId) -> bool {
    if level == LevelId::FIRST {
        return true;
    }
    let max_completed = ledger.max_completed().map(LevelId::get).unwrap_or(0);
    u64::from(level.get()) <= u64::from(max_completed) + 1
}

/// The furthest level the player can open right now.
pub fn frontier(ledger: &ProgressLedger) -> LevelId {
    ledger
        .max_completed()
        .map(LevelId::next)
        .unwrap_or(LevelId::FIRST)
}

/// Unlock state for levels `1..=last`, for rendering a level picker.
pub fn unlock_map(ledger: &ProgressLedger, last: LevelId) -> Vec<(LevelId, bool)> {
    (1..=last.get())
        .filter_map(LevelId::new)
        .map(|level| (level, is_unlocked(ledger, level)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(id: u32) -> LevelId {
        LevelId::new(id).unwrap()
    }

    fn ledger_with(levels: &[u32]) -> ProgressLedger {
        levels.iter().fold(ProgressLedger::new(), |ledger, &id| {
            ledger.complete_level(level(id), 10).ledger
        })
    }

    #[test]
    fn first_level_always_unlocked() {
        assert!(is_unlocked(&ProgressLedger::new(), LevelId::FIRST));
        assert!(is_unlocked(&ledger_with(&[7]), LevelId::FIRST));
    }

    #[test]
    fn empty_ledger_locks_level_two() {
        assert!(!is_unlocked(&ProgressLedger::new(), level(2)));
        assert_eq!(frontier(&ProgressLedger::new()), LevelId::FIRST);
    }

    #[test]
    fn next_level_after_completed_prefix() {
        let ledger = ledger_with(&[1, 2]);
        assert!(is_unlocked(&ledger, level(2)));
        assert!(is_unlocked(&ledger, level(3)));
        assert!(!is_unlocked(&ledger, level(4)));
        assert_eq!(frontier(&ledger), level(3));
    }

    #[test]
    fn trusts_stored_maximum_for_gaps() {
        let ledger = ledger_with(&[5]);
        assert!(is_unlocked(&ledger, level(6)));
        assert!(is_unlocked(&ledger, level(3)));
        assert!(!is_unlocked(&ledger, level(7)));
    }

    #[test]
    fn max_level_does_not_overflow() {
        let top = LevelId::new(u32::MAX).unwrap();
        let ledger = ProgressLedger::new().complete_level(top, 1).ledger;
        assert!(is_unlocked(&ledger, top));
        assert_eq!(frontier(&ledger), top);
    }

    #[test]
    fn unlock_map_marks_each_level() {
        let ledger = ledger_with(&[1]);
        let map = unlock_map(&ledger, level(3));
        assert_eq!(map, vec![(level(1), true), (level(2), true), (level(3), false)]);
    }
}
