//! `/api/progress/*` routes — level completion, unlock checks, and totals.
//!
//! The document store behind the bridge resolves immediately, so async
//! engine calls are driven to completion with `block_on`.

use futures::executor::block_on;
use serde_json::json;

use crate::engine::progress::{LevelId, ProgressLedger};
use crate::engine::state::{self, Engine};
use crate::engine::tracker::SaveOutcome;
use crate::engine::unlock;
use crate::routes::util::{json_error, json_ok, Params};

/// Load the activity's ledger unless it is already cached.
fn ensure_loaded(engine: &mut Engine, activity: &str) -> ProgressLedger {
    if engine.tracker.is_loaded(activity) {
        engine.tracker.ledger(activity)
    } else {
        block_on(engine.tracker.load(activity))
    }
}

fn ledger_json(activity: &str, ledger: &ProgressLedger, levels: Option<LevelId>) -> serde_json::Value {
    let mut body = json!({
        "activity": activity,
        "ledger": ledger,
        "frontier": unlock::frontier(ledger),
    });
    if let Some(last) = levels {
        let unlocked: Vec<bool> = unlock::unlock_map(ledger, last)
            .into_iter()
            .map(|(_, open)| open)
            .collect();
        body["unlocked"] = json!(unlocked);
    }
    body
}

fn outcome_label(outcome: &SaveOutcome) -> String {
    match outcome {
        SaveOutcome::Saved => "saved".to_string(),
        SaveOutcome::Unchanged => "unchanged".to_string(),
        SaveOutcome::Cancelled => "cancelled".to_string(),
        SaveOutcome::Failed(e) => format!("failed: {}", e),
    }
}

// ── GET /api/progress ──────────────────────────────────────────────

/// Handle GET /api/progress?activity={id}[&levels={n}]
/// Returns the ledger, the furthest unlocked level, and optionally the
/// unlock state of levels 1..=n. `n` is capped by `EngineConfig::max_levels`.
pub fn handle_get(query: &str) -> String {
    let params = Params::from_query(query);
    let activity = match params.require("activity") {
        Ok(a) => a,
        Err(e) => return json_error(&e),
    };
    let levels = params.parse_opt::<LevelId>("levels");
    state::with_engine_mut(|engine| {
        if let Some(last) = levels {
            let max = engine.config.max_levels;
            if last.get() > max {
                return json_error(&format!("levels must be at most {}", max));
            }
        }
        let ledger = ensure_loaded(engine, activity);
        json_ok(&ledger_json(activity, &ledger, levels))
    })
}

// ── POST /api/progress/complete ────────────────────────────────────

/// Handle POST /api/progress/complete
/// Body params: activity={id}&level={n}&points={n}[&now={ms}]
///
/// Returns the updated ledger, the points credited, and the save outcome.
/// A failed save is reported but the returned ledger still reflects the
/// completion.
pub fn handle_complete_post(body: &str) -> String {
    let params = Params::from_form(body);
    let parsed = params.require("activity").and_then(|activity| {
        let level = params.parse::<LevelId>("level")?;
        let points = params.parse::<u64>("points")?;
        Ok((activity, level, points))
    });
    let (activity, level, points) = match parsed {
        Ok(p) => p,
        Err(e) => return json_error(&e),
    };

    state::with_engine_mut(|engine| {
        engine.observe_time(params.parse_opt("now").unwrap_or(0));
        let (completion, task) =
            match block_on(engine.tracker.complete_level(activity, level, points)) {
                Ok(done) => done,
                Err(e) => return json_error(&e.to_string()),
            };
        let outcome = block_on(task.run());
        let mut body = ledger_json(activity, &completion.ledger, None);
        body["delta"] = json!(completion.delta);
        body["bestScore"] = json!(completion.best_score);
        body["save"] = json!(outcome_label(&outcome));
        json_ok(&body)
    })
}

// ── GET /api/progress/unlocked ─────────────────────────────────────

/// Handle GET /api/progress/unlocked?activity={id}&level={n}
pub fn handle_unlocked_get(query: &str) -> String {
    let params = Params::from_query(query);
    let parsed = params
        .require("activity")
        .and_then(|activity| Ok((activity, params.parse::<LevelId>("level")?)));
    let (activity, level) = match parsed {
        Ok(p) => p,
        Err(e) => return json_error(&e),
    };
    state::with_engine_mut(|engine| {
        ensure_loaded(engine, activity);
        json_ok(&json!({
            "activity": activity,
            "level": level,
            "unlocked": engine.tracker.is_unlocked(activity, level),
        }))
    })
}

// ── GET /api/progress/total ────────────────────────────────────────

/// Handle GET /api/progress/total
/// Sum of points across every activity in the current namespace.
pub fn handle_total_get(_query: &str) -> String {
    state::with_engine(|engine| {
        let total = block_on(engine.tracker.total_across_activities());
        json_ok(&json!({ "total": total }))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::identity;

    fn value(json: &str) -> serde_json::Value {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn get_requires_activity() {
        state::reset();
        assert!(handle_get("").contains("missing activity parameter"));
    }

    #[test]
    fn fresh_activity_is_empty_with_first_level_open() {
        state::reset();
        let body = value(&handle_get("?activity=spelling&levels=3"));
        assert_eq!(body["ledger"]["totalPoints"], 0);
        assert_eq!(body["frontier"], 1);
        assert_eq!(body["unlocked"], json!([true, false, false]));
    }

    #[test]
    fn level_map_is_bounded_by_config() {
        state::reset();
        let body = value(&handle_get("?activity=s&levels=4294967295"));
        assert_eq!(body["error"], "levels must be at most 1000");
        assert!(body.get("unlocked").is_none());

        let body = value(&handle_get("?activity=s&levels=1000"));
        assert_eq!(body["unlocked"].as_array().map(Vec::len), Some(1000));
    }

    #[test]
    fn completion_without_cache_keeps_stored_best() {
        state::reset();
        handle_complete_post("activity=math&level=1&points=90");
        state::with_engine_mut(|e| e.tracker.forget());
        let body = value(&handle_complete_post("activity=math&level=1&points=10"));
        assert_eq!(body["ledger"]["totalPoints"], 90);
        assert_eq!(body["bestScore"], 90);
        assert_eq!(body["save"], "unchanged");
        state::reset();
    }

    #[test]
    fn complete_rejects_bad_params() {
        state::reset();
        assert!(handle_complete_post("activity=s&level=0&points=5").contains("invalid level"));
        assert!(handle_complete_post("activity=s&level=1").contains("missing points"));
        assert!(handle_complete_post("level=1&points=1").contains("missing activity"));
    }

    #[test]
    fn out_of_order_completion_scenario() {
        state::reset();
        let body = value(&handle_complete_post("activity=spelling&level=2&points=50"));
        assert_eq!(body["ledger"]["completedLevels"], json!([2]));
        assert_eq!(body["ledger"]["totalPoints"], 50);
        assert_eq!(body["delta"], 50);
        assert_eq!(body["save"], "saved");

        let body = value(&handle_complete_post("activity=spelling&level=1&points=30"));
        assert_eq!(body["ledger"]["completedLevels"], json!([1, 2]));
        assert_eq!(body["ledger"]["totalPoints"], 80);

        let unlocked = value(&handle_unlocked_get("?activity=spelling&level=3"));
        assert_eq!(unlocked["unlocked"], true);
        let locked = value(&handle_unlocked_get("?activity=spelling&level=4"));
        assert_eq!(locked["unlocked"], false);
        state::reset();
    }

    #[test]
    fn replay_reports_unchanged() {
        state::reset();
        handle_complete_post("activity=math&level=1&points=10");
        let body = value(&handle_complete_post("activity=math&level=1&points=10"));
        assert_eq!(body["delta"], 0);
        assert_eq!(body["ledger"]["totalPoints"], 10);
        assert_eq!(body["save"], "unchanged");
        state::reset();
    }

    #[test]
    fn progress_survives_cache_loss() {
        state::reset();
        handle_complete_post("activity=math&level=1&points=10");
        state::with_engine_mut(|e| e.tracker.forget());
        let body = value(&handle_complete_post("activity=math&level=2&points=5"));
        assert_eq!(body["ledger"]["totalPoints"], 15);
        state::reset();
    }

    #[test]
    fn total_spans_activities_and_respects_namespace() {
        state::reset();
        identity::handle_post("user=u1");
        handle_complete_post("activity=math&level=1&points=10");
        handle_complete_post("activity=spelling&level=1&points=25");
        assert_eq!(value(&handle_total_get(""))["total"], 35);

        identity::handle_post("user=");
        assert_eq!(value(&handle_total_get(""))["total"], 0);
        identity::handle_post("user=u1");
        assert_eq!(value(&handle_total_get(""))["total"], 35);
        state::reset();
    }
}
