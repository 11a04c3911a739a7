//! Analysis-only sizing recommendations.
//!
//! Runs the same analysis as the agent's decision cycle but returns what
//! it *would* do instead of doing it, plus a confidence score describing
//! how much evidence backs the answer.

use serde::{Deserialize, Serialize};

use headroom_config::Tunables;
use headroom_state::RuntimeCounters;

use crate::sizing::{grow_target, shrink_target};

/// Action a recommendation proposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    Increase,
    Decrease,
    None,
    Error,
}

/// Sizing recommendation with data-quality confidence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recommendation {
    pub current_mb: u64,
    pub recommended_mb: u64,
    pub action: RecommendedAction,
    pub reason: String,
    /// 0 to 100. Higher means more evidence behind the recommendation.
    pub confidence: i32,
}

/// Confidence score for a recommendation.
///
/// Base 50 with valid stats; +20 once the cumulative counter has seen more
/// than 10 forced flushes; +15 with a quiet streak in progress; +15 once a
/// baseline exists.
pub fn confidence(counters: &RuntimeCounters, cumulative_forced: u64) -> i32 {
    let mut score = 50;
    if cumulative_forced > 10 {
        score += 20;
    }
    if counters.quiet_intervals > 0 {
        score += 15;
    }
    if counters.baseline.is_some() {
        score += 15;
    }
    score
}

/// Compute a recommendation from the agent's published state.
///
/// `sample` is the freshest cumulative forced-flush count, or `None` when
/// the stats source is unavailable.
pub fn recommend(
    tunables: &Tunables,
    counters: &RuntimeCounters,
    current_mb: u64,
    sample: Option<u64>,
) -> Recommendation {
    if !tunables.sizing.enable {
        return hold(
            current_mb,
            RecommendedAction::Error,
            "auto-sizing is disabled".to_string(),
            0,
        );
    }
    let Some(sample) = sample else {
        return hold(
            current_mb,
            RecommendedAction::Error,
            "journal statistics unavailable".to_string(),
            0,
        );
    };

    let score = confidence(counters, sample);

    let Some(baseline) = counters.baseline else {
        // No window yet; nothing can be said about pressure.
        return hold(
            current_mb,
            RecommendedAction::None,
            "awaiting baseline forced-flush count".to_string(),
            score.min(50),
        );
    };
    let forced = sample.saturating_sub(baseline);

    let sizing = &tunables.sizing;
    if forced >= sizing.threshold {
        let raw = grow_target(current_mb, forced);
        let (target, is_capped) = if raw > sizing.ceiling_mb {
            (sizing.ceiling_mb, true)
        } else {
            (raw, false)
        };

        if current_mb >= target {
            return hold(
                current_mb,
                RecommendedAction::None,
                format!("already at maximum ({current_mb} MB), {forced} forced flushes detected"),
                score,
            );
        }

        let reason = if is_capped {
            format!("{forced} forced flushes detected, recommend {target} MB (capped from {raw} MB)")
        } else {
            format!("{forced} forced flushes detected, recommend increase to {target} MB")
        };
        return Recommendation {
            current_mb,
            recommended_mb: target,
            action: RecommendedAction::Increase,
            reason,
            confidence: score,
        };
    }

    let shrink = &tunables.shrink;
    if !shrink.enable {
        return hold(
            current_mb,
            RecommendedAction::None,
            format!("low activity ({forced} forced flushes), shrink disabled"),
            score,
        );
    }
    if counters.quiet_intervals < shrink.intervals {
        return hold(
            current_mb,
            RecommendedAction::None,
            format!(
                "low activity, {} of {} quiet intervals needed for shrink",
                counters.quiet_intervals, shrink.intervals
            ),
            score,
        );
    }
    if current_mb <= shrink.floor_mb {
        return hold(
            current_mb,
            RecommendedAction::None,
            format!(
                "already at minimum ({current_mb} MB), {} quiet intervals accumulated",
                counters.quiet_intervals
            ),
            score,
        );
    }

    let target = shrink_target(current_mb, shrink.factor, shrink.floor_mb);
    if target >= current_mb {
        return hold(
            current_mb,
            RecommendedAction::None,
            format!("shrink target ({target} MB) not below current ({current_mb} MB)"),
            score,
        );
    }

    Recommendation {
        current_mb,
        recommended_mb: target,
        action: RecommendedAction::Decrease,
        reason: format!(
            "{} quiet intervals, recommend decrease to {target} MB",
            counters.quiet_intervals
        ),
        confidence: score,
    }
}

fn hold(current_mb: u64, action: RecommendedAction, reason: String, confidence: i32) -> Recommendation {
    Recommendation {
        current_mb,
        recommended_mb: current_mb,
        action,
        reason,
        confidence,
    }
}
