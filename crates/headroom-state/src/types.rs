//! Domain types for the history store and agent/API shared state.

use serde::{Deserialize, Serialize};

/// What kind of decision an adjustment record captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentAction {
    /// Budget grew after forced flushes crossed the threshold.
    Increase,
    /// Budget shrank after sustained quiet.
    Decrease,
    /// Budget grew but the computed target was clamped at the ceiling.
    Capped,
    /// A warranted change was declined by rate limiting.
    Skipped,
    /// An analysis-only run that would have changed the budget.
    DryRun,
}

/// One recorded sizing decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdjustmentRecord {
    /// Unix timestamp in milliseconds when the decision was made.
    pub unix_ms: u64,
    pub action: AdjustmentAction,
    /// Budget before the decision (MB).
    pub old_mb: u64,
    /// Budget after the decision (MB). Equals `old_mb` for skipped and
    /// dry-run records the agent declined to apply.
    pub new_mb: u64,
    /// Forced flushes observed in the window that produced the decision.
    pub forced_events: u64,
    /// Sampling window length in seconds at decision time.
    pub interval_secs: u64,
    /// Human-readable explanation.
    pub reason: Option<String>,
}

/// Point-in-time counters the agent publishes after every cycle.
///
/// This is the only state shared between the agent loop and the API. The
/// agent is the sole writer during normal operation; the reset endpoint
/// zeroes the whole struct, which also drops the baseline so the loop
/// re-primes on its next window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeCounters {
    /// Last observed cumulative forced-flush count. `None` until the first
    /// snapshot primes the window.
    pub baseline: Option<u64>,
    /// Consecutive windows below the growth threshold. Any window at or
    /// above the threshold breaks the streak, applied or not.
    pub quiet_intervals: u64,
    /// Sizing changes applied since the daemon started (or since reset).
    pub total_adjustments: u64,
    /// Unix timestamp (seconds) of the last completed cycle; 0 = never.
    pub last_check_unix: i64,
    /// Unix timestamp (seconds) of the last applied change; 0 = never.
    pub last_adjustment_unix: i64,
    /// Changes applied inside the current rolling hour window.
    pub changes_this_hour: u32,
    /// Unix timestamp (seconds) when the hour window opened; 0 = none yet.
    pub hour_window_start_unix: i64,
}
