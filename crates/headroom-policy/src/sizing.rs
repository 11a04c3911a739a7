//! Grow and shrink target computation.

use tracing::warn;

/// Outcome of a grow evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// The budget to run with after this decision (MB).
    pub new_budget_mb: u64,
    /// Whether the budget changed and must be persisted.
    pub applied: bool,
    /// Whether the computed target was clamped at the ceiling.
    pub capped: bool,
}

impl Decision {
    fn unchanged(current_mb: u64, capped: bool) -> Self {
        Self {
            new_budget_mb: current_mb,
            applied: false,
            capped,
        }
    }
}

/// Raw grow target.
///
/// Every forced flush in the window means the budget was exhausted once
/// over that window, so scale by `forced + 1`: linear headroom for the
/// observed pressure plus one unit for the budget already in place.
/// Saturates instead of wrapping; ceilings are expected to keep values
/// far from the representable limit.
#[inline]
pub fn grow_target(current_mb: u64, forced_in_window: u64) -> u64 {
    current_mb.saturating_mul(forced_in_window.saturating_add(1))
}

/// Decide whether the budget must grow.
///
/// Returns an unapplied decision when the window is below the threshold or
/// the (possibly clamped) target equals the current budget, so callers
/// never issue redundant writes.
pub fn decide(current_mb: u64, ceiling_mb: u64, forced_in_window: u64, threshold: u64) -> Decision {
    if forced_in_window < threshold {
        return Decision::unchanged(current_mb, false);
    }

    let mut candidate = grow_target(current_mb, forced_in_window);
    let mut capped = false;
    if candidate > ceiling_mb {
        warn!(
            requested_mb = candidate,
            ceiling_mb,
            "computed budget exceeds the configured ceiling; using the ceiling. \
             Consider raising sizing.ceiling_mb"
        );
        candidate = ceiling_mb;
        capped = true;
    }

    if candidate == current_mb {
        return Decision::unchanged(current_mb, capped);
    }

    Decision {
        new_budget_mb: candidate,
        applied: true,
        capped,
    }
}

/// Shrink target: `ceil(current * factor)`, never below the floor.
#[inline]
pub fn shrink_target(current_mb: u64, factor: f64, floor_mb: u64) -> u64 {
    let raw = (current_mb as f64 * factor).ceil() as u64;
    raw.max(floor_mb)
}
