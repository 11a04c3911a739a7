//! headroom-policy — budget sizing decisions.
//!
//! Pure functions only; the agent loop owns all I/O and state. The grow
//! rule treats every forced flush in a window as evidence the budget was
//! exhausted once during that window:
//!
//! # Sizing Algorithm
//!
//! ```text
//! forced  = counter_now - counter_at_last_window
//!
//! if forced >= threshold:
//!     candidate = budget * (forced + 1)        // saturating
//!     if candidate > ceiling:
//!         candidate = ceiling                  // warn: raise the ceiling
//!     if candidate != budget:
//!         apply(candidate)
//!
//! if forced < threshold for `shrink.intervals` consecutive windows:
//!     candidate = max(ceil(budget * shrink.factor), floor)
//!     if candidate < budget:
//!         apply(candidate)
//! ```
//!
//! [`recommend`] runs the same analysis without side effects and attaches
//! a data-quality confidence score, for the observability API.

pub mod recommend;
pub mod sizing;

pub use recommend::{Recommendation, RecommendedAction, confidence, recommend};
pub use sizing::{Decision, decide, grow_target, shrink_target};
