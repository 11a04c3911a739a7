//! headroom-state — embedded history store for sizing decisions.
//!
//! Backed by [redb](https://docs.rs/redb). Every applied, capped, or
//! skipped sizing decision is appended as an [`AdjustmentRecord`], giving
//! operators an audit trail of what the agent did and why. Records are
//! JSON-serialized into redb's `&[u8]` value column under zero-padded
//! millisecond keys so iteration order is chronological.
//!
//! The [`HistoryStore`] is `Clone` + `Send` + `Sync` (backed by
//! `Arc<Database>`) and is shared between the agent loop and the API.
//!
//! [`RuntimeCounters`] also lives here: the point-in-time counters the
//! agent publishes after each cycle and the API reads for status and
//! recommendations.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::HistoryStore;
pub use types::{AdjustmentAction, AdjustmentRecord, RuntimeCounters};
