//! headroom-agent — the adaptive budget control loop.
//!
//! A single long-lived worker samples the service's forced-flush counter
//! once per window, decides via [`headroom_policy`] whether the journal
//! budget must change, persists the new value into the service's
//! configuration, and signals the service to reload.
//!
//! # Loop protocol (once per wake)
//!
//! ```text
//! wait: interval elapsed | reload requested | shutdown     (single suspension point)
//!
//! shutdown           → exit cleanly
//! suppression token  → consume and restart (the reload we caused ourselves)
//! external reload    → re-read tunables, restart
//! sizing disabled    → restart, window state untouched
//! first snapshot     → becomes the baseline, no decision (priming)
//! forced >= threshold → grow, clamped at the ceiling
//! quiet streak       → optional shrink toward the floor
//! apply              → persist budget, arm token, notify service
//! ```
//!
//! Iterations are strictly sequential; the suppression token is a
//! single-slot marker armed immediately before the notify and consumed at
//! the very next wake, so the reload our own SIGHUP causes is never
//! mistaken for a scheduled or external one.
//!
//! Every external failure degrades to "do nothing this cycle": a failed
//! stats read or budget write leaves the window baseline untouched so the
//! next cycle retries from a consistent base.

pub mod agent;
pub mod publisher;
pub mod source;

pub use agent::{Flow, SizingAgent, Wake};
pub use publisher::{BudgetPublisher, ServiceConfigPublisher};
pub use source::{MetricsSource, StatsFileSource};
