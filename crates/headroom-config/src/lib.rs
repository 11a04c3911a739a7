//! headroom-config — tunables and service-configuration access.
//!
//! Two concerns live here:
//!
//! - [`Tunables`]: the daemon's own TOML configuration (sizing thresholds,
//!   shrink behavior, rate limits, history retention, file paths). Reloaded
//!   whole on SIGHUP; a file that fails to parse or validate is rejected as
//!   a unit so the agent keeps running on its previous values.
//! - [`HostConfig`]: read/write access to the *watched service's* TOML
//!   configuration. Only one key is ever touched (the journal budget); the
//!   rewrite preserves every other key and is made durable by writing a
//!   sibling temp file, fsyncing, and renaming over the original.

pub mod error;
pub mod host;
pub mod tunables;

pub use error::{ConfigError, ConfigResult};
pub use host::HostConfig;
pub use tunables::{
    AgentSection, HistorySection, LimitsSection, ShrinkSection, SizingSection, Tunables,
};
