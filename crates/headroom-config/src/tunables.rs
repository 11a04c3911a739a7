//! The daemon's own tunables file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// All runtime tunables, grouped the way the TOML file is.
///
/// Every field carries a default so a minimal file only needs the `[agent]`
/// paths. The whole struct is replaced on reload; partial updates are not
/// supported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tunables {
    pub agent: AgentSection,
    pub sizing: SizingSection,
    pub shrink: ShrinkSection,
    pub limits: LimitsSection,
    pub history: HistorySection,
}

/// Wiring between the daemon and the watched service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// Sampling cadence in seconds. Set this to the service's own flush
    /// cadence so each window covers exactly one flush cycle.
    pub interval_secs: u64,
    /// The service's TOML configuration file (where the budget lives).
    pub service_config: PathBuf,
    /// Key holding the journal budget inside `service_config`. Dotted
    /// segments address nested tables (`journal.budget_mb`).
    pub budget_key: String,
    /// JSON stats file the service rewrites each flush cycle.
    pub stats_file: PathBuf,
    /// Pidfile used to SIGHUP the service after a budget change.
    pub pidfile: PathBuf,
    /// Directory for the daemon's own state (history database).
    pub data_dir: PathBuf,
    /// Listen address for the observability API.
    pub api_listen: String,
}

/// Growth behavior.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizingSection {
    /// Master switch. When false the agent keeps its cadence but never
    /// samples or changes anything.
    pub enable: bool,
    /// Hard upper bound the budget never exceeds (MB). Set this below the
    /// storage actually available to the journal device.
    pub ceiling_mb: u64,
    /// Forced flushes per window required before any growth. Raise it to
    /// ignore occasional bursts from batch jobs.
    pub threshold: u64,
}

/// Shrink-back behavior after sustained quiet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShrinkSection {
    pub enable: bool,
    /// Multiplier applied to the current budget per shrink step (0, 1].
    pub factor: f64,
    /// Consecutive quiet windows required before a shrink step.
    pub intervals: u64,
    /// Floor the budget never shrinks below (MB).
    pub floor_mb: u64,
}

/// Rate limiting of applied changes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsSection {
    /// Minimum seconds between applied changes. 0 disables the cooldown.
    pub cooldown_secs: u64,
    /// Cap on changes inside a rolling hour. 0 disables the cap.
    pub max_changes_per_hour: u32,
}

/// History retention.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistorySection {
    /// Days of adjustment history to keep. 0 prunes everything.
    pub retention_days: u32,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            service_config: PathBuf::new(),
            budget_key: "budget_mb".to_string(),
            stats_file: PathBuf::new(),
            pidfile: PathBuf::new(),
            data_dir: PathBuf::from("/var/lib/headroom"),
            api_listen: "127.0.0.1:7070".to_string(),
        }
    }
}

impl Default for SizingSection {
    fn default() -> Self {
        Self {
            enable: true,
            ceiling_mb: 4096,
            threshold: 2,
        }
    }
}

impl Default for ShrinkSection {
    fn default() -> Self {
        Self {
            enable: false,
            factor: 0.75,
            intervals: 5,
            floor_mb: 1024,
        }
    }
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self {
            cooldown_secs: 300,
            max_changes_per_hour: 4,
        }
    }
}

impl Default for HistorySection {
    fn default() -> Self {
        Self { retention_days: 7 }
    }
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            agent: AgentSection::default(),
            sizing: SizingSection::default(),
            shrink: ShrinkSection::default(),
            limits: LimitsSection::default(),
            history: HistorySection::default(),
        }
    }
}

impl Tunables {
    /// Load and validate tunables from a TOML file.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let tunables: Tunables = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tunables.validate()?;
        Ok(tunables)
    }

    /// Check every field against its allowed range.
    pub fn validate(&self) -> ConfigResult<()> {
        fn invalid<T>(msg: impl Into<String>) -> ConfigResult<T> {
            Err(ConfigError::Invalid(msg.into()))
        }

        if self.agent.interval_secs < 1 {
            return invalid("agent.interval_secs must be at least 1");
        }
        if self.agent.service_config.as_os_str().is_empty() {
            return invalid("agent.service_config is required");
        }
        if self.agent.budget_key.is_empty() {
            return invalid("agent.budget_key is required");
        }
        if self.agent.stats_file.as_os_str().is_empty() {
            return invalid("agent.stats_file is required");
        }
        if self.agent.pidfile.as_os_str().is_empty() {
            return invalid("agent.pidfile is required");
        }
        if self.sizing.ceiling_mb < 2 {
            return invalid("sizing.ceiling_mb must be at least 2");
        }
        if self.sizing.threshold < 1 || self.sizing.threshold > 1000 {
            return invalid("sizing.threshold must be between 1 and 1000");
        }
        if !(self.shrink.factor > 0.0 && self.shrink.factor <= 1.0) {
            return invalid("shrink.factor must be in (0, 1]");
        }
        if self.shrink.intervals < 1 {
            return invalid("shrink.intervals must be at least 1");
        }
        if self.shrink.floor_mb < 2 {
            return invalid("shrink.floor_mb must be at least 2");
        }
        if self.limits.cooldown_secs > 86_400 {
            return invalid("limits.cooldown_secs must not exceed 86400");
        }
        if self.limits.max_changes_per_hour > 1000 {
            return invalid("limits.max_changes_per_hour must not exceed 1000");
        }
        if self.history.retention_days > 3650 {
            return invalid("history.retention_days must not exceed 3650");
        }
        Ok(())
    }
}
