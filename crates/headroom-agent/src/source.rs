//! Metrics source — the service's forced-flush counter.

use std::path::PathBuf;

use anyhow::Context;
use serde::Deserialize;

/// Read-only snapshot provider for the cumulative forced-flush counter.
///
/// The counter must be monotonically non-decreasing between restarts of
/// the owning service; the agent never resets it.
pub trait MetricsSource: Send + Sync {
    /// Current cumulative forced-flush count.
    fn sample(&self) -> anyhow::Result<u64>;
}

/// The subset of the service's stats we read.
#[derive(Debug, Deserialize)]
struct ServiceStats {
    forced_flushes: u64,
}

/// Reads the counter from the JSON stats file the service rewrites each
/// flush cycle.
#[derive(Debug, Clone)]
pub struct StatsFileSource {
    path: PathBuf,
}

impl StatsFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl MetricsSource for StatsFileSource {
    fn sample(&self) -> anyhow::Result<u64> {
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("reading stats file {}", self.path.display()))?;
        let stats: ServiceStats = serde_json::from_str(&raw)
            .with_context(|| format!("parsing stats file {}", self.path.display()))?;
        Ok(stats.forced_flushes)
    }
}
