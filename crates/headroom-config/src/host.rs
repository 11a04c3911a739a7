//! Access to the watched service's configuration file.
//!
//! The service owns its config; headroom only ever touches the one key
//! holding the journal budget. Reads parse the whole file fresh every time
//! so values changed by the operator or another tool are always picked up.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{ConfigError, ConfigResult};

/// Handle on the service's TOML configuration and the budget key inside it.
#[derive(Debug, Clone)]
pub struct HostConfig {
    path: PathBuf,
    budget_key: String,
}

impl HostConfig {
    pub fn new(path: impl Into<PathBuf>, budget_key: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            budget_key: budget_key.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the current budget value (MB).
    pub fn read_budget(&self) -> ConfigResult<u64> {
        let doc = self.load()?;
        let value = lookup(&doc, &self.budget_key)
            .ok_or_else(|| ConfigError::BudgetKey(self.budget_key.clone()))?;
        match value.as_integer() {
            Some(v) if v >= 0 => Ok(v as u64),
            _ => Err(ConfigError::BudgetKey(self.budget_key.clone())),
        }
    }

    /// Durably persist a new budget value, leaving every other key intact.
    ///
    /// The document is rewritten to a sibling temp file, fsynced, and
    /// renamed over the original so the service never observes a torn file.
    pub fn write_budget(&self, budget_mb: u64) -> ConfigResult<()> {
        let mut doc = self.load()?;
        insert(&mut doc, &self.budget_key, budget_mb as i64);
        let rendered =
            toml::to_string_pretty(&doc).map_err(|source| ConfigError::Render {
                path: self.path.clone(),
                source,
            })?;

        let tmp = self.path.with_extension("tmp");
        let write_err = |source| ConfigError::Write {
            path: tmp.clone(),
            source,
        };
        let mut file = fs::File::create(&tmp).map_err(write_err)?;
        file.write_all(rendered.as_bytes()).map_err(write_err)?;
        file.sync_all().map_err(write_err)?;
        fs::rename(&tmp, &self.path).map_err(|source| ConfigError::Write {
            path: self.path.clone(),
            source,
        })?;

        debug!(path = %self.path.display(), budget_mb, "budget written to service config");
        Ok(())
    }

    fn load(&self) -> ConfigResult<toml::Table> {
        let raw = fs::read_to_string(&self.path).map_err(|source| ConfigError::Read {
            path: self.path.clone(),
            source,
        })?;
        raw.parse::<toml::Table>().map_err(|source| ConfigError::Parse {
            path: self.path.clone(),
            source,
        })
    }
}

/// Resolve a (possibly dotted) key against nested tables.
fn lookup<'a>(doc: &'a toml::Table, key: &str) -> Option<&'a toml::Value> {
    let mut segments = key.split('.');
    let mut current = doc.get(segments.next()?)?;
    for segment in segments {
        current = current.as_table()?.get(segment)?;
    }
    Some(current)
}

/// Set a (possibly dotted) key, creating intermediate tables as needed.
fn insert(doc: &mut toml::Table, key: &str, value: i64) {
    let mut segments: Vec<&str> = key.split('.').collect();
    let leaf = segments.pop().unwrap_or(key);
    let mut table = doc;
    for segment in segments {
        let entry = table
            .entry(segment.to_string())
            .or_insert_with(|| toml::Value::Table(toml::Table::new()));
        if !entry.is_table() {
            // A scalar in the way is replaced; the budget key owns its path.
            *entry = toml::Value::Table(toml::Table::new());
        }
        let toml::Value::Table(next) = entry else {
            unreachable!("entry was just coerced to a table")
        };
        table = next;
    }
    table.insert(leaf.to_string(), toml::Value::Integer(value));
}
