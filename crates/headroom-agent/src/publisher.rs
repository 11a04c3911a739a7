//! Budget publisher — durable config writes and service reload signaling.

use std::path::PathBuf;

use anyhow::Context;
use tracing::{debug, info};

use headroom_config::HostConfig;

/// Write side of the external configuration store.
pub trait BudgetPublisher: Send + Sync {
    /// Current budget value from the live configuration.
    fn current_budget(&self) -> anyhow::Result<u64>;

    /// Durably persist a new budget value.
    fn publish(&self, budget_mb: u64) -> anyhow::Result<()>;

    /// Fire-and-forget request for the service to reread its configuration.
    fn notify_reload(&self) -> anyhow::Result<()>;
}

/// Publishes into the service's TOML config and signals it via SIGHUP.
#[derive(Debug, Clone)]
pub struct ServiceConfigPublisher {
    host: HostConfig,
    pidfile: PathBuf,
}

impl ServiceConfigPublisher {
    pub fn new(host: HostConfig, pidfile: impl Into<PathBuf>) -> Self {
        Self {
            host,
            pidfile: pidfile.into(),
        }
    }

    fn service_pid(&self) -> anyhow::Result<i32> {
        let raw = std::fs::read_to_string(&self.pidfile)
            .with_context(|| format!("reading pidfile {}", self.pidfile.display()))?;
        raw.trim()
            .parse::<i32>()
            .with_context(|| format!("parsing pid from {}", self.pidfile.display()))
    }
}

impl BudgetPublisher for ServiceConfigPublisher {
    fn current_budget(&self) -> anyhow::Result<u64> {
        Ok(self.host.read_budget()?)
    }

    fn publish(&self, budget_mb: u64) -> anyhow::Result<()> {
        self.host.write_budget(budget_mb)?;
        info!(
            budget_mb,
            path = %self.host.path().display(),
            "budget persisted to service config"
        );
        Ok(())
    }

    fn notify_reload(&self) -> anyhow::Result<()> {
        let pid = self.service_pid()?;
        // SAFETY: kill(2) with SIGHUP only delivers a signal.
        let rc = unsafe { libc::kill(pid, libc::SIGHUP) };
        if rc != 0 {
            return Err(std::io::Error::last_os_error())
                .with_context(|| format!("signaling pid {pid}"));
        }
        debug!(pid, "sent SIGHUP to service");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn service_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn publish_then_read_back() {
        let config = service_config("budget_mb = 1000\nname = \"svc\"\n");
        let publisher = ServiceConfigPublisher::new(
            HostConfig::new(config.path(), "budget_mb"),
            "/nonexistent/svc.pid",
        );

        assert_eq!(publisher.current_budget().unwrap(), 1000);
        publisher.publish(4000).unwrap();
        assert_eq!(publisher.current_budget().unwrap(), 4000);
    }

    #[test]
    fn notify_without_pidfile_is_error() {
        let config = service_config("budget_mb = 1000\n");
        let publisher = ServiceConfigPublisher::new(
            HostConfig::new(config.path(), "budget_mb"),
            "/nonexistent/svc.pid",
        );

        assert!(publisher.notify_reload().is_err());
    }

    #[test]
    fn garbage_pidfile_is_error() {
        let config = service_config("budget_mb = 1000\n");
        let mut pidfile = tempfile::NamedTempFile::new().unwrap();
        pidfile.write_all(b"not-a-pid\n").unwrap();

        let publisher = ServiceConfigPublisher::new(
            HostConfig::new(config.path(), "budget_mb"),
            pidfile.path(),
        );
        assert!(publisher.notify_reload().is_err());
    }
}
