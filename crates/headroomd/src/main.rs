//! headroomd — the headroom daemon.
//!
//! Single binary that assembles the subsystems:
//! - Tunables (TOML file, reloaded on SIGHUP)
//! - History store (redb)
//! - Sizing agent (the control loop)
//! - Observability API (axum)
//!
//! # Usage
//!
//! ```text
//! headroomd run --config /etc/headroom/headroom.toml
//! headroomd check --config /etc/headroom/headroom.toml
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::{RwLock, watch};
use tracing::{info, warn};

use headroom_agent::{ServiceConfigPublisher, SizingAgent, StatsFileSource};
use headroom_api::ApiState;
use headroom_config::{HostConfig, Tunables};
use headroom_state::{HistoryStore, RuntimeCounters};

#[derive(Parser)]
#[command(name = "headroomd", about = "Adaptive journal-budget daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the daemon.
    Run {
        /// Path to the tunables file.
        #[arg(long, default_value = "/etc/headroom/headroom.toml")]
        config: PathBuf,
    },
    /// Validate the tunables file and exit.
    Check {
        /// Path to the tunables file.
        #[arg(long, default_value = "/etc/headroom/headroom.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,headroomd=debug,headroom=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run { config } => run_daemon(config).await,
        Command::Check { config } => {
            Tunables::from_file(&config)
                .with_context(|| format!("validating {}", config.display()))?;
            println!("configuration OK");
            Ok(())
        }
    }
}

async fn run_daemon(config_path: PathBuf) -> anyhow::Result<()> {
    info!("headroom daemon starting");

    let tunables = Tunables::from_file(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let agent_cfg = tunables.agent.clone();

    // ── Initialize subsystems ──────────────────────────────────

    std::fs::create_dir_all(&agent_cfg.data_dir)
        .with_context(|| format!("creating {}", agent_cfg.data_dir.display()))?;
    let db_path = agent_cfg.data_dir.join("headroom.redb");
    let store = HistoryStore::open(&db_path)?;
    info!(path = ?db_path, "history store opened");

    let counters = Arc::new(RwLock::new(RuntimeCounters::default()));
    let shared_tunables = Arc::new(RwLock::new(tunables));

    let host = HostConfig::new(&agent_cfg.service_config, agent_cfg.budget_key.clone());
    let publisher = ServiceConfigPublisher::new(host, &agent_cfg.pidfile);
    let source = StatsFileSource::new(&agent_cfg.stats_file);
    info!(
        service_config = %agent_cfg.service_config.display(),
        stats_file = %agent_cfg.stats_file.display(),
        interval_secs = agent_cfg.interval_secs,
        "watching service"
    );

    // ── Reload and shutdown signals ────────────────────────────

    let (reload_tx, reload_rx) = watch::channel(());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        match signal(SignalKind::hangup()) {
            Ok(mut hangup) => {
                while hangup.recv().await.is_some() {
                    let _ = reload_tx.send(());
                }
            }
            Err(e) => {
                warn!(error = %e, "cannot install SIGHUP handler; reloads disabled");
                // Park instead of returning so the reload channel stays open.
                std::future::pending::<()>().await;
            }
        }
    });

    {
        let shutdown_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            let terminate = async {
                match signal(SignalKind::terminate()) {
                    Ok(mut stream) => {
                        stream.recv().await;
                    }
                    Err(e) => {
                        warn!(error = %e, "cannot install SIGTERM handler");
                        std::future::pending::<()>().await;
                    }
                }
            };
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        warn!(error = %e, "cannot install CTRL+C handler");
                    }
                }
                _ = terminate => {}
            }
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        });
    }

    // ── Start the sizing agent ─────────────────────────────────

    let agent = SizingAgent::new(
        config_path,
        shared_tunables.clone(),
        source.clone(),
        publisher.clone(),
        store.clone(),
        counters.clone(),
    );
    let agent_shutdown = shutdown_rx.clone();
    let agent_handle = tokio::spawn(async move {
        agent.run(reload_rx, agent_shutdown).await;
    });

    // ── Start the API server ───────────────────────────────────

    let api_state = ApiState {
        store,
        counters,
        tunables: shared_tunables,
        metrics: Arc::new(source),
        publisher: Arc::new(publisher),
    };
    let router = headroom_api::build_router(api_state);
    let addr: std::net::SocketAddr = agent_cfg
        .api_listen
        .parse()
        .with_context(|| format!("parsing api_listen address {}", agent_cfg.api_listen))?;

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    let mut server_shutdown = shutdown_rx.clone();
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        let _ = server_shutdown.changed().await;
    });

    server.await?;

    // Wait for the agent to finish its last iteration.
    let _ = agent_handle.await;

    info!("headroom daemon stopped");
    Ok(())
}
