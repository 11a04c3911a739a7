//! headroom-api — observability surface for the sizing agent.
//!
//! Read-mostly REST endpoints over the agent's published state. Nothing
//! here touches the loop's own state; apply-style operations go through
//! the same publisher the loop uses, and the reload they trigger reaches
//! the loop as an ordinary external one.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/status` | Tunables, counters, and rate-limit state |
//! | GET | `/api/v1/history` | Recent sizing decisions (`?limit=N`) |
//! | GET | `/api/v1/recommendation` | What the agent would do right now |
//! | POST | `/api/v1/analyze` | Recommendation, optionally applied |
//! | POST | `/api/v1/reset` | Clear history and counters |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tokio::sync::RwLock;

use headroom_agent::{BudgetPublisher, MetricsSource};
use headroom_config::Tunables;
use headroom_state::{HistoryStore, RuntimeCounters};

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: HistoryStore,
    pub counters: Arc<RwLock<RuntimeCounters>>,
    pub tunables: Arc<RwLock<Tunables>>,
    pub metrics: Arc<dyn MetricsSource>,
    pub publisher: Arc<dyn BudgetPublisher>,
}

/// Build the complete API router.
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/status", get(handlers::status))
        .route("/api/v1/history", get(handlers::history))
        .route("/api/v1/recommendation", get(handlers::recommendation))
        .route("/api/v1/analyze", post(handlers::analyze))
        .route("/api/v1/reset", post(handlers::reset))
        .with_state(state)
}
