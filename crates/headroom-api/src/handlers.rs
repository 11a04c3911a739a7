//! REST API handlers.
//!
//! Each handler reads the agent's published state and returns JSON
//! responses in a consistent envelope.

use std::time::{SystemTime, UNIX_EPOCH};

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use headroom_policy::{Recommendation, RecommendedAction, recommend};
use headroom_state::{AdjustmentAction, AdjustmentRecord, RuntimeCounters};

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> axum::response::Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
        .into_response()
}

// ── Status ─────────────────────────────────────────────────────

/// GET /api/v1/status
pub async fn status(State(state): State<ApiState>) -> impl IntoResponse {
    let tunables = state.tunables.read().await.clone();
    let counters = *state.counters.read().await;
    // Degrades to null instead of failing the whole status call when the
    // service config is momentarily unreadable.
    let current = state.publisher.current_budget().ok();

    let now = epoch_secs();
    let cooldown = tunables.limits.cooldown_secs as i64;
    let cooldown_until = counters.last_adjustment_unix.saturating_add(cooldown);
    let cooldown_active =
        cooldown > 0 && counters.last_adjustment_unix > 0 && now < cooldown_until;
    let hour_open =
        counters.hour_window_start_unix > 0 && now - counters.hour_window_start_unix < 3600;
    let hourly_limit_reached = hour_open
        && tunables.limits.max_changes_per_hour > 0
        && counters.changes_this_hour >= tunables.limits.max_changes_per_hour;

    ApiResponse::ok(json!({
        "enabled": tunables.sizing.enable,
        "current_budget_mb": current,
        "ceiling_mb": tunables.sizing.ceiling_mb,
        "threshold": tunables.sizing.threshold,
        "interval_secs": tunables.agent.interval_secs,
        "shrink_enabled": tunables.shrink.enable,
        "shrink_factor": tunables.shrink.factor,
        "shrink_intervals": tunables.shrink.intervals,
        "floor_mb": tunables.shrink.floor_mb,
        "cooldown_secs": tunables.limits.cooldown_secs,
        "max_changes_per_hour": tunables.limits.max_changes_per_hour,
        "baseline": counters.baseline,
        "quiet_intervals": counters.quiet_intervals,
        "total_adjustments": counters.total_adjustments,
        "last_check_unix": nonzero(counters.last_check_unix),
        "last_adjustment_unix": nonzero(counters.last_adjustment_unix),
        "changes_this_hour": counters.changes_this_hour,
        "cooldown_active": cooldown_active,
        "cooldown_remaining_secs": if cooldown_active { cooldown_until - now } else { 0 },
        "hourly_limit_reached": hourly_limit_reached,
        "at_ceiling": current.is_some_and(|c| c >= tunables.sizing.ceiling_mb),
    }))
}

fn nonzero(v: i64) -> Option<i64> {
    (v != 0).then_some(v)
}

// ── History ────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

/// GET /api/v1/history
pub async fn history(
    State(state): State<ApiState>,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse {
    match state.store.recent(query.limit) {
        Ok(records) => ApiResponse::ok(records).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR),
    }
}

// ── Recommendation / analysis ──────────────────────────────────

/// Everything an analysis needs, gathered in one place.
struct Analysis {
    recommendation: Recommendation,
    forced: u64,
    interval_secs: u64,
}

async fn analyze_now(state: &ApiState) -> Result<Analysis, axum::response::Response> {
    let tunables = state.tunables.read().await.clone();
    let counters = *state.counters.read().await;
    let current = state.publisher.current_budget().map_err(|e| {
        error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
    })?;
    let sample = state.metrics.sample().ok();

    let forced = match (sample, counters.baseline) {
        (Some(sample), Some(baseline)) => sample.saturating_sub(baseline),
        _ => 0,
    };
    let recommendation = recommend(&tunables, &counters, current, sample);
    Ok(Analysis {
        recommendation,
        forced,
        interval_secs: tunables.agent.interval_secs,
    })
}

/// GET /api/v1/recommendation
pub async fn recommendation(State(state): State<ApiState>) -> impl IntoResponse {
    match analyze_now(&state).await {
        Ok(analysis) => ApiResponse::ok(analysis.recommendation).into_response(),
        Err(resp) => resp,
    }
}

#[derive(Deserialize, Default)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub apply: bool,
}

/// POST /api/v1/analyze
///
/// Computes a recommendation; with `{"apply": true}` it is also executed
/// through the same publisher the agent uses. The reload it causes
/// reaches the agent as an ordinary external one.
pub async fn analyze(
    State(state): State<ApiState>,
    Json(request): Json<AnalyzeRequest>,
) -> impl IntoResponse {
    let analysis = match analyze_now(&state).await {
        Ok(analysis) => analysis,
        Err(resp) => return resp,
    };
    let rec = &analysis.recommendation;

    let actionable = matches!(
        rec.action,
        RecommendedAction::Increase | RecommendedAction::Decrease
    );
    let mut applied = false;

    if request.apply && actionable {
        if let Err(e) = state.publisher.publish(rec.recommended_mb) {
            return error_response(
                &format!("failed to apply recommendation: {e}"),
                StatusCode::INTERNAL_SERVER_ERROR,
            );
        }
        if let Err(e) = state.publisher.notify_reload() {
            warn!(error = %e, "reload notification failed after apply");
        }
        applied = true;
        info!(
            from_mb = rec.current_mb,
            to_mb = rec.recommended_mb,
            "recommendation applied via API"
        );

        let action = match rec.action {
            RecommendedAction::Decrease => AdjustmentAction::Decrease,
            _ => AdjustmentAction::Increase,
        };
        record_analysis(&state, action, &analysis);
    } else if actionable {
        record_analysis(&state, AdjustmentAction::DryRun, &analysis);
    }

    ApiResponse::ok(json!({
        "recommendation": rec,
        "applied": applied,
    }))
    .into_response()
}

fn record_analysis(state: &ApiState, action: AdjustmentAction, analysis: &Analysis) {
    let rec = &analysis.recommendation;
    let record = AdjustmentRecord {
        unix_ms: epoch_ms(),
        action,
        old_mb: rec.current_mb,
        new_mb: rec.recommended_mb,
        forced_events: analysis.forced,
        interval_secs: analysis.interval_secs,
        reason: Some(rec.reason.clone()),
    };
    if let Err(e) = state.store.append(&record) {
        warn!(error = %e, "failed to record analysis");
    }
}

// ── Reset ──────────────────────────────────────────────────────

/// POST /api/v1/reset
///
/// Clears the history table and zeroes the shared counters. Dropping the
/// baseline makes the agent re-prime on its next window.
pub async fn reset(State(state): State<ApiState>) -> impl IntoResponse {
    if let Err(e) = state.store.clear() {
        return error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR);
    }
    *state.counters.write().await = RuntimeCounters::default();
    info!("counters and history reset");
    ApiResponse::ok(true).into_response()
}

fn epoch_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
