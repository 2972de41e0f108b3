//! Scheduler trigger endpoint.
//!
//! Invoked by an external time-based trigger with at-least-once semantics.
//! Authorized by the `x-cron-secret` header matching the configured shared
//! secret; an empty configured secret rejects every request.

use axum::{extract::State, http::HeaderMap, Json};
use serde::Serialize;

use dialer_core::scheduler::TickSummary;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Trigger response body.
#[derive(Debug, Serialize)]
pub struct CronResponse {
    pub processed: usize,
    pub reconciled: usize,
    pub dispatched: usize,
    pub errors: Vec<CronError>,
}

#[derive(Debug, Serialize)]
pub struct CronError {
    pub enrollment_id: String,
    pub error: String,
}

impl From<TickSummary> for CronResponse {
    fn from(summary: TickSummary) -> Self {
        Self {
            processed: summary.processed(),
            reconciled: summary.reconciled,
            dispatched: summary.dispatched,
            errors: summary
                .errors
                .into_iter()
                .map(|e| CronError {
                    enrollment_id: e.enrollment_id.to_string(),
                    error: e.error,
                })
                .collect(),
        }
    }
}

/// Run one scheduler tick.
pub async fn run_outbound_calls(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<CronResponse>> {
    let provided = headers
        .get("x-cron-secret")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if state.config.cron_secret.is_empty() || provided != state.config.cron_secret {
        return Err(ApiError::Unauthorized("invalid cron secret".to_string()));
    }

    let summary = state.scheduler.run_tick().await?;
    Ok(Json(CronResponse::from(summary)))
}
