//! Manual call endpoint.
//!
//! Places a single call outside the enrollment flow, reusing the same
//! dispatcher and a per-call idempotency key. Not part of the retry state
//! machine.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use dialer_core::types::{ContactId, OwnerId};

use crate::error::ApiResult;
use crate::state::AppState;

/// Manual call request.
#[derive(Debug, Deserialize)]
pub struct ManualCallRequest {
    pub owner_id: String,
    pub contact_id: String,
    pub script: String,
    pub idempotency_key: String,
}

/// Manual call response.
#[derive(Debug, Serialize)]
pub struct ManualCallResponse {
    pub call_sid: String,
    pub conversation_id: Option<String>,
}

/// Place a single manual call.
pub async fn place_call(
    State(state): State<AppState>,
    Json(req): Json<ManualCallRequest>,
) -> ApiResult<Json<ManualCallResponse>> {
    let placed = state
        .scheduler
        .place_manual_call(
            &OwnerId::new(req.owner_id),
            &ContactId::new(req.contact_id),
            &req.script,
            &req.idempotency_key,
        )
        .await?;

    Ok(Json(ManualCallResponse {
        call_sid: placed.call_sid,
        conversation_id: placed.conversation_id,
    }))
}
