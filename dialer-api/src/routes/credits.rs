//! Credits endpoints - the stable contract other features build on.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

use dialer_core::types::{CreditsState, OwnerId};

use crate::error::ApiResult;
use crate::state::AppState;

// ============ DTOs ============

/// Add credits request.
#[derive(Debug, Deserialize)]
pub struct AddCreditsRequest {
    pub amount: u64,
}

/// One-shot manual debit request. The caller guarantees at-most-once
/// invocation per logical charge.
#[derive(Debug, Deserialize)]
pub struct ConsumeCreditsRequest {
    pub amount: u64,
}

/// Auto-top-up toggle request.
#[derive(Debug, Deserialize)]
pub struct AutoTopUpRequest {
    pub enabled: bool,
}

/// Credit state response.
#[derive(Debug, Serialize)]
pub struct CreditsResponse {
    pub owner_id: String,
    pub balance: u64,
    pub auto_top_up: bool,
    pub ledger_entries: usize,
}

/// Debit response.
#[derive(Debug, Serialize)]
pub struct ConsumeResponse {
    pub ok: bool,
    pub balance: u64,
}

// ============ Endpoints ============

/// Get an owner's credit state.
pub async fn get_credits(
    State(state): State<AppState>,
    Path(owner_id): Path<String>,
) -> ApiResult<Json<CreditsResponse>> {
    let owner = OwnerId::new(&owner_id);
    let credits = state.ledger.get_state(&owner).await?;
    Ok(Json(credits_to_response(&owner_id, &credits)))
}

/// Add credits (top-up or refund).
pub async fn add_credits(
    State(state): State<AppState>,
    Path(owner_id): Path<String>,
    Json(req): Json<AddCreditsRequest>,
) -> ApiResult<Json<CreditsResponse>> {
    let owner = OwnerId::new(&owner_id);
    let credits = state.ledger.add_credits(&owner, req.amount).await?;
    Ok(Json(credits_to_response(&owner_id, &credits)))
}

/// One-shot manual debit (non-idempotent).
pub async fn consume_credits(
    State(state): State<AppState>,
    Path(owner_id): Path<String>,
    Json(req): Json<ConsumeCreditsRequest>,
) -> ApiResult<Json<ConsumeResponse>> {
    let owner = OwnerId::new(&owner_id);
    let outcome = state.ledger.consume_credits(&owner, req.amount).await?;
    Ok(Json(ConsumeResponse {
        ok: outcome.ok,
        balance: outcome.state.balance,
    }))
}

/// Toggle auto-top-up.
pub async fn set_auto_top_up(
    State(state): State<AppState>,
    Path(owner_id): Path<String>,
    Json(req): Json<AutoTopUpRequest>,
) -> ApiResult<Json<CreditsResponse>> {
    let owner = OwnerId::new(&owner_id);
    let credits = state.ledger.set_auto_top_up(&owner, req.enabled).await?;
    Ok(Json(credits_to_response(&owner_id, &credits)))
}

// ============ Helpers ============

fn credits_to_response(owner_id: &str, credits: &CreditsState) -> CreditsResponse {
    CreditsResponse {
        owner_id: owner_id.to_string(),
        balance: credits.balance,
        auto_top_up: credits.auto_top_up,
        ledger_entries: credits.ledger.len(),
    }
}
