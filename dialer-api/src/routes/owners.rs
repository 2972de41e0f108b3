//! Per-owner provider settings endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;

use dialer_core::storage::DialerStorage;
use dialer_core::types::{OwnerId, ProviderSettings};

use crate::dto::MessageResponse;
use crate::error::ApiResult;
use crate::state::AppState;

/// Provider settings payload.
#[derive(Debug, Deserialize)]
pub struct ProviderSettingsRequest {
    pub voice_agent_api_key: Option<String>,
    pub outbound_number: Option<String>,
}

/// Replace an owner's provider settings.
pub async fn put_provider_settings(
    State(state): State<AppState>,
    Path(owner_id): Path<String>,
    Json(req): Json<ProviderSettingsRequest>,
) -> ApiResult<Json<MessageResponse>> {
    let settings = ProviderSettings {
        voice_agent_api_key: req.voice_agent_api_key,
        outbound_number: req.outbound_number,
    };
    state
        .storage
        .save_provider_settings(&OwnerId::new(&owner_id), &settings)
        .await?;

    Ok(Json(MessageResponse::ok("provider settings updated")))
}
