//! Campaign endpoints.
//!
//! CRUD plus contact enrollment. The scheduler only reads campaigns; status
//! and content are owner-controlled through these endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use dialer_core::storage::DialerStorage;
use dialer_core::types::{Campaign, CampaignId, CampaignStatus, ContactId, Enrollment, OwnerId};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

// ============ DTOs ============

/// Create campaign request.
#[derive(Debug, Deserialize)]
pub struct CreateCampaignRequest {
    pub owner_id: String,
    pub name: String,
    pub script: String,
    pub voice_agent_id: Option<String>,
    #[serde(default)]
    pub audience_tag_ids: Vec<String>,
}

/// Patch campaign request. Absent fields are left unchanged.
#[derive(Debug, Deserialize)]
pub struct UpdateCampaignRequest {
    pub name: Option<String>,
    pub status: Option<String>,
    pub script: Option<String>,
    pub voice_agent_id: Option<String>,
    pub audience_tag_ids: Option<Vec<String>>,
}

/// Campaign response.
#[derive(Debug, Serialize)]
pub struct CampaignResponse {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub status: String,
    pub script: String,
    pub voice_agent_id: Option<String>,
    pub audience_tag_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Enroll contacts request.
#[derive(Debug, Deserialize)]
pub struct EnrollRequest {
    pub contact_ids: Vec<String>,
    pub first_call_at: Option<DateTime<Utc>>,
}

/// Enroll contacts response. Per-contact conflicts are reported, not fatal.
#[derive(Debug, Serialize)]
pub struct EnrollResponse {
    pub enrolled: Vec<String>,
    pub conflicts: Vec<EnrollConflict>,
}

#[derive(Debug, Serialize)]
pub struct EnrollConflict {
    pub contact_id: String,
    pub error: String,
}

/// Enrollment response (owner-visible status surface).
#[derive(Debug, Serialize)]
pub struct EnrollmentResponse {
    pub id: String,
    pub owner_id: String,
    pub campaign_id: String,
    pub contact_id: String,
    pub status: String,
    pub attempt_count: u32,
    pub next_call_at: Option<DateTime<Utc>>,
    pub call_sid: Option<String>,
    pub last_error: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

// ============ Endpoints ============

/// Create a campaign (created `draft`).
pub async fn create_campaign(
    State(state): State<AppState>,
    Json(req): Json<CreateCampaignRequest>,
) -> ApiResult<Json<CampaignResponse>> {
    let mut campaign = Campaign::new(OwnerId::new(req.owner_id), req.name, req.script);
    campaign.voice_agent_id = req.voice_agent_id;
    campaign.audience_tag_ids = req.audience_tag_ids;

    state.storage.save_campaign(&campaign).await?;
    Ok(Json(campaign_to_response(&campaign)))
}

/// Get a campaign by id.
pub async fn get_campaign(
    State(state): State<AppState>,
    Path(campaign_id): Path<String>,
) -> ApiResult<Json<CampaignResponse>> {
    let campaign = state
        .storage
        .get_campaign(&CampaignId::new(&campaign_id))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Campaign {campaign_id} not found")))?;

    Ok(Json(campaign_to_response(&campaign)))
}

/// Patch a campaign.
pub async fn update_campaign(
    State(state): State<AppState>,
    Path(campaign_id): Path<String>,
    Json(req): Json<UpdateCampaignRequest>,
) -> ApiResult<Json<CampaignResponse>> {
    let mut campaign = state
        .storage
        .get_campaign(&CampaignId::new(&campaign_id))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Campaign {campaign_id} not found")))?;

    if let Some(name) = req.name {
        campaign.name = name;
    }
    if let Some(status) = req.status {
        campaign.status = CampaignStatus::parse(&status)
            .ok_or_else(|| ApiError::BadRequest(format!("Invalid campaign status '{status}'")))?;
    }
    if let Some(script) = req.script {
        campaign.script = script;
    }
    if let Some(agent_id) = req.voice_agent_id {
        campaign.voice_agent_id = if agent_id.is_empty() {
            None
        } else {
            Some(agent_id)
        };
    }
    if let Some(tags) = req.audience_tag_ids {
        campaign.audience_tag_ids = tags;
    }
    campaign.updated_at = Utc::now();

    state.storage.save_campaign(&campaign).await?;
    Ok(Json(campaign_to_response(&campaign)))
}

/// Enroll contacts into a campaign.
pub async fn enroll_contacts(
    State(state): State<AppState>,
    Path(campaign_id): Path<String>,
    Json(req): Json<EnrollRequest>,
) -> ApiResult<Json<EnrollResponse>> {
    let campaign_id = CampaignId::new(campaign_id);
    let mut response = EnrollResponse {
        enrolled: Vec::new(),
        conflicts: Vec::new(),
    };

    for contact_id in req.contact_ids {
        let contact_id = ContactId::new(contact_id);
        match state
            .scheduler
            .enroll(&campaign_id, &contact_id, req.first_call_at)
            .await
        {
            Ok(enrollment) => response.enrolled.push(enrollment.id.to_string()),
            Err(e) => response.conflicts.push(EnrollConflict {
                contact_id: contact_id.to_string(),
                error: e.to_string(),
            }),
        }
    }

    Ok(Json(response))
}

/// Get an enrollment by id.
pub async fn get_enrollment(
    State(state): State<AppState>,
    Path(enrollment_id): Path<String>,
) -> ApiResult<Json<EnrollmentResponse>> {
    let enrollment = state
        .storage
        .get_enrollment(&dialer_core::types::EnrollmentId::new(&enrollment_id))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Enrollment {enrollment_id} not found")))?;

    Ok(Json(enrollment_to_response(&enrollment)))
}

// ============ Helpers ============

fn campaign_to_response(campaign: &Campaign) -> CampaignResponse {
    CampaignResponse {
        id: campaign.id.to_string(),
        owner_id: campaign.owner_id.to_string(),
        name: campaign.name.clone(),
        status: campaign.status.to_string(),
        script: campaign.script.clone(),
        voice_agent_id: campaign.voice_agent_id.clone(),
        audience_tag_ids: campaign.audience_tag_ids.clone(),
        created_at: campaign.created_at,
        updated_at: campaign.updated_at,
    }
}

fn enrollment_to_response(enrollment: &Enrollment) -> EnrollmentResponse {
    EnrollmentResponse {
        id: enrollment.id.to_string(),
        owner_id: enrollment.owner_id.to_string(),
        campaign_id: enrollment.campaign_id.to_string(),
        contact_id: enrollment.contact_id.to_string(),
        status: enrollment.status.to_string(),
        attempt_count: enrollment.attempt_count,
        next_call_at: enrollment.next_call_at,
        call_sid: enrollment.call_sid.clone(),
        last_error: enrollment.last_error.clone(),
        completed_at: enrollment.completed_at,
        updated_at: enrollment.updated_at,
    }
}
