//! Contact endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

use dialer_core::storage::DialerStorage;
use dialer_core::types::{Contact, ContactId, OwnerId};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

// ============ DTOs ============

/// Create contact request.
#[derive(Debug, Deserialize)]
pub struct CreateContactRequest {
    pub owner_id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Contact response.
#[derive(Debug, Serialize)]
pub struct ContactResponse {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    /// The phone number as the dialer would use it, when normalizable.
    pub normalized_phone: Option<String>,
}

// ============ Endpoints ============

/// Create a contact.
pub async fn create_contact(
    State(state): State<AppState>,
    Json(req): Json<CreateContactRequest>,
) -> ApiResult<Json<ContactResponse>> {
    let mut contact = Contact::new(OwnerId::new(req.owner_id), req.name);
    contact.email = req.email;
    contact.phone = req.phone;

    state.storage.save_contact(&contact).await?;
    Ok(Json(contact_to_response(&contact)))
}

/// Get a contact by id.
pub async fn get_contact(
    State(state): State<AppState>,
    Path(contact_id): Path<String>,
) -> ApiResult<Json<ContactResponse>> {
    let contact = state
        .storage
        .get_contact(&ContactId::new(&contact_id))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Contact {contact_id} not found")))?;

    Ok(Json(contact_to_response(&contact)))
}

// ============ Helpers ============

fn contact_to_response(contact: &Contact) -> ContactResponse {
    ContactResponse {
        id: contact.id.to_string(),
        owner_id: contact.owner_id.to_string(),
        name: contact.name.clone(),
        email: contact.email.clone(),
        phone: contact.phone.clone(),
        normalized_phone: contact.usable_phone(),
    }
}
