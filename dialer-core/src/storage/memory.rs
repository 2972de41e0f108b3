//! In-memory storage implementation.
//!
//! Thread-safe reference store, used for tests and development. The
//! enrollment uniqueness index and the dispatch claim both run under the
//! enrollment write lock, which is what a relational backend would express
//! with a unique constraint and a per-row update.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::DialerStorage;
use crate::error::{DialerError, DialerResult};
use crate::types::{
    Campaign, CampaignId, Contact, ContactId, CreditsState, Enrollment, EnrollmentId,
    EnrollmentStatus, OwnerId, ProviderSettings,
};

/// Thread-safe in-memory storage.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    campaigns: Arc<RwLock<HashMap<CampaignId, Campaign>>>,
    contacts: Arc<RwLock<HashMap<ContactId, Contact>>>,
    enrollments: Arc<RwLock<HashMap<EnrollmentId, Enrollment>>>,
    // Uniqueness index over (campaign_id, contact_id)
    enrollment_index: Arc<RwLock<HashMap<(CampaignId, ContactId), EnrollmentId>>>,
    credits: Arc<RwLock<HashMap<OwnerId, CreditsState>>>,
    provider_settings: Arc<RwLock<HashMap<OwnerId, ProviderSettings>>>,
}

impl MemoryStorage {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all data.
    pub async fn clear(&self) {
        self.campaigns.write().await.clear();
        self.contacts.write().await.clear();
        self.enrollments.write().await.clear();
        self.enrollment_index.write().await.clear();
        self.credits.write().await.clear();
        self.provider_settings.write().await.clear();
    }
}

#[async_trait]
impl DialerStorage for MemoryStorage {
    // ==================== Campaign operations ====================

    async fn save_campaign(&self, campaign: &Campaign) -> DialerResult<()> {
        let mut campaigns = self.campaigns.write().await;
        campaigns.insert(campaign.id.clone(), campaign.clone());
        Ok(())
    }

    async fn get_campaign(&self, id: &CampaignId) -> DialerResult<Option<Campaign>> {
        let campaigns = self.campaigns.read().await;
        Ok(campaigns.get(id).cloned())
    }

    // ==================== Contact operations ====================

    async fn save_contact(&self, contact: &Contact) -> DialerResult<()> {
        let mut contacts = self.contacts.write().await;
        contacts.insert(contact.id.clone(), contact.clone());
        Ok(())
    }

    async fn get_contact(&self, id: &ContactId) -> DialerResult<Option<Contact>> {
        let contacts = self.contacts.read().await;
        Ok(contacts.get(id).cloned())
    }

    // ==================== Enrollment operations ====================

    async fn create_enrollment(&self, enrollment: &Enrollment) -> DialerResult<()> {
        // Lock order: enrollments before index, everywhere.
        let mut enrollments = self.enrollments.write().await;
        let mut index = self.enrollment_index.write().await;

        let key = (enrollment.campaign_id.clone(), enrollment.contact_id.clone());
        if index.contains_key(&key) {
            return Err(DialerError::EnrollmentExists {
                campaign_id: enrollment.campaign_id.to_string(),
                contact_id: enrollment.contact_id.to_string(),
            });
        }

        index.insert(key, enrollment.id.clone());
        enrollments.insert(enrollment.id.clone(), enrollment.clone());
        Ok(())
    }

    async fn save_enrollment(&self, enrollment: &Enrollment) -> DialerResult<()> {
        let mut enrollments = self.enrollments.write().await;
        if !enrollments.contains_key(&enrollment.id) {
            return Err(DialerError::NotFound(format!(
                "enrollment {}",
                enrollment.id
            )));
        }
        enrollments.insert(enrollment.id.clone(), enrollment.clone());
        Ok(())
    }

    async fn get_enrollment(&self, id: &EnrollmentId) -> DialerResult<Option<Enrollment>> {
        let enrollments = self.enrollments.read().await;
        Ok(enrollments.get(id).cloned())
    }

    async fn find_enrollment(
        &self,
        campaign_id: &CampaignId,
        contact_id: &ContactId,
    ) -> DialerResult<Option<Enrollment>> {
        let index = self.enrollment_index.read().await;
        let Some(id) = index.get(&(campaign_id.clone(), contact_id.clone())) else {
            return Ok(None);
        };
        let enrollments = self.enrollments.read().await;
        Ok(enrollments.get(id).cloned())
    }

    async fn list_due_enrollments(
        &self,
        status: EnrollmentStatus,
        due_at: DateTime<Utc>,
        limit: usize,
    ) -> DialerResult<Vec<Enrollment>> {
        let enrollments = self.enrollments.read().await;
        let mut due: Vec<Enrollment> = enrollments
            .values()
            .filter(|e| e.status == status)
            .filter(|e| e.next_call_at.is_some_and(|at| at <= due_at))
            .cloned()
            .collect();

        due.sort_by_key(|e| e.next_call_at);
        due.truncate(limit);
        Ok(due)
    }

    async fn begin_dispatch(
        &self,
        id: &EnrollmentId,
        now: DateTime<Utc>,
    ) -> DialerResult<Option<Enrollment>> {
        let mut enrollments = self.enrollments.write().await;
        let Some(enrollment) = enrollments.get_mut(id) else {
            return Ok(None);
        };
        if enrollment.status != EnrollmentStatus::Queued {
            return Ok(None);
        }
        enrollment.claim_dispatch(now)?;
        Ok(Some(enrollment.clone()))
    }

    // ==================== Credits operations ====================

    async fn get_credits(&self, owner: &OwnerId) -> DialerResult<CreditsState> {
        let credits = self.credits.read().await;
        Ok(credits.get(owner).cloned().unwrap_or_default())
    }

    async fn save_credits(&self, owner: &OwnerId, state: &CreditsState) -> DialerResult<()> {
        let mut credits = self.credits.write().await;
        credits.insert(owner.clone(), state.clone());
        Ok(())
    }

    // ==================== Provider settings ====================

    async fn get_provider_settings(
        &self,
        owner: &OwnerId,
    ) -> DialerResult<Option<ProviderSettings>> {
        let settings = self.provider_settings.read().await;
        Ok(settings.get(owner).cloned())
    }

    async fn save_provider_settings(
        &self,
        owner: &OwnerId,
        settings: &ProviderSettings,
    ) -> DialerResult<()> {
        let mut map = self.provider_settings.write().await;
        map.insert(owner.clone(), settings.clone());
        Ok(())
    }
}
