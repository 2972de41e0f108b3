//! Storage layer for campaigns, contacts, enrollments and credits.
//!
//! The storage engine itself is an external concern; this trait captures the
//! guarantees the scheduler and ledger rely on:
//!
//! - enrollment creation enforces uniqueness per `(campaign_id, contact_id)`,
//!   because enrollment can race
//! - [`begin_dispatch`](DialerStorage::begin_dispatch) re-reads status under
//!   the row write so the same enrollment is never dispatched twice
//! - due-enrollment listings return oldest-`next_call_at`-first
//!
//! Credit balances are mutated exclusively through the
//! [`CreditLedger`](crate::ledger::CreditLedger), which serializes same-owner
//! read-modify-write on top of the plain get/save contract here.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DialerResult;
use crate::types::{
    Campaign, CampaignId, Contact, ContactId, CreditsState, Enrollment, EnrollmentId,
    EnrollmentStatus, OwnerId, ProviderSettings,
};

pub use memory::MemoryStorage;

/// Storage interface for the dialer engine.
#[async_trait]
pub trait DialerStorage: Send + Sync {
    // ==================== Campaign operations ====================

    /// Save (insert or replace) a campaign.
    async fn save_campaign(&self, campaign: &Campaign) -> DialerResult<()>;

    /// Get a campaign by id.
    async fn get_campaign(&self, id: &CampaignId) -> DialerResult<Option<Campaign>>;

    // ==================== Contact operations ====================

    /// Save (insert or replace) a contact.
    async fn save_contact(&self, contact: &Contact) -> DialerResult<()>;

    /// Get a contact by id.
    async fn get_contact(&self, id: &ContactId) -> DialerResult<Option<Contact>>;

    // ==================== Enrollment operations ====================

    /// Insert a new enrollment, enforcing `(campaign_id, contact_id)`
    /// uniqueness. Fails with `EnrollmentExists` on conflict.
    async fn create_enrollment(&self, enrollment: &Enrollment) -> DialerResult<()>;

    /// Replace an existing enrollment.
    async fn save_enrollment(&self, enrollment: &Enrollment) -> DialerResult<()>;

    /// Get an enrollment by id.
    async fn get_enrollment(&self, id: &EnrollmentId) -> DialerResult<Option<Enrollment>>;

    /// Get the enrollment for a campaign/contact pair, if any.
    async fn find_enrollment(
        &self,
        campaign_id: &CampaignId,
        contact_id: &ContactId,
    ) -> DialerResult<Option<Enrollment>>;

    /// List enrollments in `status` whose `next_call_at` is due at or before
    /// `due_at`, oldest first, bounded by `limit`.
    async fn list_due_enrollments(
        &self,
        status: EnrollmentStatus,
        due_at: DateTime<Utc>,
        limit: usize,
    ) -> DialerResult<Vec<Enrollment>>;

    /// Atomically claim a queued enrollment for dispatch: re-read under the
    /// row write, require `Queued`, stamp `Calling`, persist, and return the
    /// claimed snapshot. Returns `None` when the enrollment is gone or no
    /// longer `Queued` (claimed by an overlapping tick).
    async fn begin_dispatch(
        &self,
        id: &EnrollmentId,
        now: DateTime<Utc>,
    ) -> DialerResult<Option<Enrollment>>;

    // ==================== Credits operations ====================

    /// Get an owner's credit state (empty state when absent).
    async fn get_credits(&self, owner: &OwnerId) -> DialerResult<CreditsState>;

    /// Persist an owner's credit state.
    async fn save_credits(&self, owner: &OwnerId, state: &CreditsState) -> DialerResult<()>;

    // ==================== Provider settings ====================

    /// Get an owner's provider settings, if any.
    async fn get_provider_settings(
        &self,
        owner: &OwnerId,
    ) -> DialerResult<Option<ProviderSettings>>;

    /// Persist an owner's provider settings.
    async fn save_provider_settings(
        &self,
        owner: &OwnerId,
        settings: &ProviderSettings,
    ) -> DialerResult<()>;
}
