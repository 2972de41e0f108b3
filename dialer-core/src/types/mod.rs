//! Domain types shared across the crate.

pub mod campaign;
pub mod contact;
pub mod credits;
pub mod enrollment;
pub mod ids;
pub mod provider;

pub use campaign::{Campaign, CampaignStatus};
pub use contact::{normalize_phone, Contact};
pub use credits::{CreditsState, SpendLedgerEntry, MAX_IDEMPOTENCY_KEY_LEN, SPEND_LEDGER_CAPACITY};
pub use enrollment::{
    Enrollment, EnrollmentStatus, EnrollmentTransitionError, MAX_ERROR_LEN,
};
pub use ids::{CampaignId, ContactId, EnrollmentId, OwnerId};
pub use provider::ProviderSettings;
