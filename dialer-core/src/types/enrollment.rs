//! Enrollment - one contact's participation in one campaign's call flow.
//!
//! Enrollments are the unit of work the scheduler drives. Exactly one
//! enrollment exists per `(campaign_id, contact_id)` pair; the storage layer
//! enforces the uniqueness because creation can race.
//!
//! # State machine
//!
//! ```text
//! queued ──┬──(dispatch claimed)──────────> calling ──┬──(settled)──> completed
//!          │                                          ├──(call lost)─> failed
//!          ├──(campaign inactive)─> skipped           └──(claim released,
//!          ├──(no usable phone)──> failed                 backoff)───> queued
//!          └──(attempts exhausted)─> failed
//! ```
//!
//! Terminal states (`completed`, `failed`, `skipped`) are permanent. The
//! scheduler never deletes an enrollment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{CampaignId, ContactId, EnrollmentId, OwnerId};

/// Maximum length of a recorded `last_error`, in characters.
pub const MAX_ERROR_LEN: usize = 500;

/// Enrollment lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    /// Waiting for dispatch (or re-dispatch after backoff).
    #[default]
    Queued,

    /// A call has been claimed/placed; awaiting settlement.
    Calling,

    /// Call completed and duration billing applied.
    Completed,

    /// Permanently failed (bad input, exhausted attempts, or lost call).
    Failed,

    /// Campaign was no longer active when the enrollment came due.
    Skipped,
}

impl EnrollmentStatus {
    /// Whether this status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }

    /// Whether a transition to `target` is allowed.
    pub fn can_transition_to(&self, target: EnrollmentStatus) -> bool {
        match (self, target) {
            // Dispatch claim
            (Self::Queued, Self::Calling) => true,
            // Campaign deactivated before dispatch
            (Self::Queued, Self::Skipped) => true,
            // Unusable input or exhausted attempts
            (Self::Queued, Self::Failed) => true,

            // Settlement outcomes
            (Self::Calling, Self::Completed) => true,
            (Self::Calling, Self::Failed) => true,
            // Dispatch claim released (credits short or placement failed
            // with attempts remaining)
            (Self::Calling, Self::Queued) => true,

            // Terminal states never move again
            _ => false,
        }
    }
}

impl fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Calling => write!(f, "calling"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// Invalid enrollment state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentTransitionError {
    pub from: EnrollmentStatus,
    pub to: EnrollmentStatus,
}

impl fmt::Display for EnrollmentTransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid enrollment transition from {} to {}", self.from, self.to)
    }
}

impl std::error::Error for EnrollmentTransitionError {}

/// One contact enrolled in one campaign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enrollment {
    /// Enrollment unique identifier.
    pub id: EnrollmentId,

    /// Owning tenant (denormalized from the campaign).
    pub owner_id: OwnerId,

    /// Campaign this enrollment belongs to.
    pub campaign_id: CampaignId,

    /// Contact being called.
    pub contact_id: ContactId,

    /// Lifecycle status.
    pub status: EnrollmentStatus,

    /// Number of dispatch attempts made so far.
    pub attempt_count: u32,

    /// When this enrollment next becomes eligible for processing.
    /// `None` in terminal states.
    pub next_call_at: Option<DateTime<Utc>>,

    /// Provider call handle, set once a call has been placed.
    pub call_sid: Option<String>,

    /// Opaque voice-agent conversation identifier, when that path placed
    /// the call.
    pub conversation_id: Option<String>,

    /// Consecutive status-fetch failures while `Calling`.
    pub poll_failures: u32,

    /// When the current dispatch claim was taken.
    pub dispatched_at: Option<DateTime<Utc>>,

    /// Last recorded error, truncated to [`MAX_ERROR_LEN`] characters.
    pub last_error: Option<String>,

    /// When the call completed and billing settled.
    pub completed_at: Option<DateTime<Utc>>,

    /// Creation time.
    pub created_at: DateTime<Utc>,

    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

impl Enrollment {
    /// Create a new queued enrollment due at `first_call_at`.
    pub fn new(
        owner_id: OwnerId,
        campaign_id: CampaignId,
        contact_id: ContactId,
        first_call_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: EnrollmentId::generate(),
            owner_id,
            campaign_id,
            contact_id,
            status: EnrollmentStatus::Queued,
            attempt_count: 0,
            next_call_at: Some(first_call_at),
            call_sid: None,
            conversation_id: None,
            poll_failures: 0,
            dispatched_at: None,
            last_error: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Transition to a new status, enforcing the transition table.
    pub fn transition_to(
        &mut self,
        new_status: EnrollmentStatus,
    ) -> Result<(), EnrollmentTransitionError> {
        if !self.status.can_transition_to(new_status) {
            return Err(EnrollmentTransitionError {
                from: self.status,
                to: new_status,
            });
        }
        self.status = new_status;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Claim this enrollment for dispatch.
    pub fn claim_dispatch(&mut self, now: DateTime<Utc>) -> Result<(), EnrollmentTransitionError> {
        self.transition_to(EnrollmentStatus::Calling)?;
        self.dispatched_at = Some(now);
        self.poll_failures = 0;
        Ok(())
    }

    /// Release a dispatch claim back to the queue, due again at `next`.
    pub fn release_dispatch(
        &mut self,
        next: DateTime<Utc>,
    ) -> Result<(), EnrollmentTransitionError> {
        self.transition_to(EnrollmentStatus::Queued)?;
        self.dispatched_at = None;
        self.next_call_at = Some(next);
        Ok(())
    }

    /// Record that a call was placed under the current claim.
    pub fn record_placed(
        &mut self,
        call_sid: String,
        conversation_id: Option<String>,
        next_poll: DateTime<Utc>,
    ) {
        self.call_sid = Some(call_sid);
        self.conversation_id = conversation_id;
        self.next_call_at = Some(next_poll);
        self.poll_failures = 0;
        self.updated_at = Utc::now();
    }

    /// Count one dispatch attempt against the budget.
    pub fn record_attempt(&mut self) {
        self.attempt_count += 1;
        self.updated_at = Utc::now();
    }

    /// Push `next_call_at` forward without changing status.
    pub fn defer(&mut self, next: DateTime<Utc>) {
        self.next_call_at = Some(next);
        self.updated_at = Utc::now();
    }

    /// Mark the call completed and settled.
    pub fn mark_completed(&mut self, now: DateTime<Utc>) -> Result<(), EnrollmentTransitionError> {
        self.transition_to(EnrollmentStatus::Completed)?;
        self.completed_at = Some(now);
        self.next_call_at = None;
        Ok(())
    }

    /// Mark the enrollment permanently failed.
    pub fn mark_failed(&mut self) -> Result<(), EnrollmentTransitionError> {
        self.transition_to(EnrollmentStatus::Failed)?;
        self.next_call_at = None;
        Ok(())
    }

    /// Mark the enrollment skipped (campaign no longer active).
    pub fn mark_skipped(&mut self) -> Result<(), EnrollmentTransitionError> {
        self.transition_to(EnrollmentStatus::Skipped)?;
        self.next_call_at = None;
        Ok(())
    }

    /// Record an error message, truncated to [`MAX_ERROR_LEN`] characters.
    pub fn set_last_error(&mut self, message: impl Into<String>) {
        let message: String = message.into();
        let truncated: String = message.chars().take(MAX_ERROR_LEN).collect();
        self.last_error = Some(truncated);
        self.updated_at = Utc::now();
    }

    /// Whether this enrollment can never be processed again.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_enrollment() -> Enrollment {
        Enrollment::new(
            OwnerId::new("owner-1"),
            CampaignId::new("camp-1"),
            ContactId::new("contact-1"),
            Utc::now(),
        )
    }

    #[test]
    fn test_new_enrollment_is_queued() {
        let enrollment = create_test_enrollment();
        assert_eq!(enrollment.status, EnrollmentStatus::Queued);
        assert_eq!(enrollment.attempt_count, 0);
        assert!(enrollment.next_call_at.is_some());
        assert!(enrollment.call_sid.is_none());
    }

    #[test]
    fn test_claim_place_and_complete() {
        let mut enrollment = create_test_enrollment();
        let now = Utc::now();

        enrollment.claim_dispatch(now).unwrap();
        assert_eq!(enrollment.status, EnrollmentStatus::Calling);
        assert_eq!(enrollment.dispatched_at, Some(now));

        enrollment.record_placed("CA123".to_string(), None, now);
        assert_eq!(enrollment.call_sid.as_deref(), Some("CA123"));

        enrollment.mark_completed(now).unwrap();
        assert_eq!(enrollment.status, EnrollmentStatus::Completed);
        assert_eq!(enrollment.completed_at, Some(now));
        assert!(enrollment.next_call_at.is_none());
    }

    #[test]
    fn test_release_dispatch_returns_to_queue() {
        let mut enrollment = create_test_enrollment();
        let now = Utc::now();

        enrollment.claim_dispatch(now).unwrap();
        let retry_at = now + chrono::Duration::seconds(300);
        enrollment.release_dispatch(retry_at).unwrap();

        assert_eq!(enrollment.status, EnrollmentStatus::Queued);
        assert_eq!(enrollment.next_call_at, Some(retry_at));
        assert!(enrollment.dispatched_at.is_none());
    }

    #[test]
    fn test_terminal_states_are_permanent() {
        let mut enrollment = create_test_enrollment();
        enrollment.mark_failed().unwrap();

        assert!(enrollment.is_terminal());
        assert!(enrollment.transition_to(EnrollmentStatus::Queued).is_err());
        assert!(enrollment.transition_to(EnrollmentStatus::Calling).is_err());
    }

    #[test]
    fn test_invalid_transition_rejected() {
        let mut enrollment = create_test_enrollment();
        // Queued cannot complete without a call
        let err = enrollment
            .transition_to(EnrollmentStatus::Completed)
            .unwrap_err();
        assert_eq!(err.from, EnrollmentStatus::Queued);
        assert_eq!(err.to, EnrollmentStatus::Completed);
    }

    #[test]
    fn test_last_error_truncated() {
        let mut enrollment = create_test_enrollment();
        enrollment.set_last_error("x".repeat(1000));
        assert_eq!(enrollment.last_error.as_ref().unwrap().len(), MAX_ERROR_LEN);
    }

    #[test]
    fn test_skip_clears_due_time() {
        let mut enrollment = create_test_enrollment();
        enrollment.mark_skipped().unwrap();
        assert_eq!(enrollment.status, EnrollmentStatus::Skipped);
        assert!(enrollment.next_call_at.is_none());
    }
}
