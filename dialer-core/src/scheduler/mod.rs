//! Campaign scheduler - the cron-driven orchestrator.
//!
//! A single stateless entry point ([`CampaignScheduler::run_tick`]) is
//! invoked repeatedly by an external time trigger with at-least-once
//! semantics. Each invocation:
//!
//! 1. Reconciles in-flight calls: polls the provider for `calling`
//!    enrollments that are due, bills settled calls by duration, and applies
//!    terminal transitions.
//! 2. Dispatches due work: claims `queued` enrollments, charges the fixed
//!    per-attempt cost through the idempotent ledger, places calls, and
//!    persists the new state.
//!
//! Every billing side effect is keyed so that replays across overlapping
//! ticks never double-charge: dispatch uses `{enrollment}:attempt-{n}` (a
//! fresh attempt after backoff gets a fresh key, so genuine retries are
//! billed per attempt) and settlement uses `{enrollment}:{call_sid}:settle`.
//!
//! Errors from a single enrollment are caught and recorded per enrollment;
//! they never abort the batch.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{CreditsConfig, SchedulerConfig};
use crate::dispatch::{
    CallContext, CallDispatcher, OutboundCallRequest, PlacedCall, ProviderCallStatus,
    ProviderRoute,
};
use crate::error::{DialerError, DialerResult};
use crate::ledger::CreditLedger;
use crate::render::ScriptRenderer;
use crate::storage::DialerStorage;
use crate::types::{
    Campaign, CampaignId, ContactId, Enrollment, EnrollmentId, EnrollmentStatus, OwnerId,
    ProviderSettings,
};

/// One enrollment's recorded failure within a tick.
#[derive(Debug, Clone, Serialize)]
pub struct TickError {
    pub enrollment_id: EnrollmentId,
    pub error: String,
}

/// Result of one scheduler invocation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TickSummary {
    /// In-flight enrollments reconciled this tick.
    pub reconciled: usize,
    /// Queued enrollments dispatched (or resolved) this tick.
    pub dispatched: usize,
    /// Bounded list of per-enrollment failures.
    pub errors: Vec<TickError>,
}

impl TickSummary {
    /// Total enrollments processed.
    pub fn processed(&self) -> usize {
        self.reconciled + self.dispatched
    }

    fn record_error(&mut self, enrollment_id: EnrollmentId, error: String, bound: usize) {
        if self.errors.len() < bound {
            self.errors.push(TickError {
                enrollment_id,
                error: error.chars().take(crate::types::MAX_ERROR_LEN).collect(),
            });
        }
    }
}

/// Per-tick scratch state. Never shared across invocations, so a long-lived
/// process cannot serve stale provider credentials.
#[derive(Default)]
struct TickContext {
    settings: HashMap<OwnerId, ProviderSettings>,
}

impl TickContext {
    async fn settings_for<S: DialerStorage>(
        &mut self,
        storage: &S,
        owner: &OwnerId,
    ) -> DialerResult<ProviderSettings> {
        if let Some(settings) = self.settings.get(owner) {
            return Ok(settings.clone());
        }
        let settings = storage
            .get_provider_settings(owner)
            .await?
            .unwrap_or_default();
        self.settings.insert(owner.clone(), settings.clone());
        Ok(settings)
    }
}

/// Select the provider path for a call attempt.
fn resolve_route(campaign: &Campaign, settings: &ProviderSettings) -> ProviderRoute {
    match (&campaign.voice_agent_id, &settings.voice_agent_api_key) {
        (Some(agent_id), Some(api_key)) => ProviderRoute::VoiceAgent {
            agent_id: agent_id.clone(),
            api_key: api_key.clone(),
        },
        _ => ProviderRoute::Telephony,
    }
}

/// The campaign scheduler.
pub struct CampaignScheduler<S, D, R>
where
    S: DialerStorage,
    D: CallDispatcher,
    R: ScriptRenderer,
{
    storage: Arc<S>,
    dispatcher: Arc<D>,
    renderer: Arc<R>,
    ledger: CreditLedger<S>,
    config: SchedulerConfig,
    credits: CreditsConfig,
}

impl<S, D, R> CampaignScheduler<S, D, R>
where
    S: DialerStorage,
    D: CallDispatcher,
    R: ScriptRenderer,
{
    /// Create a new scheduler.
    pub fn new(
        storage: Arc<S>,
        dispatcher: Arc<D>,
        renderer: Arc<R>,
        ledger: CreditLedger<S>,
        config: SchedulerConfig,
        credits: CreditsConfig,
    ) -> Self {
        Self {
            storage,
            dispatcher,
            renderer,
            ledger,
            config,
            credits,
        }
    }

    /// The ledger this scheduler bills through.
    pub fn ledger(&self) -> &CreditLedger<S> {
        &self.ledger
    }

    /// Run one scheduler tick.
    pub async fn run_tick(&self) -> DialerResult<TickSummary> {
        self.run_tick_at(Utc::now()).await
    }

    /// Run one scheduler tick at an explicit instant (deterministic tests).
    pub async fn run_tick_at(&self, now: DateTime<Utc>) -> DialerResult<TickSummary> {
        let mut summary = TickSummary::default();
        self.reconcile_in_flight(now, &mut summary).await?;
        self.dispatch_due(now, &mut summary).await?;
        info!(
            reconciled = summary.reconciled,
            dispatched = summary.dispatched,
            errors = summary.errors.len(),
            "scheduler tick complete"
        );
        Ok(summary)
    }

    /// Enroll a contact into a campaign, queued for `first_call_at`
    /// (defaults to now). Uniqueness per `(campaign, contact)` is enforced
    /// by the storage layer.
    pub async fn enroll(
        &self,
        campaign_id: &CampaignId,
        contact_id: &ContactId,
        first_call_at: Option<DateTime<Utc>>,
    ) -> DialerResult<Enrollment> {
        let campaign = self
            .storage
            .get_campaign(campaign_id)
            .await?
            .ok_or_else(|| DialerError::NotFound(format!("campaign {campaign_id}")))?;
        self.storage
            .get_contact(contact_id)
            .await?
            .ok_or_else(|| DialerError::NotFound(format!("contact {contact_id}")))?;

        let enrollment = Enrollment::new(
            campaign.owner_id.clone(),
            campaign_id.clone(),
            contact_id.clone(),
            first_call_at.unwrap_or_else(Utc::now),
        );
        self.storage.create_enrollment(&enrollment).await?;
        debug!(enrollment = %enrollment.id, campaign = %campaign_id, "contact enrolled");
        Ok(enrollment)
    }

    /// Place a single call outside the enrollment flow, charged through the
    /// idempotent ledger under a per-call key. Not part of the retry state
    /// machine.
    pub async fn place_manual_call(
        &self,
        owner: &OwnerId,
        contact_id: &ContactId,
        script: &str,
        idempotency_key: &str,
    ) -> DialerResult<PlacedCall> {
        let contact = self
            .storage
            .get_contact(contact_id)
            .await?
            .ok_or_else(|| DialerError::NotFound(format!("contact {contact_id}")))?;
        let to = contact.usable_phone().ok_or_else(|| {
            DialerError::InvalidInput("contact has no usable phone number".to_string())
        })?;

        let settings = self
            .storage
            .get_provider_settings(owner)
            .await?
            .unwrap_or_default();

        let cost = self.credits.call_dispatch_cost;
        let outcome = self
            .ledger
            .consume_credits_once(owner, cost, idempotency_key)
            .await?;
        if !outcome.ok {
            return Err(DialerError::InsufficientCredits {
                required: cost,
                available: outcome.state.balance,
            });
        }

        let request = OutboundCallRequest {
            owner_id: owner.clone(),
            to: to.clone(),
            from_override: settings.outbound_number.clone(),
            script: script.to_string(),
            route: ProviderRoute::Telephony,
            context: CallContext {
                contact_name: Some(contact.name.clone()),
                contact_email: contact.email.clone(),
                contact_phone: Some(to),
                campaign_id: None,
            },
        };

        match self.dispatcher.place_call(&request).await {
            Ok(placed) => Ok(placed),
            Err(e) => {
                // The call never went out; put the charge back.
                if outcome.charged > 0 && !outcome.already_consumed {
                    if let Err(refund_err) = self.ledger.add_credits(owner, outcome.charged).await {
                        warn!(owner = %owner, error = %refund_err, "failed to refund manual call charge");
                    }
                }
                Err(e)
            }
        }
    }

    // ==================== Reconcile phase ====================

    async fn reconcile_in_flight(
        &self,
        now: DateTime<Utc>,
        summary: &mut TickSummary,
    ) -> DialerResult<()> {
        let due = self
            .storage
            .list_due_enrollments(EnrollmentStatus::Calling, now, self.config.batch_size)
            .await?;

        for enrollment in due {
            let id = enrollment.id.clone();
            match self.reconcile_one(enrollment, now).await {
                Ok(()) => summary.reconciled += 1,
                Err(e) => {
                    warn!(enrollment = %id, error = %e, "failed to reconcile enrollment");
                    summary.record_error(id, e.to_string(), self.config.batch_size);
                }
            }
        }
        Ok(())
    }

    async fn reconcile_one(
        &self,
        mut enrollment: Enrollment,
        now: DateTime<Utc>,
    ) -> DialerResult<()> {
        let Some(call_sid) = enrollment.call_sid.clone() else {
            // Dispatch was interrupted before a call handle was recorded;
            // follows the fetch-failure path and is eventually capped.
            return self
                .record_poll_failure(enrollment, "no call handle recorded after dispatch", now)
                .await;
        };

        let info = match self.dispatcher.fetch_status(&call_sid).await {
            Ok(info) => info,
            Err(e) => {
                return self
                    .record_poll_failure(enrollment, &e.to_string(), now)
                    .await
            }
        };

        if info.status == ProviderCallStatus::Completed {
            return self
                .settle_completed(enrollment, &call_sid, info.duration_secs.unwrap_or(0), now)
                .await;
        }

        if info.status.is_live() {
            enrollment.poll_failures = 0;
            let poll_window_exceeded = enrollment
                .dispatched_at
                .is_some_and(|at| now - at > Duration::seconds(self.config.max_calling_secs as i64));
            if poll_window_exceeded {
                warn!(enrollment = %enrollment.id, %call_sid, "call exceeded poll window");
                enrollment.set_last_error(format!(
                    "call did not resolve within {}s",
                    self.config.max_calling_secs
                ));
                enrollment.mark_failed()?;
            } else {
                enrollment.defer(now + Duration::seconds(self.config.poll_interval_secs as i64));
            }
            return self.storage.save_enrollment(&enrollment).await;
        }

        // Busy, failed, no-answer, canceled
        debug!(enrollment = %enrollment.id, status = %info.status, "call ended without completing");
        enrollment.set_last_error(format!("call ended with status {}", info.status));
        enrollment.mark_failed()?;
        self.storage.save_enrollment(&enrollment).await
    }

    async fn record_poll_failure(
        &self,
        mut enrollment: Enrollment,
        message: &str,
        now: DateTime<Utc>,
    ) -> DialerResult<()> {
        enrollment.poll_failures += 1;
        enrollment.set_last_error(format!("status fetch failed: {message}"));

        if enrollment.poll_failures >= self.config.max_poll_failures {
            warn!(
                enrollment = %enrollment.id,
                failures = enrollment.poll_failures,
                "status fetch failure cap reached"
            );
            enrollment.mark_failed()?;
        } else {
            enrollment.defer(now + Duration::seconds(self.config.poll_interval_secs as i64));
        }
        self.storage.save_enrollment(&enrollment).await
    }

    /// Bill the completed call and mark the enrollment settled. Billing
    /// success is a precondition for `completed`: on a failed debit the
    /// enrollment stays `calling` with a longer retry delay so billing can
    /// be retried without re-placing the call.
    async fn settle_completed(
        &self,
        mut enrollment: Enrollment,
        call_sid: &str,
        duration_secs: u64,
        now: DateTime<Utc>,
    ) -> DialerResult<()> {
        let minutes = duration_secs.div_ceil(60);
        let cost = minutes * self.credits.per_minute_rate;

        if cost > 0 {
            let key = format!("{}:{}:settle", enrollment.id, call_sid);
            let outcome = self
                .ledger
                .consume_credits_once(&enrollment.owner_id, cost, &key)
                .await?;
            if !outcome.ok {
                warn!(
                    enrollment = %enrollment.id,
                    cost,
                    available = outcome.state.balance,
                    "settlement billing failed"
                );
                enrollment.set_last_error(format!(
                    "settlement billing failed: {cost} credits required, {} available",
                    outcome.state.balance
                ));
                enrollment
                    .defer(now + Duration::seconds(self.config.billing_retry_secs as i64));
                return self.storage.save_enrollment(&enrollment).await;
            }
        }

        info!(
            enrollment = %enrollment.id,
            call_sid,
            duration_secs,
            billed = cost,
            "call completed and settled"
        );
        enrollment.poll_failures = 0;
        enrollment.mark_completed(now)?;
        self.storage.save_enrollment(&enrollment).await
    }

    // ==================== Dispatch phase ====================

    async fn dispatch_due(&self, now: DateTime<Utc>, summary: &mut TickSummary) -> DialerResult<()> {
        let due = self
            .storage
            .list_due_enrollments(EnrollmentStatus::Queued, now, self.config.batch_size)
            .await?;

        let mut ctx = TickContext::default();
        for enrollment in due {
            let id = enrollment.id.clone();
            match self.dispatch_one(enrollment, &mut ctx, now).await {
                Ok(()) => summary.dispatched += 1,
                Err(e) => {
                    warn!(enrollment = %id, error = %e, "failed to dispatch enrollment");
                    summary.record_error(id, e.to_string(), self.config.batch_size);
                }
            }
        }
        Ok(())
    }

    async fn dispatch_one(
        &self,
        enrollment: Enrollment,
        ctx: &mut TickContext,
        now: DateTime<Utc>,
    ) -> DialerResult<()> {
        // Exhausted rows are failed at failure time; this is the backstop
        // for anything that slipped through an overlapping tick.
        if enrollment.attempt_count >= self.config.max_dispatch_attempts {
            let Some(mut claimed) = self.storage.begin_dispatch(&enrollment.id, now).await? else {
                return Ok(());
            };
            claimed.set_last_error("dispatch attempt budget exhausted");
            claimed.mark_failed()?;
            return self.storage.save_enrollment(&claimed).await;
        }

        // Claim under the row write; `None` means an overlapping tick won.
        let Some(mut enrollment) = self.storage.begin_dispatch(&enrollment.id, now).await? else {
            return Ok(());
        };

        let campaign = match self.storage.get_campaign(&enrollment.campaign_id).await? {
            Some(c) if c.is_active() => c,
            _ => {
                debug!(enrollment = %enrollment.id, "campaign inactive, skipping");
                enrollment.mark_skipped()?;
                return self.storage.save_enrollment(&enrollment).await;
            }
        };

        let Some(contact) = self.storage.get_contact(&enrollment.contact_id).await? else {
            return self.fail_dispatch(enrollment, "contact not found").await;
        };
        let Some(to) = contact.usable_phone() else {
            return self
                .fail_dispatch(enrollment, "contact has no usable phone number")
                .await;
        };

        let script = self.renderer.render(&campaign, &contact);
        let settings = ctx
            .settings_for(self.storage.as_ref(), &enrollment.owner_id)
            .await?;
        let route = resolve_route(&campaign, &settings);

        let key = format!("{}:attempt-{}", enrollment.id, enrollment.attempt_count);
        let outcome = self
            .ledger
            .consume_credits_once(&enrollment.owner_id, self.credits.call_dispatch_cost, &key)
            .await?;
        if !outcome.ok {
            // Resource exhaustion, not execution failure: no attempt consumed.
            debug!(enrollment = %enrollment.id, "insufficient credits for dispatch");
            enrollment.set_last_error("insufficient credits for dispatch");
            enrollment.release_dispatch(
                now + Duration::seconds(self.config.insufficient_credits_delay_secs as i64),
            )?;
            return self.storage.save_enrollment(&enrollment).await;
        }

        let request = OutboundCallRequest {
            owner_id: enrollment.owner_id.clone(),
            to: to.clone(),
            from_override: settings.outbound_number.clone(),
            script,
            route,
            context: CallContext {
                contact_name: Some(contact.name.clone()),
                contact_email: contact.email.clone(),
                contact_phone: Some(to),
                campaign_id: Some(campaign.id.clone()),
            },
        };

        match self.dispatcher.place_call(&request).await {
            Ok(placed) => {
                enrollment.record_attempt();
                enrollment.record_placed(
                    placed.call_sid.clone(),
                    placed.conversation_id,
                    now + Duration::seconds(self.config.poll_interval_secs as i64),
                );
                self.storage.save_enrollment(&enrollment).await?;
                info!(
                    enrollment = %enrollment.id,
                    call_sid = %placed.call_sid,
                    attempt = enrollment.attempt_count,
                    "call placed"
                );

                if let Some(callback) = &self.config.recording_callback_url {
                    if let Err(e) = self
                        .dispatcher
                        .start_recording(&placed.call_sid, callback)
                        .await
                    {
                        warn!(call_sid = %placed.call_sid, error = %e, "failed to start call recording");
                    }
                }
                Ok(())
            }
            Err(e) => {
                enrollment.record_attempt();
                enrollment.set_last_error(e.to_string());
                if enrollment.attempt_count >= self.config.max_dispatch_attempts {
                    warn!(
                        enrollment = %enrollment.id,
                        attempts = enrollment.attempt_count,
                        error = %e,
                        "dispatch attempts exhausted"
                    );
                    enrollment.mark_failed()?;
                } else {
                    enrollment.release_dispatch(
                        now + Duration::seconds(self.config.dispatch_backoff_secs as i64),
                    )?;
                }
                self.storage.save_enrollment(&enrollment).await
            }
        }
    }

    async fn fail_dispatch(&self, mut enrollment: Enrollment, reason: &str) -> DialerResult<()> {
        debug!(enrollment = %enrollment.id, reason, "dispatch failed terminally");
        enrollment.set_last_error(reason);
        enrollment.mark_failed()?;
        self.storage.save_enrollment(&enrollment).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::CallStatusInfo;
    use crate::render::TemplateRenderer;
    use crate::storage::MemoryStorage;
    use crate::types::{CampaignStatus, Contact};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct MockDispatcher {
        place_results: Mutex<VecDeque<DialerResult<PlacedCall>>>,
        status_results: Mutex<VecDeque<DialerResult<CallStatusInfo>>>,
        placed: Mutex<Vec<OutboundCallRequest>>,
        recordings: Mutex<Vec<String>>,
    }

    impl MockDispatcher {
        async fn place_ok(&self, call_sid: &str) {
            self.place_results.lock().await.push_back(Ok(PlacedCall {
                call_sid: call_sid.to_string(),
                conversation_id: None,
            }));
        }

        async fn place_err(&self, message: &str) {
            self.place_results
                .lock()
                .await
                .push_back(Err(DialerError::Telephony(message.to_string())));
        }

        async fn status_ok(&self, status: ProviderCallStatus, duration_secs: Option<u64>) {
            self.status_results.lock().await.push_back(Ok(CallStatusInfo {
                status,
                duration_secs,
            }));
        }

        async fn status_err(&self, message: &str) {
            self.status_results
                .lock()
                .await
                .push_back(Err(DialerError::Telephony(message.to_string())));
        }
    }

    #[async_trait]
    impl CallDispatcher for MockDispatcher {
        async fn place_call(&self, request: &OutboundCallRequest) -> DialerResult<PlacedCall> {
            self.placed.lock().await.push(request.clone());
            self.place_results
                .lock()
                .await
                .pop_front()
                .unwrap_or_else(|| Err(DialerError::Telephony("no scripted place result".into())))
        }

        async fn fetch_status(&self, _call_sid: &str) -> DialerResult<CallStatusInfo> {
            self.status_results
                .lock()
                .await
                .pop_front()
                .unwrap_or_else(|| Err(DialerError::Telephony("no scripted status result".into())))
        }

        async fn start_recording(&self, call_sid: &str, _callback_url: &str) -> DialerResult<()> {
            self.recordings.lock().await.push(call_sid.to_string());
            Ok(())
        }
    }

    struct TestEnv {
        scheduler: CampaignScheduler<MemoryStorage, MockDispatcher, TemplateRenderer>,
        storage: Arc<MemoryStorage>,
        dispatcher: Arc<MockDispatcher>,
        owner: OwnerId,
    }

    fn test_env() -> TestEnv {
        let storage = Arc::new(MemoryStorage::new());
        let dispatcher = Arc::new(MockDispatcher::default());
        let ledger = CreditLedger::new(storage.clone(), CreditsConfig::default());
        let config = SchedulerConfig {
            batch_size: 60,
            max_dispatch_attempts: 3,
            dispatch_backoff_secs: 900,
            poll_interval_secs: 60,
            billing_retry_secs: 600,
            insufficient_credits_delay_secs: 3600,
            max_poll_failures: 3,
            max_calling_secs: 1800,
            recording_callback_url: None,
        };
        let scheduler = CampaignScheduler::new(
            storage.clone(),
            dispatcher.clone(),
            Arc::new(TemplateRenderer::default()),
            ledger,
            config,
            CreditsConfig::default(),
        );
        TestEnv {
            scheduler,
            storage,
            dispatcher,
            owner: OwnerId::new("owner-1"),
        }
    }

    /// Create an active campaign + contact with a phone, enroll the contact
    /// due now, and fund the owner.
    async fn seed_queued(env: &TestEnv, balance: u64) -> Enrollment {
        let mut campaign = Campaign::new(env.owner.clone(), "Promo", "Hi {{first_name}}");
        campaign.status = CampaignStatus::Active;
        env.storage.save_campaign(&campaign).await.unwrap();

        let mut contact = Contact::new(env.owner.clone(), "Ada Lovelace");
        contact.phone = Some("+15551234567".to_string());
        env.storage.save_contact(&contact).await.unwrap();

        if balance > 0 {
            env.scheduler
                .ledger()
                .add_credits(&env.owner, balance)
                .await
                .unwrap();
        }

        env.scheduler
            .enroll(&campaign.id, &contact.id, Some(Utc::now() - Duration::minutes(1)))
            .await
            .unwrap()
    }

    /// Put a seeded enrollment into `calling` with a recorded call handle
    /// and the dispatch charge applied, due for reconciliation.
    async fn seed_calling(env: &TestEnv, balance: u64, now: DateTime<Utc>) -> Enrollment {
        let enrollment = seed_queued(env, balance).await;
        let mut calling = env
            .storage
            .begin_dispatch(&enrollment.id, now)
            .await
            .unwrap()
            .unwrap();
        env.scheduler
            .ledger()
            .consume_credits_once(&env.owner, 10, &format!("{}:attempt-0", calling.id))
            .await
            .unwrap();
        calling.record_attempt();
        calling.record_placed("CA100".to_string(), None, now - Duration::seconds(1));
        env.storage.save_enrollment(&calling).await.unwrap();
        calling
    }

    async fn get(env: &TestEnv, id: &EnrollmentId) -> Enrollment {
        env.storage.get_enrollment(id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_dispatch_success_moves_to_calling() {
        let env = test_env();
        let enrollment = seed_queued(&env, 100).await;
        env.dispatcher.place_ok("CA1").await;

        let now = Utc::now();
        let summary = env.scheduler.run_tick_at(now).await.unwrap();
        assert_eq!(summary.dispatched, 1);
        assert!(summary.errors.is_empty());

        let updated = get(&env, &enrollment.id).await;
        assert_eq!(updated.status, EnrollmentStatus::Calling);
        assert_eq!(updated.call_sid.as_deref(), Some("CA1"));
        assert_eq!(updated.attempt_count, 1);
        assert_eq!(updated.next_call_at, Some(now + Duration::seconds(60)));

        let state = env.scheduler.ledger().get_state(&env.owner).await.unwrap();
        assert_eq!(state.balance, 90);
    }

    #[tokio::test]
    async fn test_dispatch_renders_script() {
        let env = test_env();
        seed_queued(&env, 100).await;
        env.dispatcher.place_ok("CA1").await;

        env.scheduler.run_tick_at(Utc::now()).await.unwrap();

        let placed = env.dispatcher.placed.lock().await;
        assert_eq!(placed.len(), 1);
        assert_eq!(placed[0].script, "Hi Ada");
        assert_eq!(placed[0].to, "+15551234567");
        assert_eq!(placed[0].route, ProviderRoute::Telephony);
    }

    #[tokio::test]
    async fn test_inactive_campaign_skips() {
        let env = test_env();
        let enrollment = seed_queued(&env, 100).await;

        // Owner pauses the campaign before the tick
        let mut campaign = env
            .storage
            .get_campaign(&enrollment.campaign_id)
            .await
            .unwrap()
            .unwrap();
        campaign.status = CampaignStatus::Paused;
        env.storage.save_campaign(&campaign).await.unwrap();

        env.scheduler.run_tick_at(Utc::now()).await.unwrap();

        let updated = get(&env, &enrollment.id).await;
        assert_eq!(updated.status, EnrollmentStatus::Skipped);
        // Not an error and nothing charged
        let state = env.scheduler.ledger().get_state(&env.owner).await.unwrap();
        assert_eq!(state.balance, 100);
    }

    #[tokio::test]
    async fn test_missing_phone_fails_terminally() {
        let env = test_env();
        let enrollment = seed_queued(&env, 100).await;

        let mut contact = env
            .storage
            .get_contact(&enrollment.contact_id)
            .await
            .unwrap()
            .unwrap();
        contact.phone = Some("not a number".to_string());
        env.storage.save_contact(&contact).await.unwrap();

        env.scheduler.run_tick_at(Utc::now()).await.unwrap();

        let updated = get(&env, &enrollment.id).await;
        assert_eq!(updated.status, EnrollmentStatus::Failed);
        assert!(updated.last_error.as_ref().unwrap().contains("phone"));
    }

    #[tokio::test]
    async fn test_insufficient_credits_defers_without_attempt() {
        let env = test_env();
        let enrollment = seed_queued(&env, 0).await;

        let now = Utc::now();
        env.scheduler.run_tick_at(now).await.unwrap();

        let updated = get(&env, &enrollment.id).await;
        assert_eq!(updated.status, EnrollmentStatus::Queued);
        assert_eq!(updated.attempt_count, 0);
        assert_eq!(updated.next_call_at, Some(now + Duration::seconds(3600)));
        // No call was attempted
        assert!(env.dispatcher.placed.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_failures_exhaust_attempt_budget() {
        let env = test_env();
        let enrollment = seed_queued(&env, 100).await;

        let mut now = Utc::now();
        for expected_attempt in 1..=3u32 {
            env.dispatcher.place_err("provider 500").await;
            env.scheduler.run_tick_at(now).await.unwrap();

            let updated = get(&env, &enrollment.id).await;
            assert_eq!(updated.attempt_count, expected_attempt);
            if expected_attempt < 3 {
                assert_eq!(updated.status, EnrollmentStatus::Queued);
                assert_eq!(updated.next_call_at, Some(now + Duration::seconds(900)));
            } else {
                assert_eq!(updated.status, EnrollmentStatus::Failed);
                assert!(updated.next_call_at.is_none());
            }
            now += Duration::seconds(1000);
        }

        // Terminal: further ticks never dispatch it again
        env.scheduler.run_tick_at(now).await.unwrap();
        let terminal = get(&env, &enrollment.id).await;
        assert_eq!(terminal.status, EnrollmentStatus::Failed);
        assert_eq!(terminal.attempt_count, 3);

        // Each genuine attempt was billed under a fresh key
        let state = env.scheduler.ledger().get_state(&env.owner).await.unwrap();
        assert_eq!(state.balance, 70);
    }

    #[tokio::test]
    async fn test_reconcile_live_status_defers() {
        let env = test_env();
        let now = Utc::now();
        let calling = seed_calling(&env, 100, now).await;
        env.dispatcher
            .status_ok(ProviderCallStatus::Ringing, None)
            .await;

        let summary = env.scheduler.run_tick_at(now).await.unwrap();
        assert_eq!(summary.reconciled, 1);

        let updated = get(&env, &calling.id).await;
        assert_eq!(updated.status, EnrollmentStatus::Calling);
        assert_eq!(updated.next_call_at, Some(now + Duration::seconds(60)));
    }

    #[tokio::test]
    async fn test_settlement_bills_by_duration() {
        let env = test_env();
        let now = Utc::now();
        let calling = seed_calling(&env, 100, now).await;
        env.dispatcher
            .status_ok(ProviderCallStatus::Completed, Some(125))
            .await;

        env.scheduler.run_tick_at(now).await.unwrap();

        let updated = get(&env, &calling.id).await;
        assert_eq!(updated.status, EnrollmentStatus::Completed);
        assert_eq!(updated.completed_at, Some(now));

        // ceil(125 / 60) = 3 minutes at 5 credits/minute, on top of the
        // 10-credit dispatch charge already taken.
        let state = env.scheduler.ledger().get_state(&env.owner).await.unwrap();
        assert_eq!(state.balance, 100 - 10 - 15);
    }

    #[tokio::test]
    async fn test_settlement_bills_once_across_overlapping_ticks() {
        let env = test_env();
        let now = Utc::now();
        let calling = seed_calling(&env, 100, now).await;
        let stale_snapshot = get(&env, &calling.id).await;

        env.dispatcher
            .status_ok(ProviderCallStatus::Completed, Some(125))
            .await;
        env.scheduler.run_tick_at(now).await.unwrap();
        let state = env.scheduler.ledger().get_state(&env.owner).await.unwrap();
        assert_eq!(state.balance, 75);

        // An overlapping tick observed the same transition from stale state.
        env.storage.save_enrollment(&stale_snapshot).await.unwrap();
        env.dispatcher
            .status_ok(ProviderCallStatus::Completed, Some(125))
            .await;
        env.scheduler.run_tick_at(now).await.unwrap();

        let updated = get(&env, &calling.id).await;
        assert_eq!(updated.status, EnrollmentStatus::Completed);
        let state = env.scheduler.ledger().get_state(&env.owner).await.unwrap();
        assert_eq!(state.balance, 75);
    }

    #[tokio::test]
    async fn test_zero_duration_bills_zero() {
        let env = test_env();
        let now = Utc::now();
        let calling = seed_calling(&env, 100, now).await;
        env.dispatcher
            .status_ok(ProviderCallStatus::Completed, Some(0))
            .await;

        env.scheduler.run_tick_at(now).await.unwrap();

        let updated = get(&env, &calling.id).await;
        assert_eq!(updated.status, EnrollmentStatus::Completed);
        let state = env.scheduler.ledger().get_state(&env.owner).await.unwrap();
        assert_eq!(state.balance, 90);
        // No settlement entry recorded
        assert_eq!(state.ledger.len(), 1);
    }

    #[tokio::test]
    async fn test_billing_failure_keeps_calling() {
        let env = test_env();
        let now = Utc::now();
        // 10 credits cover dispatch only; settlement of 15 must fail.
        let calling = seed_calling(&env, 10, now).await;
        env.dispatcher
            .status_ok(ProviderCallStatus::Completed, Some(125))
            .await;

        env.scheduler.run_tick_at(now).await.unwrap();

        let updated = get(&env, &calling.id).await;
        assert_eq!(updated.status, EnrollmentStatus::Calling);
        assert_eq!(updated.next_call_at, Some(now + Duration::seconds(600)));
        assert!(updated
            .last_error
            .as_ref()
            .unwrap()
            .contains("settlement billing failed"));

        // Credits arrive; the next tick settles without re-placing the call.
        env.scheduler
            .ledger()
            .add_credits(&env.owner, 50)
            .await
            .unwrap();
        env.dispatcher
            .status_ok(ProviderCallStatus::Completed, Some(125))
            .await;
        let later = now + Duration::seconds(700);
        env.scheduler.run_tick_at(later).await.unwrap();

        let settled = get(&env, &calling.id).await;
        assert_eq!(settled.status, EnrollmentStatus::Completed);
        let state = env.scheduler.ledger().get_state(&env.owner).await.unwrap();
        assert_eq!(state.balance, 35);
    }

    #[tokio::test]
    async fn test_other_terminal_status_fails() {
        let env = test_env();
        let now = Utc::now();
        let calling = seed_calling(&env, 100, now).await;
        env.dispatcher
            .status_ok(ProviderCallStatus::NoAnswer, None)
            .await;

        env.scheduler.run_tick_at(now).await.unwrap();

        let updated = get(&env, &calling.id).await;
        assert_eq!(updated.status, EnrollmentStatus::Failed);
        assert!(updated.last_error.as_ref().unwrap().contains("no-answer"));
    }

    #[tokio::test]
    async fn test_poll_failures_capped() {
        let env = test_env();
        let mut now = Utc::now();
        let calling = seed_calling(&env, 100, now).await;

        // max_poll_failures = 3 in the test config
        for failures in 1..=3u32 {
            env.dispatcher.status_err("gateway timeout").await;
            env.scheduler.run_tick_at(now).await.unwrap();

            let updated = get(&env, &calling.id).await;
            if failures < 3 {
                assert_eq!(updated.status, EnrollmentStatus::Calling);
                assert_eq!(updated.poll_failures, failures);
            } else {
                assert_eq!(updated.status, EnrollmentStatus::Failed);
            }
            now += Duration::seconds(120);
        }
    }

    #[tokio::test]
    async fn test_poll_window_cap_fails_stuck_call() {
        let env = test_env();
        let now = Utc::now();
        let calling = seed_calling(&env, 100, now - Duration::seconds(2000)).await;
        env.dispatcher
            .status_ok(ProviderCallStatus::InProgress, None)
            .await;

        env.scheduler.run_tick_at(now).await.unwrap();

        let updated = get(&env, &calling.id).await;
        assert_eq!(updated.status, EnrollmentStatus::Failed);
        assert!(updated.last_error.as_ref().unwrap().contains("did not resolve"));
    }

    #[tokio::test]
    async fn test_enroll_rejects_duplicate_pair() {
        let env = test_env();
        let enrollment = seed_queued(&env, 0).await;

        let err = env
            .scheduler
            .enroll(&enrollment.campaign_id, &enrollment.contact_id, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DialerError::EnrollmentExists { .. }));
    }

    #[tokio::test]
    async fn test_voice_agent_route_resolution() {
        let env = test_env();
        let enrollment = seed_queued(&env, 100).await;

        let mut campaign = env
            .storage
            .get_campaign(&enrollment.campaign_id)
            .await
            .unwrap()
            .unwrap();
        campaign.voice_agent_id = Some("agent-7".to_string());
        env.storage.save_campaign(&campaign).await.unwrap();

        env.storage
            .save_provider_settings(
                &env.owner,
                &ProviderSettings {
                    voice_agent_api_key: Some("va-key".to_string()),
                    outbound_number: None,
                },
            )
            .await
            .unwrap();

        env.dispatcher.place_ok("CA2").await;
        env.scheduler.run_tick_at(Utc::now()).await.unwrap();

        let placed = env.dispatcher.placed.lock().await;
        assert_eq!(
            placed[0].route,
            ProviderRoute::VoiceAgent {
                agent_id: "agent-7".to_string(),
                api_key: "va-key".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_telephony_route_without_owner_key() {
        let env = test_env();
        let enrollment = seed_queued(&env, 100).await;

        // Agent set on the campaign but no owner API key: native path.
        let mut campaign = env
            .storage
            .get_campaign(&enrollment.campaign_id)
            .await
            .unwrap()
            .unwrap();
        campaign.voice_agent_id = Some("agent-7".to_string());
        env.storage.save_campaign(&campaign).await.unwrap();

        env.dispatcher.place_ok("CA3").await;
        env.scheduler.run_tick_at(Utc::now()).await.unwrap();

        let placed = env.dispatcher.placed.lock().await;
        assert_eq!(placed[0].route, ProviderRoute::Telephony);
    }

    #[tokio::test]
    async fn test_manual_call_charges_and_places() {
        let env = test_env();
        let mut contact = Contact::new(env.owner.clone(), "Grace Hopper");
        contact.phone = Some("+15557654321".to_string());
        env.storage.save_contact(&contact).await.unwrap();
        env.scheduler
            .ledger()
            .add_credits(&env.owner, 50)
            .await
            .unwrap();

        env.dispatcher.place_ok("CA9").await;
        let placed = env
            .scheduler
            .place_manual_call(&env.owner, &contact.id, "Hello there", "manual-1")
            .await
            .unwrap();
        assert_eq!(placed.call_sid, "CA9");

        let state = env.scheduler.ledger().get_state(&env.owner).await.unwrap();
        assert_eq!(state.balance, 40);
    }

    #[tokio::test]
    async fn test_manual_call_refunds_on_placement_failure() {
        let env = test_env();
        let mut contact = Contact::new(env.owner.clone(), "Grace Hopper");
        contact.phone = Some("+15557654321".to_string());
        env.storage.save_contact(&contact).await.unwrap();
        env.scheduler
            .ledger()
            .add_credits(&env.owner, 50)
            .await
            .unwrap();

        env.dispatcher.place_err("provider down").await;
        let err = env
            .scheduler
            .place_manual_call(&env.owner, &contact.id, "Hello", "manual-2")
            .await
            .unwrap_err();
        assert!(matches!(err, DialerError::Telephony(_)));

        let state = env.scheduler.ledger().get_state(&env.owner).await.unwrap();
        assert_eq!(state.balance, 50);
    }

    #[tokio::test]
    async fn test_manual_call_rejects_when_short() {
        let env = test_env();
        let mut contact = Contact::new(env.owner.clone(), "Grace Hopper");
        contact.phone = Some("+15557654321".to_string());
        env.storage.save_contact(&contact).await.unwrap();

        let err = env
            .scheduler
            .place_manual_call(&env.owner, &contact.id, "Hello", "manual-3")
            .await
            .unwrap_err();
        assert!(matches!(err, DialerError::InsufficientCredits { .. }));
    }

    #[tokio::test]
    async fn test_recording_started_when_configured() {
        let storage = Arc::new(MemoryStorage::new());
        let dispatcher = Arc::new(MockDispatcher::default());
        let ledger = CreditLedger::new(storage.clone(), CreditsConfig::default());
        let config = SchedulerConfig {
            recording_callback_url: Some("https://portal.example.com/webhooks/recording".to_string()),
            ..SchedulerConfig::default()
        };
        let scheduler = CampaignScheduler::new(
            storage.clone(),
            dispatcher.clone(),
            Arc::new(TemplateRenderer::default()),
            ledger,
            config,
            CreditsConfig::default(),
        );
        let env = TestEnv {
            scheduler,
            storage,
            dispatcher,
            owner: OwnerId::new("owner-1"),
        };

        let enrollment = seed_queued(&env, 100).await;
        env.dispatcher.place_ok("CA7").await;
        env.scheduler.run_tick_at(Utc::now()).await.unwrap();

        assert_eq!(get(&env, &enrollment.id).await.status, EnrollmentStatus::Calling);
        assert_eq!(*env.dispatcher.recordings.lock().await, vec!["CA7".to_string()]);
    }

    #[tokio::test]
    async fn test_batch_isolates_enrollment_failures() {
        let env = test_env();
        // Two enrollments; the first placement fails, the second succeeds.
        let first = seed_queued(&env, 100).await;

        let mut contact = Contact::new(env.owner.clone(), "Grace Hopper");
        contact.phone = Some("+15557654321".to_string());
        env.storage.save_contact(&contact).await.unwrap();
        let second = env
            .scheduler
            .enroll(
                &first.campaign_id,
                &contact.id,
                Some(Utc::now() - Duration::seconds(30)),
            )
            .await
            .unwrap();

        env.dispatcher.place_err("provider 500").await;
        env.dispatcher.place_ok("CA5").await;

        let summary = env.scheduler.run_tick_at(Utc::now()).await.unwrap();
        assert_eq!(summary.dispatched, 2);

        let a = get(&env, &first.id).await;
        let b = get(&env, &second.id).await;
        // Oldest first: `first` (due 1 minute ago) got the failure.
        assert_eq!(a.status, EnrollmentStatus::Queued);
        assert_eq!(a.attempt_count, 1);
        assert_eq!(b.status, EnrollmentStatus::Calling);
    }
}
