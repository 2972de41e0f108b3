//! Outbound-call campaign scheduler and credit ledger.
//!
//! This crate is the engine behind the outbound-calling add-on of a
//! client-portal platform. It turns a queued "call this contact" intent into
//! a billed, provider-dispatched phone call, settled asynchronously, while
//! guaranteeing a contact is never billed twice for the same logical charge
//! even though the scheduler is triggered with at-least-once semantics.
//!
//! # Architecture
//!
//! - **Credit Ledger** ([`ledger`]): per-owner balances with a capped
//!   append-only spend ledger; idempotent and non-idempotent debits with an
//!   auto-top-up hook.
//! - **Storage** ([`storage`]): campaigns, contacts, enrollments (unique per
//!   campaign/contact pair) and credit state behind an async trait.
//! - **Call Dispatcher** ([`dispatch`]): native telephony and
//!   conversational voice-agent call placement, plus status polling.
//! - **Scheduler** ([`scheduler`]): the cron-driven orchestrator that
//!   reconciles in-flight calls and dispatches due work each tick.
//! - **Script Renderer** ([`render`]): bounded opening-line rendering.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dialer_core::config::DialerConfig;
//! use dialer_core::dispatch::{ProviderDispatcher, TelephonyClient, VoiceAgentClient};
//! use dialer_core::ledger::CreditLedger;
//! use dialer_core::render::TemplateRenderer;
//! use dialer_core::scheduler::CampaignScheduler;
//! use dialer_core::storage::MemoryStorage;
//!
//! async fn example() {
//!     let config = DialerConfig::development();
//!     let storage = Arc::new(MemoryStorage::new());
//!     let dispatcher = Arc::new(ProviderDispatcher::new(
//!         TelephonyClient::new(config.telephony.clone()).unwrap(),
//!         VoiceAgentClient::new(config.voice_agent.clone()).unwrap(),
//!     ));
//!     let ledger = CreditLedger::new(storage.clone(), config.credits.clone());
//!     let scheduler = CampaignScheduler::new(
//!         storage,
//!         dispatcher,
//!         Arc::new(TemplateRenderer::default()),
//!         ledger,
//!         config.scheduler,
//!         config.credits,
//!     );
//!
//!     let summary = scheduler.run_tick().await.unwrap();
//!     println!("processed {}", summary.processed());
//! }
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod ledger;
pub mod render;
pub mod scheduler;
pub mod storage;
pub mod types;

pub use config::{CreditsConfig, DialerConfig, SchedulerConfig, TelephonyConfig, VoiceAgentConfig};
pub use dispatch::{
    CallDispatcher, CallStatusInfo, OutboundCallRequest, PlacedCall, ProviderCallStatus,
    ProviderDispatcher, ProviderRoute, TelephonyClient, VoiceAgentClient,
};
pub use error::{DialerError, DialerResult};
pub use ledger::{CreditLedger, DebitOutcome, FreeAccountPolicy, TopUpProvider};
pub use render::{ScriptRenderer, TemplateRenderer};
pub use scheduler::{CampaignScheduler, TickError, TickSummary};
pub use storage::{DialerStorage, MemoryStorage};
pub use types::{
    Campaign, CampaignId, CampaignStatus, Contact, ContactId, CreditsState, Enrollment,
    EnrollmentId, EnrollmentStatus, OwnerId, ProviderSettings, SpendLedgerEntry,
};
