//! Credit ledger.
//!
//! Owns per-owner balances and the capped spend ledger. The scheduler is
//! invoked with at-least-once semantics, so the primitive it bills through
//! ([`CreditLedger::consume_credits_once`]) must be idempotent: the same
//! logical charge, replayed across overlapping ticks, debits exactly once.
//!
//! Every balance mutation for an owner runs under that owner's entry in a
//! hash-sharded lock pool ([`KeyedLocks`]). Serializing per owner subsumes
//! the per-`(owner, key)` requirement and also keeps concurrent debits with
//! *different* keys from racing the balance read-modify-write.

pub mod locks;

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::CreditsConfig;
use crate::error::{DialerError, DialerResult};
use crate::storage::DialerStorage;
use crate::types::{CreditsState, OwnerId, MAX_IDEMPOTENCY_KEY_LEN};

pub use locks::KeyedLocks;

/// Outcome of a debit operation.
#[derive(Debug, Clone)]
pub struct DebitOutcome {
    /// Whether the charge is satisfied (including idempotent replays and
    /// free-account bypasses).
    pub ok: bool,

    /// Owner state after the operation.
    pub state: CreditsState,

    /// Amount actually recorded for this charge. On an idempotent replay
    /// this is the previously recorded amount.
    pub charged: u64,

    /// Whether this charge was already recorded by an earlier call.
    pub already_consumed: bool,
}

/// Policy deciding which owners are exempt from consumption.
pub trait FreeAccountPolicy: Send + Sync {
    fn is_free(&self, owner: &OwnerId) -> bool;
}

/// Allow-list policy built from configuration.
#[derive(Debug, Default)]
pub struct AllowListPolicy {
    owners: HashSet<String>,
}

impl AllowListPolicy {
    pub fn new(owners: impl IntoIterator<Item = String>) -> Self {
        Self {
            owners: owners.into_iter().collect(),
        }
    }
}

impl FreeAccountPolicy for AllowListPolicy {
    fn is_free(&self, owner: &OwnerId) -> bool {
        self.owners.contains(owner.as_str())
    }
}

/// External payment side effect used for auto-top-up.
#[async_trait]
pub trait TopUpProvider: Send + Sync {
    /// Purchase `packages` top-up packages for `owner`, returning the number
    /// of credits granted.
    async fn purchase(&self, owner: &OwnerId, packages: u64) -> DialerResult<u64>;
}

/// Top-up provider used when no payment integration is configured.
#[derive(Debug, Default)]
pub struct TopUpDisabled;

#[async_trait]
impl TopUpProvider for TopUpDisabled {
    async fn purchase(&self, _owner: &OwnerId, _packages: u64) -> DialerResult<u64> {
        Err(DialerError::TopUpUnavailable(
            "no payment provider configured".to_string(),
        ))
    }
}

/// Per-owner credit ledger.
pub struct CreditLedger<S: DialerStorage> {
    storage: Arc<S>,
    config: CreditsConfig,
    locks: Arc<KeyedLocks>,
    free_accounts: Arc<dyn FreeAccountPolicy>,
    top_up: Arc<dyn TopUpProvider>,
}

impl<S: DialerStorage> Clone for CreditLedger<S> {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
            config: self.config.clone(),
            locks: self.locks.clone(),
            free_accounts: self.free_accounts.clone(),
            top_up: self.top_up.clone(),
        }
    }
}

impl<S: DialerStorage> CreditLedger<S> {
    /// Create a ledger with the allow-list policy from `config` and top-up
    /// disabled.
    pub fn new(storage: Arc<S>, config: CreditsConfig) -> Self {
        let free_accounts = Arc::new(AllowListPolicy::new(config.free_owners.clone()));
        Self {
            storage,
            config,
            locks: Arc::new(KeyedLocks::default()),
            free_accounts,
            top_up: Arc::new(TopUpDisabled),
        }
    }

    /// Replace the free-account policy.
    pub fn with_free_account_policy(mut self, policy: Arc<dyn FreeAccountPolicy>) -> Self {
        self.free_accounts = policy;
        self
    }

    /// Replace the top-up provider.
    pub fn with_top_up_provider(mut self, provider: Arc<dyn TopUpProvider>) -> Self {
        self.top_up = provider;
        self
    }

    /// Get an owner's credit state. No side effects.
    pub async fn get_state(&self, owner: &OwnerId) -> DialerResult<CreditsState> {
        self.storage.get_credits(owner).await
    }

    /// Add credits to an owner's balance. Non-idempotent; used for top-ups
    /// and refunds. Serialized per owner so concurrent callers never lose
    /// updates.
    pub async fn add_credits(&self, owner: &OwnerId, amount: u64) -> DialerResult<CreditsState> {
        let _guard = self.locks.lock(owner.as_str()).await;
        let mut state = self.storage.get_credits(owner).await?;
        state.balance = state.balance.saturating_add(amount);
        self.storage.save_credits(owner, &state).await?;
        debug!(owner = %owner, amount, balance = state.balance, "credits added");
        Ok(state)
    }

    /// Debit an owner's balance without idempotency protection. The caller
    /// must guarantee at-most-once invocation per logical charge. The debit
    /// either fully succeeds or leaves the balance unchanged.
    pub async fn consume_credits(&self, owner: &OwnerId, amount: u64) -> DialerResult<DebitOutcome> {
        if self.free_accounts.is_free(owner) {
            let state = self.storage.get_credits(owner).await?;
            return Ok(DebitOutcome {
                ok: true,
                state,
                charged: 0,
                already_consumed: false,
            });
        }

        let _guard = self.locks.lock(owner.as_str()).await;
        let mut state = self.storage.get_credits(owner).await?;
        if state.balance < amount {
            return Ok(DebitOutcome {
                ok: false,
                state,
                charged: 0,
                already_consumed: false,
            });
        }
        state.balance -= amount;
        self.storage.save_credits(owner, &state).await?;
        debug!(owner = %owner, amount, balance = state.balance, "credits consumed");
        Ok(DebitOutcome {
            ok: true,
            state,
            charged: amount,
            already_consumed: false,
        })
    }

    /// Debit an owner's balance exactly once per idempotency key.
    ///
    /// - An empty key degrades to [`consume_credits`](Self::consume_credits)
    ///   (documented weaker guarantee for callers that cannot supply one).
    /// - A key already present in the spend ledger returns success with the
    ///   previously recorded amount, balance untouched.
    /// - When auto-top-up is enabled and the balance is short, exactly one
    ///   top-up attempt is made before the final sufficiency check; top-up
    ///   failure is non-fatal and falls through to the insufficient-funds
    ///   outcome.
    pub async fn consume_credits_once(
        &self,
        owner: &OwnerId,
        amount: u64,
        key: &str,
    ) -> DialerResult<DebitOutcome> {
        if key.is_empty() {
            debug!(owner = %owner, amount, "empty idempotency key, degrading to plain consume");
            return self.consume_credits(owner, amount).await;
        }
        if key.chars().count() > MAX_IDEMPOTENCY_KEY_LEN {
            return Err(DialerError::InvalidInput(format!(
                "idempotency key exceeds {MAX_IDEMPOTENCY_KEY_LEN} characters"
            )));
        }

        if self.free_accounts.is_free(owner) {
            let state = self.storage.get_credits(owner).await?;
            return Ok(DebitOutcome {
                ok: true,
                state,
                charged: 0,
                already_consumed: false,
            });
        }

        // Fast path: charge already recorded.
        let state = self.storage.get_credits(owner).await?;
        if let Some(entry) = state.find_entry(key) {
            debug!(owner = %owner, key, charged = entry.amount, "idempotent replay");
            let charged = entry.amount;
            return Ok(DebitOutcome {
                ok: true,
                state,
                charged,
                already_consumed: true,
            });
        }

        // One top-up attempt before the final check. Runs outside the owner
        // lock: the purchase is an external call and must not hold it.
        if state.auto_top_up && state.balance < amount {
            self.try_top_up(owner, amount - state.balance).await;
        }

        // Serialization point: close the race between the checks above and
        // the debit below.
        let _guard = self.locks.lock(owner.as_str()).await;
        let mut state = self.storage.get_credits(owner).await?;

        if let Some(entry) = state.find_entry(key) {
            let charged = entry.amount;
            return Ok(DebitOutcome {
                ok: true,
                state,
                charged,
                already_consumed: true,
            });
        }

        if state.balance < amount {
            return Ok(DebitOutcome {
                ok: false,
                state,
                charged: 0,
                already_consumed: false,
            });
        }

        state.balance -= amount;
        state.record_spend(key, amount, Utc::now());
        self.storage.save_credits(owner, &state).await?;
        debug!(owner = %owner, key, amount, balance = state.balance, "credits consumed once");

        Ok(DebitOutcome {
            ok: true,
            state,
            charged: amount,
            already_consumed: false,
        })
    }

    /// Enable or disable auto-top-up for an owner.
    pub async fn set_auto_top_up(
        &self,
        owner: &OwnerId,
        enabled: bool,
    ) -> DialerResult<CreditsState> {
        let _guard = self.locks.lock(owner.as_str()).await;
        let mut state = self.storage.get_credits(owner).await?;
        state.auto_top_up = enabled;
        self.storage.save_credits(owner, &state).await?;
        info!(owner = %owner, enabled, "auto top-up updated");
        Ok(state)
    }

    /// Attempt one top-up covering `shortfall` credits. Failure is logged
    /// and swallowed; the caller re-checks sufficiency afterwards.
    async fn try_top_up(&self, owner: &OwnerId, shortfall: u64) {
        let package = self.config.top_up_package_credits.max(1);
        let packages = shortfall.div_ceil(package);

        match self.top_up.purchase(owner, packages).await {
            Ok(granted) => {
                info!(owner = %owner, packages, granted, "auto top-up succeeded");
                if let Err(e) = self.add_credits(owner, granted).await {
                    warn!(owner = %owner, error = %e, "failed to apply top-up credits");
                }
            }
            Err(e) => {
                warn!(owner = %owner, packages, error = %e, "auto top-up unavailable");
            }
        }
    }
}
