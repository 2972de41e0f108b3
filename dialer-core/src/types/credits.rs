//! Per-owner credit balance and spend ledger.
//!
//! The spend ledger is append-only and capped: only the
//! [`SPEND_LEDGER_CAPACITY`] most recent entries are retained (oldest evicted
//! first). Idempotency protection is therefore only guaranteed within the
//! retained window - an accepted trade-off that bounds storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum number of spend-ledger entries retained per owner.
pub const SPEND_LEDGER_CAPACITY: usize = 500;

/// Maximum accepted idempotency-key length, in characters.
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 160;

/// One recorded debit, keyed by the caller-supplied idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendLedgerEntry {
    /// The idempotency key this charge was recorded under.
    pub id: String,

    /// Amount debited.
    pub amount: u64,

    /// When the debit was applied.
    pub at: DateTime<Utc>,
}

/// Credit state for one owner.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CreditsState {
    /// Current balance. Never goes negative as an effect of a debit.
    pub balance: u64,

    /// Whether to attempt an automatic top-up when a debit comes up short.
    pub auto_top_up: bool,

    /// Capped spend ledger, oldest first.
    pub ledger: Vec<SpendLedgerEntry>,
}

impl CreditsState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a prior spend by idempotency key.
    pub fn find_entry(&self, key: &str) -> Option<&SpendLedgerEntry> {
        self.ledger.iter().find(|e| e.id == key)
    }

    /// Append a spend entry, evicting the oldest past capacity.
    pub fn record_spend(&mut self, key: impl Into<String>, amount: u64, at: DateTime<Utc>) {
        self.ledger.push(SpendLedgerEntry {
            id: key.into(),
            amount,
            at,
        });
        if self.ledger.len() > SPEND_LEDGER_CAPACITY {
            let excess = self.ledger.len() - SPEND_LEDGER_CAPACITY;
            self.ledger.drain(..excess);
        }
    }
}
