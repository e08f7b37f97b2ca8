use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stablegate_core::{AccountId, EntryId, LedgerReason};

/// One append-only ledger entry per settled financial event.
///
/// Never updated or deleted after insert. `reference` ties the entry back to
/// its originating event (e.g. `"{chain_id}:{tx_hash}"` for a payment) and is
/// unique per account — the idempotency anchor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditLedgerEntry {
    /// Entry identifier.
    pub id: EntryId,
    /// Account the entry belongs to.
    pub billing_account_id: AccountId,
    /// Signed credit delta (positive = credit, negative = debit).
    pub amount: i128,
    /// Balance snapshot immediately after this entry was applied.
    pub balance_after: i128,
    /// Why the entry exists.
    pub reason: LedgerReason,
    /// Unique-per-account reference to the originating event.
    pub reference: String,
    /// When the entry was committed.
    pub created_at: DateTime<Utc>,
}

/// Balance plus entry history for one account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSummary {
    pub billing_account_id: AccountId,
    pub balance_credits: i128,
    /// Entries in commit order (oldest first).
    pub entries: Vec<CreditLedgerEntry>,
}
