use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashMap;

use stablegate_core::{AccountId, EntryId, LedgerReason, OwnerId};

use crate::account::BillingAccount;
use crate::entry::{CreditLedgerEntry, LedgerSummary};
use crate::error::LedgerError;

/// Per-account book: entries, the reference uniqueness index, and the cached
/// balance. Mutated only while the owning DashMap shard lock is held, which
/// stands in for the database transaction around the settle write.
#[derive(Debug)]
struct AccountBook {
    owner_id: OwnerId,
    created_at: DateTime<Utc>,
    balance: i128,
    entries: Vec<CreditLedgerEntry>,
    by_reference: HashMap<String, usize>,
}

impl AccountBook {
    fn new(owner_id: OwnerId, now: DateTime<Utc>) -> Self {
        Self {
            owner_id,
            created_at: now,
            balance: 0,
            entries: Vec::new(),
            by_reference: HashMap::new(),
        }
    }
}

/// Outcome of a settle call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    /// The committed entry — either freshly inserted or the pre-existing one
    /// for the same reference.
    pub entry: CreditLedgerEntry,
    /// False when the reference had already been settled (idempotent no-op).
    pub newly_settled: bool,
}

/// Append-only credit ledger, keyed by billing account.
///
/// Thread-safe: uses `DashMap` for concurrent access. Two racing settles for
/// the same (account, reference) serialize on the account's shard lock; the
/// first commits, the second observes the existing entry and returns it.
pub struct CreditLedger {
    books: DashMap<AccountId, AccountBook>,
}

impl CreditLedger {
    /// Create a new, empty ledger.
    pub fn new() -> Self {
        Self {
            books: DashMap::new(),
        }
    }

    /// Ensure an account exists, creating it lazily on first use.
    ///
    /// Fails if the account already exists under a different owner.
    pub fn ensure_account(
        &self,
        account_id: AccountId,
        owner_id: OwnerId,
        now: DateTime<Utc>,
    ) -> Result<BillingAccount, LedgerError> {
        let book = self
            .books
            .entry(account_id)
            .or_insert_with(|| AccountBook::new(owner_id, now));

        if book.owner_id != owner_id {
            return Err(LedgerError::OwnerMismatch(account_id));
        }

        Ok(BillingAccount {
            id: account_id,
            owner_id: book.owner_id,
            balance_credits: book.balance,
            created_at: book.created_at,
        })
    }

    /// The owner of an account, if it exists.
    pub fn account_owner(&self, account_id: &AccountId) -> Option<OwnerId> {
        self.books.get(account_id).map(|b| b.owner_id)
    }

    /// Snapshot of an account, if it exists.
    pub fn account(&self, account_id: &AccountId) -> Option<BillingAccount> {
        self.books.get(account_id).map(|b| BillingAccount {
            id: *account_id,
            owner_id: b.owner_id,
            balance_credits: b.balance,
            created_at: b.created_at,
        })
    }

    /// Current balance for an account (0 if the account does not exist yet).
    pub fn balance(&self, account_id: &AccountId) -> i128 {
        self.books.get(account_id).map(|b| b.balance).unwrap_or(0)
    }

    /// Atomically append a ledger entry and update the cached balance.
    ///
    /// Exactly-once per (account, reference): a repeated or racing settle
    /// with a reference that is already committed is a success-no-op that
    /// returns the existing entry, not an error.
    pub fn settle(
        &self,
        account_id: AccountId,
        reference: &str,
        amount: i128,
        reason: LedgerReason,
        now: DateTime<Utc>,
    ) -> Result<Settlement, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidDelta("zero delta".into()));
        }
        if reference.is_empty() {
            return Err(LedgerError::InvalidDelta("empty reference".into()));
        }

        let mut book = self
            .books
            .get_mut(&account_id)
            .ok_or(LedgerError::AccountNotFound(account_id))?;

        // Uniqueness check and the write below happen under the same shard
        // lock: this is the sole serialization point for racing settles.
        if let Some(&idx) = book.by_reference.get(reference) {
            let existing = book.entries[idx].clone();
            tracing::debug!(
                account_id = %account_id,
                reference = %reference,
                entry_id = %existing.id,
                "settle: reference already committed, returning existing entry"
            );
            return Ok(Settlement {
                entry: existing,
                newly_settled: false,
            });
        }

        let new_balance = book
            .balance
            .checked_add(amount)
            .ok_or(LedgerError::BalanceOverflow(account_id))?;
        if new_balance < 0 {
            return Err(LedgerError::InsufficientBalance {
                available: book.balance,
                required: -amount,
            });
        }

        let entry = CreditLedgerEntry {
            id: EntryId::new(),
            billing_account_id: account_id,
            amount,
            balance_after: new_balance,
            reason,
            reference: reference.to_string(),
            created_at: now,
        };

        let idx = book.entries.len();
        book.balance = new_balance;
        book.by_reference.insert(reference.to_string(), idx);
        book.entries.push(entry.clone());

        tracing::info!(
            account_id = %account_id,
            reference = %reference,
            amount,
            balance_after = new_balance,
            reason = %reason,
            "ledger entry committed"
        );

        Ok(Settlement {
            entry,
            newly_settled: true,
        })
    }

    /// Debit an account for metered usage, creating the account lazily.
    ///
    /// `cost_credits` must be positive; the debit is rejected if it would
    /// drive the balance negative. Idempotent per (account, reference).
    pub fn record_usage(
        &self,
        account_id: AccountId,
        owner_id: OwnerId,
        reference: &str,
        cost_credits: i128,
        now: DateTime<Utc>,
    ) -> Result<Settlement, LedgerError> {
        if cost_credits <= 0 {
            return Err(LedgerError::InvalidDelta(format!(
                "usage cost must be positive, got {}",
                cost_credits
            )));
        }
        self.ensure_account(account_id, owner_id, now)?;
        self.settle(account_id, reference, -cost_credits, LedgerReason::LlmUsage, now)
    }

    /// The entry committed for (account, reference), if any.
    pub fn find_by_reference(
        &self,
        account_id: &AccountId,
        reference: &str,
    ) -> Option<CreditLedgerEntry> {
        let book = self.books.get(account_id)?;
        let idx = *book.by_reference.get(reference)?;
        Some(book.entries[idx].clone())
    }

    /// All entries for an account in commit order.
    pub fn entries(&self, account_id: &AccountId) -> Vec<CreditLedgerEntry> {
        self.books
            .get(account_id)
            .map(|b| b.entries.clone())
            .unwrap_or_default()
    }

    /// Balance plus entry history for an account.
    pub fn summary(&self, account_id: &AccountId) -> Result<LedgerSummary, LedgerError> {
        let book = self
            .books
            .get(account_id)
            .ok_or(LedgerError::AccountNotFound(*account_id))?;
        Ok(LedgerSummary {
            billing_account_id: *account_id,
            balance_credits: book.balance,
            entries: book.entries.clone(),
        })
    }

    /// Number of accounts with a book.
    pub fn account_count(&self) -> usize {
        self.books.len()
    }
}

impl Default for CreditLedger {
    fn default() -> Self {
        Self::new()
    }
}
