use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use stablegate_core::{
    AccountId, AttemptEvent, AttemptId, AttemptState, AttemptStateMachine, ChainAddress, ChainId,
    TxHash,
};

use crate::error::SettlementError;
use crate::verifier::RejectionCode;

/// One payment lifecycle instance, from intent to terminal outcome.
///
/// Created on intent request, mutated only by the settlement engine, never
/// deleted — terminal attempts stay as the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentAttempt {
    /// Attempt identifier.
    pub id: AttemptId,
    /// Account this attempt is scoped to.
    pub billing_account_id: AccountId,
    /// Wallet the payment is promised to come from (session wallet).
    pub payer_address: ChainAddress,
    /// Promised amount in USD cents.
    pub amount_usd_cents: u64,
    /// Promised amount in smallest on-chain units.
    pub amount_raw: u128,
    /// Chain the payment must land on.
    pub chain_id: ChainId,
    /// Custodial address the payment must be sent to.
    pub recipient_address: ChainAddress,
    /// Bound transaction hash, once submitted.
    pub tx_hash: Option<TxHash>,
    /// Lifecycle state.
    pub status: AttemptState,
    /// Terminal rejection/failure code, if any.
    pub error_code: Option<RejectionCode>,
    /// When the transaction hash was bound.
    pub submitted_at: Option<DateTime<Utc>>,
    /// Confirmations last observed by the oracle.
    pub confirmations: Option<u32>,
    /// When the intent was created.
    pub created_at: DateTime<Utc>,
}

impl PaymentAttempt {
    /// The idempotency reference for this attempt's ledger entry.
    pub fn reference(&self) -> Option<String> {
        self.tx_hash
            .as_ref()
            .map(|hash| format!("{}:{}", self.chain_id, hash))
    }
}

/// Store of payment attempts plus the global (chain, tx-hash) binding index.
///
/// Thread-safe: uses `DashMap` for concurrent access. The binding index's
/// atomic entry insert is the uniqueness constraint that keeps one
/// transaction hash from crediting two attempts.
pub struct AttemptStore {
    records: DashMap<AttemptId, PaymentAttempt>,
    tx_bindings: DashMap<(ChainId, TxHash), AttemptId>,
}

impl AttemptStore {
    /// Create a new, empty store.
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            tx_bindings: DashMap::new(),
        }
    }

    /// Insert a freshly created attempt.
    pub fn insert(&self, attempt: PaymentAttempt) {
        self.records.insert(attempt.id, attempt);
    }

    /// Snapshot of an attempt.
    pub fn get(&self, attempt_id: &AttemptId) -> Option<PaymentAttempt> {
        self.records.get(attempt_id).map(|a| a.clone())
    }

    /// The attempt a (chain, tx-hash) pair is bound to, if any.
    pub fn find_by_tx_hash(&self, chain_id: ChainId, tx_hash: &TxHash) -> Option<PaymentAttempt> {
        // Copy the id out before touching the records map so the two shard
        // locks are never held at once.
        let attempt_id = {
            let bound = self.tx_bindings.get(&(chain_id, tx_hash.clone()))?;
            *bound
        };
        self.get(&attempt_id)
    }

    /// Number of attempts in the store.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Bind a transaction hash to an attempt and move it to PendingUnverified.
    ///
    /// Returns `(attempt, repeat)`; `repeat` is true when the same hash was
    /// already bound to this attempt (idempotent re-submission). Binding a
    /// hash that belongs to a different attempt is a conflict; binding a
    /// second, different hash to the same attempt is rejected.
    pub fn bind_tx_hash(
        &self,
        attempt_id: AttemptId,
        tx_hash: TxHash,
        now: DateTime<Utc>,
    ) -> Result<(PaymentAttempt, bool), SettlementError> {
        let mut record = self
            .records
            .get_mut(&attempt_id)
            .ok_or(SettlementError::NotFound(attempt_id))?;

        if let Some(existing) = &record.tx_hash {
            if *existing == tx_hash {
                return Ok((record.clone(), true));
            }
            return Err(SettlementError::AlreadyBound(attempt_id));
        }

        // Atomic uniqueness check on the global binding index. Lock order is
        // always records → bindings.
        match self.tx_bindings.entry((record.chain_id, tx_hash.clone())) {
            Entry::Occupied(bound) => {
                if *bound.get() != attempt_id {
                    return Err(SettlementError::TxHashConflict {
                        chain_id: record.chain_id,
                        tx_hash,
                    });
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(attempt_id);
            }
        }

        record.status = AttemptStateMachine::transition(record.status, AttemptEvent::TxSubmitted)?;
        record.submitted_at = Some(now);

        tracing::info!(
            attempt_id = %attempt_id,
            chain_id = %record.chain_id,
            tx_hash = %tx_hash,
            "transaction hash bound"
        );
        record.tx_hash = Some(tx_hash);

        Ok((record.clone(), false))
    }

    /// Record the confirmations last seen for a still-pending attempt.
    pub fn record_confirmations(
        &self,
        attempt_id: AttemptId,
        confirmations: u32,
    ) -> Result<PaymentAttempt, SettlementError> {
        let mut record = self
            .records
            .get_mut(&attempt_id)
            .ok_or(SettlementError::NotFound(attempt_id))?;
        if !record.status.is_final() {
            record.confirmations = Some(confirmations);
        }
        Ok(record.clone())
    }

    /// Transition an attempt to Credited.
    ///
    /// Callers only credit once the ledger entry is committed, so this is
    /// where the ledger outranks everything else. Idempotent on an attempt
    /// that is already Credited, and a Failed attempt (a racing poll applied
    /// the receipt timeout between the ledger commit and this call) is
    /// reconciled to Credited rather than left contradicting the ledger.
    pub fn mark_credited(
        &self,
        attempt_id: AttemptId,
        confirmations: u32,
    ) -> Result<PaymentAttempt, SettlementError> {
        let mut record = self
            .records
            .get_mut(&attempt_id)
            .ok_or(SettlementError::NotFound(attempt_id))?;

        match record.status {
            AttemptState::Credited => return Ok(record.clone()),
            AttemptState::Failed => {
                record.status = AttemptState::Credited;
                record.error_code = None;
                record.confirmations = Some(confirmations);
                tracing::warn!(
                    attempt_id = %attempt_id,
                    "reconciled timed-out attempt to credited, ledger entry is committed"
                );
                return Ok(record.clone());
            }
            _ => {}
        }

        record.status = AttemptStateMachine::transition(record.status, AttemptEvent::Verified)?;
        record.confirmations = Some(confirmations);
        record.error_code = None;

        tracing::info!(attempt_id = %attempt_id, confirmations, "attempt credited");
        Ok(record.clone())
    }

    /// Transition an attempt to Rejected with a terminal code.
    ///
    /// No-op on an attempt that is already terminal: a racing caller that
    /// reached a terminal verdict first wins, and the current record is
    /// returned so the caller reports that verdict.
    pub fn mark_rejected(
        &self,
        attempt_id: AttemptId,
        code: RejectionCode,
    ) -> Result<PaymentAttempt, SettlementError> {
        let mut record = self
            .records
            .get_mut(&attempt_id)
            .ok_or(SettlementError::NotFound(attempt_id))?;

        if record.status.is_final() {
            return Ok(record.clone());
        }

        record.status =
            AttemptStateMachine::transition(record.status, AttemptEvent::VerificationRejected)?;
        record.error_code = Some(code);

        tracing::warn!(attempt_id = %attempt_id, code = %code, "attempt rejected");
        Ok(record.clone())
    }

    /// Transition an attempt to Failed (receipt window elapsed).
    ///
    /// No-op on an attempt that is already terminal, in particular a
    /// Credited one: a settle that committed before the timeout was applied
    /// keeps its credit, and the caller reports Credited.
    pub fn mark_failed(
        &self,
        attempt_id: AttemptId,
        code: RejectionCode,
    ) -> Result<PaymentAttempt, SettlementError> {
        let mut record = self
            .records
            .get_mut(&attempt_id)
            .ok_or(SettlementError::NotFound(attempt_id))?;

        if record.status.is_final() {
            return Ok(record.clone());
        }

        record.status =
            AttemptStateMachine::transition(record.status, AttemptEvent::ReceiptTimedOut)?;
        record.error_code = Some(code);

        tracing::warn!(attempt_id = %attempt_id, code = %code, "attempt failed");
        Ok(record.clone())
    }
}

impl Default for AttemptStore {
    fn default() -> Self {
        Self::new()
    }
}
