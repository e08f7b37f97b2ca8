use serde::{Deserialize, Serialize};
use std::sync::Arc;

use stablegate_core::{
    AccountId, AttemptId, AttemptState, ChainAddress, ChainId, ClientStatus, Clock, LedgerReason,
    OwnerId, SettlementConfig, TxHash,
};
use stablegate_ledger::{CreditLedger, LedgerSummary};

use crate::attempt::{AttemptStore, PaymentAttempt};
use crate::error::SettlementError;
use crate::verifier::{
    verify_with_timeout, OnChainVerifier, RejectionCode, VerificationResult, VerificationStatus,
};

/// What a caller needs to make the promised payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentReceipt {
    pub attempt_id: AttemptId,
    pub chain_id: ChainId,
    pub recipient_address: ChainAddress,
    /// Exact amount, in smallest on-chain units, the transfer must carry.
    pub amount_raw: u128,
}

/// Client-facing view of an attempt's current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub attempt_id: AttemptId,
    pub status: ClientStatus,
    pub error_code: Option<RejectionCode>,
}

impl StatusReport {
    fn from_attempt(attempt: &PaymentAttempt) -> Self {
        Self {
            attempt_id: attempt.id,
            status: attempt.status.client_status(),
            error_code: attempt.error_code,
        }
    }
}

/// Owns the payment-attempt state machine and its settlement into the ledger.
///
/// Request-parallel by design: every method is a single bounded
/// read/verify/write cycle, and all coordination happens through the stores'
/// atomic operations — the ledger's (account, reference) uniqueness for
/// racing settles, the binding index for (chain, tx-hash) uniqueness. No
/// advisory locks.
pub struct SettlementEngine {
    config: SettlementConfig,
    recipient: ChainAddress,
    attempts: AttemptStore,
    ledger: Arc<CreditLedger>,
    verifier: Arc<dyn OnChainVerifier>,
    clock: Arc<dyn Clock>,
}

impl SettlementEngine {
    /// Create an engine over the given ledger, oracle port, and clock.
    pub fn new(
        config: SettlementConfig,
        ledger: Arc<CreditLedger>,
        verifier: Arc<dyn OnChainVerifier>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, SettlementError> {
        let recipient = config.recipient()?;
        config.token()?;

        Ok(Self {
            config,
            recipient,
            attempts: AttemptStore::new(),
            ledger,
            verifier,
            clock,
        })
    }

    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    /// Create a payment intent: the promise of (amount, chain, recipient).
    ///
    /// Computes the raw on-chain amount with integer arithmetic only, lazily
    /// creates the billing account, and persists a `Created` attempt. No
    /// ledger write happens here — no funds have moved yet.
    pub fn create_intent(
        &self,
        billing_account_id: AccountId,
        owner_id: OwnerId,
        payer_address: &str,
        amount_usd_cents: u64,
    ) -> Result<IntentReceipt, SettlementError> {
        let payer = ChainAddress::parse(payer_address)?;
        let amount_raw = self.config.rates.raw_amount(amount_usd_cents)?;
        let now = self.clock.now();

        self.ledger.ensure_account(billing_account_id, owner_id, now)?;

        let attempt = PaymentAttempt {
            id: AttemptId::new(),
            billing_account_id,
            payer_address: payer,
            amount_usd_cents,
            amount_raw,
            chain_id: self.config.chain_id(),
            recipient_address: self.recipient.clone(),
            tx_hash: None,
            status: AttemptState::Created,
            error_code: None,
            submitted_at: None,
            confirmations: None,
            created_at: now,
        };

        let receipt = IntentReceipt {
            attempt_id: attempt.id,
            chain_id: attempt.chain_id,
            recipient_address: attempt.recipient_address.clone(),
            amount_raw,
        };

        tracing::info!(
            attempt_id = %attempt.id,
            account_id = %billing_account_id,
            amount_usd_cents,
            amount_raw,
            "payment intent created"
        );
        self.attempts.insert(attempt);

        Ok(receipt)
    }

    /// Bind a client-submitted transaction hash and verify immediately.
    ///
    /// Idempotent: re-submitting the same hash, or calling on a terminal
    /// attempt, returns the current result unchanged. A hash already bound
    /// to a different attempt is a conflict.
    pub async fn submit_tx_hash(
        &self,
        attempt_id: AttemptId,
        tx_hash: &str,
        caller_id: OwnerId,
    ) -> Result<StatusReport, SettlementError> {
        let tx_hash = TxHash::parse(tx_hash)?;
        let attempt = self.owned_attempt(attempt_id, caller_id)?;

        if attempt.status.is_final() {
            return Ok(StatusReport::from_attempt(&attempt));
        }

        let (attempt, repeat) = self.attempts.bind_tx_hash(attempt_id, tx_hash, self.clock.now())?;
        if repeat {
            tracing::debug!(attempt_id = %attempt_id, "repeat submission of the same hash");
        }

        let attempt = self.run_verification(attempt).await?;
        Ok(StatusReport::from_attempt(&attempt))
    }

    /// Report the attempt's status, advancing it where due.
    ///
    /// A pending attempt whose receipt window has elapsed fails with
    /// `RECEIPT_NOT_FOUND` without consulting the oracle; otherwise the
    /// verification branch re-runs so confirmations can accrue and the
    /// payment can auto-credit on a later poll.
    pub async fn get_status(
        &self,
        attempt_id: AttemptId,
        caller_id: OwnerId,
    ) -> Result<StatusReport, SettlementError> {
        let attempt = self.owned_attempt(attempt_id, caller_id)?;

        if attempt.status.is_final() || attempt.status == AttemptState::Created {
            return Ok(StatusReport::from_attempt(&attempt));
        }

        if let Some(submitted_at) = attempt.submitted_at {
            if self.clock.now() - submitted_at > self.config.receipt_timeout() {
                // The ledger is the source of truth: a settle that already
                // committed this attempt's entry outranks the timeout, even
                // when the attempt record has not caught up yet.
                if let Some(reference) = attempt.reference() {
                    if self
                        .ledger
                        .find_by_reference(&attempt.billing_account_id, &reference)
                        .is_some()
                    {
                        let credited = self.attempts.mark_credited(
                            attempt.id,
                            attempt.confirmations.unwrap_or(self.config.min_confirmations),
                        )?;
                        return Ok(StatusReport::from_attempt(&credited));
                    }
                }
                let failed = self
                    .attempts
                    .mark_failed(attempt.id, RejectionCode::ReceiptNotFound)?;
                return Ok(StatusReport::from_attempt(&failed));
            }
        }

        let attempt = self.run_verification(attempt).await?;
        Ok(StatusReport::from_attempt(&attempt))
    }

    /// Balance plus entry history, scoped to the caller's own account.
    pub fn ledger_summary(
        &self,
        billing_account_id: AccountId,
        caller_id: OwnerId,
    ) -> Result<LedgerSummary, SettlementError> {
        if self.ledger.account_owner(&billing_account_id) != Some(caller_id) {
            return Err(SettlementError::AccountNotFound(billing_account_id));
        }
        Ok(self.ledger.summary(&billing_account_id)?)
    }

    /// Full attempt record, scoped to the caller (audit view).
    pub fn attempt(
        &self,
        attempt_id: AttemptId,
        caller_id: OwnerId,
    ) -> Result<PaymentAttempt, SettlementError> {
        self.owned_attempt(attempt_id, caller_id)
    }

    /// Fetch an attempt, enforcing tenant scope.
    ///
    /// Another tenant's attempt behaves identically to a missing one.
    fn owned_attempt(
        &self,
        attempt_id: AttemptId,
        caller_id: OwnerId,
    ) -> Result<PaymentAttempt, SettlementError> {
        let attempt = self
            .attempts
            .get(&attempt_id)
            .ok_or(SettlementError::NotFound(attempt_id))?;

        match self.ledger.account_owner(&attempt.billing_account_id) {
            Some(owner) if owner == caller_id => Ok(attempt),
            _ => {
                tracing::debug!(
                    attempt_id = %attempt_id,
                    caller_id = %caller_id,
                    "ownership check failed, reporting not found"
                );
                Err(SettlementError::NotFound(attempt_id))
            }
        }
    }

    /// Ask the oracle about the bound hash and apply the verification branch.
    async fn run_verification(
        &self,
        attempt: PaymentAttempt,
    ) -> Result<PaymentAttempt, SettlementError> {
        let Some(tx_hash) = attempt.tx_hash.clone() else {
            return Ok(attempt);
        };

        let result = verify_with_timeout(
            self.verifier.as_ref(),
            attempt.chain_id,
            &tx_hash,
            self.config.verifier_timeout(),
        )
        .await;

        match result.status {
            VerificationStatus::Pending => {
                self.attempts.record_confirmations(attempt.id, result.confirmations)
            }
            VerificationStatus::Rejected => match result.error_code {
                Some(code) => self.attempts.mark_rejected(attempt.id, code),
                None => {
                    tracing::warn!(
                        attempt_id = %attempt.id,
                        "oracle rejected without a code, treating as pending"
                    );
                    self.attempts.record_confirmations(attempt.id, result.confirmations)
                }
            },
            VerificationStatus::Verified => {
                if let Some(code) = Self::first_mismatch(&attempt, &result) {
                    self.attempts.mark_rejected(attempt.id, code)
                } else if result.confirmations < self.config.min_confirmations {
                    tracing::debug!(
                        attempt_id = %attempt.id,
                        confirmations = result.confirmations,
                        required = self.config.min_confirmations,
                        "verified but below confirmation threshold"
                    );
                    self.attempts.record_confirmations(attempt.id, result.confirmations)
                } else {
                    self.settle_attempt(&attempt, &tx_hash, result.confirmations)
                }
            }
        }
    }

    /// Compare oracle actuals against the promised intent.
    ///
    /// First failing check wins: sender, then recipient, then amount. A
    /// verified transfer missing an actual cannot be matched to the promise
    /// and fails that field's check.
    fn first_mismatch(
        attempt: &PaymentAttempt,
        result: &VerificationResult,
    ) -> Option<RejectionCode> {
        if result.actual_from.as_ref() != Some(&attempt.payer_address) {
            return Some(RejectionCode::SenderMismatch);
        }
        if result.actual_to.as_ref() != Some(&attempt.recipient_address) {
            return Some(RejectionCode::RecipientMismatch);
        }
        if result.actual_amount < attempt.amount_raw {
            return Some(RejectionCode::InsufficientAmount);
        }
        None
    }

    /// Grant credits exactly once and mark the attempt credited.
    ///
    /// The ledger's (account, reference) uniqueness is the serialization
    /// point: a racing caller that loses the insert still observes the
    /// committed entry and reports the same outcome.
    fn settle_attempt(
        &self,
        attempt: &PaymentAttempt,
        tx_hash: &TxHash,
        confirmations: u32,
    ) -> Result<PaymentAttempt, SettlementError> {
        let reference = format!("{}:{}", attempt.chain_id, tx_hash);
        let credits = self.config.rates.credits(attempt.amount_usd_cents)?;

        let settlement = self.ledger.settle(
            attempt.billing_account_id,
            &reference,
            credits,
            LedgerReason::OnChainPayment,
            self.clock.now(),
        )?;

        if !settlement.newly_settled {
            tracing::debug!(
                attempt_id = %attempt.id,
                reference = %reference,
                "settle resolved to already-committed entry"
            );
        }

        self.attempts.mark_credited(attempt.id, confirmations)
    }
}
