use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use stablegate_core::{ChainAddress, ChainId, TxHash};

/// Terminal rejection codes surfaced to callers on an attempt.
///
/// All of these are final — the engine never retries an attempt that carries
/// one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionCode {
    /// Transfer came from a wallet other than the one bound to the intent.
    SenderMismatch,
    /// Transfer moved a token other than the accepted stablecoin.
    InvalidToken,
    /// Transfer went to an address other than the custodial address.
    RecipientMismatch,
    /// Transfer amount is below the promised raw amount.
    InsufficientAmount,
    /// No receipt appeared within the receipt timeout window.
    ReceiptNotFound,
}

impl RejectionCode {
    /// Wire form of the code.
    pub fn as_str(&self) -> &str {
        match self {
            Self::SenderMismatch => "SENDER_MISMATCH",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::RecipientMismatch => "RECIPIENT_MISMATCH",
            Self::InsufficientAmount => "INSUFFICIENT_AMOUNT",
            Self::ReceiptNotFound => "RECEIPT_NOT_FOUND",
        }
    }
}

impl fmt::Display for RejectionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What the chain indexer reported for a (chain, tx-hash) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationStatus {
    /// A matching transfer was observed with its actuals populated.
    Verified,
    /// Receipt not yet indexed (or the oracle could not be reached).
    Pending,
    /// The transaction exists but is not a valid transfer for this system.
    Rejected,
}

/// Transfer facts reported by the oracle. Transient — never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub status: VerificationStatus,
    /// Observed sender, when status is Verified.
    pub actual_from: Option<ChainAddress>,
    /// Observed recipient, when status is Verified.
    pub actual_to: Option<ChainAddress>,
    /// Observed amount in smallest on-chain units.
    pub actual_amount: u128,
    /// Confirmations accrued so far.
    pub confirmations: u32,
    /// Rejection code, when status is Rejected.
    pub error_code: Option<RejectionCode>,
}

impl VerificationResult {
    /// A receipt that has not been indexed yet.
    pub fn pending(confirmations: u32) -> Self {
        Self {
            status: VerificationStatus::Pending,
            actual_from: None,
            actual_to: None,
            actual_amount: 0,
            confirmations,
            error_code: None,
        }
    }

    /// An observed transfer with its actuals.
    pub fn verified(
        actual_from: ChainAddress,
        actual_to: ChainAddress,
        actual_amount: u128,
        confirmations: u32,
    ) -> Self {
        Self {
            status: VerificationStatus::Verified,
            actual_from: Some(actual_from),
            actual_to: Some(actual_to),
            actual_amount,
            confirmations,
            error_code: None,
        }
    }

    /// A definitive rejection from the oracle itself.
    pub fn rejected(code: RejectionCode) -> Self {
        Self {
            status: VerificationStatus::Rejected,
            actual_from: None,
            actual_to: None,
            actual_amount: 0,
            confirmations: 0,
            error_code: Some(code),
        }
    }
}

/// Oracle transport/protocol failures.
///
/// These are always transient from the engine's point of view: an
/// unreachable oracle must never cause a false rejection.
#[derive(Debug, thiserror::Error)]
pub enum VerifierError {
    #[error("oracle transport error: {0}")]
    Transport(String),

    #[error("malformed oracle response: {0}")]
    Malformed(String),
}

/// Port to the external chain-indexing oracle.
///
/// `verify` must be idempotent and side-effect-free; the engine calls it
/// arbitrarily many times for the same transaction hash as confirmations
/// accrue.
#[async_trait]
pub trait OnChainVerifier: Send + Sync {
    async fn verify(
        &self,
        chain_id: ChainId,
        tx_hash: &TxHash,
    ) -> Result<VerificationResult, VerifierError>;
}

/// Call the oracle with a bounded timeout.
///
/// An elapsed timeout or a transport error degrades to `Pending`: the client
/// will poll again and the receipt window still bounds the attempt.
pub async fn verify_with_timeout(
    verifier: &dyn OnChainVerifier,
    chain_id: ChainId,
    tx_hash: &TxHash,
    timeout: Duration,
) -> VerificationResult {
    match tokio::time::timeout(timeout, verifier.verify(chain_id, tx_hash)).await {
        Ok(Ok(result)) => result,
        Ok(Err(err)) => {
            tracing::warn!(%chain_id, %tx_hash, error = %err, "oracle error, treating as pending");
            VerificationResult::pending(0)
        }
        Err(_) => {
            tracing::warn!(%chain_id, %tx_hash, timeout_ms = timeout.as_millis() as u64, "oracle call timed out, treating as pending");
            VerificationResult::pending(0)
        }
    }
}
