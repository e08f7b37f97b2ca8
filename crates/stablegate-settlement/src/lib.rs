//! Stablegate Settlement Layer
//!
//! Owns the payment-attempt lifecycle: intent creation, transaction-hash
//! binding, on-chain verification through the [`OnChainVerifier`] port, and
//! atomic settlement into the credit ledger.

pub mod attempt;
pub mod engine;
pub mod error;
pub mod scripted;
pub mod verifier;

pub use attempt::{AttemptStore, PaymentAttempt};
pub use engine::{IntentReceipt, SettlementEngine, StatusReport};
pub use error::SettlementError;
pub use scripted::ScriptedVerifier;
pub use verifier::{
    OnChainVerifier, RejectionCode, VerificationResult, VerificationStatus, VerifierError,
};
