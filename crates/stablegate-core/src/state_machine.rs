use std::fmt;

use crate::error::CoreError;

/// The states of a payment-attempt lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum AttemptState {
    /// Intent created; no transaction hash bound yet.
    Created,
    /// Transaction hash bound; awaiting on-chain verification.
    PendingUnverified,
    /// Payment verified and credits granted. Final state.
    Credited,
    /// Payment verified but did not match the intent. Final state.
    Rejected,
    /// No receipt appeared within the timeout window. Final state.
    Failed,
}

impl AttemptState {
    /// Whether this is a final (terminal) state.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Credited | Self::Rejected | Self::Failed)
    }

    /// The client-facing status vocabulary for this state.
    pub fn client_status(&self) -> ClientStatus {
        match self {
            Self::Created => ClientStatus::AwaitingPayment,
            Self::PendingUnverified => ClientStatus::PendingVerification,
            Self::Credited => ClientStatus::Confirmed,
            Self::Rejected => ClientStatus::Rejected,
            Self::Failed => ClientStatus::Failed,
        }
    }
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::PendingUnverified => write!(f, "PendingUnverified"),
            Self::Credited => write!(f, "Credited"),
            Self::Rejected => write!(f, "Rejected"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Status vocabulary exposed to clients by the API layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientStatus {
    AwaitingPayment,
    PendingVerification,
    Confirmed,
    Rejected,
    Failed,
}

impl ClientStatus {
    /// Wire form of the status.
    pub fn as_str(&self) -> &str {
        match self {
            Self::AwaitingPayment => "AWAITING_PAYMENT",
            Self::PendingVerification => "PENDING_VERIFICATION",
            Self::Confirmed => "CONFIRMED",
            Self::Rejected => "REJECTED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for ClientStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Events that trigger attempt state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptEvent {
    /// A transaction hash was bound to the attempt.
    TxSubmitted,
    /// The verifier confirmed a matching transfer with enough confirmations.
    Verified,
    /// The verifier reported a mismatch or an invalid transfer.
    VerificationRejected,
    /// No receipt appeared within the receipt timeout window.
    ReceiptTimedOut,
}

/// Manages attempt state transitions.
///
/// Valid transitions:
/// - Created → PendingUnverified (TxSubmitted)
/// - PendingUnverified → Credited (Verified)
/// - PendingUnverified → Rejected (VerificationRejected)
/// - PendingUnverified → Failed (ReceiptTimedOut)
///
/// Credited, Rejected and Failed are terminal — no transitions out.
pub struct AttemptStateMachine;

impl AttemptStateMachine {
    /// Attempt a state transition based on an event.
    /// Returns the new state on success, or an error for invalid transitions.
    pub fn transition(current: AttemptState, event: AttemptEvent) -> Result<AttemptState, CoreError> {
        let new_state = match (current, event) {
            (AttemptState::Created, AttemptEvent::TxSubmitted) => AttemptState::PendingUnverified,

            (AttemptState::PendingUnverified, AttemptEvent::Verified) => AttemptState::Credited,
            (AttemptState::PendingUnverified, AttemptEvent::VerificationRejected) => {
                AttemptState::Rejected
            }
            (AttemptState::PendingUnverified, AttemptEvent::ReceiptTimedOut) => AttemptState::Failed,

            _ => {
                let target = match event {
                    AttemptEvent::TxSubmitted => AttemptState::PendingUnverified,
                    AttemptEvent::Verified => AttemptState::Credited,
                    AttemptEvent::VerificationRejected => AttemptState::Rejected,
                    AttemptEvent::ReceiptTimedOut => AttemptState::Failed,
                };
                return Err(CoreError::InvalidStateTransition {
                    from: current,
                    to: target,
                });
            }
        };

        tracing::debug!(
            from = %current,
            to = %new_state,
            event = ?event,
            "attempt state transition"
        );

        Ok(new_state)
    }

    /// Check if a transition is valid without performing it.
    pub fn can_transition(current: AttemptState, event: AttemptEvent) -> bool {
        Self::transition(current, event).is_ok()
    }
}
