use crate::state_machine::AttemptState;

/// Core errors shared across the Stablegate crates.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        from: AttemptState,
        to: AttemptState,
    },

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid transaction hash: {0}")]
    InvalidTxHash(String),

    #[error("invalid chain address: {0}")]
    InvalidAddress(String),

    #[error("amount conversion overflow: {0}")]
    AmountOverflow(String),

    #[error("configuration error: {0}")]
    ConfigError(String),
}
