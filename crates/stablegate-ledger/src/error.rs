use stablegate_core::AccountId;

/// Ledger-layer errors.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("billing account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("billing account {0} already exists under a different owner")]
    OwnerMismatch(AccountId),

    #[error("insufficient balance: available {available}, required {required}")]
    InsufficientBalance { available: i128, required: i128 },

    #[error("invalid ledger delta: {0}")]
    InvalidDelta(String),

    #[error("balance overflow for account {0}")]
    BalanceOverflow(AccountId),
}
