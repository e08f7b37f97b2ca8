use stablegate_core::{AccountId, AttemptId, ChainId, CoreError, TxHash};
use stablegate_ledger::LedgerError;

/// Settlement-layer errors.
///
/// `NotFound` covers both "no such attempt" and "attempt owned by another
/// tenant" — callers must not be able to distinguish the two.
#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    #[error("payment attempt not found: {0}")]
    NotFound(AttemptId),

    #[error("billing account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("transaction {tx_hash} on chain {chain_id} is already bound to another attempt")]
    TxHashConflict { chain_id: ChainId, tx_hash: TxHash },

    #[error("attempt {0} already has a different transaction hash bound")]
    AlreadyBound(AttemptId),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
