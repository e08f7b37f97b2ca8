//! Stablegate Credit Ledger
//!
//! Append-only store of signed credit deltas per billing account. The ledger
//! is the source of truth for balances: the cached balance is only ever
//! mutated alongside an entry insert, inside the same critical section, and
//! the (account, reference) uniqueness index is the serialization point that
//! makes settlement exactly-once under concurrent access.

pub mod account;
pub mod entry;
pub mod error;
pub mod ledger;

pub use account::BillingAccount;
pub use entry::{CreditLedgerEntry, LedgerSummary};
pub use error::LedgerError;
pub use ledger::{CreditLedger, Settlement};
