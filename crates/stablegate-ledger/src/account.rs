use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stablegate_core::{AccountId, OwnerId};

/// One billing account per tenant owner.
///
/// `balance_credits` always equals the sum of all ledger entry amounts for
/// the account; it is never written outside the settle critical section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingAccount {
    /// Account identifier.
    pub id: AccountId,
    /// Tenant owner this account belongs to.
    pub owner_id: OwnerId,
    /// Cached balance (non-negative).
    pub balance_credits: i128,
    /// When the account was lazily created.
    pub created_at: DateTime<Utc>,
}
