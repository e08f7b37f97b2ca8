//! Integer-only conversion between USD cents, on-chain raw units, and credits.
//!
//! All arithmetic is checked u128/i128 multiplication. Floating point never
//! appears on any amount path: the promised on-chain amount must be
//! reproducible bit-for-bit by any client from (cents, rate) alone.

use crate::error::CoreError;

/// Conversion rates between the three amount domains.
///
/// Carried in [`crate::config::SettlementConfig`]; the defaults assume a
/// 6-decimal stablecoin (USDC-style), where 1 cent = 10^4 raw units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ConversionRates {
    /// Smallest on-chain token units per USD cent.
    pub raw_units_per_cent: u128,
    /// Internal spend credits granted per USD cent.
    pub credits_per_cent: u64,
}

impl Default for ConversionRates {
    fn default() -> Self {
        Self {
            raw_units_per_cent: 10_000,
            credits_per_cent: 100,
        }
    }
}

impl ConversionRates {
    /// The exact on-chain amount (smallest unit) promised for `amount_usd_cents`.
    pub fn raw_amount(&self, amount_usd_cents: u64) -> Result<u128, CoreError> {
        if amount_usd_cents == 0 {
            return Err(CoreError::InvalidAmount("amount must be positive".into()));
        }
        u128::from(amount_usd_cents)
            .checked_mul(self.raw_units_per_cent)
            .ok_or_else(|| CoreError::AmountOverflow(format!("{} cents to raw units", amount_usd_cents)))
    }

    /// The credit delta granted for `amount_usd_cents`.
    pub fn credits(&self, amount_usd_cents: u64) -> Result<i128, CoreError> {
        if amount_usd_cents == 0 {
            return Err(CoreError::InvalidAmount("amount must be positive".into()));
        }
        i128::from(amount_usd_cents)
            .checked_mul(i128::from(self.credits_per_cent))
            .ok_or_else(|| CoreError::AmountOverflow(format!("{} cents to credits", amount_usd_cents)))
    }
}
