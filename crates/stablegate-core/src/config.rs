use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::conversion::ConversionRates;
use crate::error::CoreError;
use crate::types::{ChainAddress, ChainId};

/// Configuration for the settlement engine.
///
/// The confirmation threshold and receipt window are policy knobs, not
/// structural constants: both are expected to differ between chains and
/// deployments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementConfig {
    /// Chain the custodial address lives on.
    pub chain_id: u64,
    /// Custodial address payments must be sent to.
    pub recipient_address: String,
    /// Contract address of the accepted stablecoin.
    pub token_address: String,
    /// Confirmations required before a transfer counts as final.
    pub min_confirmations: u32,
    /// Window after tx submission in which a receipt must appear (seconds).
    pub receipt_timeout_secs: u64,
    /// Bound on a single verifier call (seconds).
    pub verifier_timeout_secs: u64,
    /// Cents ↔ raw-units ↔ credits conversion rates.
    pub rates: ConversionRates,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            chain_id: 8453,
            recipient_address: "0x0000000000000000000000000000000000000000".into(),
            token_address: "0x0000000000000000000000000000000000000000".into(),
            min_confirmations: 12,
            receipt_timeout_secs: 86_400,
            verifier_timeout_secs: 5,
            rates: ConversionRates::default(),
        }
    }
}

impl SettlementConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| CoreError::ConfigError(format!("read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(raw: &str) -> Result<Self, CoreError> {
        toml::from_str(raw).map_err(|e| CoreError::ConfigError(e.to_string()))
    }

    pub fn chain_id(&self) -> ChainId {
        ChainId(self.chain_id)
    }

    /// The custodial address, parsed and normalized.
    pub fn recipient(&self) -> Result<ChainAddress, CoreError> {
        ChainAddress::parse(&self.recipient_address)
    }

    /// The accepted token contract, parsed and normalized.
    pub fn token(&self) -> Result<ChainAddress, CoreError> {
        ChainAddress::parse(&self.token_address)
    }

    pub fn receipt_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.receipt_timeout_secs as i64)
    }

    pub fn verifier_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.verifier_timeout_secs)
    }
}
