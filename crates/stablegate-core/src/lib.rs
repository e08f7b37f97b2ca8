//! Stablegate Core
//!
//! Shared types for the Stablegate settlement pipeline: identifiers, chain
//! primitives, the payment-attempt state machine, integer-only amount
//! conversion, the injectable clock, and configuration.

pub mod clock;
pub mod config;
pub mod conversion;
pub mod error;
pub mod state_machine;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SettlementConfig;
pub use conversion::ConversionRates;
pub use error::CoreError;
pub use state_machine::{AttemptEvent, AttemptState, AttemptStateMachine, ClientStatus};
pub use types::{AccountId, AttemptId, ChainAddress, ChainId, EntryId, LedgerReason, OwnerId, TxHash};
