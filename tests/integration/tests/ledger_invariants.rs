//! Integration test: Ledger invariants under direct and concurrent use.
//!
//! The ledger is the source of truth for balances; these tests drive it
//! directly (without the engine) to pin down idempotency, the balance/entry
//! invariant, and behavior under racing settles.

use std::sync::Arc;

use chrono::Utc;
use stablegate_core::{AccountId, ConversionRates, LedgerReason, OwnerId};
use stablegate_ledger::{CreditLedger, LedgerError};

fn setup() -> (Arc<CreditLedger>, AccountId, OwnerId) {
    let ledger = Arc::new(CreditLedger::new());
    let account = AccountId::new();
    let owner = OwnerId::new();
    ledger.ensure_account(account, owner, Utc::now()).unwrap();
    (ledger, account, owner)
}

// =========================================================================
// Idempotent settlement
// =========================================================================

#[test]
fn test_settle_twice_one_entry_same_balance_after() {
    let (ledger, account, _) = setup();

    let first = ledger
        .settle(account, "8453:0xaaa", 50_000, LedgerReason::OnChainPayment, Utc::now())
        .unwrap();
    let second = ledger
        .settle(account, "8453:0xaaa", 50_000, LedgerReason::OnChainPayment, Utc::now())
        .unwrap();

    assert!(first.newly_settled);
    assert!(!second.newly_settled);
    assert_eq!(first.entry.id, second.entry.id);
    assert_eq!(first.entry.balance_after, second.entry.balance_after);
    assert_eq!(ledger.entries(&account).len(), 1);
}

#[tokio::test]
async fn test_racing_settles_commit_exactly_once() {
    let (ledger, account, _) = setup();

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let ledger = Arc::clone(&ledger);
        tasks.push(tokio::spawn(async move {
            ledger.settle(account, "8453:0xrace", 50_000, LedgerReason::OnChainPayment, Utc::now())
        }));
    }

    let mut fresh = 0;
    for task in tasks {
        let settlement = task.await.unwrap().unwrap();
        assert_eq!(settlement.entry.balance_after, 50_000);
        if settlement.newly_settled {
            fresh += 1;
        }
    }

    // Whichever committed first won; everyone else observed its entry.
    assert_eq!(fresh, 1);
    assert_eq!(ledger.entries(&account).len(), 1);
    assert_eq!(ledger.balance(&account), 50_000);
}

// =========================================================================
// Balance is derived, never drifts
// =========================================================================

#[test]
fn test_balance_always_equals_entry_sum() {
    let (ledger, account, owner) = setup();

    ledger
        .settle(account, "p1", 50_000, LedgerReason::OnChainPayment, Utc::now())
        .unwrap();
    ledger.record_usage(account, owner, "u1", 999, Utc::now()).unwrap();
    ledger
        .settle(account, "p2", 10_000, LedgerReason::OnChainPayment, Utc::now())
        .unwrap();
    ledger.record_usage(account, owner, "u2", 1, Utc::now()).unwrap();

    let entries = ledger.entries(&account);
    let sum: i128 = entries.iter().map(|e| e.amount).sum();
    assert_eq!(ledger.balance(&account), sum);

    // Every snapshot is consistent with its prefix.
    let mut running = 0i128;
    for entry in &entries {
        running += entry.amount;
        assert_eq!(entry.balance_after, running);
    }
}

#[test]
fn test_debit_cannot_drive_balance_negative() {
    let (ledger, account, owner) = setup();
    ledger
        .settle(account, "p1", 100, LedgerReason::OnChainPayment, Utc::now())
        .unwrap();

    let result = ledger.record_usage(account, owner, "u1", 101, Utc::now());
    assert!(matches!(result, Err(LedgerError::InsufficientBalance { .. })));
    assert_eq!(ledger.balance(&account), 100);
}

// =========================================================================
// Numeric exactness across the conversion pipeline
// =========================================================================

#[test]
fn test_conversion_exactness_feeds_ledger() {
    let rates = ConversionRates::default();
    let (ledger, account, _) = setup();

    for (i, cents) in [1u64, 99, 100, 2_000_000].iter().enumerate() {
        let credits = rates.credits(*cents).unwrap();
        assert_eq!(credits, i128::from(*cents) * 100);
        assert_eq!(rates.raw_amount(*cents).unwrap(), u128::from(*cents) * 10_000);

        ledger
            .settle(
                account,
                &format!("ref-{}", i),
                credits,
                LedgerReason::OnChainPayment,
                Utc::now(),
            )
            .unwrap();
    }

    let expected: i128 = [1u64, 99, 100, 2_000_000]
        .iter()
        .map(|c| i128::from(*c) * 100)
        .sum();
    assert_eq!(ledger.balance(&account), expected);
}
