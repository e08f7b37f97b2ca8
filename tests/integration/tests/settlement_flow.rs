//! Integration test: Full payment-attempt lifecycle across crates.
//!
//! Drives the settlement engine against the credit ledger with a scripted
//! oracle and a manual clock, covering the verification branches, the lazy
//! receipt timeout, and tenant isolation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use chrono::{Duration, Utc};
use stablegate_core::{
    AccountId, AttemptId, ChainAddress, ChainId, ClientStatus, Clock, LedgerReason, ManualClock,
    OwnerId, SettlementConfig, TxHash,
};
use stablegate_ledger::CreditLedger;
use stablegate_settlement::{
    OnChainVerifier, RejectionCode, ScriptedVerifier, SettlementEngine, SettlementError,
    VerificationResult, VerifierError,
};

const PAYER: &str = "0x1111111111111111111111111111111111111111";
const RECIPIENT: &str = "0x2222222222222222222222222222222222222222";
const TOKEN: &str = "0x3333333333333333333333333333333333333333";

/// Helper: engine wired to a scripted oracle and a manual clock.
/// Returns the engine plus the collaborators the tests assert against.
fn setup() -> (
    Arc<SettlementEngine>,
    Arc<CreditLedger>,
    Arc<ScriptedVerifier>,
    Arc<ManualClock>,
) {
    let config = SettlementConfig {
        chain_id: 8453,
        recipient_address: RECIPIENT.into(),
        token_address: TOKEN.into(),
        min_confirmations: 12,
        ..SettlementConfig::default()
    };
    let ledger = Arc::new(CreditLedger::new());
    let verifier = Arc::new(ScriptedVerifier::new());
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let engine = Arc::new(
        SettlementEngine::new(
            config,
            Arc::clone(&ledger),
            Arc::clone(&verifier) as Arc<dyn OnChainVerifier>,
            Arc::clone(&clock) as Arc<dyn Clock>,
        )
        .expect("engine construction should succeed"),
    );
    (engine, ledger, verifier, clock)
}

fn tx(byte: &str) -> String {
    format!("0x{}", byte.repeat(32))
}

fn addr(raw: &str) -> ChainAddress {
    ChainAddress::parse(raw).expect("valid address")
}

fn verified_ok(amount: u128, confirmations: u32) -> VerificationResult {
    VerificationResult::verified(addr(PAYER), addr(RECIPIENT), amount, confirmations)
}

// =========================================================================
// Happy path: pending, then credited on a later poll
// =========================================================================

#[tokio::test]
async fn test_pending_then_credited() {
    let (engine, ledger, verifier, _clock) = setup();
    let account = AccountId::new();
    let owner = OwnerId::new();

    // $5.00 intent.
    let receipt = engine.create_intent(account, owner, PAYER, 500).unwrap();
    assert_eq!(receipt.amount_raw, 5_000_000);

    // Receipt not yet indexed.
    verifier.push(VerificationResult::pending(0));
    let report = engine
        .submit_tx_hash(receipt.attempt_id, &tx("aa"), owner)
        .await
        .unwrap();
    assert_eq!(report.status, ClientStatus::PendingVerification);
    assert_eq!(ledger.balance(&account), 0);

    // Second poll: verified with enough confirmations — auto-credits.
    verifier.push(verified_ok(5_000_000, 14));
    let report = engine.get_status(receipt.attempt_id, owner).await.unwrap();
    assert_eq!(report.status, ClientStatus::Confirmed);
    assert_eq!(report.error_code, None);

    // Balance increased by exactly cents × credits-per-cent.
    assert_eq!(ledger.balance(&account), 500 * 100);
    assert_eq!(ledger.entries(&account).len(), 1);
}

// =========================================================================
// Bidirectional invariant: Credited ⇔ matching ledger entry
// =========================================================================

#[tokio::test]
async fn test_credited_iff_ledger_entry_exists() {
    let (engine, ledger, verifier, _clock) = setup();
    let account = AccountId::new();
    let owner = OwnerId::new();

    let receipt = engine.create_intent(account, owner, PAYER, 1234).unwrap();
    verifier.push(verified_ok(12_340_000, 20));
    engine
        .submit_tx_hash(receipt.attempt_id, &tx("ab"), owner)
        .await
        .unwrap();

    let attempt = engine.attempt(receipt.attempt_id, owner).unwrap();
    assert!(attempt.status.is_final());

    let reference = attempt.reference().expect("hash is bound");
    let entry = ledger
        .find_by_reference(&account, &reference)
        .expect("credited attempt must have its entry");
    assert_eq!(entry.amount, 1234 * 100);

    // And the converse: a rejected attempt has no entry.
    let receipt2 = engine.create_intent(account, owner, PAYER, 500).unwrap();
    verifier.push(VerificationResult::rejected(RejectionCode::InvalidToken));
    engine
        .submit_tx_hash(receipt2.attempt_id, &tx("cd"), owner)
        .await
        .unwrap();
    let attempt2 = engine.attempt(receipt2.attempt_id, owner).unwrap();
    let reference2 = attempt2.reference().unwrap();
    assert!(ledger.find_by_reference(&account, &reference2).is_none());
}

// =========================================================================
// Verification mismatches
// =========================================================================

#[tokio::test]
async fn test_sender_mismatch_rejected_with_zero_entries() {
    let (engine, ledger, verifier, _clock) = setup();
    let account = AccountId::new();
    let owner = OwnerId::new();

    // Intent for $5; transfer came from the wrong wallet.
    let receipt = engine.create_intent(account, owner, PAYER, 500).unwrap();
    verifier.push(VerificationResult::verified(
        addr("0x9999999999999999999999999999999999999999"),
        addr(RECIPIENT),
        5_000_000,
        20,
    ));

    let report = engine
        .submit_tx_hash(receipt.attempt_id, &tx("aa"), owner)
        .await
        .unwrap();
    assert_eq!(report.status, ClientStatus::Rejected);
    assert_eq!(report.error_code, Some(RejectionCode::SenderMismatch));
    assert!(ledger.entries(&account).is_empty());

    // Terminal — a later poll does not resurrect it.
    verifier.push(verified_ok(5_000_000, 30));
    let report = engine.get_status(receipt.attempt_id, owner).await.unwrap();
    assert_eq!(report.status, ClientStatus::Rejected);
    assert!(ledger.entries(&account).is_empty());
}

#[tokio::test]
async fn test_recipient_and_amount_mismatches() {
    let (engine, _ledger, verifier, _clock) = setup();
    let account = AccountId::new();
    let owner = OwnerId::new();

    // Wrong recipient.
    let r1 = engine.create_intent(account, owner, PAYER, 500).unwrap();
    verifier.push(VerificationResult::verified(
        addr(PAYER),
        addr("0x8888888888888888888888888888888888888888"),
        5_000_000,
        20,
    ));
    let report = engine.submit_tx_hash(r1.attempt_id, &tx("aa"), owner).await.unwrap();
    assert_eq!(report.error_code, Some(RejectionCode::RecipientMismatch));

    // Amount short by one raw unit.
    let r2 = engine.create_intent(account, owner, PAYER, 500).unwrap();
    verifier.push(verified_ok(4_999_999, 20));
    let report = engine.submit_tx_hash(r2.attempt_id, &tx("bb"), owner).await.unwrap();
    assert_eq!(report.error_code, Some(RejectionCode::InsufficientAmount));
}

// =========================================================================
// Duplicate transaction hash across attempts
// =========================================================================

#[tokio::test]
async fn test_duplicate_tx_hash_conflicts() {
    let (engine, ledger, verifier, _clock) = setup();
    let account = AccountId::new();
    let owner = OwnerId::new();

    let first = engine.create_intent(account, owner, PAYER, 500).unwrap();
    verifier.push(verified_ok(5_000_000, 20));
    engine
        .submit_tx_hash(first.attempt_id, &tx("aa"), owner)
        .await
        .unwrap();

    // Same hash on a second attempt — conflict, and the ledger still holds
    // exactly one entry (the first attempt's).
    let second = engine.create_intent(account, owner, PAYER, 500).unwrap();
    let result = engine.submit_tx_hash(second.attempt_id, &tx("aa"), owner).await;
    assert!(matches!(result, Err(SettlementError::TxHashConflict { .. })));
    assert_eq!(ledger.entries(&account).len(), 1);
    assert_eq!(ledger.balance(&account), 50_000);
}

// =========================================================================
// Receipt timeout (lazy, evaluated on read)
// =========================================================================

#[tokio::test]
async fn test_receipt_timeout_after_24h() {
    let (engine, ledger, verifier, clock) = setup();
    let account = AccountId::new();
    let owner = OwnerId::new();

    let receipt = engine.create_intent(account, owner, PAYER, 500).unwrap();
    engine
        .submit_tx_hash(receipt.attempt_id, &tx("aa"), owner)
        .await
        .unwrap();
    let calls_after_submit = verifier.calls();

    // Just inside the window: still pending, oracle consulted again.
    clock.advance(Duration::hours(23));
    let report = engine.get_status(receipt.attempt_id, owner).await.unwrap();
    assert_eq!(report.status, ClientStatus::PendingVerification);
    assert!(verifier.calls() > calls_after_submit);

    // Past the window: fails without needing the oracle to answer.
    let calls_before_timeout = verifier.calls();
    clock.advance(Duration::hours(2));
    let report = engine.get_status(receipt.attempt_id, owner).await.unwrap();
    assert_eq!(report.status, ClientStatus::Failed);
    assert_eq!(report.error_code, Some(RejectionCode::ReceiptNotFound));
    assert_eq!(verifier.calls(), calls_before_timeout);
    assert!(ledger.entries(&account).is_empty());
}

// =========================================================================
// Ownership isolation
// =========================================================================

#[tokio::test]
async fn test_second_tenant_sees_not_found() {
    let (engine, _ledger, verifier, _clock) = setup();
    let owner = OwnerId::new();
    let stranger = OwnerId::new();

    let receipt = engine
        .create_intent(AccountId::new(), owner, PAYER, 500)
        .unwrap();
    verifier.push(verified_ok(5_000_000, 20));
    engine
        .submit_tx_hash(receipt.attempt_id, &tx("aa"), owner)
        .await
        .unwrap();

    // The stranger's calls behave exactly as if the attempt did not exist.
    assert!(matches!(
        engine.get_status(receipt.attempt_id, stranger).await,
        Err(SettlementError::NotFound(_))
    ));
    assert!(matches!(
        engine.submit_tx_hash(receipt.attempt_id, &tx("aa"), stranger).await,
        Err(SettlementError::NotFound(_))
    ));
    assert!(matches!(
        engine.attempt(receipt.attempt_id, stranger),
        Err(SettlementError::NotFound(_))
    ));
}

// =========================================================================
// Idempotent re-submission and racing polls
// =========================================================================

#[tokio::test]
async fn test_repeat_submission_credits_once() {
    let (engine, ledger, verifier, _clock) = setup();
    let account = AccountId::new();
    let owner = OwnerId::new();

    let receipt = engine.create_intent(account, owner, PAYER, 500).unwrap();
    verifier.push(verified_ok(5_000_000, 20));

    for _ in 0..5 {
        let report = engine
            .submit_tx_hash(receipt.attempt_id, &tx("aa"), owner)
            .await
            .unwrap();
        assert_eq!(report.status, ClientStatus::Confirmed);
    }

    assert_eq!(ledger.entries(&account).len(), 1);
    assert_eq!(ledger.balance(&account), 50_000);
}

/// Oracle whose first answer interleaves a status poll that crosses the
/// receipt-timeout boundary while this verification is still in flight,
/// then reports a fully verified transfer.
struct TimeoutRacingVerifier {
    wired: OnceLock<(Arc<SettlementEngine>, AttemptId, OwnerId)>,
    clock: Arc<ManualClock>,
    fired: AtomicBool,
}

#[async_trait::async_trait]
impl OnChainVerifier for TimeoutRacingVerifier {
    async fn verify(
        &self,
        _chain_id: ChainId,
        _tx_hash: &TxHash,
    ) -> Result<VerificationResult, VerifierError> {
        if !self.fired.swap(true, Ordering::SeqCst) {
            let (engine, attempt_id, owner) = self.wired.get().expect("verifier wired").clone();
            self.clock.advance(Duration::hours(25));

            // The racing poll applies the timeout: no entry is committed
            // yet, so the attempt reads Failed at this instant.
            let report = engine.get_status(attempt_id, owner).await.expect("racing poll");
            assert_eq!(report.status, ClientStatus::Failed);
        }
        Ok(verified_ok(5_000_000, 20))
    }
}

#[tokio::test]
async fn test_timeout_poll_during_settlement_reconciles_to_credited() {
    let config = SettlementConfig {
        chain_id: 8453,
        recipient_address: RECIPIENT.into(),
        token_address: TOKEN.into(),
        min_confirmations: 12,
        ..SettlementConfig::default()
    };
    let ledger = Arc::new(CreditLedger::new());
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let verifier = Arc::new(TimeoutRacingVerifier {
        wired: OnceLock::new(),
        clock: Arc::clone(&clock),
        fired: AtomicBool::new(false),
    });
    let engine = Arc::new(
        SettlementEngine::new(
            config,
            Arc::clone(&ledger),
            Arc::clone(&verifier) as Arc<dyn OnChainVerifier>,
            Arc::clone(&clock) as Arc<dyn Clock>,
        )
        .unwrap(),
    );

    let account = AccountId::new();
    let owner = OwnerId::new();
    let receipt = engine.create_intent(account, owner, PAYER, 500).unwrap();
    let _ = verifier
        .wired
        .set((Arc::clone(&engine), receipt.attempt_id, owner));

    // The settle commits after the racing poll failed the attempt; the
    // committed entry wins and the attempt is reconciled to Credited.
    let report = engine
        .submit_tx_hash(receipt.attempt_id, &tx("aa"), owner)
        .await
        .unwrap();
    assert_eq!(report.status, ClientStatus::Confirmed);
    assert_eq!(report.error_code, None);

    assert_eq!(ledger.entries(&account).len(), 1);
    assert_eq!(ledger.balance(&account), 50_000);

    // status == CREDITED iff the reference's entry exists, on every later read.
    let report = engine.get_status(receipt.attempt_id, owner).await.unwrap();
    assert_eq!(report.status, ClientStatus::Confirmed);
    assert_eq!(report.error_code, None);
}

#[tokio::test]
async fn test_timeout_poll_after_committed_entry_reports_confirmed() {
    let (engine, ledger, _verifier, clock) = setup();
    let account = AccountId::new();
    let owner = OwnerId::new();

    let receipt = engine.create_intent(account, owner, PAYER, 500).unwrap();
    engine
        .submit_tx_hash(receipt.attempt_id, &tx("aa"), owner)
        .await
        .unwrap();

    // The entry is committed but the attempt record never caught up (a
    // settling caller that stopped between the two writes).
    let attempt = engine.attempt(receipt.attempt_id, owner).unwrap();
    let reference = attempt.reference().unwrap();
    ledger
        .settle(account, &reference, 50_000, LedgerReason::OnChainPayment, Utc::now())
        .unwrap();

    // A poll past the window must side with the ledger, not the timeout.
    clock.advance(Duration::hours(25));
    let report = engine.get_status(receipt.attempt_id, owner).await.unwrap();
    assert_eq!(report.status, ClientStatus::Confirmed);
    assert_eq!(report.error_code, None);
    assert_eq!(ledger.entries(&account).len(), 1);
}

#[tokio::test]
async fn test_concurrent_polls_settle_exactly_once() {
    let (engine, ledger, verifier, _clock) = setup();
    let account = AccountId::new();
    let owner = OwnerId::new();

    let receipt = engine.create_intent(account, owner, PAYER, 500).unwrap();
    verifier.push(VerificationResult::pending(0));
    engine
        .submit_tx_hash(receipt.attempt_id, &tx("aa"), owner)
        .await
        .unwrap();

    // Every racing poll observes a verified transfer.
    for _ in 0..8 {
        verifier.push(verified_ok(5_000_000, 20));
    }

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let engine = Arc::clone(&engine);
        tasks.push(tokio::spawn(async move {
            engine.get_status(receipt.attempt_id, owner).await
        }));
    }

    for task in tasks {
        let report = task.await.unwrap().unwrap();
        assert_eq!(report.status, ClientStatus::Confirmed);
    }

    // The (account, reference) uniqueness constraint was the only
    // serialization point — and it admitted exactly one entry.
    assert_eq!(ledger.entries(&account).len(), 1);
    assert_eq!(ledger.balance(&account), 50_000);
}
