//! A scriptable [`OnChainVerifier`] for tests and local development.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use stablegate_core::{ChainId, TxHash};

use crate::verifier::{OnChainVerifier, VerificationResult, VerifierError};

/// Returns canned [`VerificationResult`]s in FIFO order; once the script is
/// exhausted it keeps returning the last scripted result (an oracle keeps
/// reporting the same facts when re-asked). With no script at all it reports
/// `Pending`.
pub struct ScriptedVerifier {
    script: Mutex<VecDeque<VerificationResult>>,
    last: Mutex<Option<VerificationResult>>,
    calls: AtomicUsize,
}

impl ScriptedVerifier {
    /// Create a verifier with an empty script (always `Pending`).
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    /// Queue the next result to return.
    pub fn push(&self, result: VerificationResult) {
        self.script.lock().expect("script lock poisoned").push_back(result);
    }

    /// How many times `verify` has been called.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for ScriptedVerifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OnChainVerifier for ScriptedVerifier {
    async fn verify(
        &self,
        _chain_id: ChainId,
        _tx_hash: &TxHash,
    ) -> Result<VerificationResult, VerifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(next) = self.script.lock().expect("script lock poisoned").pop_front() {
            *self.last.lock().expect("last lock poisoned") = Some(next.clone());
            return Ok(next);
        }

        let last = self.last.lock().expect("last lock poisoned").clone();
        Ok(last.unwrap_or_else(|| VerificationResult::pending(0)))
    }
}
