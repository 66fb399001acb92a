//! Scripted signer double.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::domain::AccountId;
use crate::error::SignerError;
use crate::exec::{TransactionSigner, TxHandle, TxStatus, UnsignedTransaction};

#[derive(Debug, Clone)]
enum ScriptedOutcome {
    Confirm { gas_paid: Decimal, after_polls: u32 },
    Revert { reason: String },
    StayPending,
}

struct Inner {
    account_sequence: u64,
    sequence_errors: VecDeque<SignerError>,
    base_fee: Decimal,
    broadcast_errors: VecDeque<SignerError>,
    outcome: ScriptedOutcome,
    broadcasts: Vec<UnsignedTransaction>,
    polls: u32,
    sequence_queries: u32,
}

/// In-memory signer whose behavior is scripted per test: broadcast
/// failures are queued and consumed in order, and the confirmation
/// outcome is fixed up front. Every broadcast is recorded.
pub struct MockSigner {
    inner: Mutex<Inner>,
}

impl Default for MockSigner {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSigner {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                account_sequence: 0,
                sequence_errors: VecDeque::new(),
                base_fee: dec!(10),
                broadcast_errors: VecDeque::new(),
                outcome: ScriptedOutcome::Confirm {
                    gas_paid: dec!(12),
                    after_polls: 0,
                },
                broadcasts: Vec::new(),
                polls: 0,
                sequence_queries: 0,
            }),
        }
    }

    pub fn set_account_sequence(&self, sequence: u64) {
        self.inner.lock().account_sequence = sequence;
    }

    pub fn set_base_fee(&self, base_fee: Decimal) {
        self.inner.lock().base_fee = base_fee;
    }

    /// Queue a failure for the next broadcast attempt.
    pub fn push_broadcast_error(&self, error: SignerError) {
        self.inner.lock().broadcast_errors.push_back(error);
    }

    /// Queue a failure for the next account sequence query.
    pub fn push_sequence_error(&self, error: SignerError) {
        self.inner.lock().sequence_errors.push_back(error);
    }

    pub fn confirm_after_polls(&self, polls: u32) {
        self.inner.lock().outcome = ScriptedOutcome::Confirm {
            gas_paid: dec!(12),
            after_polls: polls,
        };
    }

    pub fn revert_with(&self, reason: &str) {
        self.inner.lock().outcome = ScriptedOutcome::Revert {
            reason: reason.to_string(),
        };
    }

    pub fn stay_pending(&self) {
        self.inner.lock().outcome = ScriptedOutcome::StayPending;
    }

    pub fn broadcasts(&self) -> Vec<UnsignedTransaction> {
        self.inner.lock().broadcasts.clone()
    }

    pub fn sequence_queries(&self) -> u32 {
        self.inner.lock().sequence_queries
    }
}

#[async_trait]
impl TransactionSigner for MockSigner {
    async fn account_sequence(&self, _account: &AccountId) -> Result<u64, SignerError> {
        let mut inner = self.inner.lock();
        inner.sequence_queries += 1;
        if let Some(error) = inner.sequence_errors.pop_front() {
            return Err(error);
        }
        Ok(inner.account_sequence)
    }

    async fn base_fee(&self) -> Result<Decimal, SignerError> {
        Ok(self.inner.lock().base_fee)
    }

    async fn sign_and_broadcast(
        &self,
        tx: &UnsignedTransaction,
    ) -> Result<TxHandle, SignerError> {
        let mut inner = self.inner.lock();
        inner.broadcasts.push(tx.clone());
        if let Some(error) = inner.broadcast_errors.pop_front() {
            return Err(error);
        }
        inner.account_sequence = inner.account_sequence.max(tx.sequence + 1);
        Ok(TxHandle(format!("0xtx{:04}", inner.broadcasts.len())))
    }

    async fn transaction_status(&self, _handle: &TxHandle) -> Result<TxStatus, SignerError> {
        let mut inner = self.inner.lock();
        inner.polls += 1;
        match &inner.outcome {
            ScriptedOutcome::Confirm { gas_paid, after_polls } => {
                if inner.polls > *after_polls {
                    Ok(TxStatus::Confirmed { gas_paid: *gas_paid })
                } else {
                    Ok(TxStatus::Pending)
                }
            }
            ScriptedOutcome::Revert { reason } => Ok(TxStatus::Reverted {
                reason: reason.clone(),
            }),
            ScriptedOutcome::StayPending => Ok(TxStatus::Pending),
        }
    }
}
