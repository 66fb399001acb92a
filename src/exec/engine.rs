//! Execution engines: simulated fills and live broadcast.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::domain::{AccountId, QuoteCache};
use crate::error::{ExecutionFailure, SignerError};

use super::gas::GasPricer;
use super::signer::{TransactionSigner, TxStatus, UnsignedTransaction};
use super::{Confirmation, ExecutionBackend, Mode, SequencedRequest};

/// Simulates fills against the current quote cache. Holds no signer, so
/// dry runs cannot broadcast anything by construction. Sequence numbers
/// are purely local and start at zero per identity.
pub struct DryRunEngine {
    cache: Arc<QuoteCache>,
    sequences: Mutex<HashMap<AccountId, u64>>,
}

impl DryRunEngine {
    pub fn new(cache: Arc<QuoteCache>) -> Self {
        Self {
            cache,
            sequences: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl ExecutionBackend for DryRunEngine {
    fn mode(&self) -> Mode {
        Mode::DryRun
    }

    async fn execute(
        &self,
        dispatch: &SequencedRequest,
    ) -> Result<Confirmation, ExecutionFailure> {
        let opportunity = &dispatch.request.opportunity;
        let Some(quote) = self.cache.get(&opportunity.market_id, opportunity.side) else {
            return Err(ExecutionFailure::NoQuote);
        };

        // Fill at whatever the book shows now, not at detection price.
        let fill_size = opportunity.size.min(quote.size);
        self.sequences
            .lock()
            .insert(dispatch.request.account.clone(), dispatch.sequence + 1);

        debug!(
            opportunity_id = %opportunity.id,
            market_id = %opportunity.market_id,
            fill_price = %quote.price,
            %fill_size,
            sequence = dispatch.sequence,
            "simulated fill"
        );
        Ok(Confirmation {
            tx_hash: None,
            fill_price: quote.price,
            fill_size,
            gas_paid: None,
        })
    }

    async fn account_sequence(&self, account: &AccountId) -> Result<u64, SignerError> {
        Ok(self.sequences.lock().get(account).copied().unwrap_or(0))
    }
}

/// Broadcasts through the signer port. A rejected broadcast is retried
/// exactly once with a bumped priority fee; confirmation is polled
/// until the timeout.
pub struct LiveEngine {
    signer: Arc<dyn TransactionSigner>,
    gas: GasPricer,
    confirmation_timeout: Duration,
    poll_interval: Duration,
}

impl LiveEngine {
    pub fn new(
        signer: Arc<dyn TransactionSigner>,
        gas: GasPricer,
        confirmation_timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            signer,
            gas,
            confirmation_timeout,
            poll_interval,
        }
    }

    async fn broadcast(
        &self,
        mut tx: UnsignedTransaction,
    ) -> Result<super::signer::TxHandle, ExecutionFailure> {
        let first_quote = super::gas::GasQuote {
            base_fee: tx.base_fee,
            priority_fee: tx.priority_fee,
        };
        match self.signer.sign_and_broadcast(&tx).await {
            Ok(handle) => Ok(handle),
            Err(first) => {
                let bumped = self.gas.bump(&first_quote);
                warn!(
                    account = %tx.account,
                    sequence = tx.sequence,
                    error = %first,
                    retry_priority_fee = %bumped.priority_fee,
                    "broadcast rejected, retrying once with bumped fee"
                );
                tx.priority_fee = bumped.priority_fee;
                self.signer.sign_and_broadcast(&tx).await.map_err(|second| {
                    ExecutionFailure::BroadcastRejected {
                        reason: second.to_string(),
                    }
                })
            }
        }
    }

    async fn await_confirmation(
        &self,
        handle: &super::signer::TxHandle,
    ) -> Result<TxStatus, ExecutionFailure> {
        let deadline = tokio::time::Instant::now() + self.confirmation_timeout;
        loop {
            match self.signer.transaction_status(handle).await {
                Ok(TxStatus::Pending) => {}
                Ok(status) => return Ok(status),
                // Lookup failures count against the same deadline.
                Err(error) => {
                    warn!(tx = %handle, %error, "confirmation lookup failed");
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(ExecutionFailure::ConfirmationTimeout {
                    timeout_ms: self.confirmation_timeout.as_millis() as i64,
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[async_trait]
impl ExecutionBackend for LiveEngine {
    fn mode(&self) -> Mode {
        Mode::Live
    }

    async fn execute(
        &self,
        dispatch: &SequencedRequest,
    ) -> Result<Confirmation, ExecutionFailure> {
        let opportunity = &dispatch.request.opportunity;
        let base_fee =
            self.signer
                .base_fee()
                .await
                .map_err(|e| ExecutionFailure::BroadcastRejected {
                    reason: format!("gas estimation failed: {e}"),
                })?;
        let quote = self.gas.quote(base_fee);

        let tx = UnsignedTransaction {
            account: dispatch.request.account.clone(),
            sequence: dispatch.sequence,
            market_id: opportunity.market_id.clone(),
            side: opportunity.side,
            price: opportunity.price,
            size: opportunity.size,
            base_fee: quote.base_fee,
            priority_fee: quote.priority_fee,
        };

        let handle = self.broadcast(tx).await?;
        match self.await_confirmation(&handle).await? {
            TxStatus::Confirmed { gas_paid } => Ok(Confirmation {
                tx_hash: Some(handle.0),
                fill_price: opportunity.price,
                fill_size: opportunity.size,
                gas_paid: Some(gas_paid),
            }),
            TxStatus::Reverted { reason } => {
                Err(ExecutionFailure::RevertedOnChain { reason })
            }
            TxStatus::Pending => unreachable!("pending is never returned as terminal"),
        }
    }

    async fn account_sequence(&self, account: &AccountId) -> Result<u64, SignerError> {
        self.signer.account_sequence(account).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MarketId, Opportunity, Outcome, Quote};
    use crate::error::SequenceDisposition;
    use crate::exec::ExecutionRequest;
    use crate::testkit::MockSigner;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn dispatch(market: &str, sequence: u64) -> SequencedRequest {
        let opportunity = Opportunity::builder()
            .market_id(MarketId::new(market))
            .side(Outcome::Yes)
            .price(dec!(0.50))
            .fair_value(dec!(0.60))
            .size(dec!(100))
            .build()
            .unwrap();
        SequencedRequest {
            request: ExecutionRequest {
                opportunity,
                account: AccountId::new("acct-1"),
                submitted_at: Utc::now(),
            },
            sequence,
        }
    }

    fn live(signer: Arc<MockSigner>) -> LiveEngine {
        LiveEngine::new(
            signer,
            GasPricer::new(dec!(2), dec!(10)),
            Duration::from_millis(200),
            Duration::from_millis(5),
        )
    }

    #[tokio::test]
    async fn dry_run_fills_at_current_quote() {
        let cache = Arc::new(QuoteCache::new());
        cache.insert(Quote {
            market_id: MarketId::new("m1"),
            side: Outcome::Yes,
            price: dec!(0.52),
            size: dec!(60),
            observed_at: Utc::now(),
        });
        let engine = DryRunEngine::new(cache);

        let confirmation = engine.execute(&dispatch("m1", 0)).await.unwrap();
        assert_eq!(confirmation.fill_price, dec!(0.52));
        assert_eq!(confirmation.fill_size, dec!(60));
        assert!(confirmation.tx_hash.is_none());
        assert!(confirmation.gas_paid.is_none());
    }

    #[tokio::test]
    async fn dry_run_without_quote_fails() {
        let engine = DryRunEngine::new(Arc::new(QuoteCache::new()));
        let err = engine.execute(&dispatch("m1", 0)).await.unwrap_err();
        assert_eq!(err, ExecutionFailure::NoQuote);
    }

    #[tokio::test]
    async fn live_confirms_on_first_broadcast() {
        let signer = Arc::new(MockSigner::new());
        signer.set_base_fee(dec!(20));
        let engine = live(signer.clone());

        let confirmation = engine.execute(&dispatch("m1", 7)).await.unwrap();
        assert!(confirmation.tx_hash.is_some());
        assert_eq!(signer.broadcasts().len(), 1);
        assert_eq!(signer.broadcasts()[0].sequence, 7);
        assert_eq!(signer.broadcasts()[0].priority_fee, dec!(2));
    }

    #[tokio::test]
    async fn live_retries_once_with_bumped_fee() {
        let signer = Arc::new(MockSigner::new());
        signer.push_broadcast_error(SignerError::BroadcastRejected(
            "replacement transaction underpriced".into(),
        ));
        let engine = live(signer.clone());

        engine.execute(&dispatch("m1", 0)).await.unwrap();
        let broadcasts = signer.broadcasts();
        assert_eq!(broadcasts.len(), 2);
        assert_eq!(broadcasts[0].priority_fee, dec!(2));
        assert_eq!(broadcasts[1].priority_fee, dec!(3));
    }

    #[tokio::test]
    async fn live_double_rejection_is_terminal() {
        let signer = Arc::new(MockSigner::new());
        signer.push_broadcast_error(SignerError::BroadcastRejected("nonce too low".into()));
        signer.push_broadcast_error(SignerError::BroadcastRejected("nonce too low".into()));
        let engine = live(signer.clone());

        let err = engine.execute(&dispatch("m1", 0)).await.unwrap_err();
        assert!(matches!(err, ExecutionFailure::BroadcastRejected { .. }));
        assert_eq!(err.sequence_disposition(), SequenceDisposition::Unused);
        assert_eq!(signer.broadcasts().len(), 2);
    }

    #[tokio::test]
    async fn live_revert_is_terminal() {
        let signer = Arc::new(MockSigner::new());
        signer.revert_with("slippage");
        let engine = live(signer);

        let err = engine.execute(&dispatch("m1", 0)).await.unwrap_err();
        assert!(matches!(err, ExecutionFailure::RevertedOnChain { .. }));
    }

    #[tokio::test]
    async fn live_times_out_when_never_confirmed() {
        let signer = Arc::new(MockSigner::new());
        signer.stay_pending();
        let engine = live(signer);

        let err = engine.execute(&dispatch("m1", 0)).await.unwrap_err();
        assert!(matches!(err, ExecutionFailure::ConfirmationTimeout { .. }));
        assert_eq!(err.sequence_disposition(), SequenceDisposition::Unknown);
    }
}
