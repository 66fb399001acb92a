//! Per-identity execution scheduling.
//!
//! Each identity gets one bounded queue drained by one worker task, so
//! requests for an identity execute strictly one at a time and sequence
//! numbers never race. Submission is non-blocking: a full queue rejects
//! immediately instead of stalling the detection path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::domain::AccountId;
use crate::error::{SchedulingError, SequenceDisposition, SignerError};

use super::sequence::SequenceTracker;
use super::{
    ExecutionBackend, ExecutionRequest, ExecutionResult, ExecutionStatus, SequencedRequest,
};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub queue_depth: usize,
    pub staleness_window: Duration,
    /// Retry interval for sequence reconciliation after a timeout.
    pub reconcile_backoff: std::time::Duration,
}

struct Worker {
    tx: mpsc::Sender<ExecutionRequest>,
    parked: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

pub struct Scheduler {
    backend: Arc<dyn ExecutionBackend>,
    config: SchedulerConfig,
    results: mpsc::Sender<ExecutionResult>,
    workers: HashMap<AccountId, Worker>,
}

impl Scheduler {
    pub fn new(
        backend: Arc<dyn ExecutionBackend>,
        config: SchedulerConfig,
        results: mpsc::Sender<ExecutionResult>,
    ) -> Self {
        Self {
            backend,
            config,
            results,
            workers: HashMap::new(),
        }
    }

    /// Register an identity and spawn its worker. The initial sequence
    /// number comes from the backend's authoritative view, so a restart
    /// resumes from where the chain says.
    pub async fn register(&mut self, account: AccountId) -> Result<(), SignerError> {
        if self.workers.contains_key(&account) {
            return Ok(());
        }
        let initial = self.backend.account_sequence(&account).await?;
        let (tx, rx) = mpsc::channel(self.config.queue_depth);
        let parked = Arc::new(AtomicBool::new(false));
        let tracker = SequenceTracker::new(account.clone(), initial);

        info!(account = %account, initial_sequence = initial, "execution worker started");
        let task = tokio::spawn(worker_loop(
            Arc::clone(&self.backend),
            tracker,
            Arc::clone(&parked),
            self.config.clone(),
            rx,
            self.results.clone(),
        ));
        self.workers.insert(account, Worker { tx, parked, task });
        Ok(())
    }

    /// Enqueue a request for its identity's worker. Never blocks.
    pub fn submit(&self, request: ExecutionRequest) -> Result<(), SchedulingError> {
        let identity = request.account.as_str().to_string();
        let worker = self
            .workers
            .get(&request.account)
            .ok_or_else(|| SchedulingError::Closed {
                identity: identity.clone(),
            })?;

        if worker.parked.load(Ordering::Acquire) {
            return Err(SchedulingError::AwaitingReconciliation { identity });
        }

        worker.tx.try_send(request).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SchedulingError::Saturated {
                identity,
                depth: self.config.queue_depth,
            },
            mpsc::error::TrySendError::Closed(_) => SchedulingError::Closed { identity },
        })
    }

    pub fn is_registered(&self, account: &AccountId) -> bool {
        self.workers.contains_key(account)
    }

    /// Drain all queues and wait for the workers to finish.
    pub async fn shutdown(self) {
        for (account, worker) in self.workers {
            drop(worker.tx);
            if worker.task.await.is_err() {
                warn!(account = %account, "execution worker panicked");
            }
        }
    }
}

async fn worker_loop(
    backend: Arc<dyn ExecutionBackend>,
    mut tracker: SequenceTracker,
    parked: Arc<AtomicBool>,
    config: SchedulerConfig,
    mut rx: mpsc::Receiver<ExecutionRequest>,
    results: mpsc::Sender<ExecutionResult>,
) {
    while let Some(request) = rx.recv().await {
        // Staleness is re-checked at dispatch: an opportunity can age
        // out while queued, and dropping it here consumes no sequence
        // number.
        let now = Utc::now();
        let age_ms = request.opportunity.age_ms(now);
        if age_ms > config.staleness_window.num_milliseconds() {
            let _ = results
                .send(dropped(
                    &request,
                    None,
                    &format!("stale at dispatch: {age_ms}ms old"),
                ))
                .await;
            continue;
        }

        let sequence = match tracker.allocate() {
            Ok(sequence) => sequence,
            Err(error) => {
                let _ = results
                    .send(dropped(&request, None, &error.to_string()))
                    .await;
                continue;
            }
        };
        let dispatch = SequencedRequest { request, sequence };

        let status = match backend.execute(&dispatch).await {
            Ok(confirmation) => {
                tracker.resolve(sequence, true);
                ExecutionStatus::Confirmed(confirmation)
            }
            Err(failure) => {
                match failure.sequence_disposition() {
                    // A reverted transaction still burned its number.
                    SequenceDisposition::Consumed => tracker.resolve(sequence, true),
                    // Nothing was accepted anywhere; the same number is
                    // handed out again on the next request.
                    SequenceDisposition::Unused => tracker.cancel(sequence),
                    SequenceDisposition::Unknown => {
                        tracker.resolve(sequence, false);
                        parked.store(true, Ordering::Release);
                        warn!(
                            account = %tracker.account(),
                            sequence,
                            "confirmation timed out, identity parked for reconciliation"
                        );
                    }
                }
                ExecutionStatus::Failed(failure)
            }
        };

        let result = ExecutionResult {
            opportunity_id: dispatch.request.opportunity.id,
            market_id: dispatch.request.opportunity.market_id.clone(),
            account: dispatch.request.account.clone(),
            sequence: Some(dispatch.sequence),
            status,
            completed_at: Utc::now(),
        };
        if results.send(result).await.is_err() {
            break;
        }

        // A timeout leaves the counter unusable until the authoritative
        // sequence is re-read; no further dispatch until that succeeds.
        if tracker.is_parked() {
            if !reconcile(&*backend, &mut tracker, &mut rx, &results, &config).await {
                return;
            }
            parked.store(false, Ordering::Release);
        }
    }
}

/// Re-read the authoritative sequence until it succeeds, draining any
/// requests that slip in meanwhile as dropped. Returns false when the
/// queue closes first.
async fn reconcile(
    backend: &dyn ExecutionBackend,
    tracker: &mut SequenceTracker,
    rx: &mut mpsc::Receiver<ExecutionRequest>,
    results: &mpsc::Sender<ExecutionResult>,
    config: &SchedulerConfig,
) -> bool {
    loop {
        match backend.account_sequence(tracker.account()).await {
            Ok(authoritative) => {
                info!(
                    account = %tracker.account(),
                    sequence = authoritative,
                    "sequence reconciled"
                );
                tracker.resync(authoritative);
                return true;
            }
            Err(error) => {
                warn!(account = %tracker.account(), %error, "reconciliation failed");
            }
        }
        tokio::select! {
            _ = tokio::time::sleep(config.reconcile_backoff) => {}
            maybe = rx.recv() => match maybe {
                None => return false,
                Some(request) => {
                    let _ = results
                        .send(dropped(&request, None, "awaiting sequence reconciliation"))
                        .await;
                }
            },
        }
    }
}

fn dropped(request: &ExecutionRequest, sequence: Option<u64>, reason: &str) -> ExecutionResult {
    ExecutionResult {
        opportunity_id: request.opportunity.id,
        market_id: request.opportunity.market_id.clone(),
        account: request.account.clone(),
        sequence,
        status: ExecutionStatus::Dropped {
            reason: reason.to_string(),
        },
        completed_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Outcome, QuoteCache};
    use crate::exec::DryRunEngine;
    use crate::testkit;
    use rust_decimal_macros::dec;

    fn config() -> SchedulerConfig {
        SchedulerConfig {
            queue_depth: 4,
            staleness_window: Duration::seconds(5),
            reconcile_backoff: std::time::Duration::from_millis(10),
        }
    }

    fn request(market: &str) -> ExecutionRequest {
        ExecutionRequest {
            opportunity: testkit::opportunity(market),
            account: AccountId::new("acct-1"),
            submitted_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn sequences_advance_without_gaps() {
        let cache = Arc::new(QuoteCache::new());
        cache.insert(testkit::quote("m1", Outcome::Yes, dec!(0.50), dec!(1000)));
        let backend = Arc::new(DryRunEngine::new(cache));
        let (results_tx, mut results_rx) = mpsc::channel(16);

        let mut scheduler = Scheduler::new(backend, config(), results_tx);
        scheduler.register(AccountId::new("acct-1")).await.unwrap();

        for _ in 0..3 {
            scheduler.submit(request("m1")).unwrap();
        }

        let mut sequences = Vec::new();
        for _ in 0..3 {
            let result = results_rx.recv().await.unwrap();
            assert!(result.status.is_confirmed());
            sequences.push(result.sequence.unwrap());
        }
        assert_eq!(sequences, vec![0, 1, 2]);

        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn failed_fill_does_not_consume_a_sequence() {
        let cache = Arc::new(QuoteCache::new());
        let backend = Arc::new(DryRunEngine::new(Arc::clone(&cache)));
        let (results_tx, mut results_rx) = mpsc::channel(16);

        let mut scheduler = Scheduler::new(backend, config(), results_tx);
        scheduler.register(AccountId::new("acct-1")).await.unwrap();

        // No quote cached yet, so the simulated fill fails.
        scheduler.submit(request("m1")).unwrap();
        let failed = results_rx.recv().await.unwrap();
        assert!(matches!(failed.status, ExecutionStatus::Failed(_)));
        assert_eq!(failed.sequence, Some(0));

        // The number was never accepted anywhere; the next request
        // gets it again.
        cache.insert(testkit::quote("m1", Outcome::Yes, dec!(0.50), dec!(1000)));
        scheduler.submit(request("m1")).unwrap();
        let confirmed = results_rx.recv().await.unwrap();
        assert!(confirmed.status.is_confirmed());
        assert_eq!(confirmed.sequence, Some(0));

        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn stale_request_dropped_without_consuming_a_sequence() {
        let cache = Arc::new(QuoteCache::new());
        cache.insert(testkit::quote("m1", Outcome::Yes, dec!(0.50), dec!(1000)));
        let backend = Arc::new(DryRunEngine::new(cache));
        let (results_tx, mut results_rx) = mpsc::channel(16);

        let mut scheduler = Scheduler::new(
            backend,
            SchedulerConfig {
                queue_depth: 4,
                staleness_window: Duration::milliseconds(0),
                reconcile_backoff: std::time::Duration::from_millis(10),
            },
            results_tx,
        );
        scheduler.register(AccountId::new("acct-1")).await.unwrap();

        let mut stale = request("m1");
        stale.opportunity.detected_at = Utc::now() - Duration::seconds(10);
        scheduler.submit(stale).unwrap();

        let result = results_rx.recv().await.unwrap();
        assert!(matches!(result.status, ExecutionStatus::Dropped { .. }));
        assert!(result.sequence.is_none());

        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn unregistered_identity_is_rejected() {
        let backend = Arc::new(DryRunEngine::new(Arc::new(QuoteCache::new())));
        let (results_tx, _results_rx) = mpsc::channel(16);
        let scheduler = Scheduler::new(backend, config(), results_tx);

        let err = scheduler.submit(request("m1")).unwrap_err();
        assert!(matches!(err, SchedulingError::Closed { .. }));
    }
}
