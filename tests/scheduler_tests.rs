//! Sequence discipline across the scheduler and live engine.

mod support;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;

use fairedge::domain::AccountId;
use fairedge::error::{ExecutionFailure, SchedulingError, SignerError};
use fairedge::exec::{ExecutionStatus, Scheduler, SchedulerConfig};
use fairedge::testkit::MockSigner;

fn config(queue_depth: usize) -> SchedulerConfig {
    SchedulerConfig {
        queue_depth,
        staleness_window: Duration::seconds(30),
        reconcile_backoff: StdDuration::from_millis(10),
    }
}

#[tokio::test]
async fn sequences_follow_submission_order_without_gaps() {
    let signer = Arc::new(MockSigner::new());
    let backend = Arc::new(support::live_engine(
        signer.clone(),
        StdDuration::from_secs(1),
    ));
    let (results_tx, mut results_rx) = mpsc::channel(16);
    let mut scheduler = Scheduler::new(backend, config(8), results_tx);
    scheduler.register(AccountId::new("acct-1")).await.unwrap();

    for market in ["m1", "m2", "m3"] {
        scheduler.submit(support::request(market, "acct-1")).unwrap();
    }
    for expected in 0..3u64 {
        let result = results_rx.recv().await.unwrap();
        assert!(result.status.is_confirmed());
        assert_eq!(result.sequence, Some(expected));
    }

    let sequences: Vec<u64> = signer.broadcasts().iter().map(|tx| tx.sequence).collect();
    assert_eq!(sequences, vec![0, 1, 2]);
    scheduler.shutdown().await;
}

#[tokio::test]
async fn restart_resumes_from_the_authoritative_sequence() {
    let signer = Arc::new(MockSigner::new());
    signer.set_account_sequence(7);

    {
        let backend = Arc::new(support::live_engine(
            signer.clone(),
            StdDuration::from_secs(1),
        ));
        let (results_tx, mut results_rx) = mpsc::channel(16);
        let mut scheduler = Scheduler::new(backend, config(8), results_tx);
        scheduler.register(AccountId::new("acct-1")).await.unwrap();
        scheduler.submit(support::request("m1", "acct-1")).unwrap();
        assert!(results_rx.recv().await.unwrap().status.is_confirmed());
        scheduler.shutdown().await;
    }

    // Fresh process: the worker must pick up where the chain says.
    let backend = Arc::new(support::live_engine(
        signer.clone(),
        StdDuration::from_secs(1),
    ));
    let (results_tx, mut results_rx) = mpsc::channel(16);
    let mut scheduler = Scheduler::new(backend, config(8), results_tx);
    scheduler.register(AccountId::new("acct-1")).await.unwrap();
    scheduler.submit(support::request("m2", "acct-1")).unwrap();
    let result = results_rx.recv().await.unwrap();
    assert_eq!(result.sequence, Some(8));

    assert_eq!(
        signer
            .broadcasts()
            .iter()
            .map(|tx| tx.sequence)
            .collect::<Vec<_>>(),
        vec![7, 8]
    );
    scheduler.shutdown().await;
}

#[tokio::test]
async fn rejected_broadcast_frees_its_sequence_for_reuse() {
    let signer = Arc::new(MockSigner::new());
    signer.push_broadcast_error(SignerError::BroadcastRejected("nonce too low".into()));
    signer.push_broadcast_error(SignerError::BroadcastRejected("nonce too low".into()));

    let backend = Arc::new(support::live_engine(
        signer.clone(),
        StdDuration::from_secs(1),
    ));
    let (results_tx, mut results_rx) = mpsc::channel(16);
    let mut scheduler = Scheduler::new(backend, config(8), results_tx);
    scheduler.register(AccountId::new("acct-1")).await.unwrap();

    scheduler.submit(support::request("m1", "acct-1")).unwrap();
    let failed = results_rx.recv().await.unwrap();
    assert!(matches!(
        failed.status,
        ExecutionStatus::Failed(ExecutionFailure::BroadcastRejected { .. })
    ));
    assert_eq!(failed.sequence, Some(0));

    // The node never accepted sequence 0, so the next request takes it.
    scheduler.submit(support::request("m2", "acct-1")).unwrap();
    let confirmed = results_rx.recv().await.unwrap();
    assert!(confirmed.status.is_confirmed());
    assert_eq!(confirmed.sequence, Some(0));

    let sequences: Vec<u64> = signer.broadcasts().iter().map(|tx| tx.sequence).collect();
    assert_eq!(sequences, vec![0, 0, 0]);
    scheduler.shutdown().await;
}

#[tokio::test]
async fn confirmation_timeout_parks_the_identity_until_reconciled() {
    let signer = Arc::new(MockSigner::new());
    signer.stay_pending();

    let backend = Arc::new(support::live_engine(
        signer.clone(),
        StdDuration::from_millis(100),
    ));
    let (results_tx, mut results_rx) = mpsc::channel(16);
    let mut scheduler = Scheduler::new(backend, config(8), results_tx);
    scheduler.register(AccountId::new("acct-1")).await.unwrap();
    // The first reconciliation attempt fails, keeping the identity
    // parked long enough to observe the submission rejection.
    signer.push_sequence_error(SignerError::Unreachable("node down".into()));

    scheduler.submit(support::request("m1", "acct-1")).unwrap();
    let result = results_rx.recv().await.unwrap();
    assert!(matches!(
        result.status,
        ExecutionStatus::Failed(ExecutionFailure::ConfirmationTimeout { .. })
    ));

    let rejected = scheduler.submit(support::request("m2", "acct-1"));
    assert!(matches!(
        rejected,
        Err(SchedulingError::AwaitingReconciliation { .. })
    ));

    // Background retries succeed once the node answers again; the
    // broadcast landed, so the authoritative next sequence is 1.
    signer.confirm_after_polls(0);
    let mut accepted = false;
    for _ in 0..100 {
        if scheduler.submit(support::request("m3", "acct-1")).is_ok() {
            accepted = true;
            break;
        }
        sleep(StdDuration::from_millis(10)).await;
    }
    assert!(accepted, "identity never unparked");

    let result = results_rx.recv().await.unwrap();
    assert!(result.status.is_confirmed());
    assert_eq!(result.sequence, Some(1));

    scheduler.shutdown().await;
}

#[tokio::test]
async fn full_queue_rejects_instead_of_blocking() {
    let signer = Arc::new(MockSigner::new());
    signer.stay_pending();
    let backend = Arc::new(support::live_engine(
        signer.clone(),
        StdDuration::from_millis(300),
    ));
    let (results_tx, mut results_rx) = mpsc::channel(16);
    let mut scheduler = Scheduler::new(backend, config(1), results_tx);
    scheduler.register(AccountId::new("acct-1")).await.unwrap();

    // First request occupies the worker; the second fills the queue.
    scheduler.submit(support::request("m1", "acct-1")).unwrap();
    sleep(StdDuration::from_millis(50)).await;
    scheduler.submit(support::request("m2", "acct-1")).unwrap();

    let saturated = scheduler.submit(support::request("m3", "acct-1"));
    assert!(matches!(
        saturated,
        Err(SchedulingError::Saturated { depth: 1, .. })
    ));

    // Unblock confirmation so shutdown drains quickly.
    signer.confirm_after_polls(0);
    results_rx.recv().await.unwrap();
    results_rx.recv().await.unwrap();
    scheduler.shutdown().await;
}
