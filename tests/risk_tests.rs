//! Risk gate behavior under concurrency.

mod support;

use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::Barrier;

use fairedge::error::RiskRejection;
use fairedge::risk::RiskGate;

#[tokio::test]
async fn concurrent_submissions_never_overshoot_the_global_cap() {
    // Four 50-notional opportunities against a 100 cap: exactly two may
    // pass no matter how the submissions interleave.
    let gate = RiskGate::spawn(support::limits(dec!(100), dec!(100)));
    let barrier = Arc::new(Barrier::new(4));

    let mut tasks = Vec::new();
    for market in ["m1", "m2", "m3", "m4"] {
        let handle = gate.handle();
        let barrier = Arc::clone(&barrier);
        let opportunity = support::opportunity(market, dec!(100));
        tasks.push(tokio::spawn(async move {
            barrier.wait().await;
            handle.evaluate(opportunity).await.unwrap()
        }));
    }

    let mut approved = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(()) => approved += 1,
            Err(rejection) => {
                assert!(matches!(
                    rejection,
                    RiskRejection::GlobalExposureExceeded { .. }
                ));
            }
        }
    }
    assert_eq!(approved, 2);

    let snapshot = gate.handle().snapshot().await.unwrap();
    assert_eq!(snapshot.global_reserved, dec!(100));
    gate.shutdown().await;
}

#[tokio::test]
async fn double_submission_for_one_market_hits_the_cooldown() {
    let gate = RiskGate::spawn(support::limits(dec!(500), dec!(500)));
    let handle = gate.handle();

    handle
        .evaluate(support::opportunity("m1", dec!(100)))
        .await
        .unwrap()
        .unwrap();
    let second = handle
        .evaluate(support::opportunity("m1", dec!(100)))
        .await
        .unwrap();
    assert!(matches!(second, Err(RiskRejection::CooldownActive { .. })));

    gate.shutdown().await;
}

#[tokio::test]
async fn released_exposure_frees_headroom_for_other_markets() {
    let gate = RiskGate::spawn(support::limits(dec!(100), dec!(60)));
    let handle = gate.handle();

    let first = support::opportunity("m1", dec!(100));
    let first_id = first.id;
    handle.evaluate(first).await.unwrap().unwrap();

    // 50 reserved of a 60 cap: the next 50 cannot fit.
    let blocked = handle
        .evaluate(support::opportunity("m2", dec!(100)))
        .await
        .unwrap();
    assert!(matches!(
        blocked,
        Err(RiskRejection::GlobalExposureExceeded { .. })
    ));

    handle.release(first_id).await.unwrap();
    handle
        .evaluate(support::opportunity("m2", dec!(100)))
        .await
        .unwrap()
        .unwrap();

    gate.shutdown().await;
}

#[tokio::test]
async fn committed_exposure_still_counts_against_the_cap() {
    let gate = RiskGate::spawn(support::limits(dec!(100), dec!(60)));
    let handle = gate.handle();

    let first = support::opportunity("m1", dec!(100));
    let first_id = first.id;
    handle.evaluate(first).await.unwrap().unwrap();
    handle.commit(first_id).await.unwrap();

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.global_reserved, Decimal::ZERO);
    assert_eq!(snapshot.global_committed, dec!(50));

    let blocked = handle
        .evaluate(support::opportunity("m2", dec!(100)))
        .await
        .unwrap();
    assert!(matches!(
        blocked,
        Err(RiskRejection::GlobalExposureExceeded { .. })
    ));

    gate.shutdown().await;
}
