//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use fairedge::domain::{AccountId, MarketId, Opportunity, Outcome};
use fairedge::exec::{ExecutionRequest, GasPricer, LiveEngine};
use fairedge::risk::RiskLimits;
use fairedge::testkit::MockSigner;

pub fn limits(per_market_cap: Decimal, global_cap: Decimal) -> RiskLimits {
    RiskLimits {
        per_market_cap,
        global_cap,
        cooldown: Duration::seconds(30),
        staleness_window: Duration::seconds(5),
    }
}

/// Yes-side opportunity at 0.50 with the given size: notional is half
/// the size.
pub fn opportunity(market: &str, size: Decimal) -> Opportunity {
    Opportunity::builder()
        .market_id(MarketId::new(market))
        .side(Outcome::Yes)
        .price(dec!(0.50))
        .fair_value(dec!(0.60))
        .size(size)
        .detected_at(Utc::now())
        .build()
        .unwrap()
}

pub fn request(market: &str, account: &str) -> ExecutionRequest {
    ExecutionRequest {
        opportunity: opportunity(market, dec!(100)),
        account: AccountId::new(account),
        submitted_at: Utc::now(),
    }
}

pub fn live_engine(signer: Arc<MockSigner>, timeout: StdDuration) -> LiveEngine {
    LiveEngine::new(
        signer,
        GasPricer::new(dec!(2), dec!(10)),
        timeout,
        StdDuration::from_millis(5),
    )
}
