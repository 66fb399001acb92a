//! Shared test doubles. Compiled for unit tests and behind the
//! `testkit` feature for integration tests.

mod feed;
mod signer;

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::domain::{MarketId, Opportunity, Outcome, Quote};

pub use feed::ScriptedFeed;
pub use signer::MockSigner;

/// A quote with sensible defaults for tests.
pub fn quote(market: &str, side: Outcome, price: Decimal, size: Decimal) -> Quote {
    Quote {
        market_id: MarketId::new(market),
        side,
        price,
        size,
        observed_at: Utc::now(),
    }
}

/// A fresh yes-side opportunity with a 0.10 edge.
pub fn opportunity(market: &str) -> Opportunity {
    Opportunity::builder()
        .market_id(MarketId::new(market))
        .side(Outcome::Yes)
        .price(dec!(0.50))
        .fair_value(dec!(0.60))
        .size(dec!(100))
        .detected_at(Utc::now())
        .build()
        .expect("valid test opportunity")
}
