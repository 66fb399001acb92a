//! Executable quotes and the shared quote cache.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;

use super::ids::MarketId;
use super::market::Outcome;

/// An immutable observation of executable taker liquidity on one side
/// of a market. Never mutated after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub market_id: MarketId,
    pub side: Outcome,
    pub price: Decimal,
    pub size: Decimal,
    pub observed_at: DateTime<Utc>,
}

impl Quote {
    /// Age of this quote relative to `now`, in milliseconds. Clock skew
    /// that would produce a negative age clamps to zero.
    pub fn age_ms(&self, now: DateTime<Utc>) -> i64 {
        (now - self.observed_at).num_milliseconds().max(0)
    }

    pub fn is_stale(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.age_ms(now) > window.num_milliseconds()
    }
}

/// Latest-wins cache of quotes keyed by market and side. Shared between
/// the normalizer (writer) and detector/engine (readers).
#[derive(Debug, Default)]
pub struct QuoteCache {
    quotes: RwLock<HashMap<(MarketId, Outcome), Quote>>,
}

impl QuoteCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a quote, replacing any prior quote for the same side.
    pub fn insert(&self, quote: Quote) {
        let key = (quote.market_id.clone(), quote.side);
        self.quotes.write().insert(key, quote);
    }

    pub fn get(&self, market_id: &MarketId, side: Outcome) -> Option<Quote> {
        self.quotes
            .read()
            .get(&(market_id.clone(), side))
            .cloned()
    }

    /// Both sides of a market, if both have been observed.
    pub fn get_pair(&self, market_id: &MarketId) -> Option<(Quote, Quote)> {
        let quotes = self.quotes.read();
        let yes = quotes.get(&(market_id.clone(), Outcome::Yes))?;
        let no = quotes.get(&(market_id.clone(), Outcome::No))?;
        Some((yes.clone(), no.clone()))
    }

    pub fn len(&self) -> usize {
        self.quotes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.read().is_empty()
    }
}
