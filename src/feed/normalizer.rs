//! Tick validation and translation into the shared quote cache.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::debug;

use crate::domain::{Market, MarketId, Outcome, PriceHistory, Quote, QuoteCache};
use crate::error::FeedError;

use super::RawTick;

/// Validates raw ticks and maintains the market registry, the quote
/// cache, and the rolling price history each market's valuation runs
/// against. Owned by the ingest task; only the cache is shared.
pub struct Normalizer {
    cache: Arc<QuoteCache>,
    markets: HashMap<MarketId, Market>,
    histories: HashMap<MarketId, PriceHistory>,
    history_capacity: usize,
}

impl Normalizer {
    pub fn new(cache: Arc<QuoteCache>, history_capacity: usize) -> Self {
        Self {
            cache,
            markets: HashMap::new(),
            histories: HashMap::new(),
            history_capacity,
        }
    }

    /// Validate a tick, publish the quote, and record the yes equivalent
    /// price into the market's history. Malformed ticks are rejected
    /// without touching any state.
    pub fn ingest(&mut self, tick: RawTick, now: DateTime<Utc>) -> Result<Quote, FeedError> {
        let market_id = tick
            .market_id
            .ok_or(FeedError::MissingTickField { field: "market_id" })?;
        let side_raw = tick
            .side
            .ok_or(FeedError::MissingTickField { field: "side" })?;
        let price = tick
            .price
            .ok_or(FeedError::MissingTickField { field: "price" })?;
        let size = tick
            .size
            .ok_or(FeedError::MissingTickField { field: "size" })?;

        let side = match side_raw.as_str() {
            "yes" => Outcome::Yes,
            "no" => Outcome::No,
            _ => {
                return Err(FeedError::UnknownSide {
                    market_id,
                    side: side_raw,
                })
            }
        };

        if price < Decimal::ZERO || price > Decimal::ONE {
            return Err(FeedError::TickFieldOutOfRange {
                market_id,
                field: "price",
                value: price,
            });
        }
        if size < Decimal::ZERO {
            return Err(FeedError::TickFieldOutOfRange {
                market_id,
                field: "size",
                value: size,
            });
        }

        let market_id = MarketId::new(market_id);
        let observed_at = tick.observed_at.unwrap_or(now);

        let quote = Quote {
            market_id: market_id.clone(),
            side,
            price,
            size,
            observed_at,
        };
        self.cache.insert(quote.clone());

        // History tracks the yes probability regardless of which side
        // the tick quoted.
        let yes_price = match side {
            Outcome::Yes => price,
            Outcome::No => Decimal::ONE - price,
        };
        self.markets
            .entry(market_id.clone())
            .or_insert_with(|| Market::new(market_id.clone()))
            .observe(yes_price, size, observed_at);
        self.histories
            .entry(market_id.clone())
            .or_insert_with(|| PriceHistory::new(self.history_capacity))
            .push(yes_price, observed_at);

        debug!(
            market_id = %market_id,
            side = %side,
            %price,
            %size,
            "quote normalized"
        );
        Ok(quote)
    }

    pub fn market(&self, market_id: &MarketId) -> Option<&Market> {
        self.markets.get(market_id)
    }

    pub fn markets(&self) -> impl Iterator<Item = &Market> {
        self.markets.values()
    }

    pub fn history(&self, market_id: &MarketId) -> Option<&PriceHistory> {
        self.histories.get(market_id)
    }

    pub fn cache(&self) -> &Arc<QuoteCache> {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn tick(market: &str, side: &str, price: Decimal, size: Decimal) -> RawTick {
        RawTick {
            market_id: Some(market.to_string()),
            side: Some(side.to_string()),
            price: Some(price),
            size: Some(size),
            observed_at: None,
        }
    }

    fn normalizer() -> Normalizer {
        Normalizer::new(Arc::new(QuoteCache::new()), 16)
    }

    #[test]
    fn valid_tick_reaches_cache_and_history() {
        let mut n = normalizer();
        let now = Utc::now();
        n.ingest(tick("m1", "yes", dec!(0.50), dec!(200)), now)
            .unwrap();

        let cached = n.cache().get(&MarketId::new("m1"), Outcome::Yes).unwrap();
        assert_eq!(cached.price, dec!(0.50));
        assert_eq!(n.history(&MarketId::new("m1")).unwrap().len(), 1);
    }

    #[test]
    fn market_snapshot_refreshes_each_cycle() {
        let mut n = normalizer();
        let first = Utc::now();
        n.ingest(tick("m1", "yes", dec!(0.50), dec!(200)), first)
            .unwrap();
        n.ingest(tick("m1", "yes", dec!(0.55), dec!(150)), Utc::now())
            .unwrap();

        let market = n.market(&MarketId::new("m1")).unwrap();
        assert_eq!(market.taker_price(), Some(dec!(0.55)));
        assert_eq!(market.liquidity(), dec!(150));
        assert_eq!(n.markets().count(), 1);
    }

    #[test]
    fn no_side_records_yes_equivalent_price() {
        let mut n = normalizer();
        n.ingest(tick("m1", "no", dec!(0.30), dec!(50)), Utc::now())
            .unwrap();

        let history = n.history(&MarketId::new("m1")).unwrap();
        assert_eq!(history.latest().unwrap().price, dec!(0.70));
    }

    #[test]
    fn missing_field_rejected_without_state_change() {
        let mut n = normalizer();
        let mut t = tick("m1", "yes", dec!(0.50), dec!(200));
        t.price = None;

        let err = n.ingest(t, Utc::now()).unwrap_err();
        assert!(matches!(err, FeedError::MissingTickField { field: "price" }));
        assert!(n.cache().is_empty());
        assert!(n.history(&MarketId::new("m1")).is_none());
        assert!(n.market(&MarketId::new("m1")).is_none());
    }

    #[test]
    fn out_of_range_price_rejected() {
        let mut n = normalizer();
        let err = n
            .ingest(tick("m1", "yes", dec!(1.20), dec!(200)), Utc::now())
            .unwrap_err();
        assert!(matches!(
            err,
            FeedError::TickFieldOutOfRange { field: "price", .. }
        ));
        assert!(n.cache().is_empty());
    }

    #[test]
    fn unknown_side_rejected() {
        let mut n = normalizer();
        let err = n
            .ingest(tick("m1", "maybe", dec!(0.50), dec!(200)), Utc::now())
            .unwrap_err();
        assert!(matches!(err, FeedError::UnknownSide { .. }));
    }
}
