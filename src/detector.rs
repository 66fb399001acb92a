//! Opportunity detection: fair value against executable taker quotes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, trace};

use crate::domain::{MarketId, Opportunity, PriceHistory, Quote, QuoteCache};
use crate::error::ValuationError;
use crate::model::ValuationModel;

pub struct Detector {
    model: Arc<dyn ValuationModel>,
    min_edge: Decimal,
    min_size: Decimal,
}

impl Detector {
    pub fn new(model: Arc<dyn ValuationModel>, min_edge: Decimal, min_size: Decimal) -> Self {
        Self {
            model,
            min_edge,
            min_size,
        }
    }

    /// Check one market. Valuation runs once; both sides are scored
    /// against it and the better qualifying side wins. Returns `None`
    /// when no side clears the edge and size thresholds.
    pub fn detect(
        &self,
        market_id: &MarketId,
        cache: &QuoteCache,
        history: &PriceHistory,
        now: DateTime<Utc>,
    ) -> Result<Option<Opportunity>, ValuationError> {
        let Some((yes, no)) = cache.get_pair(market_id) else {
            trace!(market_id = %market_id, "one or both sides unquoted");
            return Ok(None);
        };

        let estimate = self.model.estimate(market_id, history, now)?;
        let fair_yes = estimate.fair_value;
        let fair_no = Decimal::ONE - fair_yes;

        let yes_candidate = self.score(&yes, fair_yes);
        let no_candidate = self.score(&no, fair_no);

        // Both sides qualifying at once means the pair is priced
        // inconsistently. Prefer the larger edge, then the larger size;
        // a full tie is ambiguous and takes neither leg.
        let best = match (yes_candidate, no_candidate) {
            (Some(a), Some(b)) => {
                if a.0 > b.0 {
                    Some(a)
                } else if b.0 > a.0 {
                    Some(b)
                } else if a.1.size > b.1.size {
                    Some(a)
                } else if b.1.size > a.1.size {
                    Some(b)
                } else {
                    trace!(market_id = %market_id, "both sides tie exactly, taking neither");
                    None
                }
            }
            (a, None) => a,
            (None, b) => b,
        };

        let Some((edge, quote, fair)) = best else {
            return Ok(None);
        };

        let opportunity = Opportunity::builder()
            .market_id(market_id.clone())
            .side(quote.side)
            .price(quote.price)
            .fair_value(fair)
            .size(quote.size)
            .detected_at(now)
            .build()
            .map_err(|e| {
                // The scorer only passes strictly positive edges and
                // sizes, so a build failure here is a bug in the scoring.
                unreachable!("detector produced an invalid opportunity: {e}")
            })?;

        debug!(
            market_id = %market_id,
            side = %opportunity.side,
            %edge,
            price = %opportunity.price,
            fair = %opportunity.fair_value,
            "opportunity detected"
        );
        Ok(Some(opportunity))
    }

    fn score(&self, quote: &Quote, fair: Decimal) -> Option<(Decimal, Quote, Decimal)> {
        let edge = fair - quote.price;
        // An opportunity needs a strictly positive edge and size even
        // when the configured thresholds would let zero through.
        if edge <= Decimal::ZERO || quote.size <= Decimal::ZERO {
            return None;
        }
        if edge >= self.min_edge && quote.size >= self.min_size {
            Some((edge, quote.clone(), fair))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Outcome;
    use crate::model::ConstantModel;
    use rust_decimal_macros::dec;

    fn cache_with(yes_price: Decimal, no_price: Decimal, size: Decimal) -> QuoteCache {
        let cache = QuoteCache::new();
        let now = Utc::now();
        for (side, price) in [(Outcome::Yes, yes_price), (Outcome::No, no_price)] {
            cache.insert(Quote {
                market_id: MarketId::new("m1"),
                side,
                price,
                size,
                observed_at: now,
            });
        }
        cache
    }

    fn detector(fair: Decimal) -> Detector {
        Detector::new(
            Arc::new(ConstantModel::new(fair)),
            dec!(0.05),
            dec!(10),
        )
    }

    #[test]
    fn underpriced_yes_side_is_detected() {
        let cache = cache_with(dec!(0.50), dec!(0.48), dec!(100));
        let history = PriceHistory::new(4);

        let opp = detector(dec!(0.60))
            .detect(&MarketId::new("m1"), &cache, &history, Utc::now())
            .unwrap()
            .unwrap();

        assert_eq!(opp.side, Outcome::Yes);
        assert_eq!(opp.edge, dec!(0.10));
        assert_eq!(opp.price, dec!(0.50));
        assert_eq!(opp.fair_value, dec!(0.60));
    }

    #[test]
    fn no_side_wins_when_its_edge_is_larger() {
        // fair yes 0.40 means fair no 0.60 against a 0.45 no quote.
        let cache = cache_with(dec!(0.50), dec!(0.45), dec!(100));
        let history = PriceHistory::new(4);

        let opp = detector(dec!(0.40))
            .detect(&MarketId::new("m1"), &cache, &history, Utc::now())
            .unwrap()
            .unwrap();

        assert_eq!(opp.side, Outcome::No);
        assert_eq!(opp.edge, dec!(0.15));
    }

    #[test]
    fn sub_threshold_edge_is_ignored() {
        let cache = cache_with(dec!(0.58), dec!(0.50), dec!(100));
        let history = PriceHistory::new(4);

        let opp = detector(dec!(0.60))
            .detect(&MarketId::new("m1"), &cache, &history, Utc::now())
            .unwrap();
        assert!(opp.is_none());
    }

    #[test]
    fn sub_threshold_size_is_ignored() {
        let cache = cache_with(dec!(0.50), dec!(0.48), dec!(5));
        let history = PriceHistory::new(4);

        let opp = detector(dec!(0.60))
            .detect(&MarketId::new("m1"), &cache, &history, Utc::now())
            .unwrap();
        assert!(opp.is_none());
    }

    #[test]
    fn zero_edge_threshold_never_takes_a_fairly_priced_quote() {
        // A zero threshold would admit a zero edge into the builder,
        // which rejects it. The scorer must drop it first.
        let detector = Detector::new(
            Arc::new(ConstantModel::new(dec!(0.50))),
            Decimal::ZERO,
            Decimal::ZERO,
        );
        let cache = cache_with(dec!(0.50), dec!(0.50), dec!(100));
        let history = PriceHistory::new(4);

        let opp = detector
            .detect(&MarketId::new("m1"), &cache, &history, Utc::now())
            .unwrap();
        assert!(opp.is_none());
    }

    #[test]
    fn exact_tie_on_edge_and_size_takes_neither_leg() {
        // fair yes 0.50: both sides are 0.10 under fair at equal size.
        let cache = cache_with(dec!(0.40), dec!(0.40), dec!(100));
        let history = PriceHistory::new(4);

        let opp = detector(dec!(0.50))
            .detect(&MarketId::new("m1"), &cache, &history, Utc::now())
            .unwrap();
        assert!(opp.is_none());
    }

    #[test]
    fn edge_tie_breaks_on_size() {
        let cache = QuoteCache::new();
        let now = Utc::now();
        cache.insert(Quote {
            market_id: MarketId::new("m1"),
            side: Outcome::Yes,
            price: dec!(0.40),
            size: dec!(50),
            observed_at: now,
        });
        cache.insert(Quote {
            market_id: MarketId::new("m1"),
            side: Outcome::No,
            price: dec!(0.40),
            size: dec!(80),
            observed_at: now,
        });
        let history = PriceHistory::new(4);

        let opp = detector(dec!(0.50))
            .detect(&MarketId::new("m1"), &cache, &history, Utc::now())
            .unwrap()
            .unwrap();
        assert_eq!(opp.side, Outcome::No);
        assert_eq!(opp.size, dec!(80));
    }

    #[test]
    fn missing_side_yields_no_opportunity() {
        let cache = QuoteCache::new();
        cache.insert(Quote {
            market_id: MarketId::new("m1"),
            side: Outcome::Yes,
            price: dec!(0.50),
            size: dec!(100),
            observed_at: Utc::now(),
        });
        let history = PriceHistory::new(4);

        let opp = detector(dec!(0.60))
            .detect(&MarketId::new("m1"), &cache, &history, Utc::now())
            .unwrap();
        assert!(opp.is_none());
    }
}
