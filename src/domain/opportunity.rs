//! Detected taker opportunities.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use super::ids::{MarketId, OpportunityId};
use super::market::Outcome;

/// A priced, sized taker opportunity emitted by the detector.
/// Immutable once built; the edge is fixed at detection time.
#[derive(Debug, Clone, PartialEq)]
pub struct Opportunity {
    pub id: OpportunityId,
    pub market_id: MarketId,
    pub side: Outcome,
    /// Taker price the opportunity executes at.
    pub price: Decimal,
    /// Fair value estimate that justified the trade.
    pub fair_value: Decimal,
    /// Absolute edge: fair value minus taker price, always positive.
    pub edge: Decimal,
    /// Notional size to take, bounded by quoted size.
    pub size: Decimal,
    pub detected_at: DateTime<Utc>,
}

impl Opportunity {
    pub fn builder() -> OpportunityBuilder {
        OpportunityBuilder::default()
    }

    pub fn age_ms(&self, now: DateTime<Utc>) -> i64 {
        (now - self.detected_at).num_milliseconds().max(0)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum OpportunityBuildError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("edge is not positive: fair {fair_value} vs price {price}")]
    NonPositiveEdge {
        fair_value: Decimal,
        price: Decimal,
    },
    #[error("size is not positive: {0}")]
    NonPositiveSize(Decimal),
}

#[derive(Debug, Default)]
pub struct OpportunityBuilder {
    market_id: Option<MarketId>,
    side: Option<Outcome>,
    price: Option<Decimal>,
    fair_value: Option<Decimal>,
    size: Option<Decimal>,
    detected_at: Option<DateTime<Utc>>,
}

impl OpportunityBuilder {
    pub fn market_id(mut self, market_id: MarketId) -> Self {
        self.market_id = Some(market_id);
        self
    }

    pub fn side(mut self, side: Outcome) -> Self {
        self.side = Some(side);
        self
    }

    pub fn price(mut self, price: Decimal) -> Self {
        self.price = Some(price);
        self
    }

    pub fn fair_value(mut self, fair_value: Decimal) -> Self {
        self.fair_value = Some(fair_value);
        self
    }

    pub fn size(mut self, size: Decimal) -> Self {
        self.size = Some(size);
        self
    }

    pub fn detected_at(mut self, at: DateTime<Utc>) -> Self {
        self.detected_at = Some(at);
        self
    }

    pub fn build(self) -> Result<Opportunity, OpportunityBuildError> {
        let market_id = self
            .market_id
            .ok_or(OpportunityBuildError::MissingField("market_id"))?;
        let side = self.side.ok_or(OpportunityBuildError::MissingField("side"))?;
        let price = self
            .price
            .ok_or(OpportunityBuildError::MissingField("price"))?;
        let fair_value = self
            .fair_value
            .ok_or(OpportunityBuildError::MissingField("fair_value"))?;
        let size = self.size.ok_or(OpportunityBuildError::MissingField("size"))?;

        let edge = fair_value - price;
        if edge <= Decimal::ZERO {
            return Err(OpportunityBuildError::NonPositiveEdge { fair_value, price });
        }
        if size <= Decimal::ZERO {
            return Err(OpportunityBuildError::NonPositiveSize(size));
        }

        Ok(Opportunity {
            id: OpportunityId::generate(),
            market_id,
            side,
            price,
            fair_value,
            edge,
            size,
            detected_at: self.detected_at.unwrap_or_else(Utc::now),
        })
    }
}
