//! Fixed fair value model, mainly useful for replay runs and tests.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::{MarketId, PriceHistory};
use crate::error::ValuationError;

use super::{clamp_probability, ValuationEstimate, ValuationModel};

#[derive(Debug, Clone)]
pub struct ConstantModel {
    fair_value: Decimal,
}

impl ConstantModel {
    pub fn new(fair_value: Decimal) -> Self {
        Self {
            fair_value: clamp_probability(fair_value),
        }
    }
}

impl ValuationModel for ConstantModel {
    fn name(&self) -> &'static str {
        "constant"
    }

    fn estimate(
        &self,
        market_id: &MarketId,
        _history: &PriceHistory,
        now: DateTime<Utc>,
    ) -> Result<ValuationEstimate, ValuationError> {
        Ok(ValuationEstimate {
            market_id: market_id.clone(),
            fair_value: self.fair_value,
            variance: Decimal::ZERO,
            computed_at: now,
        })
    }
}
