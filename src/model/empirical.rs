//! Rolling mean model: fair value is the average of the window.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::{MarketId, PriceHistory};
use crate::error::ValuationError;

use super::{clamp_probability, ValuationEstimate, ValuationModel};

#[derive(Debug, Clone)]
pub struct EmpiricalModel {
    min_observations: usize,
}

impl EmpiricalModel {
    pub fn new(min_observations: usize) -> Self {
        Self {
            min_observations: min_observations.max(1),
        }
    }
}

impl ValuationModel for EmpiricalModel {
    fn name(&self) -> &'static str {
        "empirical-mean"
    }

    fn estimate(
        &self,
        market_id: &MarketId,
        history: &PriceHistory,
        now: DateTime<Utc>,
    ) -> Result<ValuationEstimate, ValuationError> {
        if history.len() < self.min_observations {
            return Err(ValuationError::InsufficientHistory {
                market_id: market_id.clone(),
                observed: history.len(),
                required: self.min_observations,
            });
        }

        let sum: Decimal = history.prices().sum();
        let count = Decimal::from(history.len());
        let mean = sum / count;
        let variance: Decimal = history
            .prices()
            .map(|p| (p - mean) * (p - mean))
            .sum::<Decimal>()
            / count;

        Ok(ValuationEstimate {
            market_id: market_id.clone(),
            fair_value: clamp_probability(mean),
            variance,
            computed_at: now,
        })
    }
}
