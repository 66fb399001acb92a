//! Ornstein-Uhlenbeck mean reversion model.
//!
//! Fits the long-run mean and reversion speed from the rolling window and
//! projects the last observation toward the mean:
//!
//!   fair = mu + (last - mu) * exp(-theta * dt)
//!
//! Reversion speed comes from the lag-1 autocorrelation of the window.
//! The fit uses f64 internally; the projected value is clamped to [0, 1]
//! before converting back to `Decimal`.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

use crate::domain::{MarketId, PriceHistory};
use crate::error::ValuationError;

use super::{clamp_probability, ValuationEstimate, ValuationModel};

/// Autocorrelation is clamped into this band so theta stays finite.
const RHO_MIN: f64 = 0.01;
const RHO_MAX: f64 = 0.99;

#[derive(Debug, Clone)]
pub struct OrnsteinUhlenbeckModel {
    min_observations: usize,
}

impl OrnsteinUhlenbeckModel {
    pub fn new(min_observations: usize) -> Self {
        // Fitting the autocorrelation needs at least three points.
        Self {
            min_observations: min_observations.max(3),
        }
    }

    pub fn min_observations(&self) -> usize {
        self.min_observations
    }
}

impl ValuationModel for OrnsteinUhlenbeckModel {
    fn name(&self) -> &'static str {
        "ornstein-uhlenbeck"
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

        let prices: Vec<f64> = history
            .prices()
            .map(|p| p.to_f64().unwrap_or(0.0))
            .collect();
        let n = prices.len();

        let mu = prices.iter().sum::<f64>() / n as f64;

        let mut cov = 0.0;
        let mut var = 0.0;
        for i in 0..n {
            let d = prices[i] - mu;
            var += d * d;
            if i + 1 < n {
                cov += d * (prices[i + 1] - mu);
            }
        }

        let last_point = history.latest().expect("non-empty checked above");
        let last = prices[n - 1];

        let variance = Decimal::from_f64(var / n as f64).unwrap_or(Decimal::ZERO);

        // Flat window: no information beyond the mean itself.
        if var <= f64::EPSILON {
            let fair = Decimal::from_f64(mu).unwrap_or(last_point.price);
            return Ok(ValuationEstimate {
                market_id: market_id.clone(),
                fair_value: clamp_probability(fair),
                variance: Decimal::ZERO,
                computed_at: now,
            });
        }

        let rho = (cov / var).clamp(RHO_MIN, RHO_MAX);
        let sample_dt = mean_sample_interval_secs(history);
        let theta = -rho.ln() / sample_dt;

        let dt = (now - last_point.at).num_milliseconds().max(0) as f64 / 1000.0;
        let fair = mu + (last - mu) * (-theta * dt).exp();

        let fair = Decimal::from_f64(fair).unwrap_or(last_point.price);
        Ok(ValuationEstimate {
            market_id: market_id.clone(),
            fair_value: clamp_probability(fair),
            variance,
            computed_at: now,
        })
    }
}

fn mean_sample_interval_secs(history: &PriceHistory) -> f64 {
    let points: Vec<_> = history.iter().collect();
    let spans: Vec<f64> = points
        .windows(2)
        .map(|w| (w[1].at - w[0].at).num_milliseconds().max(0) as f64 / 1000.0)
        .collect();
    let mean = spans.iter().sum::<f64>() / spans.len().max(1) as f64;
    if mean > 0.0 {
        mean
    } else {
        1.0
    }
}
