//! Fair value estimation models.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::{MarketId, PriceHistory};
use crate::error::ValuationError;

mod constant;
mod empirical;
mod ou;

pub use constant::ConstantModel;
pub use empirical::EmpiricalModel;
pub use ou::OrnsteinUhlenbeckModel;

/// A point-in-time fair value estimate for one market.
#[derive(Debug, Clone, PartialEq)]
pub struct ValuationEstimate {
    pub market_id: MarketId,
    /// Estimated fair probability, always within [0, 1].
    pub fair_value: Decimal,
    /// Price variance of the window the estimate was fit on. Zero when
    /// the model carries no dispersion information.
    pub variance: Decimal,
    pub computed_at: DateTime<Utc>,
}

/// A deterministic valuation model. Given the same history and clock,
/// an implementation must return the same estimate.
pub trait ValuationModel: Send + Sync {
    fn name(&self) -> &'static str;

    fn estimate(
        &self,
        market_id: &MarketId,
        history: &PriceHistory,
        now: DateTime<Utc>,
    ) -> Result<ValuationEstimate, ValuationError>;
}

pub(crate) fn clamp_probability(value: Decimal) -> Decimal {
    value.clamp(Decimal::ZERO, Decimal::ONE)
}
