//! Market identity and per-cycle observation snapshot.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ids::MarketId;

/// Outcome side of a binary market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Yes,
    No,
}

impl Outcome {
    /// The complementary side of the pair.
    pub fn complement(self) -> Self {
        match self {
            Outcome::Yes => Outcome::No,
            Outcome::No => Outcome::Yes,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Yes => "yes",
            Outcome::No => "no",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A monitored market: immutable identity plus the mutable fields
/// refreshed each observation cycle.
#[derive(Debug, Clone)]
pub struct Market {
    id: MarketId,
    taker_price: Option<Decimal>,
    liquidity: Decimal,
    last_observed: Option<DateTime<Utc>>,
}

impl Market {
    pub fn new(id: MarketId) -> Self {
        Self {
            id,
            taker_price: None,
            liquidity: Decimal::ZERO,
            last_observed: None,
        }
    }

    pub fn id(&self) -> &MarketId {
        &self.id
    }

    /// Best taker price on the YES side from the most recent cycle.
    pub fn taker_price(&self) -> Option<Decimal> {
        self.taker_price
    }

    pub fn liquidity(&self) -> Decimal {
        self.liquidity
    }

    pub fn last_observed(&self) -> Option<DateTime<Utc>> {
        self.last_observed
    }

    /// Refresh the mutable snapshot from a new observation.
    pub fn observe(&mut self, price: Decimal, liquidity: Decimal, at: DateTime<Utc>) {
        self.taker_price = Some(price);
        self.liquidity = liquidity;
        self.last_observed = Some(at);
    }
}
