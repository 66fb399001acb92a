//! Gas quoting with a hard priority fee ceiling.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const BUMP_FACTOR: Decimal = dec!(1.5);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GasQuote {
    pub base_fee: Decimal,
    pub priority_fee: Decimal,
}

impl GasQuote {
    pub fn total(&self) -> Decimal {
        self.base_fee + self.priority_fee
    }
}

/// Prices gas for broadcasts. The priority fee starts at the configured
/// value and may be bumped once for a retry, never past the bound.
#[derive(Debug, Clone)]
pub struct GasPricer {
    initial_priority: Decimal,
    priority_bound: Decimal,
}

impl GasPricer {
    pub fn new(initial_priority: Decimal, priority_bound: Decimal) -> Self {
        Self {
            initial_priority: initial_priority.min(priority_bound),
            priority_bound,
        }
    }

    pub fn quote(&self, base_fee: Decimal) -> GasQuote {
        GasQuote {
            base_fee,
            priority_fee: self.initial_priority,
        }
    }

    /// Retry pricing: priority fee times 1.5, capped at the bound.
    pub fn bump(&self, quote: &GasQuote) -> GasQuote {
        GasQuote {
            base_fee: quote.base_fee,
            priority_fee: (quote.priority_fee * BUMP_FACTOR).min(self.priority_bound),
        }
    }
}
