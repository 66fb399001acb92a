//! Pure risk accounting: exposure ledger, cooldowns, staleness.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tracing::warn;

use crate::domain::{MarketId, Opportunity, OpportunityId};
use crate::error::RiskRejection;

#[derive(Debug, Clone)]
pub struct RiskLimits {
    pub per_market_cap: Decimal,
    pub global_cap: Decimal,
    pub cooldown: Duration,
    pub staleness_window: Duration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Exposure {
    reserved: Decimal,
    committed: Decimal,
}

impl Exposure {
    fn total(&self) -> Decimal {
        self.reserved + self.committed
    }
}

#[derive(Debug, Clone)]
struct Reservation {
    market_id: MarketId,
    notional: Decimal,
}

/// A read-only view of the ledger, taken under the gate's serialization.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskSnapshot {
    pub global_reserved: Decimal,
    pub global_committed: Decimal,
    pub open_reservations: usize,
}

/// Exposure ledger with two-phase accounting. Approval reserves the
/// opportunity's notional; a confirmed execution commits it; a failed
/// or dropped execution releases it. Exposure counts reserved plus
/// committed, so in-flight requests already consume headroom.
#[derive(Debug)]
pub struct RiskState {
    limits: RiskLimits,
    markets: HashMap<MarketId, Exposure>,
    global: Exposure,
    cooling_until: HashMap<MarketId, DateTime<Utc>>,
    reservations: HashMap<OpportunityId, Reservation>,
}

impl RiskState {
    pub fn new(limits: RiskLimits) -> Self {
        Self {
            limits,
            markets: HashMap::new(),
            global: Exposure::default(),
            cooling_until: HashMap::new(),
            reservations: HashMap::new(),
        }
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    /// Evaluate an opportunity against every limit. Checks run in a
    /// fixed order so the reported reason is deterministic: cooldown,
    /// market cap, global cap, staleness. Approval reserves exposure
    /// and starts the market's cooldown immediately.
    pub fn evaluate(
        &mut self,
        opportunity: &Opportunity,
        now: DateTime<Utc>,
    ) -> Result<(), RiskRejection> {
        let market_id = &opportunity.market_id;
        let notional = opportunity.price * opportunity.size;

        if let Some(until) = self.cooling_until.get(market_id) {
            let remaining_ms = (*until - now).num_milliseconds();
            if remaining_ms > 0 {
                return Err(RiskRejection::CooldownActive {
                    market_id: market_id.clone(),
                    remaining_ms,
                });
            }
        }

        let market_current = self
            .markets
            .get(market_id)
            .map(Exposure::total)
            .unwrap_or_default();
        if market_current + notional > self.limits.per_market_cap {
            return Err(RiskRejection::MarketExposureExceeded {
                market_id: market_id.clone(),
                current: market_current,
                additional: notional,
                cap: self.limits.per_market_cap,
            });
        }

        let global_current = self.global.total();
        if global_current + notional > self.limits.global_cap {
            return Err(RiskRejection::GlobalExposureExceeded {
                current: global_current,
                additional: notional,
                cap: self.limits.global_cap,
            });
        }

        let age_ms = opportunity.age_ms(now);
        let window_ms = self.limits.staleness_window.num_milliseconds();
        if age_ms > window_ms {
            return Err(RiskRejection::StaleOpportunity { age_ms, window_ms });
        }

        self.markets.entry(market_id.clone()).or_default().reserved += notional;
        self.global.reserved += notional;
        self.cooling_until
            .insert(market_id.clone(), now + self.limits.cooldown);
        self.reservations.insert(
            opportunity.id,
            Reservation {
                market_id: market_id.clone(),
                notional,
            },
        );
        Ok(())
    }

    /// Convert a reservation into committed exposure. Unknown ids are
    /// ignored so duplicate result deliveries are harmless.
    pub fn commit(&mut self, id: &OpportunityId) {
        let Some(reservation) = self.reservations.remove(id) else {
            warn!(opportunity_id = %id, "commit for unknown reservation");
            return;
        };
        if let Some(exposure) = self.markets.get_mut(&reservation.market_id) {
            exposure.reserved -= reservation.notional;
            exposure.committed += reservation.notional;
        }
        self.global.reserved -= reservation.notional;
        self.global.committed += reservation.notional;
    }

    /// Return a reservation's notional to headroom. Unknown ids are
    /// ignored.
    pub fn release(&mut self, id: &OpportunityId) {
        let Some(reservation) = self.reservations.remove(id) else {
            warn!(opportunity_id = %id, "release for unknown reservation");
            return;
        };
        if let Some(exposure) = self.markets.get_mut(&reservation.market_id) {
            exposure.reserved -= reservation.notional;
        }
        self.global.reserved -= reservation.notional;
    }

    pub fn snapshot(&self) -> RiskSnapshot {
        RiskSnapshot {
            global_reserved: self.global.reserved,
            global_committed: self.global.committed,
            open_reservations: self.reservations.len(),
        }
    }

    /// Whether the market is out of cooldown. Callers still go through
    /// [`RiskState::evaluate`] for the authoritative verdict; this only
    /// answers the eligibility question without mutating anything.
    pub fn is_eligible(&self, market_id: &MarketId, now: DateTime<Utc>) -> bool {
        self.cooling_until
            .get(market_id)
            .map(|until| now >= *until)
            .unwrap_or(true)
    }

    pub fn market_exposure(&self, market_id: &MarketId) -> Decimal {
        self.markets
            .get(market_id)
            .map(Exposure::total)
            .unwrap_or_default()
    }

    pub fn global_exposure(&self) -> Decimal {
        self.global.total()
    }
}
