//! Synthetic feed: mean-reverting random walk for local dry runs.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use crate::error::FeedError;

use super::{MarketFeed, RawTick};

const THETA: f64 = 0.1;
const SIGMA: f64 = 0.04;
const PRICE_FLOOR: f64 = 0.05;
const PRICE_CEIL: f64 = 0.95;
const SPREAD: f64 = 0.02;

struct MarketWalk {
    market_id: String,
    mu: f64,
    price: f64,
}

/// Emits a yes and a no tick per market per step, each market following
/// an independent mean-reverting walk. A fixed seed makes a run
/// reproducible.
pub struct SyntheticFeed {
    walks: Vec<MarketWalk>,
    rng: StdRng,
    interval: Duration,
    pending: VecDeque<RawTick>,
    next_walk: usize,
}

impl SyntheticFeed {
    pub fn new(markets: Vec<String>, interval: Duration, seed: u64) -> Self {
        let walks = markets
            .into_iter()
            .map(|market_id| MarketWalk {
                market_id,
                mu: 0.5,
                price: 0.5,
            })
            .collect();
        Self {
            walks,
            rng: StdRng::seed_from_u64(seed),
            interval,
            pending: VecDeque::new(),
            next_walk: 0,
        }
    }

    fn step(&mut self) {
        if self.walks.is_empty() {
            return;
        }
        let noise = gaussian(&mut self.rng) * SIGMA;
        let index = self.next_walk;
        self.next_walk = (self.next_walk + 1) % self.walks.len();
        let walk = &mut self.walks[index];

        walk.price += THETA * (walk.mu - walk.price) + noise;
        walk.price = walk.price.clamp(PRICE_FLOOR, PRICE_CEIL);

        let now = Utc::now();
        let yes = walk.price;
        let no = (1.0 - walk.price - SPREAD).clamp(PRICE_FLOOR, PRICE_CEIL);
        let size = 100.0 + self.rng.gen::<f64>() * 400.0;

        for (side, price) in [("yes", yes), ("no", no)] {
            self.pending.push_back(RawTick {
                market_id: Some(walk.market_id.clone()),
                side: Some(side.to_string()),
                price: Decimal::from_f64(price).map(|p| p.round_dp(4)),
                size: Decimal::from_f64(size).map(|s| s.round_dp(2)),
                observed_at: Some(now),
            });
        }
    }
}

fn gaussian(rng: &mut StdRng) -> f64 {
    // Box-Muller transform over two uniforms.
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

#[async_trait]
impl MarketFeed for SyntheticFeed {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    async fn next_tick(&mut self) -> Result<Option<RawTick>, FeedError> {
        if self.walks.is_empty() {
            return Ok(None);
        }
        if self.pending.is_empty() {
            if !self.interval.is_zero() {
                tokio::time::sleep(self.interval).await;
            }
            self.step();
        }
        Ok(self.pending.pop_front())
    }
}
