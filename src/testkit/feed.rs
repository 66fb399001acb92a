//! Scripted feed double.

use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;

use crate::error::FeedError;
use crate::feed::{MarketFeed, RawTick};

/// Replays a fixed script of ticks, then exhausts.
pub struct ScriptedFeed {
    ticks: VecDeque<RawTick>,
}

impl ScriptedFeed {
    pub fn new(ticks: impl IntoIterator<Item = RawTick>) -> Self {
        Self {
            ticks: ticks.into_iter().collect(),
        }
    }

    /// Both sides of one market at the given yes price, with the no
    /// side priced at the complement.
    pub fn both_sides(market: &str, yes_price: Decimal, size: Decimal) -> Vec<RawTick> {
        let now = Utc::now();
        vec![
            RawTick {
                market_id: Some(market.to_string()),
                side: Some("yes".to_string()),
                price: Some(yes_price),
                size: Some(size),
                observed_at: Some(now),
            },
            RawTick {
                market_id: Some(market.to_string()),
                side: Some("no".to_string()),
                price: Some(Decimal::ONE - yes_price),
                size: Some(size),
                observed_at: Some(now),
            },
        ]
    }
}

#[async_trait]
impl MarketFeed for ScriptedFeed {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn next_tick(&mut self) -> Result<Option<RawTick>, FeedError> {
        Ok(self.ticks.pop_front())
    }
}
