//! Market data ingress: feed sources and tick normalization.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::FeedError;

mod normalizer;
mod replay;
mod synthetic;

pub use normalizer::Normalizer;
pub use replay::ReplayFeed;
pub use synthetic::SyntheticFeed;

/// An untrusted tick as it arrives from a source. Every field is
/// optional until the normalizer has validated it.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawTick {
    pub market_id: Option<String>,
    pub side: Option<String>,
    pub price: Option<Decimal>,
    pub size: Option<Decimal>,
    pub observed_at: Option<DateTime<Utc>>,
}

/// A source of raw market ticks. `next_tick` returns `Ok(None)` when
/// the source is exhausted; live sources never exhaust.
#[async_trait]
pub trait MarketFeed: Send {
    fn name(&self) -> &'static str;

    async fn next_tick(&mut self) -> Result<Option<RawTick>, FeedError>;
}
