//! Replay feed: deterministic playback of recorded ticks.
//!
//! Two record formats, one tick per line:
//!
//!   observed_at,market_id,side,price,size
//!   {"market_id":"m1","side":"yes","price":"0.50","size":"100",...}
//!
//! `observed_at` is RFC 3339. A header line starting with `observed_at`
//! is skipped. Lines starting with `{` are decoded as JSON ticks.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::error::FeedError;

use super::{MarketFeed, RawTick};

#[derive(Debug)]
pub struct ReplayFeed {
    ticks: Vec<RawTick>,
    cursor: usize,
}

impl ReplayFeed {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, FeedError> {
        let content = std::fs::read_to_string(path).map_err(FeedError::Source)?;
        Self::from_str_content(&content)
    }

    pub fn from_str_content(content: &str) -> Result<Self, FeedError> {
        let mut ticks = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if idx == 0 && line.starts_with("observed_at") {
                continue;
            }
            if line.starts_with('{') {
                ticks.push(serde_json::from_str(line).map_err(FeedError::Decode)?);
            } else {
                ticks.push(parse_record(idx + 1, line)?);
            }
        }
        Ok(Self { ticks, cursor: 0 })
    }

    /// Rewind to the first tick.
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    pub fn has_more(&self) -> bool {
        self.cursor < self.ticks.len()
    }

    /// Fraction of the recording consumed so far, in [0, 1].
    pub fn progress(&self) -> f64 {
        if self.ticks.is_empty() {
            1.0
        } else {
            self.cursor as f64 / self.ticks.len() as f64
        }
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }
}

fn parse_record(line: usize, raw: &str) -> Result<RawTick, FeedError> {
    let fields: Vec<&str> = raw.split(',').map(str::trim).collect();
    if fields.len() != 5 {
        return Err(FeedError::MalformedRecord {
            line,
            reason: format!("expected 5 fields, got {}", fields.len()),
        });
    }

    let observed_at = DateTime::parse_from_rfc3339(fields[0])
        .map_err(|e| FeedError::MalformedRecord {
            line,
            reason: format!("bad timestamp: {e}"),
        })?
        .with_timezone(&Utc);
    let price = Decimal::from_str(fields[3]).map_err(|e| FeedError::MalformedRecord {
        line,
        reason: format!("bad price: {e}"),
    })?;
    let size = Decimal::from_str(fields[4]).map_err(|e| FeedError::MalformedRecord {
        line,
        reason: format!("bad size: {e}"),
    })?;

    Ok(RawTick {
        market_id: Some(fields[1].to_string()),
        side: Some(fields[2].to_string()),
        price: Some(price),
        size: Some(size),
        observed_at: Some(observed_at),
    })
}

#[async_trait]
impl MarketFeed for ReplayFeed {
    fn name(&self) -> &'static str {
        "replay"
    }

    async fn next_tick(&mut self) -> Result<Option<RawTick>, FeedError> {
        let tick = self.ticks.get(self.cursor).cloned();
        if tick.is_some() {
            self.cursor += 1;
        }
        Ok(tick)
    }
}
