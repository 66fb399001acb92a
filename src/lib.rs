//! Fair value taker pipeline for binary prediction markets.
//!
//! Quotes flow from a [`feed`] source through normalization into a
//! shared cache, a [`model`] prices each market, the [`detector`]
//! surfaces mispriced taker opportunities, the [`risk`] gate enforces
//! exposure caps and cooldowns, and [`exec`] serializes approved
//! requests per signing identity before filling them, simulated or
//! live.

pub mod app;
pub mod cli;
pub mod config;
pub mod detector;
pub mod domain;
pub mod error;
pub mod exec;
pub mod feed;
pub mod model;
pub mod notify;
pub mod risk;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;

pub use app::{App, PipelineSummary};
pub use config::Config;
pub use error::{Error, Result};
