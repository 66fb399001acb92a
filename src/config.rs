//! Configuration: TOML file, defaults, environment overrides.

use std::path::Path;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use crate::error::ConfigError;
use crate::exec::Mode;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedSource {
    Synthetic,
    Replay,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeedConfig {
    #[serde(default = "default_feed_source")]
    pub source: FeedSource,
    #[serde(default = "default_markets")]
    pub markets: Vec<String>,
    /// Recording file for the replay source.
    #[serde(default)]
    pub replay_path: Option<String>,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DetectionConfig {
    #[serde(default = "default_min_edge")]
    pub min_edge_threshold: Decimal,
    #[serde(default = "default_min_size")]
    pub min_size_threshold: Decimal,
    #[serde(default = "default_min_observations")]
    pub min_observations: usize,
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RiskConfig {
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_period_ms: u64,
    #[serde(default = "default_per_market_cap")]
    pub per_market_cap: Decimal,
    #[serde(default = "default_global_cap")]
    pub global_cap: Decimal,
    #[serde(default = "default_staleness_ms")]
    pub staleness_window_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutionConfig {
    #[serde(default = "default_mode")]
    pub mode: Mode,
    #[serde(default = "default_queue_depth")]
    pub scheduler_queue_depth: usize,
    #[serde(default = "default_accounts")]
    pub accounts: Vec<String>,
    #[serde(default = "default_priority_fee")]
    pub gas_priority_fee: Decimal,
    #[serde(default = "default_priority_bound")]
    pub gas_priority_bound: Decimal,
    #[serde(default = "default_confirmation_timeout_ms")]
    pub confirmation_timeout_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub confirmation_poll_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    #[serde(default = "default_log_filter")]
    pub filter: String,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Pretty,
    Json,
}

fn default_feed_source() -> FeedSource {
    FeedSource::Synthetic
}
fn default_markets() -> Vec<String> {
    vec!["demo-market".to_string()]
}
fn default_tick_interval_ms() -> u64 {
    250
}
fn default_seed() -> u64 {
    0
}
fn default_min_edge() -> Decimal {
    dec!(0.05)
}
fn default_min_size() -> Decimal {
    dec!(10)
}
fn default_min_observations() -> usize {
    20
}
fn default_history_capacity() -> usize {
    200
}
fn default_cooldown_ms() -> u64 {
    30_000
}
fn default_per_market_cap() -> Decimal {
    dec!(500)
}
fn default_global_cap() -> Decimal {
    dec!(2000)
}
fn default_staleness_ms() -> u64 {
    2_000
}
fn default_mode() -> Mode {
    Mode::DryRun
}
fn default_queue_depth() -> usize {
    8
}
fn default_accounts() -> Vec<String> {
    vec!["primary".to_string()]
}
fn default_priority_fee() -> Decimal {
    dec!(2)
}
fn default_priority_bound() -> Decimal {
    dec!(50)
}
fn default_confirmation_timeout_ms() -> u64 {
    120_000
}
fn default_poll_interval_ms() -> u64 {
    1_000
}
fn default_log_filter() -> String {
    "info".to_string()
}
fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            source: default_feed_source(),
            markets: default_markets(),
            replay_path: None,
            tick_interval_ms: default_tick_interval_ms(),
            seed: default_seed(),
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_edge_threshold: default_min_edge(),
            min_size_threshold: default_min_size(),
            min_observations: default_min_observations(),
            history_capacity: default_history_capacity(),
        }
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            cooldown_period_ms: default_cooldown_ms(),
            per_market_cap: default_per_market_cap(),
            global_cap: default_global_cap(),
            staleness_window_ms: default_staleness_ms(),
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            scheduler_queue_depth: default_queue_depth(),
            accounts: default_accounts(),
            gas_priority_fee: default_priority_fee(),
            gas_priority_bound: default_priority_bound(),
            confirmation_timeout_ms: default_confirmation_timeout_ms(),
            confirmation_poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            format: default_log_format(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feed: FeedConfig::default(),
            detection: DetectionConfig::default(),
            risk: RiskConfig::default(),
            execution: ExecutionConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load from a TOML file, apply environment overrides, validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(mode) = std::env::var("FAIREDGE_MODE") {
            self.execution.mode = match mode.as_str() {
                "dry_run" => Mode::DryRun,
                "live" => Mode::Live,
                other => {
                    return Err(ConfigError::InvalidValue {
                        field: "FAIREDGE_MODE",
                        reason: format!("unknown mode {other:?}"),
                    })
                }
            };
        }
        if let Ok(filter) = std::env::var("FAIREDGE_LOG_FILTER") {
            self.logging.filter = filter;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.detection.min_edge_threshold <= Decimal::ZERO
            || self.detection.min_edge_threshold >= Decimal::ONE
        {
            return Err(ConfigError::InvalidValue {
                field: "detection.min_edge_threshold",
                reason: "must be strictly between 0 and 1".to_string(),
            });
        }
        if self.detection.min_size_threshold <= Decimal::ZERO {
            return Err(ConfigError::InvalidValue {
                field: "detection.min_size_threshold",
                reason: "must be positive".to_string(),
            });
        }
        if self.detection.history_capacity < self.detection.min_observations {
            return Err(ConfigError::InvalidValue {
                field: "detection.history_capacity",
                reason: "must be at least min_observations".to_string(),
            });
        }
        if self.risk.per_market_cap <= Decimal::ZERO || self.risk.global_cap <= Decimal::ZERO {
            return Err(ConfigError::InvalidValue {
                field: "risk.per_market_cap",
                reason: "exposure caps must be positive".to_string(),
            });
        }
        if self.risk.per_market_cap > self.risk.global_cap {
            return Err(ConfigError::InvalidValue {
                field: "risk.global_cap",
                reason: "global cap must be at least the per-market cap".to_string(),
            });
        }
        if self.execution.scheduler_queue_depth == 0 {
            return Err(ConfigError::InvalidValue {
                field: "execution.scheduler_queue_depth",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.execution.accounts.is_empty() {
            return Err(ConfigError::MissingField {
                field: "execution.accounts",
            });
        }
        if self.execution.gas_priority_bound <= Decimal::ZERO {
            return Err(ConfigError::InvalidValue {
                field: "execution.gas_priority_bound",
                reason: "must be positive".to_string(),
            });
        }
        if matches!(self.feed.source, FeedSource::Replay) && self.feed.replay_path.is_none() {
            return Err(ConfigError::MissingField {
                field: "feed.replay_path",
            });
        }
        Ok(())
    }
}

impl LoggingConfig {
    /// Install the global tracing subscriber. `RUST_LOG` wins over the
    /// configured filter.
    pub fn init(&self) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.filter.clone()));
        let builder = tracing_subscriber::fmt().with_env_filter(filter);
        match self.format {
            LogFormat::Json => builder.json().init(),
            LogFormat::Pretty => builder.init(),
        }
    }
}
