//! Error types for the crate.
//!
//! `RiskRejection` is deliberately separate from the failure errors: a
//! rejected opportunity is an expected control-flow outcome that is
//! reported and never retried, not a fault.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::MarketId;

/// Configuration-related errors with structured variants.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),
}

/// Feed-layer errors. A malformed tick skips the cycle for that market;
/// the market is retried on the next observation.
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("malformed tick: missing field {field}")]
    MissingTickField { field: &'static str },

    #[error("malformed tick for {market_id}: {field} = {value} out of range")]
    TickFieldOutOfRange {
        market_id: String,
        field: &'static str,
        value: Decimal,
    },

    #[error("malformed tick for {market_id}: unrecognized side {side:?}")]
    UnknownSide { market_id: String, side: String },

    #[error("malformed record at line {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },

    #[error("failed to read feed source: {0}")]
    Source(#[source] std::io::Error),

    #[error("failed to decode feed record: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Valuation model errors. Insufficient history excludes the market
/// from detection until enough observations accumulate; it is not fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValuationError {
    #[error("insufficient history for {market_id}: {observed} observations, need {required}")]
    InsufficientHistory {
        market_id: MarketId,
        observed: usize,
        required: usize,
    },
}

/// Reasons the risk gate rejects an opportunity, checked in this order.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RiskRejection {
    #[error("cooldown active for {market_id}: {remaining_ms}ms remaining")]
    CooldownActive {
        market_id: MarketId,
        remaining_ms: i64,
    },

    #[error("market exposure exceeded for {market_id}: {current} + {additional} > {cap}")]
    MarketExposureExceeded {
        market_id: MarketId,
        current: Decimal,
        additional: Decimal,
        cap: Decimal,
    },

    #[error("global exposure exceeded: {current} + {additional} > {cap}")]
    GlobalExposureExceeded {
        current: Decimal,
        additional: Decimal,
        cap: Decimal,
    },

    #[error("opportunity stale: quote observed {age_ms}ms ago, window is {window_ms}ms")]
    StaleOpportunity { age_ms: i64, window_ms: i64 },
}

impl RiskRejection {
    /// Short event label for reporting.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CooldownActive { .. } => "cooldown_active",
            Self::MarketExposureExceeded { .. } => "market_exposure_exceeded",
            Self::GlobalExposureExceeded { .. } => "global_exposure_exceeded",
            Self::StaleOpportunity { .. } => "stale_opportunity",
        }
    }
}

/// Scheduling errors: the request never reaches the execution engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulingError {
    #[error("scheduler saturated for {identity}: queue depth {depth} reached")]
    Saturated { identity: String, depth: usize },

    #[error("identity {identity} awaiting sequence reconciliation")]
    AwaitingReconciliation { identity: String },

    #[error("scheduler for {identity} has shut down")]
    Closed { identity: String },
}

/// Signer/broadcaster port errors.
#[derive(Error, Debug, Clone)]
pub enum SignerError {
    #[error("signing failed: {0}")]
    Signing(String),

    #[error("broadcast rejected: {0}")]
    BroadcastRejected(String),

    #[error("node unreachable: {0}")]
    Unreachable(String),
}

/// Terminal execution failure reasons.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionFailure {
    #[error("broadcast rejected after retry: {reason}")]
    BroadcastRejected { reason: String },

    #[error("transaction reverted on-chain: {reason}")]
    RevertedOnChain { reason: String },

    #[error("confirmation timed out after {timeout_ms}ms; manual reconciliation required")]
    ConfirmationTimeout { timeout_ms: i64 },

    #[error("no quote available for simulated fill")]
    NoQuote,
}

/// What a terminal failure implies for the assigned sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceDisposition {
    /// The number landed on-chain and can never be used again.
    Consumed,
    /// The number was never accepted anywhere and must be reused.
    Unused,
    /// The transaction may still land; nothing can be assumed until the
    /// signer's on-chain view is re-read.
    Unknown,
}

impl ExecutionFailure {
    pub fn sequence_disposition(&self) -> SequenceDisposition {
        match self {
            // A reverted transaction still consumes its nonce.
            Self::RevertedOnChain { .. } => SequenceDisposition::Consumed,
            Self::BroadcastRejected { .. } | Self::NoQuote => SequenceDisposition::Unused,
            Self::ConfirmationTimeout { .. } => SequenceDisposition::Unknown,
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error(transparent)]
    Valuation(#[from] ValuationError),

    #[error(transparent)]
    Scheduling(#[from] SchedulingError),

    #[error(transparent)]
    Signer(#[from] SignerError),

    #[error(transparent)]
    Execution(#[from] ExecutionFailure),

    #[error("risk gate has shut down")]
    RiskGateClosed,
}

pub type Result<T> = std::result::Result<T, Error>;
