//! Execution: sequencing, scheduling, and the dry-run and live engines.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::domain::{AccountId, MarketId, Opportunity, OpportunityId};
use crate::error::{ExecutionFailure, SignerError};

mod engine;
mod gas;
mod scheduler;
mod sequence;
mod signer;

pub use engine::{DryRunEngine, LiveEngine};
pub use gas::{GasPricer, GasQuote};
pub use scheduler::{Scheduler, SchedulerConfig};
pub use sequence::SequenceTracker;
pub use signer::{TransactionSigner, TxHandle, TxStatus, UnsignedTransaction};

/// Execution mode. Dry run simulates fills locally and never touches
/// the signer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    DryRun,
    Live,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::DryRun => f.write_str("dry_run"),
            Mode::Live => f.write_str("live"),
        }
    }
}

/// An approved opportunity bound to the identity that will execute it.
/// The sequence number is assigned later, at dispatch.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub opportunity: Opportunity,
    pub account: AccountId,
    pub submitted_at: DateTime<Utc>,
}

/// A request bound to its assigned sequence number. Built by the
/// scheduler's worker once the request has survived the staleness
/// re-check, and never mutated afterwards. Requests dropped before
/// this point never carry a number, which keeps the per-identity
/// sequence gapless.
#[derive(Debug, Clone)]
pub struct SequencedRequest {
    pub request: ExecutionRequest,
    pub sequence: u64,
}

/// Details of a confirmed fill.
#[derive(Debug, Clone, PartialEq)]
pub struct Confirmation {
    pub tx_hash: Option<String>,
    pub fill_price: Decimal,
    pub fill_size: Decimal,
    pub gas_paid: Option<Decimal>,
}

/// Terminal outcome of one execution request.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionStatus {
    Confirmed(Confirmation),
    Failed(ExecutionFailure),
    /// Dropped before dispatch; no sequence number was consumed.
    Dropped { reason: String },
}

impl ExecutionStatus {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Confirmed(_) => "confirmed",
            Self::Failed(_) => "failed",
            Self::Dropped { .. } => "dropped",
        }
    }
}

/// Result record delivered back to the pipeline for exposure settlement.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub opportunity_id: OpportunityId,
    pub market_id: MarketId,
    pub account: AccountId,
    pub sequence: Option<u64>,
    pub status: ExecutionStatus,
    pub completed_at: DateTime<Utc>,
}

/// Backend the scheduler's workers execute against.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    fn mode(&self) -> Mode;

    async fn execute(
        &self,
        dispatch: &SequencedRequest,
    ) -> Result<Confirmation, ExecutionFailure>;

    /// The identity's next usable sequence number according to the
    /// authoritative source. Used at startup and for reconciliation.
    async fn account_sequence(&self, account: &AccountId) -> Result<u64, SignerError>;
}
