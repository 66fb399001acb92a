//! Single-writer risk gate task.
//!
//! All mutations of the exposure ledger flow through one mpsc channel
//! into one task, so check-and-reserve is atomic: two concurrent
//! submissions can never both pass a cap check against the same
//! headroom.

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::domain::{MarketId, Opportunity, OpportunityId};
use crate::error::{Error, Result, RiskRejection};

use super::state::{RiskLimits, RiskSnapshot, RiskState};

const COMMAND_BUFFER: usize = 64;

enum Command {
    Evaluate {
        opportunity: Box<Opportunity>,
        reply: oneshot::Sender<std::result::Result<(), RiskRejection>>,
    },
    Commit {
        id: OpportunityId,
    },
    Release {
        id: OpportunityId,
    },
    IsEligible {
        market_id: MarketId,
        reply: oneshot::Sender<bool>,
    },
    Snapshot {
        reply: oneshot::Sender<RiskSnapshot>,
    },
}

/// Cloneable handle to the gate task.
#[derive(Clone)]
pub struct RiskGateHandle {
    tx: mpsc::Sender<Command>,
}

impl RiskGateHandle {
    /// Submit an opportunity for approval. `Ok(Ok(()))` means exposure
    /// has been reserved and the market's cooldown armed.
    pub async fn evaluate(
        &self,
        opportunity: Opportunity,
    ) -> Result<std::result::Result<(), RiskRejection>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Evaluate {
                opportunity: Box::new(opportunity),
                reply,
            })
            .await
            .map_err(|_| Error::RiskGateClosed)?;
        rx.await.map_err(|_| Error::RiskGateClosed)
    }

    /// Report a confirmed execution: reservation becomes committed.
    pub async fn commit(&self, id: OpportunityId) -> Result<()> {
        self.tx
            .send(Command::Commit { id })
            .await
            .map_err(|_| Error::RiskGateClosed)
    }

    /// Report a failed or dropped execution: reservation is released.
    pub async fn release(&self, id: OpportunityId) -> Result<()> {
        self.tx
            .send(Command::Release { id })
            .await
            .map_err(|_| Error::RiskGateClosed)
    }

    /// Whether the market is outside its cooldown window. A cheap
    /// pre-check for the detection path; approval still goes through
    /// [`evaluate`](Self::evaluate).
    pub async fn is_eligible(&self, market_id: MarketId) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::IsEligible { market_id, reply })
            .await
            .map_err(|_| Error::RiskGateClosed)?;
        rx.await.map_err(|_| Error::RiskGateClosed)
    }

    pub async fn snapshot(&self) -> Result<RiskSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Snapshot { reply })
            .await
            .map_err(|_| Error::RiskGateClosed)?;
        rx.await.map_err(|_| Error::RiskGateClosed)
    }
}

/// The gate task. Dropping every handle shuts it down.
pub struct RiskGate {
    handle: RiskGateHandle,
    task: JoinHandle<()>,
}

impl RiskGate {
    pub fn spawn(limits: RiskLimits) -> Self {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let task = tokio::spawn(run(RiskState::new(limits), rx));
        Self {
            handle: RiskGateHandle { tx },
            task,
        }
    }

    pub fn handle(&self) -> RiskGateHandle {
        self.handle.clone()
    }

    /// Stop the gate task. Callers have settled every in-flight command
    /// by the time they shut down, so aborting the idle receive loop is
    /// safe even while clone handles are still alive.
    pub async fn shutdown(self) {
        drop(self.handle);
        self.task.abort();
        let _ = self.task.await;
    }
}

async fn run(mut state: RiskState, mut rx: mpsc::Receiver<Command>) {
    info!(
        per_market_cap = %state.limits().per_market_cap,
        global_cap = %state.limits().global_cap,
        "risk gate started"
    );
    while let Some(command) = rx.recv().await {
        match command {
            Command::Evaluate { opportunity, reply } => {
                let verdict = state.evaluate(&opportunity, Utc::now());
                if let Err(rejection) = &verdict {
                    debug!(
                        opportunity_id = %opportunity.id,
                        market_id = %opportunity.market_id,
                        reason = rejection.kind(),
                        "opportunity rejected"
                    );
                }
                let _ = reply.send(verdict);
            }
            Command::Commit { id } => state.commit(&id),
            Command::Release { id } => state.release(&id),
            Command::IsEligible { market_id, reply } => {
                let _ = reply.send(state.is_eligible(&market_id, Utc::now()));
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(state.snapshot());
            }
        }
    }
    debug!("risk gate stopped");
}
