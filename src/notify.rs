//! Pipeline event reporting.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::domain::Opportunity;
use crate::error::RiskRejection;
use crate::exec::ExecutionResult;

/// Events the pipeline emits as opportunities move through it.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    TickDiscarded {
        reason: String,
    },
    OpportunityDetected(Opportunity),
    OpportunityRejected {
        opportunity: Opportunity,
        rejection: RiskRejection,
    },
    /// The scheduler turned an approved opportunity away at the door.
    SchedulingRejected {
        opportunity: Opportunity,
        reason: String,
    },
    ExecutionCompleted(ExecutionResult),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;

    async fn notify(&self, event: &PipelineEvent);
}

/// Fans one event out to every registered notifier.
#[derive(Default)]
pub struct NotifierRegistry {
    notifiers: Vec<Box<dyn Notifier>>,
}

impl NotifierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, notifier: Box<dyn Notifier>) {
        self.notifiers.push(notifier);
    }

    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }

    pub async fn dispatch(&self, event: &PipelineEvent) {
        for notifier in &self.notifiers {
            notifier.notify(event).await;
        }
    }
}

/// Emits events as structured log lines.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn notify(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::TickDiscarded { reason } => {
                warn!(reason, "tick discarded");
            }
            PipelineEvent::SchedulingRejected {
                opportunity,
                reason,
            } => {
                warn!(
                    opportunity_id = %opportunity.id,
                    market_id = %opportunity.market_id,
                    reason,
                    "scheduling rejected"
                );
            }
            PipelineEvent::OpportunityDetected(opportunity) => {
                info!(
                    opportunity_id = %opportunity.id,
                    market_id = %opportunity.market_id,
                    side = %opportunity.side,
                    edge = %opportunity.edge,
                    price = %opportunity.price,
                    size = %opportunity.size,
                    "opportunity detected"
                );
            }
            PipelineEvent::OpportunityRejected {
                opportunity,
                rejection,
            } => {
                info!(
                    opportunity_id = %opportunity.id,
                    market_id = %opportunity.market_id,
                    reason = rejection.kind(),
                    detail = %rejection,
                    "opportunity rejected"
                );
            }
            PipelineEvent::ExecutionCompleted(result) => {
                info!(
                    opportunity_id = %result.opportunity_id,
                    market_id = %result.market_id,
                    account = %result.account,
                    sequence = ?result.sequence,
                    outcome = result.status.kind(),
                    "execution completed"
                );
            }
        }
    }
}

/// Swallows everything. Useful for tests and benchmarks.
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    fn name(&self) -> &'static str {
        "null"
    }

    async fn notify(&self, _event: &PipelineEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit;

    #[tokio::test]
    async fn registry_dispatches_to_all() {
        let mut registry = NotifierRegistry::new();
        registry.register(Box::new(NullNotifier));
        registry.register(Box::new(LogNotifier));
        assert_eq!(registry.len(), 2);

        let event = PipelineEvent::OpportunityDetected(testkit::opportunity("m1"));
        registry.dispatch(&event).await;
    }
}
