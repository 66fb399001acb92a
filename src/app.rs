//! Pipeline assembly and the main processing loop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::{Config, FeedSource};
use crate::detector::Detector;
use crate::domain::{AccountId, MarketId, PriceHistory, QuoteCache};
use crate::error::{ConfigError, Error, Result, ValuationError};
use crate::exec::{
    DryRunEngine, ExecutionBackend, ExecutionRequest, ExecutionResult, ExecutionStatus,
    GasPricer, LiveEngine, Mode, Scheduler, SchedulerConfig, TransactionSigner,
};
use crate::feed::{MarketFeed, Normalizer, ReplayFeed, SyntheticFeed};
use crate::model::{OrnsteinUhlenbeckModel, ValuationModel};
use crate::notify::{LogNotifier, NotifierRegistry, PipelineEvent};
use crate::risk::{RiskGate, RiskGateHandle, RiskLimits};

/// Counters for one pipeline run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSummary {
    pub ticks: u64,
    pub detected: u64,
    pub approved: u64,
    pub rejected: u64,
    pub confirmed: u64,
    pub failed: u64,
    pub dropped: u64,
}

pub struct App {
    config: Config,
    registry: Arc<NotifierRegistry>,
}

impl App {
    pub fn new(config: Config) -> Self {
        let mut registry = NotifierRegistry::new();
        registry.register(Box::new(LogNotifier));
        Self {
            config,
            registry: Arc::new(registry),
        }
    }

    pub fn with_registry(config: Config, registry: NotifierRegistry) -> Self {
        Self {
            config,
            registry: Arc::new(registry),
        }
    }

    /// Build the feed, model, and backend from configuration and run
    /// until the feed exhausts. Live mode needs a signer wired through
    /// [`App::run_live`]; the bare binary only runs dry.
    pub async fn run(self) -> Result<PipelineSummary> {
        let feed = self.build_feed()?;
        let model: Arc<dyn ValuationModel> = Arc::new(OrnsteinUhlenbeckModel::new(
            self.config.detection.min_observations,
        ));
        match self.config.execution.mode {
            Mode::DryRun => self.run_with(feed, model, None).await,
            Mode::Live => Err(Error::Config(ConfigError::InvalidValue {
                field: "execution.mode",
                reason: "live mode requires a signer; use run_live".to_string(),
            })),
        }
    }

    /// Run live against the given signer.
    pub async fn run_live(
        self,
        signer: Arc<dyn TransactionSigner>,
    ) -> Result<PipelineSummary> {
        let feed = self.build_feed()?;
        let model: Arc<dyn ValuationModel> = Arc::new(OrnsteinUhlenbeckModel::new(
            self.config.detection.min_observations,
        ));
        self.run_with(feed, model, Some(signer)).await
    }

    fn build_feed(&self) -> Result<Box<dyn MarketFeed>> {
        let feed = &self.config.feed;
        Ok(match feed.source {
            FeedSource::Synthetic => Box::new(SyntheticFeed::new(
                feed.markets.clone(),
                StdDuration::from_millis(feed.tick_interval_ms),
                feed.seed,
            )),
            FeedSource::Replay => {
                let path = feed.replay_path.as_ref().ok_or(ConfigError::MissingField {
                    field: "feed.replay_path",
                })?;
                Box::new(ReplayFeed::from_path(path).map_err(Error::Feed)?)
            }
        })
    }

    /// Run the pipeline with explicit collaborators. Consumes the feed
    /// until it returns `None`, then drains execution and settles every
    /// open reservation before returning.
    pub async fn run_with(
        self,
        mut feed: Box<dyn MarketFeed>,
        model: Arc<dyn ValuationModel>,
        signer: Option<Arc<dyn TransactionSigner>>,
    ) -> Result<PipelineSummary> {
        let config = &self.config;
        let cache = Arc::new(QuoteCache::new());
        let mut normalizer = Normalizer::new(Arc::clone(&cache), config.detection.history_capacity);
        let detector = Detector::new(
            model,
            config.detection.min_edge_threshold,
            config.detection.min_size_threshold,
        );

        let backend: Arc<dyn ExecutionBackend> = match (config.execution.mode, signer) {
            (Mode::DryRun, _) => Arc::new(DryRunEngine::new(Arc::clone(&cache))),
            (Mode::Live, Some(signer)) => Arc::new(LiveEngine::new(
                signer,
                GasPricer::new(
                    config.execution.gas_priority_fee,
                    config.execution.gas_priority_bound,
                ),
                StdDuration::from_millis(config.execution.confirmation_timeout_ms),
                StdDuration::from_millis(config.execution.confirmation_poll_interval_ms),
            )),
            (Mode::Live, None) => {
                return Err(Error::Config(ConfigError::MissingField {
                    field: "signer",
                }))
            }
        };

        let gate = RiskGate::spawn(RiskLimits {
            per_market_cap: config.risk.per_market_cap,
            global_cap: config.risk.global_cap,
            cooldown: Duration::milliseconds(config.risk.cooldown_period_ms as i64),
            staleness_window: Duration::milliseconds(config.risk.staleness_window_ms as i64),
        });
        let gate_handle = gate.handle();

        let (results_tx, results_rx) = mpsc::channel::<ExecutionResult>(64);
        let mut scheduler = Scheduler::new(
            Arc::clone(&backend),
            SchedulerConfig {
                queue_depth: config.execution.scheduler_queue_depth,
                staleness_window: Duration::milliseconds(config.risk.staleness_window_ms as i64),
                reconcile_backoff: StdDuration::from_millis(
                    config.execution.confirmation_poll_interval_ms,
                ),
            },
            results_tx,
        );
        let accounts: Vec<AccountId> = config
            .execution
            .accounts
            .iter()
            .map(|account| AccountId::new(account.clone()))
            .collect();
        for account in &accounts {
            scheduler
                .register(account.clone())
                .await
                .map_err(Error::Signer)?;
        }

        let settlement = tokio::spawn(settle_results(
            results_rx,
            gate_handle.clone(),
            Arc::clone(&self.registry),
        ));

        info!(
            mode = %backend.mode(),
            markets = config.feed.markets.len(),
            accounts = accounts.len(),
            "pipeline started"
        );

        // Detection runs as one logical task per monitored market; the
        // ingest loop only normalizes ticks and hands each market a
        // snapshot of its history. The risk gate linearizes whatever
        // the market tasks throw at it concurrently.
        let stats = Arc::new(RunStats::default());
        let scheduler = Arc::new(scheduler);
        let context = Arc::new(DetectContext {
            detector,
            cache: Arc::clone(&cache),
            gate: gate_handle.clone(),
            scheduler: Arc::clone(&scheduler),
            accounts,
            next_account: AtomicUsize::new(0),
            registry: Arc::clone(&self.registry),
            stats: Arc::clone(&stats),
        });
        let mut markets: HashMap<MarketId, MarketTask> = HashMap::new();

        let mut summary = PipelineSummary::default();
        while let Some(tick) = feed.next_tick().await? {
            summary.ticks += 1;
            let now = Utc::now();
            let quote = match normalizer.ingest(tick, now) {
                Ok(quote) => quote,
                Err(error) => {
                    self.registry
                        .dispatch(&PipelineEvent::TickDiscarded {
                            reason: error.to_string(),
                        })
                        .await;
                    continue;
                }
            };

            let Some(history) = normalizer.history(&quote.market_id) else {
                continue;
            };
            let task = markets
                .entry(quote.market_id.clone())
                .or_insert_with(|| MarketTask::spawn(quote.market_id.clone(), &context));
            if task.tx.send(history.clone()).await.is_err() {
                warn!(market_id = %quote.market_id, "detection task gone");
            }
        }

        // Feed exhausted: detection tasks finish their queues first,
        // then the workers drain and the settlement task sees the
        // results channel close and reports totals.
        for (market_id, task) in markets {
            drop(task.tx);
            if task.handle.await.is_err() {
                warn!(market_id = %market_id, "detection task panicked");
            }
        }
        drop(context);
        summary.detected = stats.detected.load(Ordering::Relaxed);
        summary.approved = stats.approved.load(Ordering::Relaxed);
        summary.rejected = stats.rejected.load(Ordering::Relaxed);

        let scheduler = match Arc::into_inner(scheduler) {
            Some(scheduler) => scheduler,
            None => unreachable!("detection tasks are joined before the scheduler unwraps"),
        };
        scheduler.shutdown().await;
        let (confirmed, failed, dropped) = settlement.await.unwrap_or((0, 0, 0));
        summary.confirmed = confirmed;
        summary.failed = failed;
        summary.dropped = dropped;

        let open = gate_handle.snapshot().await?.open_reservations;
        if open > 0 {
            warn!(open, "reservations still open at shutdown");
        }
        gate.shutdown().await;

        info!(
            ticks = summary.ticks,
            detected = summary.detected,
            approved = summary.approved,
            rejected = summary.rejected,
            confirmed = summary.confirmed,
            failed = summary.failed,
            dropped = summary.dropped,
            "pipeline finished"
        );
        Ok(summary)
    }
}

#[derive(Debug, Default)]
struct RunStats {
    detected: AtomicU64,
    approved: AtomicU64,
    rejected: AtomicU64,
}

/// Everything a per-market detection task needs, shared across markets.
struct DetectContext {
    detector: Detector,
    cache: Arc<QuoteCache>,
    gate: RiskGateHandle,
    scheduler: Arc<Scheduler>,
    accounts: Vec<AccountId>,
    next_account: AtomicUsize,
    registry: Arc<NotifierRegistry>,
    stats: Arc<RunStats>,
}

struct MarketTask {
    tx: mpsc::Sender<PriceHistory>,
    handle: JoinHandle<()>,
}

impl MarketTask {
    fn spawn(market_id: MarketId, context: &Arc<DetectContext>) -> Self {
        let (tx, rx) = mpsc::channel(16);
        let handle = tokio::spawn(market_loop(market_id, Arc::clone(context), rx));
        Self { tx, handle }
    }
}

/// One detection cycle per history snapshot, in arrival order. Requests
/// for this market never overlap; cross-market races are the risk
/// gate's problem.
async fn market_loop(
    market_id: MarketId,
    context: Arc<DetectContext>,
    mut jobs: mpsc::Receiver<PriceHistory>,
) {
    while let Some(history) = jobs.recv().await {
        // Markets inside their cooldown window skip valuation entirely.
        match context.gate.is_eligible(market_id.clone()).await {
            Ok(true) => {}
            Ok(false) => continue,
            Err(_) => {
                error!(market_id = %market_id, "risk gate closed, detection stopping");
                return;
            }
        }

        let opportunity =
            match context
                .detector
                .detect(&market_id, &context.cache, &history, Utc::now())
            {
                Ok(Some(opportunity)) => opportunity,
                Ok(None) => continue,
                Err(ValuationError::InsufficientHistory { .. }) => continue,
            };

        context.stats.detected.fetch_add(1, Ordering::Relaxed);
        context
            .registry
            .dispatch(&PipelineEvent::OpportunityDetected(opportunity.clone()))
            .await;

        let verdict = match context.gate.evaluate(opportunity.clone()).await {
            Ok(verdict) => verdict,
            Err(_) => {
                error!(market_id = %market_id, "risk gate closed, detection stopping");
                return;
            }
        };
        match verdict {
            Ok(()) => {
                context.stats.approved.fetch_add(1, Ordering::Relaxed);
                let slot = context.next_account.fetch_add(1, Ordering::Relaxed);
                let account = context.accounts[slot % context.accounts.len()].clone();
                let request = ExecutionRequest {
                    opportunity: opportunity.clone(),
                    account,
                    submitted_at: Utc::now(),
                };
                if let Err(scheduling) = context.scheduler.submit(request) {
                    if context.gate.release(opportunity.id).await.is_err() {
                        error!(market_id = %market_id, "risk gate closed, detection stopping");
                        return;
                    }
                    context
                        .registry
                        .dispatch(&PipelineEvent::SchedulingRejected {
                            opportunity,
                            reason: scheduling.to_string(),
                        })
                        .await;
                }
            }
            Err(rejection) => {
                context.stats.rejected.fetch_add(1, Ordering::Relaxed);
                context
                    .registry
                    .dispatch(&PipelineEvent::OpportunityRejected {
                        opportunity,
                        rejection,
                    })
                    .await;
            }
        }
    }
}

/// Applies each terminal result to the exposure ledger: confirmations
/// commit the reservation, everything else releases it.
async fn settle_results(
    mut results: mpsc::Receiver<ExecutionResult>,
    gate: RiskGateHandle,
    registry: Arc<NotifierRegistry>,
) -> (u64, u64, u64) {
    let mut confirmed = 0;
    let mut failed = 0;
    let mut dropped = 0;
    while let Some(result) = results.recv().await {
        let settled = match &result.status {
            ExecutionStatus::Confirmed(_) => {
                confirmed += 1;
                gate.commit(result.opportunity_id).await
            }
            ExecutionStatus::Failed(_) => {
                failed += 1;
                gate.release(result.opportunity_id).await
            }
            ExecutionStatus::Dropped { .. } => {
                dropped += 1;
                gate.release(result.opportunity_id).await
            }
        };
        if settled.is_err() {
            warn!(opportunity_id = %result.opportunity_id, "risk gate gone, result unsettled");
        }
        registry
            .dispatch(&PipelineEvent::ExecutionCompleted(result))
            .await;
    }
    (confirmed, failed, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::RawTick;
    use crate::model::ConstantModel;
    use crate::notify::NullNotifier;
    use crate::testkit::ScriptedFeed;
    use rust_decimal_macros::dec;

    fn config() -> Config {
        let mut config = Config::default();
        config.detection.min_observations = 1;
        config.feed.tick_interval_ms = 0;
        config
    }

    fn app(config: Config) -> App {
        let mut registry = NotifierRegistry::new();
        registry.register(Box::new(NullNotifier));
        App::with_registry(config, registry)
    }

    fn ticks() -> Vec<RawTick> {
        // Underpriced yes side against a 0.60 fair value.
        ScriptedFeed::both_sides("m1", dec!(0.50), dec!(100))
    }

    #[tokio::test]
    async fn dry_run_pipeline_confirms_an_underpriced_quote() {
        let feed = Box::new(ScriptedFeed::new(ticks()));
        let model = Arc::new(ConstantModel::new(dec!(0.60)));

        let summary = app(config()).run_with(feed, model, None).await.unwrap();
        assert_eq!(summary.ticks, 2);
        assert!(summary.detected >= 1);
        assert_eq!(summary.approved, 1);
        assert_eq!(summary.confirmed, 1);
        assert_eq!(summary.failed, 0);
    }

    #[tokio::test]
    async fn cooldown_suppresses_repeat_detections() {
        let mut config = config();
        config.risk.cooldown_period_ms = 60_000;

        let mut script = ticks();
        script.extend(ticks());
        let feed = Box::new(ScriptedFeed::new(script));
        let model = Arc::new(ConstantModel::new(dec!(0.60)));

        let summary = app(config).run_with(feed, model, None).await.unwrap();
        // Detection work for m1 is serial, so once the first approval
        // arms the cooldown the remaining snapshots are skipped before
        // valuation.
        assert_eq!(summary.detected, 1);
        assert_eq!(summary.approved, 1);
        assert_eq!(summary.rejected, 0);
    }

    #[tokio::test]
    async fn live_mode_without_signer_is_a_config_error() {
        let mut config = config();
        config.execution.mode = Mode::Live;
        let feed = Box::new(ScriptedFeed::new(Vec::new()));
        let model = Arc::new(ConstantModel::new(dec!(0.60)));

        let err = app(config).run_with(feed, model, None).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
