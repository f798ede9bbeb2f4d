//! Coordinator: the four periodic loops.
//!
//! 1. scan: `OpportunityScanner::scan_cycle`
//! 2. refresh: `PaperLedger::refresh_positions`
//! 3. intake: retain new opportunities, publish them, auto-trade the best
//! 4. strategy: top up the strategy book from the generator
//!
//! Each loop owns a clone of `CoordinatorCore` and runs on its own task.
//! An iteration that panics is logged and the loop carries on at its
//! next tick. `stop` signals every loop over a watch channel and waits
//! for them to finish the iteration in progress.

use chrono::{DateTime, Utc};
use futures::FutureExt;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::events::{panic_message, EventBus, EventKind, EventSink, EventSubscriber};
use super::ledger::{LedgerStatistics, PaperLedger, PlacementResult};
use super::scanner::{OpportunityScanner, ScanReport, ScannerConfig};
use crate::config::AppConfig;
use crate::llm::StrategyGenerator;
use crate::platforms::MarketDataSource;
use crate::strategy::{position_fraction, AcceptanceCriteria, StrategyBook};
use crate::types::{MarketFilter, Opportunity, StrategyDescriptor, StrategyType};

/// Strategy types requested on every strategy refresh.
pub const GENERATED_STRATEGY_TYPES: [StrategyType; 3] = [
    StrategyType::Arbitrage,
    StrategyType::ProbabilityEdge,
    StrategyType::TimeDecay,
];

const STRATEGY_MARKET_SAMPLE: usize = 100;
const STRATEGY_OPPORTUNITY_SAMPLE: usize = 50;
/// Most candidates pulled from the scanner per intake.
const INTAKE_LIMIT: usize = 100;

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    /// Minimum score for intake.
    pub score_threshold: Decimal,
    /// Minimum score for automatic trading.
    pub auto_trade_score: Decimal,
    pub max_concurrent_positions: usize,
    pub max_position_size: Decimal,
    pub max_strategies: usize,
    pub retained_capacity: usize,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl CoordinatorSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            score_threshold: cfg.trading.score_threshold,
            auto_trade_score: cfg.trading.auto_trade_score,
            max_concurrent_positions: cfg.trading.max_concurrent_positions,
            max_position_size: cfg.trading.max_position_size,
            max_strategies: cfg.risk.max_strategies,
            retained_capacity: cfg.scanner.retained_opportunities,
        }
    }
}

/// Tick periods for the four loops.
#[derive(Debug, Clone)]
pub struct LoopSchedule {
    pub scan: Duration,
    pub refresh: Duration,
    pub intake: Duration,
    pub strategy: Duration,
}

impl Default for LoopSchedule {
    fn default() -> Self {
        Self {
            scan: Duration::from_secs(30),
            refresh: Duration::from_secs(10),
            intake: Duration::from_secs(5),
            strategy: Duration::from_secs(3600),
        }
    }
}

impl LoopSchedule {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            scan: Duration::from_secs(cfg.agent.scan_interval_secs.max(1)),
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Retained opportunities
// ---------------------------------------------------------------------------

/// Bounded, insertion-ordered buffer of recent opportunities.
///
/// `processed` outlives the buffer: an id stays in it after its entry is
/// evicted, and only `retain_processed` removes it.
#[derive(Debug)]
struct RetainedOpportunities {
    items: VecDeque<Opportunity>,
    processed: HashSet<String>,
    capacity: usize,
}

impl RetainedOpportunities {
    fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::new(),
            processed: HashSet::new(),
            capacity: capacity.max(1),
        }
    }

    /// False if the id was processed before.
    fn insert(&mut self, opportunity: Opportunity) -> bool {
        if !self.processed.insert(opportunity.id.clone()) {
            return false;
        }
        if self.items.len() >= self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(opportunity);
        true
    }

    /// Forget processed ids not in `live`. Returns how many were dropped.
    fn retain_processed(&mut self, live: &HashSet<String>) -> usize {
        let before = self.processed.len();
        self.processed.retain(|id| live.contains(id));
        before - self.processed.len()
    }

    /// Up to `n` most recent, oldest first.
    fn recent(&self, n: usize) -> Vec<Opportunity> {
        let skip = self.items.len().saturating_sub(n);
        self.items.iter().skip(skip).cloned().collect()
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// What happened to one auto-trade candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum TradeDecision {
    Executed { position_id: String, strategy: String },
    AtCapacity,
    NoStrategy,
    Rejected(String),
}

#[derive(Debug, Clone, Default)]
pub struct IntakeReport {
    pub considered: usize,
    pub retained: usize,
    pub duplicates: usize,
    pub decisions: Vec<(String, TradeDecision)>,
}

impl IntakeReport {
    pub fn executed(&self) -> usize {
        self.decisions
            .iter()
            .filter(|(_, d)| matches!(d, TradeDecision::Executed { .. }))
            .count()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CoordinatorStatus {
    pub running: bool,
    pub retained_opportunities: usize,
    pub scanner_opportunities: usize,
    pub strategies: usize,
    pub open_positions: usize,
    pub total_trades: u64,
    pub last_scan: Option<DateTime<Utc>>,
    pub statistics: LedgerStatistics,
}

// ---------------------------------------------------------------------------
// Core
// ---------------------------------------------------------------------------

/// Shared state handed to every loop. Cloning shares, never copies.
#[derive(Clone)]
pub struct CoordinatorCore {
    source: Arc<dyn MarketDataSource>,
    scanner: Arc<OpportunityScanner>,
    ledger: Arc<PaperLedger>,
    generator: Option<Arc<dyn StrategyGenerator>>,
    strategies: Arc<RwLock<StrategyBook>>,
    retained: Arc<Mutex<RetainedOpportunities>>,
    /// Serializes the capacity check with the placement it guards.
    admission: Arc<Mutex<()>>,
    events: Arc<EventBus>,
    settings: Arc<CoordinatorSettings>,
}

impl CoordinatorCore {
    pub fn scanner(&self) -> &OpportunityScanner {
        &self.scanner
    }

    pub fn ledger(&self) -> &PaperLedger {
        &self.ledger
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub async fn scan_once(&self) -> ScanReport {
        self.scanner.scan_cycle().await
    }

    pub async fn refresh_once(&self) -> usize {
        let report = self.ledger.refresh_positions().await;
        if !report.closed.is_empty() {
            info!(
                marked = report.marked,
                closed = report.closed.len(),
                unpriced = report.unpriced,
                "Positions refreshed"
            );
        }
        report.closed.len()
    }

    /// Pull qualifying opportunities from the scanner and ingest them.
    pub async fn intake_once(&self) -> IntakeReport {
        let candidates = self
            .scanner
            .get_opportunities(Some(self.settings.score_threshold), None, INTAKE_LIMIT)
            .await;
        self.ingest(candidates).await
    }

    /// Retain unseen opportunities, publish each once and auto-trade the
    /// ones scoring at or above the auto-trade threshold.
    pub async fn ingest(&self, opportunities: Vec<Opportunity>) -> IntakeReport {
        let mut report = IntakeReport::default();

        for opp in opportunities {
            if opp.score < self.settings.score_threshold {
                continue;
            }
            report.considered += 1;

            let inserted = self.retained.lock().await.insert(opp.clone());
            if !inserted {
                report.duplicates += 1;
                continue;
            }
            report.retained += 1;

            match serde_json::to_value(&opp) {
                Ok(payload) => {
                    self.events.publish(EventKind::Opportunity, payload);
                }
                Err(e) => warn!(opportunity = %opp.id, error = %e, "Opportunity not serializable"),
            }

            if opp.score >= self.settings.auto_trade_score {
                let decision = self.try_auto_trade(&opp).await;
                report.decisions.push((opp.id.clone(), decision));
            }
        }

        if report.retained > 0 {
            debug!(
                considered = report.considered,
                retained = report.retained,
                executed = report.executed(),
                "Intake complete"
            );
        }
        report
    }

    async fn try_auto_trade(&self, opp: &Opportunity) -> TradeDecision {
        let _admission = self.admission.lock().await;

        let open = self.ledger.open_position_count().await;
        if open >= self.settings.max_concurrent_positions {
            debug!(opportunity = %opp.id, open, "At position capacity, not trading");
            return TradeDecision::AtCapacity;
        }

        let strategy = {
            let book = self.strategies.read().await;
            book.select_for(opp.opportunity_type).cloned()
        };
        let Some(strategy) = strategy else {
            debug!(opportunity = %opp.id, "No strategy available");
            return TradeDecision::NoStrategy;
        };

        let fraction = position_fraction(&strategy, self.settings.max_position_size, opp.score);
        match self
            .ledger
            .place_from_opportunity(opp, fraction, Some(&strategy.name))
            .await
        {
            Ok(PlacementResult::Filled { order, position }) => {
                info!(
                    opportunity = %opp.id,
                    strategy = %strategy.name,
                    fraction = %fraction,
                    order = %order,
                    "Trade executed"
                );
                self.events.publish(
                    EventKind::TradeExecuted,
                    serde_json::json!({
                        "opportunity": opp,
                        "order": order,
                        "position": position,
                        "strategy": strategy.name,
                    }),
                );
                TradeDecision::Executed {
                    position_id: position.id,
                    strategy: strategy.name,
                }
            }
            Ok(PlacementResult::InsufficientCapital { required, available }) => {
                TradeDecision::Rejected(format!(
                    "insufficient capital: need {required:.2}, have {available:.2}"
                ))
            }
            Err(e) => {
                warn!(opportunity = %opp.id, error = %e, "Placement rejected");
                TradeDecision::Rejected(e.to_string())
            }
        }
    }

    /// Ask the generator for one strategy per type while the book has room.
    /// Returns how many were accepted.
    pub async fn refresh_strategies_once(&self) -> usize {
        let Some(generator) = &self.generator else {
            debug!("No strategy generator configured");
            return 0;
        };

        let held = self.strategies.read().await.len();
        if held >= self.settings.max_strategies {
            debug!(held, "Strategy book full");
            return 0;
        }

        let markets = match self
            .source
            .list_markets(&MarketFilter::open(), STRATEGY_MARKET_SAMPLE)
            .await
        {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "Market context unavailable for strategy generation");
                Vec::new()
            }
        };
        let opportunities = self
            .retained
            .lock()
            .await
            .recent(STRATEGY_OPPORTUNITY_SAMPLE);

        let mut accepted = 0;
        for strategy_type in GENERATED_STRATEGY_TYPES {
            let descriptor = match generator.generate(strategy_type, &markets, &opportunities).await {
                Ok(d) => d,
                Err(e) => {
                    warn!(
                        generator = generator.name(),
                        strategy_type = %strategy_type,
                        error = %e,
                        "Strategy generation failed"
                    );
                    continue;
                }
            };

            let payload = serde_json::to_value(&descriptor);
            if !self.strategies.write().await.admit(descriptor) {
                continue;
            }
            accepted += 1;
            match payload {
                Ok(p) => {
                    self.events.publish(EventKind::StrategyGenerated, p);
                }
                Err(e) => warn!(error = %e, "Strategy not serializable"),
            }
        }

        let held = self.strategies.read().await.len();
        info!(
            generator = generator.name(),
            accepted,
            held,
            "Strategy refresh complete"
        );
        accepted
    }

    /// Prune aged scanner opportunities, forget the processed ids the
    /// scanner no longer holds and clear the seen set.
    pub async fn run_maintenance(&self, max_age_hours: i64) -> (usize, usize) {
        let pruned = self.scanner.prune_older_than(max_age_hours, Utc::now()).await;
        let live = self.scanner.opportunity_ids().await;
        let forgotten = self.retained.lock().await.retain_processed(&live);
        let cleared = self.scanner.clear_seen().await;
        info!(pruned, forgotten, cleared, "Maintenance complete");
        (pruned, cleared)
    }

    pub async fn strategies(&self) -> Vec<StrategyDescriptor> {
        self.strategies.read().await.all()
    }

    pub async fn retained_opportunities(&self) -> Vec<Opportunity> {
        self.retained.lock().await.items.iter().cloned().collect()
    }
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

pub struct Coordinator {
    core: CoordinatorCore,
    schedule: LoopSchedule,
    shutdown: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    running: AtomicBool,
}

impl Coordinator {
    pub fn new(
        cfg: &AppConfig,
        source: Arc<dyn MarketDataSource>,
        generator: Option<Arc<dyn StrategyGenerator>>,
        sink: Option<Arc<dyn EventSink>>,
    ) -> Self {
        let scanner = OpportunityScanner::new(Arc::clone(&source), ScannerConfig::from_config(cfg));
        let ledger = PaperLedger::new(
            Arc::clone(&source),
            cfg.trading.initial_capital,
            cfg.scanner.trade_history,
        );
        let settings = CoordinatorSettings::from_config(cfg);

        let core = CoordinatorCore {
            source,
            scanner: Arc::new(scanner),
            ledger: Arc::new(ledger),
            generator,
            strategies: Arc::new(RwLock::new(StrategyBook::new(AcceptanceCriteria::from_config(
                &cfg.risk,
            )))),
            retained: Arc::new(Mutex::new(RetainedOpportunities::new(settings.retained_capacity))),
            admission: Arc::new(Mutex::new(())),
            events: Arc::new(EventBus::new(sink)),
            settings: Arc::new(settings),
        };

        let (shutdown, _) = watch::channel(false);
        Self {
            core,
            schedule: LoopSchedule::from_config(cfg),
            shutdown,
            handles: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
        }
    }

    pub fn with_schedule(mut self, schedule: LoopSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn core(&self) -> &CoordinatorCore {
        &self.core
    }

    pub fn subscribe(&self, subscriber: Arc<dyn EventSubscriber>) {
        self.core.events.subscribe(subscriber);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Spawn the four loops. A second call while running is ignored.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Coordinator already running");
            return;
        }
        self.shutdown.send_replace(false);

        let s = &self.schedule;
        let mut handles = self.handles.lock().await;

        let core = self.core.clone();
        handles.push(spawn_loop("scan", s.scan, self.shutdown.subscribe(), move || {
            let core = core.clone();
            async move {
                core.scan_once().await;
            }
        }));

        let core = self.core.clone();
        handles.push(spawn_loop("refresh", s.refresh, self.shutdown.subscribe(), move || {
            let core = core.clone();
            async move {
                core.refresh_once().await;
            }
        }));

        let core = self.core.clone();
        handles.push(spawn_loop("intake", s.intake, self.shutdown.subscribe(), move || {
            let core = core.clone();
            async move {
                core.intake_once().await;
            }
        }));

        let core = self.core.clone();
        handles.push(spawn_loop("strategy", s.strategy, self.shutdown.subscribe(), move || {
            let core = core.clone();
            async move {
                core.refresh_strategies_once().await;
            }
        }));

        info!(
            scan_secs = s.scan.as_secs_f64(),
            refresh_secs = s.refresh.as_secs_f64(),
            intake_secs = s.intake.as_secs_f64(),
            strategy_secs = s.strategy.as_secs_f64(),
            "Coordinator started"
        );
    }

    /// Signal every loop and wait for them to exit.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.shutdown.send_replace(true);

        let handles: Vec<JoinHandle<()>> = self.handles.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Loop task ended abnormally");
            }
        }
        info!("Coordinator stopped");
    }

    pub async fn status(&self) -> CoordinatorStatus {
        let statistics = self.core.ledger.statistics().await;
        CoordinatorStatus {
            running: self.is_running(),
            retained_opportunities: self.core.retained.lock().await.items.len(),
            scanner_opportunities: self.core.scanner.opportunity_count().await,
            strategies: self.core.strategies.read().await.len(),
            open_positions: statistics.open_positions,
            total_trades: statistics.total_trades,
            last_scan: self.core.scanner.last_scan().await,
            statistics,
        }
    }
}

/// Run `body` every `period` until shutdown. The first tick is immediate.
fn spawn_loop<F, Fut>(
    name: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut body: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if let Err(panic) = AssertUnwindSafe(body()).catch_unwind().await {
                        error!(task = name, panic = %panic_message(panic.as_ref()), "Loop iteration panicked");
                    }
                }
            }
        }
        debug!(task = name, "Loop exited");
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
