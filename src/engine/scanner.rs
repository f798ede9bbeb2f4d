//! Opportunity scanner.
//!
//! Pulls open markets from the market-data source, fetches their order
//! books concurrently and runs the edge detectors against each. Markets
//! that produced at least one opportunity are remembered in a "seen" set
//! and skipped until `clear_seen` is called.

use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::platforms::MarketDataSource;
use crate::strategy::edge;
use crate::types::{Market, MarketFilter, Opportunity, OpportunityType};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// Markets requested from the source per cycle.
    pub market_fetch_limit: usize,
    /// Markets analyzed per cycle.
    pub markets_per_cycle: usize,
    pub filter: MarketFilter,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            market_fetch_limit: 1000,
            markets_per_cycle: 100,
            filter: MarketFilter::open(),
        }
    }
}

impl ScannerConfig {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            market_fetch_limit: cfg.scanner.market_fetch_limit,
            markets_per_cycle: cfg.scanner.markets_per_cycle,
            filter: MarketFilter::open(),
        }
    }
}

/// Outcome of one scan cycle.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub markets_fetched: usize,
    pub markets_analyzed: usize,
    pub skipped_seen: usize,
    pub books_unavailable: usize,
    pub opportunities_found: usize,
    pub markets_with_opportunities: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ScanReport {
    fn empty(started_at: DateTime<Utc>) -> Self {
        Self {
            markets_fetched: 0,
            markets_analyzed: 0,
            skipped_seen: 0,
            books_unavailable: 0,
            opportunities_found: 0,
            markets_with_opportunities: 0,
            started_at,
            finished_at: started_at,
        }
    }
}

#[derive(Default)]
struct ScannerState {
    opportunities: Vec<Opportunity>,
    seen: HashSet<String>,
    last_scan: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Scanner
// ---------------------------------------------------------------------------

pub struct OpportunityScanner {
    source: Arc<dyn MarketDataSource>,
    config: ScannerConfig,
    state: Mutex<ScannerState>,
}

impl OpportunityScanner {
    pub fn new(source: Arc<dyn MarketDataSource>, config: ScannerConfig) -> Self {
        Self {
            source,
            config,
            state: Mutex::new(ScannerState::default()),
        }
    }

    pub async fn scan_cycle(&self) -> ScanReport {
        self.scan_cycle_at(Utc::now()).await
    }

    /// Run one scan with detectors evaluated at `now`.
    pub async fn scan_cycle_at(&self, now: DateTime<Utc>) -> ScanReport {
        let mut report = ScanReport::empty(now);

        let markets = match self
            .source
            .list_markets(&self.config.filter, self.config.market_fetch_limit)
            .await
        {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "Market listing failed, skipping scan cycle");
                report.finished_at = Utc::now();
                return report;
            }
        };
        report.markets_fetched = markets.len();

        let batch: Vec<Market> = {
            let state = self.state.lock().await;
            let (unseen, seen): (Vec<Market>, Vec<Market>) =
                markets.into_iter().partition(|m| !state.seen.contains(&m.id));
            report.skipped_seen = seen.len();
            unseen.into_iter().take(self.config.markets_per_cycle).collect()
        };
        report.markets_analyzed = batch.len();

        // Book fetches are the only I/O; detection is pure.
        let books = join_all(batch.iter().map(|m| self.source.get_order_book(&m.id))).await;

        let mut found = Vec::new();
        let mut fired_markets = Vec::new();
        for (market, book) in batch.iter().zip(books) {
            let Some(book) = book else {
                debug!(market_id = %market.id, "Order book unavailable, will retry next cycle");
                report.books_unavailable += 1;
                continue;
            };
            let opps = edge::detect_all(market, &book, now);
            if !opps.is_empty() {
                for opp in &opps {
                    debug!(market_id = %market.id, opportunity = %opp, "Opportunity detected");
                }
                fired_markets.push(market.id.clone());
                found.extend(opps);
            }
        }

        report.opportunities_found = found.len();
        report.markets_with_opportunities = fired_markets.len();
        report.finished_at = Utc::now();

        {
            let mut state = self.state.lock().await;
            state.seen.extend(fired_markets);
            state.opportunities.extend(found);
            state.last_scan = Some(report.finished_at);
        }

        info!(
            fetched = report.markets_fetched,
            analyzed = report.markets_analyzed,
            skipped_seen = report.skipped_seen,
            books_unavailable = report.books_unavailable,
            opportunities = report.opportunities_found,
            "Scan cycle complete"
        );
        report
    }

    /// Filter by score and type, best first, truncated to `limit`.
    pub async fn get_opportunities(
        &self,
        min_score: Option<Decimal>,
        kind: Option<OpportunityType>,
        limit: usize,
    ) -> Vec<Opportunity> {
        let state = self.state.lock().await;
        let mut selected: Vec<Opportunity> = state
            .opportunities
            .iter()
            .filter(|o| min_score.map_or(true, |min| o.score >= min))
            .filter(|o| kind.map_or(true, |k| o.opportunity_type == k))
            .cloned()
            .collect();
        selected.sort_by(|a, b| b.score.cmp(&a.score));
        selected.truncate(limit);
        selected
    }

    /// Drop opportunities detected before `now - max_age_hours` unless they
    /// still have a future expiry. Returns how many were removed.
    pub async fn prune_older_than(&self, max_age_hours: i64, now: DateTime<Utc>) -> usize {
        let cutoff = now - Duration::hours(max_age_hours);
        let mut state = self.state.lock().await;
        let before = state.opportunities.len();
        state
            .opportunities
            .retain(|o| o.detected_at > cutoff || o.is_live_at(now));
        let removed = before - state.opportunities.len();
        if removed > 0 {
            info!(removed, remaining = state.opportunities.len(), "Pruned aged opportunities");
        }
        removed
    }

    /// Forget every analyzed market so the next cycle reconsiders them.
    pub async fn clear_seen(&self) -> usize {
        let mut state = self.state.lock().await;
        let cleared = state.seen.len();
        state.seen.clear();
        debug!(cleared, "Seen set cleared");
        cleared
    }

    pub async fn last_scan(&self) -> Option<DateTime<Utc>> {
        self.state.lock().await.last_scan
    }

    pub async fn opportunity_count(&self) -> usize {
        self.state.lock().await.opportunities.len()
    }

    /// Ids of every opportunity currently held.
    pub async fn opportunity_ids(&self) -> HashSet<String> {
        self.state
            .lock()
            .await
            .opportunities
            .iter()
            .map(|o| o.id.clone())
            .collect()
    }

    pub async fn seen_count(&self) -> usize {
        self.state.lock().await.seen.len()
    }

    pub async fn has_seen(&self, market_id: &str) -> bool {
        self.state.lock().await.seen.contains(market_id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
