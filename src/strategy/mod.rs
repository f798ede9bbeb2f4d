//! Strategy layer: order-book analytics, opportunity detectors and the
//! book of accepted trading strategies.

pub mod edge;
pub mod orderbook;

use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::config::RiskConfig;
use crate::types::{OpportunityType, StrategyDescriptor};

// ---------------------------------------------------------------------------
// Acceptance criteria
// ---------------------------------------------------------------------------

/// Minimum evaluation metrics a generated strategy must report.
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptanceCriteria {
    pub min_win_rate: f64,
    /// Strictly exceeded.
    pub min_total_return: f64,
    /// Strictly undercut.
    pub max_drawdown: f64,
}

impl Default for AcceptanceCriteria {
    fn default() -> Self {
        Self::from_config(&RiskConfig::default())
    }
}

impl AcceptanceCriteria {
    pub fn from_config(cfg: &RiskConfig) -> Self {
        Self {
            min_win_rate: cfg.min_win_rate,
            min_total_return: cfg.min_total_return,
            max_drawdown: cfg.max_drawdown,
        }
    }

    pub fn accepts(&self, strategy: &StrategyDescriptor) -> bool {
        let r = &strategy.test_results;
        r.win_rate >= self.min_win_rate
            && r.total_return > self.min_total_return
            && r.max_drawdown < self.max_drawdown
    }
}

// ---------------------------------------------------------------------------
// Strategy book
// ---------------------------------------------------------------------------

/// Accepted strategies, keyed by name.
///
/// A strategy with an existing name replaces the earlier one.
#[derive(Debug, Clone, Default)]
pub struct StrategyBook {
    strategies: BTreeMap<String, StrategyDescriptor>,
    criteria: AcceptanceCriteria,
}

impl StrategyBook {
    pub fn new(criteria: AcceptanceCriteria) -> Self {
        Self {
            strategies: BTreeMap::new(),
            criteria,
        }
    }

    /// Store the strategy if it meets the acceptance criteria.
    /// Returns whether it was kept.
    pub fn admit(&mut self, strategy: StrategyDescriptor) -> bool {
        if !self.criteria.accepts(&strategy) {
            info!(
                strategy = %strategy.name,
                win_rate = strategy.test_results.win_rate,
                total_return = strategy.test_results.total_return,
                max_drawdown = strategy.test_results.max_drawdown,
                "Strategy rejected by acceptance criteria"
            );
            return false;
        }
        debug!(strategy = %strategy, "Strategy accepted");
        self.strategies.insert(strategy.name.clone(), strategy);
        true
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&StrategyDescriptor> {
        self.strategies.get(name)
    }

    pub fn all(&self) -> Vec<StrategyDescriptor> {
        self.strategies.values().cloned().collect()
    }

    /// Best historical win rate among strategies covering `kind`, falling
    /// back to the best strategy overall.
    pub fn select_for(&self, kind: OpportunityType) -> Option<&StrategyDescriptor> {
        best_by_win_rate(self.strategies.values().filter(|s| s.strategy_type.covers(kind)))
            .or_else(|| best_by_win_rate(self.strategies.values()))
    }
}

/// Highest win rate; the first seen wins ties.
fn best_by_win_rate<'a>(
    candidates: impl Iterator<Item = &'a StrategyDescriptor>,
) -> Option<&'a StrategyDescriptor> {
    candidates.fold(None, |best: Option<&'a StrategyDescriptor>, s| match best {
        Some(b) if b.test_results.win_rate >= s.test_results.win_rate => Some(b),
        _ => Some(s),
    })
}

/// Fraction of equity to commit: the tighter of the strategy's and the
/// configured cap, scaled by the opportunity score.
pub fn position_fraction(
    strategy: &StrategyDescriptor,
    settings_max: Decimal,
    score: Decimal,
) -> Decimal {
    strategy.risk_management.max_position_size.min(settings_max) * score
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
