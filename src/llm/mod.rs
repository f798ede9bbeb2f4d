//! Strategy generation.
//!
//! Defines the `StrategyGenerator` trait and provides two implementations:
//! an LLM-backed generator (Anthropic Messages API) and a template
//! generator that emits the default blueprint for each strategy type.
//! Both attach simulated evaluation metrics; acceptance is decided by
//! the caller.

pub mod anthropic;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::config::AppConfig;
use crate::types::{
    Market, Opportunity, RiskManagement, StrategyDescriptor, StrategyType, TestResults,
};

/// Sample size of markets and opportunities quoted in the prompt context.
const CONTEXT_SAMPLES: usize = 5;

/// Produces strategy descriptors for a strategy type, given recent
/// market and opportunity context.
#[async_trait]
pub trait StrategyGenerator: Send + Sync {
    async fn generate(
        &self,
        strategy_type: StrategyType,
        markets: &[Market],
        opportunities: &[Opportunity],
    ) -> Result<StrategyDescriptor>;

    /// Identifier for logging.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Defaults & blueprints
// ---------------------------------------------------------------------------

/// Risk settings used for default blueprints and for fields an LLM omits.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyDefaults {
    pub max_position_size: Decimal,
    pub stop_loss_pct: Decimal,
    pub take_profit_pct: Decimal,
    pub max_drawdown: Decimal,
}

impl StrategyDefaults {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            max_position_size: cfg.trading.max_position_size,
            stop_loss_pct: cfg.trading.stop_loss_pct,
            take_profit_pct: cfg.trading.take_profit_pct,
            max_drawdown: Decimal::try_from(cfg.risk.max_drawdown).unwrap_or(Decimal::ONE),
        }
    }
}

impl Default for StrategyDefaults {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Strategy as proposed by a generator, before evaluation.
#[derive(Debug, Clone, Deserialize)]
pub struct StrategyBlueprint {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
    #[serde(default)]
    pub entry_rules: serde_json::Value,
    #[serde(default)]
    pub exit_rules: serde_json::Value,
    #[serde(default)]
    pub risk_management: BlueprintRisk,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BlueprintRisk {
    pub max_position_size: Option<Decimal>,
    pub stop_loss_pct: Option<Decimal>,
    pub take_profit_pct: Option<Decimal>,
    pub max_drawdown: Option<Decimal>,
}

impl StrategyBlueprint {
    /// Blueprint used when no generator output is available.
    pub fn default_for(strategy_type: StrategyType, defaults: &StrategyDefaults) -> Self {
        let entry = serde_json::json!(["score > 0.7", "liquidity > 1000"]);
        let exit = serde_json::json!(["take_profit OR stop_loss"]);
        Self {
            name: format!("default_{strategy_type}_strategy"),
            description: format!("Default {strategy_type} strategy"),
            parameters: serde_json::json!({}),
            entry_rules: serde_json::json!({"YES": entry, "NO": entry}),
            exit_rules: serde_json::json!({"YES": exit, "NO": exit}),
            risk_management: BlueprintRisk {
                max_position_size: Some(defaults.max_position_size),
                stop_loss_pct: Some(defaults.stop_loss_pct),
                take_profit_pct: Some(defaults.take_profit_pct),
                max_drawdown: Some(defaults.max_drawdown),
            },
        }
    }

    /// Attach evaluation metrics and fill omitted risk fields.
    pub fn into_descriptor(
        self,
        strategy_type: StrategyType,
        defaults: &StrategyDefaults,
    ) -> StrategyDescriptor {
        let clamp = |v: Decimal| v.max(Decimal::ZERO).min(Decimal::ONE);
        let risk = &self.risk_management;
        let risk_management = RiskManagement {
            max_position_size: clamp(risk.max_position_size.unwrap_or(defaults.max_position_size)),
            stop_loss_pct: clamp(risk.stop_loss_pct.unwrap_or(defaults.stop_loss_pct)),
            take_profit_pct: clamp(risk.take_profit_pct.unwrap_or(defaults.take_profit_pct)),
            max_drawdown: clamp(risk.max_drawdown.unwrap_or(defaults.max_drawdown)),
        };
        let test_results = simulated_evaluation(&self.name);
        StrategyDescriptor {
            name: self.name,
            description: self.description,
            strategy_type,
            parameters: self.parameters,
            entry_rules: self.entry_rules,
            exit_rules: self.exit_rules,
            risk_management,
            test_results,
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// 64-bit FNV-1a; stable across processes and platforms.
fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |h, b| (h ^ u64::from(*b)).wrapping_mul(PRIME))
}

/// Deterministic stand-in for a backtest, derived from the strategy name.
pub fn simulated_evaluation(name: &str) -> TestResults {
    let h = fnv1a(name.as_bytes());
    TestResults {
        win_rate: 0.60 + (h % 20) as f64 / 100.0,
        total_return: 0.10 + (h % 15) as f64 / 100.0,
        sharpe_ratio: 1.2 + (h % 10) as f64 / 10.0,
        max_drawdown: 0.08 + (h % 10) as f64 / 100.0,
        total_trades: 50 + (h % 50) as u32,
    }
}

// ---------------------------------------------------------------------------
// Prompt helpers
// ---------------------------------------------------------------------------

/// Plain-text context describing current settings and a sample of the
/// markets and opportunities seen recently.
pub fn build_context(
    strategy_type: StrategyType,
    defaults: &StrategyDefaults,
    markets: &[Market],
    opportunities: &[Opportunity],
) -> String {
    let mut lines = vec![
        format!("Strategy Type: {strategy_type}"),
        "Current Settings:".to_string(),
        format!("  - Max Position Size: {}", defaults.max_position_size),
        format!("  - Stop Loss: {}", defaults.stop_loss_pct),
        format!("  - Take Profit: {}", defaults.take_profit_pct),
    ];

    if !markets.is_empty() {
        lines.push(String::new());
        lines.push(format!("Market Data: {} markets analyzed", markets.len()));
        lines.extend(markets.iter().take(CONTEXT_SAMPLES).map(|m| {
            let question: String = m.question.chars().take(50).collect();
            format!("  - {question}: Liquidity={}, Volume={}", m.liquidity, m.volume)
        }));
    }

    if !opportunities.is_empty() {
        lines.push(String::new());
        lines.push(format!("Opportunities: {} found", opportunities.len()));
        lines.extend(opportunities.iter().take(CONTEXT_SAMPLES).map(|o| {
            format!(
                "  - {}: Score={:.2}, Expected Return={:.2}%",
                o.opportunity_type,
                o.score,
                o.expected_return * Decimal::ONE_HUNDRED
            )
        }));
    }

    let mut ctx = lines.join("\n");
    ctx.push('\n');
    ctx
}

/// Slice from the first `{` to the last `}`; the whole text if there is
/// no such span.
pub fn extract_json(text: &str) -> &str {
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if end > start => &text[start..=end],
        _ => text,
    }
}

// ---------------------------------------------------------------------------
// Template generator
// ---------------------------------------------------------------------------

/// Generator used when no LLM is configured: always the default blueprint.
pub struct TemplateGenerator {
    defaults: StrategyDefaults,
}

impl TemplateGenerator {
    pub fn new(defaults: StrategyDefaults) -> Self {
        Self { defaults }
    }
}

#[async_trait]
impl StrategyGenerator for TemplateGenerator {
    async fn generate(
        &self,
        strategy_type: StrategyType,
        _markets: &[Market],
        _opportunities: &[Opportunity],
    ) -> Result<StrategyDescriptor> {
        Ok(StrategyBlueprint::default_for(strategy_type, &self.defaults)
            .into_descriptor(strategy_type, &self.defaults))
    }

    fn name(&self) -> &str {
        "template"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
