//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Every section and field has a default, so a partial file (or none at
//! all) still yields a runnable configuration. Secrets (API keys) are
//! referenced by env-var name and resolved at runtime.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::fs;

use crate::types::TradingError;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub trading: TradingConfig,
    pub risk: RiskConfig,
    pub scanner: ScannerSettings,
    pub market_data: MarketDataConfig,
    pub llm: LlmConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AgentConfig {
    pub name: String,
    pub scan_interval_secs: u64,
    pub maintenance_interval_secs: u64,
    pub opportunity_max_age_hours: i64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "SIBYL-001".to_string(),
            scan_interval_secs: 30,
            maintenance_interval_secs: 3600,
            opportunity_max_age_hours: 24,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TradingConfig {
    pub initial_capital: Decimal,
    /// Minimum score for an opportunity to enter the retained buffer.
    pub score_threshold: Decimal,
    /// Minimum score for an opportunity to be traded automatically.
    pub auto_trade_score: Decimal,
    pub max_concurrent_positions: usize,
    /// Fraction of equity per position (0–1).
    pub max_position_size: Decimal,
    pub stop_loss_pct: Decimal,
    pub take_profit_pct: Decimal,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            initial_capital: dec!(10000),
            score_threshold: dec!(0.7),
            auto_trade_score: dec!(0.8),
            max_concurrent_positions: 10,
            max_position_size: dec!(0.2),
            stop_loss_pct: dec!(0.1),
            take_profit_pct: dec!(0.2),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RiskConfig {
    pub max_drawdown: f64,
    pub min_win_rate: f64,
    pub min_total_return: f64,
    /// Strategy generation stops once this many are held.
    pub max_strategies: usize,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_drawdown: 0.2,
            min_win_rate: 0.55,
            min_total_return: 0.05,
            max_strategies: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScannerSettings {
    pub market_fetch_limit: usize,
    pub markets_per_cycle: usize,
    pub retained_opportunities: usize,
    pub trade_history: usize,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self {
            market_fetch_limit: 1000,
            markets_per_cycle: 100,
            retained_opportunities: 1000,
            trade_history: 10_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MarketDataConfig {
    pub api_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            api_url: "https://clob.polymarket.com".to_string(),
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    pub api_key_env: String,
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            max_tokens: 4000,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config = Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the ledger and coordinator cannot run with.
    pub fn validate(&self) -> Result<(), TradingError> {
        let t = &self.trading;
        if t.initial_capital <= Decimal::ZERO {
            return Err(TradingError::Config(format!(
                "initial_capital must be positive, got {}",
                t.initial_capital
            )));
        }
        for (name, value) in [
            ("score_threshold", t.score_threshold),
            ("auto_trade_score", t.auto_trade_score),
            ("max_position_size", t.max_position_size),
            ("stop_loss_pct", t.stop_loss_pct),
            ("take_profit_pct", t.take_profit_pct),
        ] {
            if value < Decimal::ZERO || value > Decimal::ONE {
                return Err(TradingError::Config(format!(
                    "{name} must lie in [0, 1], got {value}"
                )));
            }
        }
        for (name, value) in [
            ("max_drawdown", self.risk.max_drawdown),
            ("min_win_rate", self.risk.min_win_rate),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(TradingError::Config(format!(
                    "{name} must lie in [0, 1], got {value}"
                )));
            }
        }
        if self.agent.scan_interval_secs == 0 || self.agent.maintenance_interval_secs == 0 {
            return Err(TradingError::Config("intervals must be non-zero".to_string()));
        }
        if self.scanner.retained_opportunities == 0 || self.scanner.trade_history == 0 {
            return Err(TradingError::Config("buffer capacities must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}
