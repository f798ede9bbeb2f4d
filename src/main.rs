//! SIBYL: prediction-market opportunity scanner and paper trader.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! wires the market-data client and strategy generator into the
//! coordinator, and runs until Ctrl+C with periodic maintenance.

use anyhow::Result;
use secrecy::SecretString;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use sibyl::config::AppConfig;
use sibyl::engine::{Coordinator, LoggingSubscriber};
use sibyl::llm::anthropic::AnthropicStrategyGenerator;
use sibyl::llm::{StrategyDefaults, StrategyGenerator, TemplateGenerator};
use sibyl::platforms::polymarket::PolymarketClient;
use sibyl::platforms::MarketDataSource;

const BANNER: &str = r#"
 ____ ___ ______   ___
/ ___|_ _| __ ) \ / / |
\___ \| ||  _ \\ V /| |
 ___) | || |_) || | | |___
|____/___|____/ |_| |_____|

  Prediction-market scanner & paper trader
  v0.1.0
"#;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path =
        std::env::var("SIBYL_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let cfg = if Path::new(&config_path).exists() {
        AppConfig::load(&config_path)?
    } else {
        AppConfig::default()
    };

    init_logging();

    println!("{BANNER}");
    info!(
        agent_name = %cfg.agent.name,
        config = %config_path,
        scan_interval_secs = cfg.agent.scan_interval_secs,
        initial_capital = %cfg.trading.initial_capital,
        "SIBYL starting up"
    );

    // -- Collaborators ----------------------------------------------------

    let source: Arc<dyn MarketDataSource> = Arc::new(PolymarketClient::new(&cfg.market_data)?);
    let generator = build_generator(&cfg)?;

    // -- Coordinator ------------------------------------------------------

    let coordinator = Coordinator::new(&cfg, source, Some(generator), None);
    coordinator.subscribe(Arc::new(LoggingSubscriber));
    coordinator.start().await;

    let mut maintenance =
        tokio::time::interval(Duration::from_secs(cfg.agent.maintenance_interval_secs.max(1)));
    // First tick fires immediately; nothing to maintain yet.
    maintenance.tick().await;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!("Running. Press Ctrl+C to stop.");

    loop {
        tokio::select! {
            _ = maintenance.tick() => {
                coordinator
                    .core()
                    .run_maintenance(cfg.agent.opportunity_max_age_hours)
                    .await;
                let status = coordinator.status().await;
                info!(
                    retained = status.retained_opportunities,
                    strategies = status.strategies,
                    open_positions = status.open_positions,
                    equity = %status.statistics.equity,
                    roi_pct = %status.statistics.roi.round_dp(2),
                    "Status"
                );
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    coordinator.stop().await;

    let stats = coordinator.core().ledger().statistics().await;
    info!(
        capital = format!("${:.2}", stats.capital),
        equity = format!("${:.2}", stats.equity),
        realized_pnl = format!("${:.2}", stats.realized_pnl),
        trades = stats.total_trades,
        win_rate = %stats.win_rate.round_dp(3),
        "SIBYL shut down cleanly."
    );

    Ok(())
}

/// LLM-backed generator when its API key is present, otherwise templates.
fn build_generator(cfg: &AppConfig) -> Result<Arc<dyn StrategyGenerator>> {
    let defaults = StrategyDefaults::from_config(cfg);

    match AppConfig::resolve_env(&cfg.llm.api_key_env) {
        Ok(key) if cfg.llm.provider == "anthropic" => {
            info!(model = %cfg.llm.model, "Using Anthropic strategy generator");
            Ok(Arc::new(AnthropicStrategyGenerator::new(
                SecretString::new(key),
                &cfg.llm,
                defaults,
            )?))
        }
        Ok(_) => {
            warn!(provider = %cfg.llm.provider, "Unsupported LLM provider, using templates");
            Ok(Arc::new(TemplateGenerator::new(defaults)))
        }
        Err(_) => {
            warn!(
                env = %cfg.llm.api_key_env,
                "No LLM API key configured, using template strategies"
            );
            Ok(Arc::new(TemplateGenerator::new(defaults)))
        }
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("sibyl=info"));

    if std::env::var("SIBYL_LOG_JSON").is_ok() {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
