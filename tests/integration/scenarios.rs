//! End-to-end scenarios: scan → intake → paper trade → refresh.

use rust_decimal_macros::dec;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sibyl::config::AppConfig;
use sibyl::engine::coordinator::{LoopSchedule, TradeDecision};
use sibyl::engine::events::Event;
use sibyl::engine::{Coordinator, EventKind};
use sibyl::llm::{StrategyDefaults, StrategyGenerator, TemplateGenerator};
use sibyl::platforms::MarketDataSource;
use sibyl::types::{ExitReason, OpportunityType, RiskTier, Side, TradeKind};

use crate::mock_platform::{book, market, MockMarketData};

fn template() -> Option<Arc<dyn StrategyGenerator>> {
    Some(Arc::new(TemplateGenerator::new(StrategyDefaults::default())))
}

fn coordinator_with(cfg: &AppConfig, data: &Arc<MockMarketData>) -> Coordinator {
    let source: Arc<dyn MarketDataSource> = data.clone();
    Coordinator::new(cfg, source, template(), None)
}

fn record_events(coordinator: &Coordinator) -> Arc<Mutex<Vec<EventKind>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    coordinator.subscribe(Arc::new(move |e: &Event| -> anyhow::Result<()> {
        sink.lock().unwrap().push(e.kind);
        Ok(())
    }));
    seen
}

#[tokio::test]
async fn test_thin_market_end_to_end() {
    let data = Arc::new(MockMarketData::new());
    data.add_market(market("thin", dec!(500), None), Some(book("thin", dec!(0.25), dec!(0.74))));

    let coordinator = coordinator_with(&AppConfig::default(), &data);
    let report = coordinator.core().scan_once().await;
    assert_eq!(report.opportunities_found, 1);

    let opps = coordinator
        .core()
        .scanner()
        .get_opportunities(None, None, 10)
        .await;
    assert_eq!(opps.len(), 1);
    let opp = &opps[0];
    assert_eq!(opp.opportunity_type, OpportunityType::Liquidity);
    assert_eq!(opp.side, Side::Yes);
    assert_eq!(opp.score, dec!(0.6));
    assert_eq!(opp.risk, RiskTier::High);
    assert_eq!(opp.expected_return, dec!(0.10));
    assert_eq!(opp.entry_price, dec!(0.25));

    // 0.6 is below the 0.7 intake threshold.
    let intake = coordinator.core().intake_once().await;
    assert_eq!(intake.retained, 0);
}

#[tokio::test]
async fn test_arbitrage_trade_then_take_profit() {
    let data = Arc::new(MockMarketData::new());
    data.add_market(market("arb", dec!(50000), None), Some(book("arb", dec!(0.40), dec!(0.45))));

    let coordinator = coordinator_with(&AppConfig::default(), &data);
    let events = record_events(&coordinator);
    let core = coordinator.core();

    assert_eq!(core.refresh_strategies_once().await, 3);
    core.scan_once().await;
    let intake = core.intake_once().await;
    assert_eq!(intake.executed(), 1);

    let position = core.ledger().position("arb_YES").await.unwrap();
    assert_eq!(position.entry_price, dec!(0.40));
    assert_eq!(position.size, dec!(5000));
    assert_eq!(position.take_profit, Some(dec!(0.5)));
    assert_eq!(core.ledger().balance().await, dec!(8000));

    data.set_book(book("arb", dec!(0.60), dec!(0.45)));
    assert_eq!(core.refresh_once().await, 1);

    let closed = core.ledger().closed_positions().await;
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].exit_reason, Some(ExitReason::TakeProfit));
    assert_eq!(closed[0].realized_pnl, Some(dec!(1000)));
    assert_eq!(core.ledger().balance().await, dec!(11000));

    let trades = core.ledger().recent_trades(10).await;
    assert_eq!(trades.len(), 2);
    assert_eq!(trades[1].kind, TradeKind::Close);
    assert_eq!(trades[1].strategy_id.as_deref(), Some("default_arbitrage_strategy"));

    let kinds = events.lock().unwrap().clone();
    assert_eq!(kinds.iter().filter(|k| **k == EventKind::Opportunity).count(), 1);
    assert_eq!(kinds.iter().filter(|k| **k == EventKind::TradeExecuted).count(), 1);
}

#[tokio::test]
async fn test_repeated_intake_publishes_once() {
    let data = Arc::new(MockMarketData::new());
    data.add_market(market("arb", dec!(50000), None), Some(book("arb", dec!(0.40), dec!(0.45))));

    let coordinator = Coordinator::new(&AppConfig::default(), data.clone(), None, None);
    let events = record_events(&coordinator);
    let core = coordinator.core();

    core.scan_once().await;
    let first = core.intake_once().await;
    let second = core.intake_once().await;

    assert_eq!(first.retained, 1);
    assert_eq!(second.duplicates, 1);
    assert_eq!(first.decisions[0].1, TradeDecision::NoStrategy);
    assert_eq!(*events.lock().unwrap(), vec![EventKind::Opportunity]);
}

#[tokio::test]
async fn test_intake_beyond_retained_capacity_trades_each_once() {
    let data = Arc::new(MockMarketData::new());
    for id in ["a1", "a2", "a3"] {
        data.add_market(market(id, dec!(50000), None), Some(book(id, dec!(0.40), dec!(0.45))));
    }
    let mut cfg = AppConfig::default();
    cfg.scanner.retained_opportunities = 2;

    let coordinator = coordinator_with(&cfg, &data);
    let events = record_events(&coordinator);
    let core = coordinator.core();
    core.refresh_strategies_once().await;
    core.scan_once().await;
    assert_eq!(core.scanner().opportunity_count().await, 3);

    let first = core.intake_once().await;
    assert_eq!(first.executed(), 3);
    for _ in 0..2 {
        let again = core.intake_once().await;
        assert_eq!(again.retained, 0);
        assert_eq!(again.duplicates, 3);
        assert_eq!(again.executed(), 0);
    }

    let kinds = events.lock().unwrap().clone();
    assert_eq!(kinds.iter().filter(|k| **k == EventKind::Opportunity).count(), 3);
    assert_eq!(kinds.iter().filter(|k| **k == EventKind::TradeExecuted).count(), 3);
    assert_eq!(core.ledger().statistics().await.total_trades, 3);
    assert_eq!(core.ledger().open_position_count().await, 3);
    assert_eq!(core.retained_opportunities().await.len(), 2);
}

#[tokio::test]
async fn test_admission_control_caps_open_positions() {
    let data = Arc::new(MockMarketData::new());
    for id in ["a1", "a2", "a3"] {
        data.add_market(market(id, dec!(50000), None), Some(book(id, dec!(0.40), dec!(0.45))));
    }
    let mut cfg = AppConfig::default();
    cfg.trading.max_concurrent_positions = 1;

    let coordinator = coordinator_with(&cfg, &data);
    let core = coordinator.core();
    core.refresh_strategies_once().await;
    core.scan_once().await;
    let intake = core.intake_once().await;

    assert_eq!(intake.executed(), 1);
    assert_eq!(
        intake
            .decisions
            .iter()
            .filter(|(_, d)| *d == TradeDecision::AtCapacity)
            .count(),
        2
    );
    assert_eq!(core.ledger().open_position_count().await, 1);
}

#[tokio::test]
async fn test_listing_outage_then_recovery() {
    let data = Arc::new(MockMarketData::new());
    data.add_market(market("thin", dec!(500), None), Some(book("thin", dec!(0.25), dec!(0.74))));
    data.set_error("503 Service Unavailable");

    let coordinator = coordinator_with(&AppConfig::default(), &data);
    let core = coordinator.core();

    let failed = core.scan_once().await;
    assert_eq!(failed.markets_fetched, 0);
    assert_eq!(data.book_requests(), 0);

    data.clear_error();
    let recovered = core.scan_once().await;
    assert_eq!(recovered.opportunities_found, 1);
}

#[tokio::test]
async fn test_maintenance_clears_seen_set() {
    let data = Arc::new(MockMarketData::new());
    data.add_market(market("thin", dec!(500), None), Some(book("thin", dec!(0.25), dec!(0.74))));

    let coordinator = coordinator_with(&AppConfig::default(), &data);
    let core = coordinator.core();

    core.scan_once().await;
    assert_eq!(core.scan_once().await.skipped_seen, 1);

    let (pruned, cleared) = core.run_maintenance(24).await;
    assert_eq!(pruned, 0);
    assert_eq!(cleared, 1);
    assert_eq!(core.scan_once().await.opportunities_found, 1);
    assert_eq!(core.scanner().opportunity_count().await, 2);
}

#[tokio::test]
async fn test_loops_trade_autonomously() {
    let data = Arc::new(MockMarketData::new());
    data.add_market(market("arb", dec!(50000), None), Some(book("arb", dec!(0.40), dec!(0.45))));

    let coordinator = coordinator_with(&AppConfig::default(), &data).with_schedule(LoopSchedule {
        scan: Duration::from_millis(20),
        refresh: Duration::from_millis(20),
        intake: Duration::from_millis(20),
        strategy: Duration::from_secs(3600),
    });
    let events = record_events(&coordinator);
    // Intake can run before the strategy loop's first tick.
    coordinator.core().refresh_strategies_once().await;

    coordinator.start().await;
    let mut traded = false;
    for _ in 0..100 {
        if coordinator.status().await.total_trades > 0 {
            traded = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    coordinator.stop().await;

    assert!(traded, "coordinator never traded");
    let status = coordinator.status().await;
    assert!(!status.running);
    assert_eq!(status.strategies, 3);
    assert_eq!(status.open_positions, 1);
    assert_eq!(status.retained_opportunities, 1);
    assert!(events.lock().unwrap().contains(&EventKind::TradeExecuted));
}
