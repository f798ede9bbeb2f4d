//! Paper-trading ledger.
//!
//! Simulated fills against a virtual capital balance. All bookkeeping
//! lives in a synchronous `LedgerState` behind one async `RwLock`; price
//! lookups happen outside the lock so a slow feed never stalls intake.
//!
//! Capital moves only on fills: `-position_value` on opens/increases and
//! `+exit_price × size` on closes.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::platforms::MarketDataSource;
use crate::types::{
    Direction, ExitReason, Opportunity, Order, Position, Side, Trade, TradeKind, TradingError,
};

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Outcome of a placement. Insufficient capital is a no-op, not an error.
#[derive(Debug, Clone)]
pub enum PlacementResult {
    Filled { order: Order, position: Position },
    InsufficientCapital { required: Decimal, available: Decimal },
}

impl PlacementResult {
    pub fn is_filled(&self) -> bool {
        matches!(self, PlacementResult::Filled { .. })
    }
}

#[derive(Debug, Clone, Default)]
pub struct RefreshReport {
    pub marked: usize,
    pub unpriced: usize,
    pub closed: Vec<Position>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LedgerStatistics {
    pub capital: Decimal,
    pub equity: Decimal,
    pub initial_capital: Decimal,
    pub total_pnl: Decimal,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    /// Percent
    pub roi: Decimal,
    pub total_trades: u64,
    pub closing_trades: u64,
    pub win_rate: Decimal,
    pub avg_win: Decimal,
    pub avg_loss: Decimal,
    pub open_positions: usize,
    pub closed_positions: usize,
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Synchronous ledger core. Every method is a critical section.
#[derive(Debug)]
pub struct LedgerState {
    initial_capital: Decimal,
    capital: Decimal,
    positions: BTreeMap<String, Position>,
    closed: Vec<Position>,
    trades: VecDeque<Trade>,
    trade_capacity: usize,
    total_trades: u64,
    realized_pnl: Decimal,
    wins: u64,
    losses: u64,
    win_sum: Decimal,
    loss_sum: Decimal,
}

impl LedgerState {
    pub fn new(initial_capital: Decimal, trade_capacity: usize) -> Self {
        Self {
            initial_capital,
            capital: initial_capital,
            positions: BTreeMap::new(),
            closed: Vec::new(),
            trades: VecDeque::new(),
            trade_capacity: trade_capacity.max(1),
            total_trades: 0,
            realized_pnl: Decimal::ZERO,
            wins: 0,
            losses: 0,
            win_sum: Decimal::ZERO,
            loss_sum: Decimal::ZERO,
        }
    }

    pub fn capital(&self) -> Decimal {
        self.capital
    }

    pub fn unrealized_pnl(&self) -> Decimal {
        self.positions.values().map(|p| p.unrealized_pnl).sum()
    }

    pub fn equity(&self) -> Decimal {
        self.capital + self.unrealized_pnl()
    }

    pub fn realized_pnl(&self) -> Decimal {
        self.realized_pnl
    }

    pub fn roi(&self) -> Decimal {
        if self.initial_capital.is_zero() {
            return Decimal::ZERO;
        }
        (self.equity() - self.initial_capital) / self.initial_capital * Decimal::ONE_HUNDRED
    }

    pub fn open_count(&self) -> usize {
        self.positions.len()
    }

    fn record(&mut self, trade: Trade) {
        if self.trades.len() >= self.trade_capacity {
            self.trades.pop_front();
        }
        self.trades.push_back(trade);
        self.total_trades += 1;
    }

    /// Fill `opportunity` at its entry price for `size_pct` of equity.
    /// Inputs must already be validated.
    pub fn place(
        &mut self,
        opportunity: &Opportunity,
        size_pct: Decimal,
        strategy_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> PlacementResult {
        let position_value = self.equity() * size_pct;
        if position_value <= Decimal::ZERO || position_value > self.capital {
            return PlacementResult::InsufficientCapital {
                required: position_value,
                available: self.capital,
            };
        }

        let price = opportunity.entry_price;
        let size = position_value / price;

        let mut order = Order::limit(&opportunity.market_id, opportunity.side, price, size);
        order.fill(now);
        self.capital -= position_value;

        let key = Position::key(&opportunity.market_id, opportunity.side);
        let position = self.positions.entry(key.clone()).or_insert_with(|| Position {
            id: key,
            market_id: opportunity.market_id.clone(),
            side: opportunity.side,
            direction: Direction::for_side(opportunity.side),
            size: Decimal::ZERO,
            entry_price: price,
            current_price: price,
            unrealized_pnl: Decimal::ZERO,
            realized_pnl: None,
            stop_loss: opportunity.stop_price,
            take_profit: opportunity.target_price,
            strategy_id: strategy_id.map(str::to_string),
            opened_at: now,
            closed_at: None,
            exit_reason: None,
        });

        let combined = position.size + size;
        position.entry_price = (position.entry_price * position.size + price * size) / combined;
        position.size = combined;
        position.mark(price);
        let position = position.clone();

        self.record(Trade {
            id: format!("trd-{}", uuid::Uuid::new_v4()),
            market_id: opportunity.market_id.clone(),
            side: opportunity.side,
            kind: TradeKind::Open,
            price,
            size,
            strategy_id: strategy_id.map(str::to_string),
            pnl: None,
            timestamp: now,
        });

        info!(
            position = %position.id,
            direction = %position.direction,
            price = %price,
            size = %size,
            capital = %self.capital,
            "Paper fill"
        );
        PlacementResult::Filled { order, position }
    }

    /// Mark an open position and close it if an exit threshold is crossed.
    pub fn mark(&mut self, position_id: &str, price: Decimal, now: DateTime<Utc>) -> Option<Position> {
        let position = self.positions.get_mut(position_id)?;
        position.mark(price);
        let reason = position.exit_trigger(price)?;
        self.close_at(position_id, price, reason, now)
    }

    /// Close at `exit_price`. `None` if the position is not open.
    pub fn close_at(
        &mut self,
        position_id: &str,
        exit_price: Decimal,
        reason: ExitReason,
        now: DateTime<Utc>,
    ) -> Option<Position> {
        let mut position = self.positions.remove(position_id)?;
        let pnl = position.pnl_at(exit_price);

        self.capital += exit_price * position.size;
        self.realized_pnl += pnl;
        if pnl > Decimal::ZERO {
            self.wins += 1;
            self.win_sum += pnl;
        } else if pnl < Decimal::ZERO {
            self.losses += 1;
            self.loss_sum += pnl;
        }

        position.current_price = exit_price;
        position.unrealized_pnl = Decimal::ZERO;
        position.realized_pnl = Some(pnl);
        position.closed_at = Some(now);
        position.exit_reason = Some(reason);

        self.record(Trade {
            id: format!("trd-{}", uuid::Uuid::new_v4()),
            market_id: position.market_id.clone(),
            side: position.side,
            kind: TradeKind::Close,
            price: exit_price,
            size: position.size,
            strategy_id: position.strategy_id.clone(),
            pnl: Some(pnl),
            timestamp: now,
        });

        info!(
            position = %position.id,
            reason = %reason,
            exit = %exit_price,
            pnl = %pnl,
            capital = %self.capital,
            "Position closed"
        );
        self.closed.push(position.clone());
        Some(position)
    }

    pub fn statistics(&self) -> LedgerStatistics {
        let closing = self.closed.len() as u64;
        let win_rate = if closing == 0 {
            Decimal::ZERO
        } else {
            Decimal::from(self.wins) / Decimal::from(closing)
        };
        let avg = |sum: Decimal, n: u64| {
            if n == 0 {
                Decimal::ZERO
            } else {
                sum / Decimal::from(n)
            }
        };
        let unrealized = self.unrealized_pnl();

        LedgerStatistics {
            capital: self.capital,
            equity: self.capital + unrealized,
            initial_capital: self.initial_capital,
            total_pnl: self.realized_pnl + unrealized,
            realized_pnl: self.realized_pnl,
            unrealized_pnl: unrealized,
            roi: self.roi(),
            total_trades: self.total_trades,
            closing_trades: closing,
            win_rate,
            avg_win: avg(self.win_sum, self.wins),
            avg_loss: avg(self.loss_sum, self.losses),
            open_positions: self.positions.len(),
            closed_positions: self.closed.len(),
        }
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

pub struct PaperLedger {
    source: Arc<dyn MarketDataSource>,
    state: RwLock<LedgerState>,
}

impl PaperLedger {
    pub fn new(source: Arc<dyn MarketDataSource>, initial_capital: Decimal, trade_capacity: usize) -> Self {
        Self {
            source,
            state: RwLock::new(LedgerState::new(initial_capital, trade_capacity)),
        }
    }

    /// Open or increase a position from an opportunity.
    pub async fn place_from_opportunity(
        &self,
        opportunity: &Opportunity,
        size_pct: Decimal,
        strategy_id: Option<&str>,
    ) -> Result<PlacementResult, TradingError> {
        let price = opportunity.entry_price;
        if price <= Decimal::ZERO || price > Decimal::ONE {
            return Err(TradingError::InvalidPrice(price));
        }
        if size_pct <= Decimal::ZERO || size_pct > Decimal::ONE {
            return Err(TradingError::InvalidFraction {
                name: "size_pct",
                value: size_pct,
            });
        }
        if opportunity.score < Decimal::ZERO || opportunity.score > Decimal::ONE {
            return Err(TradingError::InvalidScore(opportunity.score));
        }

        let mut state = self.state.write().await;
        let result = state.place(opportunity, size_pct, strategy_id, Utc::now());
        if let PlacementResult::InsufficientCapital { required, available } = &result {
            info!(
                opportunity = %opportunity.id,
                required = %required,
                available = %available,
                "Insufficient capital, order skipped"
            );
        }
        Ok(result)
    }

    /// Mark every open position to its side's best bid and apply exits.
    pub async fn refresh_positions(&self) -> RefreshReport {
        let targets: Vec<(String, String, Side)> = {
            let state = self.state.read().await;
            state
                .positions
                .values()
                .map(|p| (p.id.clone(), p.market_id.clone(), p.side))
                .collect()
        };
        if targets.is_empty() {
            return RefreshReport::default();
        }

        let prices = join_all(
            targets
                .iter()
                .map(|(_, market_id, side)| self.source.get_best_price(market_id, *side)),
        )
        .await;

        let mut report = RefreshReport::default();
        let now = Utc::now();
        let mut state = self.state.write().await;
        for ((id, market_id, _), price) in targets.iter().zip(prices) {
            let Some(price) = price else {
                debug!(position = %id, market_id = %market_id, "No price, mark skipped");
                report.unpriced += 1;
                continue;
            };
            if !state.positions.contains_key(id) {
                continue;
            }
            report.marked += 1;
            if let Some(closed) = state.mark(id, price, now) {
                report.closed.push(closed);
            }
        }
        report
    }

    /// Close at the current best bid. `None` if absent or unpriced.
    pub async fn close_position(&self, position_id: &str, reason: ExitReason) -> Option<Position> {
        let (market_id, side) = {
            let state = self.state.read().await;
            let p = state.positions.get(position_id)?;
            (p.market_id.clone(), p.side)
        };

        let Some(price) = self.source.get_best_price(&market_id, side).await else {
            warn!(position = %position_id, market_id = %market_id, "No exit price, close skipped");
            return None;
        };

        self.state
            .write()
            .await
            .close_at(position_id, price, reason, Utc::now())
    }

    pub async fn balance(&self) -> Decimal {
        self.state.read().await.capital()
    }

    pub async fn equity(&self) -> Decimal {
        self.state.read().await.equity()
    }

    pub async fn realized_pnl(&self) -> Decimal {
        self.state.read().await.realized_pnl()
    }

    pub async fn unrealized_pnl(&self) -> Decimal {
        self.state.read().await.unrealized_pnl()
    }

    pub async fn total_pnl(&self) -> Decimal {
        let state = self.state.read().await;
        state.realized_pnl() + state.unrealized_pnl()
    }

    pub async fn roi(&self) -> Decimal {
        self.state.read().await.roi()
    }

    pub async fn statistics(&self) -> LedgerStatistics {
        self.state.read().await.statistics()
    }

    pub async fn open_position_count(&self) -> usize {
        self.state.read().await.open_count()
    }

    pub async fn open_positions(&self) -> Vec<Position> {
        self.state.read().await.positions.values().cloned().collect()
    }

    pub async fn closed_positions(&self) -> Vec<Position> {
        self.state.read().await.closed.clone()
    }

    pub async fn position(&self, position_id: &str) -> Option<Position> {
        self.state.read().await.positions.get(position_id).cloned()
    }

    /// Most recent trades, oldest first.
    pub async fn recent_trades(&self, limit: usize) -> Vec<Trade> {
        let state = self.state.read().await;
        let skip = state.trades.len().saturating_sub(limit);
        state.trades.iter().skip(skip).cloned().collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
