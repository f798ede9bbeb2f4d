//! Shared types for the SIBYL agent.
//!
//! These types form the data model used across all modules: market
//! snapshots, order books, opportunities, orders, positions, trades and
//! strategy descriptors. Prices are probabilities held as exact
//! `Decimal`s so that cost-basis and PnL arithmetic never drifts.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// One of the two complementary outcomes of a binary market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Side {
    Yes,
    No,
}

impl Side {
    /// The opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Side::Yes => Side::No,
            Side::No => Side::Yes,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Yes => write!(f, "YES"),
            Side::No => write!(f, "NO"),
        }
    }
}

/// Market lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketStatus {
    Open,
    Closed,
    Resolved,
}

impl MarketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketStatus::Open => "open",
            MarketStatus::Closed => "closed",
            MarketStatus::Resolved => "resolved",
        }
    }
}

impl fmt::Display for MarketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MarketStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open" | "active" => Ok(MarketStatus::Open),
            "closed" => Ok(MarketStatus::Closed),
            "resolved" | "settled" => Ok(MarketStatus::Resolved),
            _ => Err(anyhow::anyhow!("Unknown market status: {s}")),
        }
    }
}

/// Kind of mispricing signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityType {
    Arbitrage,
    NewsGap,
    ProbabilityEdge,
    TimeDecay,
    Liquidity,
    TraderSignal,
    SocialSentiment,
    BreakingNews,
}

impl OpportunityType {
    pub const ALL: &'static [OpportunityType] = &[
        OpportunityType::Arbitrage,
        OpportunityType::NewsGap,
        OpportunityType::ProbabilityEdge,
        OpportunityType::TimeDecay,
        OpportunityType::Liquidity,
        OpportunityType::TraderSignal,
        OpportunityType::SocialSentiment,
        OpportunityType::BreakingNews,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OpportunityType::Arbitrage => "arbitrage",
            OpportunityType::NewsGap => "news_gap",
            OpportunityType::ProbabilityEdge => "probability_edge",
            OpportunityType::TimeDecay => "time_decay",
            OpportunityType::Liquidity => "liquidity",
            OpportunityType::TraderSignal => "trader_signal",
            OpportunityType::SocialSentiment => "social_sentiment",
            OpportunityType::BreakingNews => "breaking_news",
        }
    }
}

impl fmt::Display for OpportunityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Qualitative risk tier attached to an opportunity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskTier::Low => write!(f, "low"),
            RiskTier::Medium => write!(f, "medium"),
            RiskTier::High => write!(f, "high"),
        }
    }
}

// ---------------------------------------------------------------------------
// Market
// ---------------------------------------------------------------------------

/// Snapshot of a prediction market, fetched once per scan cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub id: String,
    pub question: String,
    pub description: Option<String>,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Available liquidity in USD equivalent
    pub liquidity: Decimal,
    pub volume: Decimal,
    /// Resolution deadline, when the venue publishes one
    pub end_time: Option<DateTime<Utc>>,
    pub status: MarketStatus,
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} (liq: ${:.0} | vol: ${:.0} | {})",
            self.id, self.question, self.liquidity, self.volume, self.status,
        )
    }
}

impl Market {
    /// Time left until resolution, measured from `now`.
    pub fn time_to_resolution(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.end_time.map(|end| end - now)
    }
}

/// Selection criteria passed to a market-data source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketFilter {
    pub status: Option<MarketStatus>,
    pub tag: Option<String>,
    pub min_liquidity: Option<Decimal>,
}

impl MarketFilter {
    /// Only markets still open for trading.
    pub fn open() -> Self {
        Self {
            status: Some(MarketStatus::Open),
            ..Default::default()
        }
    }

    /// Whether a market satisfies every criterion set on the filter.
    pub fn matches(&self, market: &Market) -> bool {
        if let Some(status) = self.status {
            if market.status != status {
                return false;
            }
        }
        if let Some(tag) = &self.tag {
            if !market.tags.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
                return false;
            }
        }
        if let Some(min) = self.min_liquidity {
            if market.liquidity < min {
                return false;
            }
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Order book
// ---------------------------------------------------------------------------

/// A single price level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBookEntry {
    pub price: Decimal,
    pub size: Decimal,
}

impl OrderBookEntry {
    pub fn new(price: Decimal, size: Decimal) -> Self {
        Self { price, size }
    }

    /// Prices are probabilities in [0, 1]; sizes are non-negative.
    pub fn is_valid(&self) -> bool {
        self.price >= Decimal::ZERO && self.price <= Decimal::ONE && self.size >= Decimal::ZERO
    }
}

/// Bid/ask ladders for both outcomes of a market.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBook {
    pub market_id: String,
    pub yes_bids: Vec<OrderBookEntry>,
    pub yes_asks: Vec<OrderBookEntry>,
    pub no_bids: Vec<OrderBookEntry>,
    pub no_asks: Vec<OrderBookEntry>,
    pub timestamp: DateTime<Utc>,
}

impl OrderBook {
    pub fn empty(market_id: &str) -> Self {
        Self {
            market_id: market_id.to_string(),
            yes_bids: Vec::new(),
            yes_asks: Vec::new(),
            no_bids: Vec::new(),
            no_asks: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn bids(&self, side: Side) -> &[OrderBookEntry] {
        match side {
            Side::Yes => &self.yes_bids,
            Side::No => &self.no_bids,
        }
    }

    pub fn asks(&self, side: Side) -> &[OrderBookEntry] {
        match side {
            Side::Yes => &self.yes_asks,
            Side::No => &self.no_asks,
        }
    }
}

// ---------------------------------------------------------------------------
// Opportunity
// ---------------------------------------------------------------------------

/// A detected, scored, directional trading signal. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: String,
    pub market_id: String,
    pub opportunity_type: OpportunityType,
    pub side: Side,
    /// Confidence score (0–1)
    pub score: Decimal,
    pub expected_return: Decimal,
    pub risk: RiskTier,
    pub entry_price: Decimal,
    pub target_price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub rationale: String,
    pub detected_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Raw detector inputs, kept for audit
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl fmt::Display for Opportunity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} @ {:.2} | score={:.2} exp={:.1}% risk={} | {}",
            self.opportunity_type,
            self.side,
            self.market_id,
            self.entry_price,
            self.score,
            self.expected_return * Decimal::ONE_HUNDRED,
            self.risk,
            self.rationale,
        )
    }
}

impl Opportunity {
    /// Whether the opportunity carries an expiry that lies after `now`.
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |exp| exp > now)
    }
}

// ---------------------------------------------------------------------------
// Orders, positions & trades
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Limit,
    Market,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Filled,
    Cancelled,
    Partial,
}

/// A simulated order. Fills are immediate and complete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub market_id: String,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Decimal,
    pub size: Decimal,
    pub filled_size: Decimal,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub filled_at: Option<DateTime<Utc>>,
}

impl Order {
    /// New pending limit order.
    pub fn limit(market_id: &str, side: Side, price: Decimal, size: Decimal) -> Self {
        Self {
            id: format!("ord-{}", uuid::Uuid::new_v4()),
            market_id: market_id.to_string(),
            side,
            order_type: OrderType::Limit,
            price,
            size,
            filled_size: Decimal::ZERO,
            status: OrderStatus::Pending,
            created_at: Utc::now(),
            filled_at: None,
        }
    }

    /// Pending → filled, for the full requested size.
    pub fn fill(&mut self, at: DateTime<Utc>) {
        self.filled_size = self.size;
        self.status = OrderStatus::Filled;
        self.filled_at = Some(at);
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} size={:.4} @ {:.4} ({:?})",
            self.id, self.side, self.market_id, self.size, self.price, self.status,
        )
    }
}

/// Whether a position profits from the price rising or falling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// YES exposure is long, NO exposure is short.
    pub fn for_side(side: Side) -> Self {
        match side {
            Side::Yes => Direction::Long,
            Side::No => Direction::Short,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    Manual,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::StopLoss => write!(f, "stop_loss"),
            ExitReason::TakeProfit => write!(f, "take_profit"),
            ExitReason::Manual => write!(f, "manual"),
        }
    }
}

/// Open (or closed) exposure on one side of one market.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub market_id: String,
    pub side: Side,
    pub direction: Direction,
    pub size: Decimal,
    /// Size-weighted average entry price
    pub entry_price: Decimal,
    pub current_price: Decimal,
    pub unrealized_pnl: Decimal,
    /// Set only when the position is closed
    pub realized_pnl: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub strategy_id: Option<String>,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub exit_reason: Option<ExitReason>,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pnl = self.unrealized_pnl;
        let pnl_sign = if pnl >= Decimal::ZERO { "+" } else { "" };
        write!(
            f,
            "[{}] {} size={:.4} entry={:.4} mark={:.4} ({pnl_sign}{pnl:.2})",
            self.id, self.direction, self.size, self.entry_price, self.current_price,
        )
    }
}

impl Position {
    /// Positions are keyed by market and side.
    pub fn key(market_id: &str, side: Side) -> String {
        format!("{market_id}_{side}")
    }

    /// Directional PnL if the whole position were valued at `price`.
    pub fn pnl_at(&self, price: Decimal) -> Decimal {
        match self.direction {
            Direction::Long => (price - self.entry_price) * self.size,
            Direction::Short => (self.entry_price - price) * self.size,
        }
    }

    /// Mark the position to `price`.
    pub fn mark(&mut self, price: Decimal) {
        self.current_price = price;
        self.unrealized_pnl = self.pnl_at(price);
    }

    /// Capital committed at the current average entry.
    pub fn cost_basis(&self) -> Decimal {
        self.entry_price * self.size
    }

    /// Evaluate the stop-loss / take-profit thresholds at `price`.
    /// Take-profit wins when both hold.
    pub fn exit_trigger(&self, price: Decimal) -> Option<ExitReason> {
        let (stop_hit, target_hit) = match self.direction {
            Direction::Long => (
                self.stop_loss.map_or(false, |s| price <= s),
                self.take_profit.map_or(false, |t| price >= t),
            ),
            Direction::Short => (
                self.stop_loss.map_or(false, |s| price >= s),
                self.take_profit.map_or(false, |t| price <= t),
            ),
        };
        if target_hit {
            Some(ExitReason::TakeProfit)
        } else if stop_hit {
            Some(ExitReason::StopLoss)
        } else {
            None
        }
    }
}

/// Whether a trade opened/increased exposure or closed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeKind {
    Open,
    Close,
}

/// Immutable execution record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub market_id: String,
    pub side: Side,
    pub kind: TradeKind,
    pub price: Decimal,
    pub size: Decimal,
    pub strategy_id: Option<String>,
    /// Realized PnL, present on closing trades
    pub pnl: Option<Decimal>,
    pub timestamp: DateTime<Utc>,
}

impl fmt::Display for Trade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} {} {} size={:.4} @ {:.4}",
            self.kind, self.side, self.market_id, self.size, self.price,
        )?;
        if let Some(pnl) = self.pnl {
            write!(f, " pnl={pnl:.2}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Strategy descriptors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyType {
    Arbitrage,
    NewsDriven,
    ProbabilityEdge,
    TimeDecay,
    Liquidity,
    TraderFollowing,
    SocialSentiment,
}

impl StrategyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyType::Arbitrage => "arbitrage",
            StrategyType::NewsDriven => "news_driven",
            StrategyType::ProbabilityEdge => "probability_edge",
            StrategyType::TimeDecay => "time_decay",
            StrategyType::Liquidity => "liquidity",
            StrategyType::TraderFollowing => "trader_following",
            StrategyType::SocialSentiment => "social_sentiment",
        }
    }

    /// Whether strategies of this type trade the given opportunity type.
    pub fn covers(&self, kind: OpportunityType) -> bool {
        self.as_str().contains(kind.as_str())
    }
}

impl fmt::Display for StrategyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position sizing and exit limits a strategy trades under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskManagement {
    /// Fraction of equity per position (0–1)
    pub max_position_size: Decimal,
    pub stop_loss_pct: Decimal,
    pub take_profit_pct: Decimal,
    pub max_drawdown: Decimal,
}

/// Evaluation metrics reported for a strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResults {
    pub win_rate: f64,
    pub total_return: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub total_trades: u32,
}

/// A generated trading strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyDescriptor {
    pub name: String,
    pub description: String,
    pub strategy_type: StrategyType,
    #[serde(default)]
    pub parameters: serde_json::Value,
    #[serde(default)]
    pub entry_rules: serde_json::Value,
    #[serde(default)]
    pub exit_rules: serde_json::Value,
    pub risk_management: RiskManagement,
    pub test_results: TestResults,
    pub created_at: DateTime<Utc>,
}

impl fmt::Display for StrategyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] win={:.0}% ret={:.1}% dd={:.1}% max_size={:.0}%",
            self.name,
            self.strategy_type,
            self.test_results.win_rate * 100.0,
            self.test_results.total_return * 100.0,
            self.test_results.max_drawdown * 100.0,
            self.risk_management.max_position_size * Decimal::ONE_HUNDRED,
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Boundary violations rejected before they can touch ledger state.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TradingError {
    #[error("Price out of range (0, 1]: {0}")]
    InvalidPrice(Decimal),

    #[error("Fraction {name} out of range: {value}")]
    InvalidFraction { name: &'static str, value: Decimal },

    #[error("Score out of range [0, 1]: {0}")]
    InvalidScore(Decimal),

    #[error("Configuration error: {0}")]
    Config(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn make_position(direction: Direction) -> Position {
        let side = match direction {
            Direction::Long => Side::Yes,
            Direction::Short => Side::No,
        };
        Position {
            id: Position::key("MKT-1", side),
            market_id: "MKT-1".to_string(),
            side,
            direction,
            size: dec!(10),
            entry_price: dec!(0.40),
            current_price: dec!(0.40),
            unrealized_pnl: Decimal::ZERO,
            realized_pnl: None,
            stop_loss: None,
            take_profit: None,
            strategy_id: None,
            opened_at: Utc::now(),
            closed_at: None,
            exit_reason: None,
        }
    }

    #[test]
    fn test_side_display_and_opposite() {
        assert_eq!(format!("{}", Side::Yes), "YES");
        assert_eq!(format!("{}", Side::No), "NO");
        assert_eq!(Side::Yes.opposite(), Side::No);
    }

    #[test]
    fn test_market_status_from_str() {
        assert_eq!("OPEN".parse::<MarketStatus>().unwrap(), MarketStatus::Open);
        assert_eq!("settled".parse::<MarketStatus>().unwrap(), MarketStatus::Resolved);
        assert!("nonsense".parse::<MarketStatus>().is_err());
    }

    #[test]
    fn test_opportunity_type_serde_names() {
        for kind in OpportunityType::ALL {
            let json = serde_json::to_string(kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn test_strategy_type_covers() {
        assert!(StrategyType::Arbitrage.covers(OpportunityType::Arbitrage));
        assert!(StrategyType::TimeDecay.covers(OpportunityType::TimeDecay));
        assert!(!StrategyType::NewsDriven.covers(OpportunityType::NewsGap));
        assert!(!StrategyType::Liquidity.covers(OpportunityType::Arbitrage));
    }

    #[test]
    fn test_position_key() {
        assert_eq!(Position::key("abc", Side::No), "abc_NO");
    }

    #[test]
    fn test_position_pnl_sign_convention() {
        let mut long = make_position(Direction::Long);
        long.mark(dec!(0.60));
        assert_eq!(long.unrealized_pnl, dec!(2.00));

        let mut short = make_position(Direction::Short);
        short.mark(dec!(0.60));
        assert_eq!(short.unrealized_pnl, dec!(-2.00));
    }

    #[test]
    fn test_exit_trigger_long() {
        let mut pos = make_position(Direction::Long);
        pos.stop_loss = Some(dec!(0.30));
        pos.take_profit = Some(dec!(0.50));
        assert_eq!(pos.exit_trigger(dec!(0.30)), Some(ExitReason::StopLoss));
        assert_eq!(pos.exit_trigger(dec!(0.50)), Some(ExitReason::TakeProfit));
        assert_eq!(pos.exit_trigger(dec!(0.40)), None);
    }

    #[test]
    fn test_exit_trigger_short() {
        let mut pos = make_position(Direction::Short);
        pos.stop_loss = Some(dec!(0.50));
        pos.take_profit = Some(dec!(0.30));
        assert_eq!(pos.exit_trigger(dec!(0.55)), Some(ExitReason::StopLoss));
        assert_eq!(pos.exit_trigger(dec!(0.25)), Some(ExitReason::TakeProfit));
        assert_eq!(pos.exit_trigger(dec!(0.40)), None);
    }

    #[test]
    fn test_exit_trigger_take_profit_wins() {
        let mut pos = make_position(Direction::Long);
        // Inverted thresholds: both conditions hold at 0.45
        pos.stop_loss = Some(dec!(0.50));
        pos.take_profit = Some(dec!(0.40));
        assert_eq!(pos.exit_trigger(dec!(0.45)), Some(ExitReason::TakeProfit));
    }

    #[test]
    fn test_market_filter_matches() {
        let market = Market {
            id: "m1".to_string(),
            question: "Will it rain?".to_string(),
            description: None,
            slug: String::new(),
            tags: vec!["Weather".to_string()],
            liquidity: dec!(500),
            volume: dec!(1000),
            end_time: None,
            status: MarketStatus::Open,
        };
        assert!(MarketFilter::open().matches(&market));
        let by_tag = MarketFilter { tag: Some("weather".to_string()), ..Default::default() };
        assert!(by_tag.matches(&market));
        let rich = MarketFilter { min_liquidity: Some(dec!(1000)), ..Default::default() };
        assert!(!rich.matches(&market));
        let closed = MarketFilter { status: Some(MarketStatus::Closed), ..Default::default() };
        assert!(!closed.matches(&market));
    }

    #[test]
    fn test_order_fill() {
        let mut order = Order::limit("m1", Side::Yes, dec!(0.4), dec!(25));
        assert_eq!(order.status, OrderStatus::Pending);
        order.fill(Utc::now());
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.filled_size, dec!(25));
        assert!(order.filled_at.is_some());
    }

    #[test]
    fn test_order_book_entry_validity() {
        assert!(OrderBookEntry::new(dec!(0), dec!(5)).is_valid());
        assert!(OrderBookEntry::new(dec!(1), dec!(0)).is_valid());
        assert!(!OrderBookEntry::new(dec!(1.01), dec!(5)).is_valid());
        assert!(!OrderBookEntry::new(dec!(0.5), dec!(-1)).is_valid());
    }

    #[test]
    fn test_trading_error_display() {
        let e = TradingError::InvalidPrice(dec!(1.5));
        assert_eq!(format!("{e}"), "Price out of range (0, 1]: 1.5");
    }
}
