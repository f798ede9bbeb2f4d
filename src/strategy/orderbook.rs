//! Order-book analytics.
//!
//! Pure, allocation-light views over an `OrderBook` snapshot: best
//! prices, spread, mid, depth, band liquidity, imbalance, market impact
//! and cross-outcome arbitrage. Nothing here does I/O or holds state.
//!
//! A missing best price is `None`, never zero. Zero is a legal price.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

use crate::types::{OrderBook, OrderBookEntry, Side};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Lower edge of the no-arbitrage band on YES mid + NO mid.
pub const ARB_LOWER_BOUND: Decimal = dec!(0.98);

/// Upper edge of the no-arbitrage band on YES mid + NO mid.
pub const ARB_UPPER_BOUND: Decimal = dec!(1.02);

/// Band used by `summary()` for liquidity around the mid.
pub const SUMMARY_BAND_PCT: Decimal = dec!(0.05);

/// Levels reported per side by `summary()`.
pub const SUMMARY_DEPTH_LEVELS: usize = 5;

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Top of book for one outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BestBidAsk {
    pub best_bid: Option<Decimal>,
    pub best_ask: Option<Decimal>,
    pub spread: Option<Decimal>,
    pub mid: Option<Decimal>,
}

/// Top-N levels: bids descending, asks ascending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Depth {
    pub bids: Vec<OrderBookEntry>,
    pub asks: Vec<OrderBookEntry>,
}

/// Resting size within a band around the mid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BandLiquidity {
    pub bid_liquidity: Decimal,
    pub ask_liquidity: Decimal,
    pub total: Decimal,
}

impl BandLiquidity {
    pub const ZERO: BandLiquidity = BandLiquidity {
        bid_liquidity: Decimal::ZERO,
        ask_liquidity: Decimal::ZERO,
        total: Decimal::ZERO,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArbitrageKind {
    /// Outcomes sum below 1: buy both.
    Buy,
    /// Outcomes sum above 1: sell both.
    Sell,
}

/// Cross-outcome mispricing outside the deadband.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Arbitrage {
    pub kind: ArbitrageKind,
    pub magnitude: Decimal,
    pub yes_mid: Decimal,
    pub no_mid: Decimal,
    pub total: Decimal,
}

/// Result of walking the ask ladder for a hypothetical buy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MarketImpact {
    pub requested: Decimal,
    pub filled: Decimal,
    pub unfilled: Decimal,
    /// Average over the filled size only; `None` when nothing filled.
    pub avg_price: Option<Decimal>,
    pub levels_consumed: usize,
    /// (avg − best ask) / best ask
    pub price_impact: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SideSummary {
    pub best_bid: Option<Decimal>,
    pub best_ask: Option<Decimal>,
    pub spread: Option<Decimal>,
    pub spread_pct: Option<Decimal>,
    pub mid: Option<Decimal>,
    pub liquidity: BandLiquidity,
    pub imbalance: Decimal,
    pub depth: Depth,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookSummary {
    pub market_id: String,
    pub yes: SideSummary,
    pub no: SideSummary,
    pub arbitrage: Option<Arbitrage>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

// ---------------------------------------------------------------------------
// View
// ---------------------------------------------------------------------------

/// Read-only analytics over a borrowed order book.
#[derive(Debug, Clone, Copy)]
pub struct OrderBookView<'a> {
    book: &'a OrderBook,
}

impl<'a> OrderBookView<'a> {
    pub fn new(book: &'a OrderBook) -> Self {
        Self { book }
    }

    /// Highest bid on `side`.
    pub fn best_bid(&self, side: Side) -> Option<Decimal> {
        self.book.bids(side).iter().map(|e| e.price).max()
    }

    /// Lowest ask on `side`.
    pub fn best_ask(&self, side: Side) -> Option<Decimal> {
        self.book.asks(side).iter().map(|e| e.price).min()
    }

    pub fn best_bid_ask(&self, side: Side) -> BestBidAsk {
        let best_bid = self.best_bid(side);
        let best_ask = self.best_ask(side);
        let (spread, mid) = match (best_bid, best_ask) {
            (Some(bid), Some(ask)) => (Some(ask - bid), Some((bid + ask) / dec!(2))),
            _ => (None, None),
        };
        BestBidAsk {
            best_bid,
            best_ask,
            spread,
            mid,
        }
    }

    pub fn mid(&self, side: Side) -> Option<Decimal> {
        self.best_bid_ask(side).mid
    }

    /// Spread as a percentage of the mid.
    pub fn spread_pct(&self, side: Side) -> Option<Decimal> {
        let bba = self.best_bid_ask(side);
        match (bba.spread, bba.mid) {
            (Some(spread), Some(mid)) if !mid.is_zero() => {
                Some(spread / mid * Decimal::ONE_HUNDRED)
            }
            _ => None,
        }
    }

    pub fn depth(&self, side: Side, levels: usize) -> Depth {
        let mut bids = self.book.bids(side).to_vec();
        bids.sort_by(|a, b| b.price.cmp(&a.price));
        bids.truncate(levels);

        let mut asks = self.book.asks(side).to_vec();
        asks.sort_by(|a, b| a.price.cmp(&b.price));
        asks.truncate(levels);

        Depth { bids, asks }
    }

    /// Size resting within `mid ± mid * band_pct` (bounds inclusive).
    pub fn liquidity_in_band(&self, side: Side, band_pct: Decimal) -> BandLiquidity {
        let Some(mid) = self.mid(side) else {
            return BandLiquidity::ZERO;
        };
        let lower = mid - mid * band_pct;
        let upper = mid + mid * band_pct;
        let in_band = |entries: &[OrderBookEntry]| -> Decimal {
            entries
                .iter()
                .filter(|e| e.price >= lower && e.price <= upper)
                .map(|e| e.size)
                .sum()
        };
        let bid_liquidity = in_band(self.book.bids(side));
        let ask_liquidity = in_band(self.book.asks(side));
        BandLiquidity {
            bid_liquidity,
            ask_liquidity,
            total: bid_liquidity + ask_liquidity,
        }
    }

    /// (bid size − ask size) / total size, in [−1, 1]; 0 for an empty side.
    pub fn imbalance(&self, side: Side) -> Decimal {
        let bid_size: Decimal = self.book.bids(side).iter().map(|e| e.size).sum();
        let ask_size: Decimal = self.book.asks(side).iter().map(|e| e.size).sum();
        let total = bid_size + ask_size;
        if total.is_zero() {
            Decimal::ZERO
        } else {
            (bid_size - ask_size) / total
        }
    }

    /// YES mid + NO mid outside [0.98, 1.02].
    pub fn arbitrage(&self) -> Option<Arbitrage> {
        let yes_mid = self.mid(Side::Yes)?;
        let no_mid = self.mid(Side::No)?;
        let total = yes_mid + no_mid;

        let (kind, magnitude) = if total < ARB_LOWER_BOUND {
            (ArbitrageKind::Buy, Decimal::ONE - total)
        } else if total > ARB_UPPER_BOUND {
            (ArbitrageKind::Sell, total - Decimal::ONE)
        } else {
            return None;
        };

        Some(Arbitrage {
            kind,
            magnitude,
            yes_mid,
            no_mid,
            total,
        })
    }

    /// Greedily consume asks (cheapest first) for `size` units.
    /// Depth shortfall is reported as `unfilled`, not as an error.
    pub fn market_impact(&self, side: Side, size: Decimal) -> MarketImpact {
        let mut asks = self.book.asks(side).to_vec();
        asks.sort_by(|a, b| a.price.cmp(&b.price));

        let mut remaining = size.max(Decimal::ZERO);
        let mut filled = Decimal::ZERO;
        let mut cost = Decimal::ZERO;
        let mut levels_consumed = 0usize;

        for level in &asks {
            if remaining <= Decimal::ZERO {
                break;
            }
            let take = remaining.min(level.size);
            if take > Decimal::ZERO {
                filled += take;
                cost += take * level.price;
                remaining -= take;
                levels_consumed += 1;
            }
        }

        let avg_price = if filled.is_zero() {
            None
        } else {
            Some(cost / filled)
        };
        let price_impact = match (avg_price, asks.first().map(|e| e.price)) {
            (Some(avg), Some(best)) if !best.is_zero() => Some((avg - best) / best),
            _ => None,
        };

        MarketImpact {
            requested: size,
            filled,
            unfilled: remaining,
            avg_price,
            levels_consumed,
            price_impact,
        }
    }

    fn side_summary(&self, side: Side) -> SideSummary {
        let bba = self.best_bid_ask(side);
        SideSummary {
            best_bid: bba.best_bid,
            best_ask: bba.best_ask,
            spread: bba.spread,
            spread_pct: self.spread_pct(side),
            mid: bba.mid,
            liquidity: self.liquidity_in_band(side, SUMMARY_BAND_PCT),
            imbalance: self.imbalance(side),
            depth: self.depth(side, SUMMARY_DEPTH_LEVELS),
        }
    }

    /// Serializable snapshot of every metric for both outcomes.
    pub fn summary(&self) -> BookSummary {
        BookSummary {
            market_id: self.book.market_id.clone(),
            yes: self.side_summary(Side::Yes),
            no: self.side_summary(Side::No),
            arbitrage: self.arbitrage(),
            timestamp: self.book.timestamp,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
