//! Market-data sources.
//!
//! Defines the `MarketDataSource` trait consumed by the scanner and the
//! ledger, and the Polymarket CLOB implementation used in production.

pub mod polymarket;

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::strategy::orderbook::OrderBookView;
use crate::types::{Market, MarketFilter, OrderBook, Side};

/// Read-only access to market snapshots and order books.
///
/// Implementations own their timeouts and retry policy. Book and price
/// lookups report failure as `None` rather than an error so that a single
/// bad market never aborts a scan.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Fetch up to `limit` markets matching `filter`.
    async fn list_markets(&self, filter: &MarketFilter, limit: usize) -> Result<Vec<Market>>;

    /// Current order book, or `None` if it cannot be fetched.
    async fn get_order_book(&self, market_id: &str) -> Option<OrderBook>;

    /// Best bid on `side`, or `None` if the book or the side is empty.
    async fn get_best_price(&self, market_id: &str, side: Side) -> Option<Decimal> {
        let book = self.get_order_book(market_id).await?;
        OrderBookView::new(&book).best_bid(side)
    }
}
