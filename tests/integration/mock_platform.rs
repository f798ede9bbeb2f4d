//! Mock market-data source for integration testing.
//!
//! Markets and order books are fully controllable from test code and
//! can be swapped while the coordinator is running.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use sibyl::platforms::MarketDataSource;
use sibyl::types::*;

#[derive(Default)]
pub struct MockMarketData {
    markets: Mutex<Vec<Market>>,
    books: Mutex<HashMap<String, OrderBook>>,
    /// If set, `list_markets` fails with this message.
    force_error: Mutex<Option<String>>,
    book_requests: AtomicUsize,
}

impl MockMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_market(&self, market: Market, book: Option<OrderBook>) {
        if let Some(book) = book {
            self.set_book(book);
        }
        self.markets.lock().unwrap().push(market);
    }

    pub fn set_book(&self, book: OrderBook) {
        self.books.lock().unwrap().insert(book.market_id.clone(), book);
    }

    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }

    pub fn book_requests(&self) -> usize {
        self.book_requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketDataSource for MockMarketData {
    async fn list_markets(&self, filter: &MarketFilter, limit: usize) -> Result<Vec<Market>> {
        if let Some(msg) = self.force_error.lock().unwrap().clone() {
            return Err(anyhow!(msg));
        }
        Ok(self
            .markets
            .lock()
            .unwrap()
            .iter()
            .filter(|m| filter.matches(m))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_order_book(&self, market_id: &str) -> Option<OrderBook> {
        self.book_requests.fetch_add(1, Ordering::SeqCst);
        self.books.lock().unwrap().get(market_id).cloned()
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn market(id: &str, liquidity: Decimal, end_time: Option<DateTime<Utc>>) -> Market {
    Market {
        id: id.to_string(),
        question: format!("Will {id} resolve YES?"),
        description: None,
        slug: id.to_string(),
        tags: vec!["test".to_string()],
        liquidity,
        volume: dec!(10000),
        end_time,
        status: MarketStatus::Open,
    }
}

/// One-level book with a one-cent spread on each outcome.
pub fn book(market_id: &str, yes_bid: Decimal, no_bid: Decimal) -> OrderBook {
    let mut b = OrderBook::empty(market_id);
    b.yes_bids = vec![OrderBookEntry::new(yes_bid, dec!(500))];
    b.yes_asks = vec![OrderBookEntry::new(yes_bid + dec!(0.01), dec!(500))];
    b.no_bids = vec![OrderBookEntry::new(no_bid, dec!(500))];
    b.no_asks = vec![OrderBookEntry::new(no_bid + dec!(0.01), dec!(500))];
    b
}
