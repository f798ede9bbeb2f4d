//! Polymarket CLOB integration.
//!
//! Market discovery and order books come from the REST API:
//!
//!   GET /markets?limit=&offset=&status=&tag=   → {"data": [market, ...]}
//!   GET /markets/{id}/orderbook                → {"data": {"yesBids": [[price, size], ...], ...}}
//!
//! Requests retry with exponential backoff on rate limits, server errors
//! and transport failures. Malformed market records and invalid book
//! levels are skipped individually.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::MarketDataConfig;
use crate::platforms::MarketDataSource;
use crate::types::{Market, MarketFilter, MarketStatus, OrderBook, OrderBookEntry};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Base delay for exponential backoff (ms).
const BASE_BACKOFF_MS: u64 = 1000;
/// Ceiling on any single backoff delay (ms).
const MAX_BACKOFF_MS: u64 = 60_000;

/// Delay before retry number `attempt` (1-based), doubling up to the cap.
fn backoff_delay(attempt: u32) -> Duration {
    let ms = 2u64
        .checked_pow(attempt.saturating_sub(1))
        .and_then(|factor| BASE_BACKOFF_MS.checked_mul(factor))
        .map_or(MAX_BACKOFF_MS, |ms| ms.min(MAX_BACKOFF_MS));
    Duration::from_millis(ms)
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct PolymarketClient {
    http: Client,
    base_url: String,
    max_retries: u32,
}

impl PolymarketClient {
    pub fn new(cfg: &MarketDataConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("Failed to build Polymarket HTTP client")?;

        Ok(Self {
            http,
            base_url: cfg.api_url.trim_end_matches('/').to_string(),
            max_retries: cfg.max_retries.max(1),
        })
    }

    /// GET a JSON document with retry + backoff.
    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        let url = format!("{}{path}", self.base_url);
        let mut last_error = None;

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                let delay = backoff_delay(attempt);
                debug!(attempt, delay_ms = delay.as_millis() as u64, url = %url, "Retrying Polymarket request");
                tokio::time::sleep(delay).await;
            }

            match self.http.get(&url).query(query).send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response
                            .json::<Value>()
                            .await
                            .with_context(|| format!("Failed to parse response from {url}"));
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body = response.text().await.unwrap_or_default();
                        warn!(status = %status, attempt, error = %body, "Retryable Polymarket API error");
                        last_error = Some(format!("HTTP {status}: {body}"));
                        continue;
                    }

                    let body = response.text().await.unwrap_or_default();
                    anyhow::bail!("Polymarket API error {status}: {body}");
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Polymarket request failed");
                    last_error = Some(format!("Request error: {e}"));
                }
            }
        }

        anyhow::bail!(
            "Polymarket API failed after {} attempts: {}",
            self.max_retries,
            last_error.unwrap_or_default()
        )
    }

    // -- Parsing ----------------------------------------------------------

    /// Convert the `data` array of a /markets response, skipping bad records.
    pub fn parse_markets(body: &Value) -> Vec<Market> {
        let Some(records) = body.get("data").and_then(Value::as_array) else {
            warn!("Markets response has no data array");
            return Vec::new();
        };

        let mut markets = Vec::with_capacity(records.len());
        for record in records {
            match Self::parse_market(record) {
                Some(m) => markets.push(m),
                None => {
                    let id = record.get("id").map(|v| v.to_string()).unwrap_or_default();
                    warn!(record_id = %id, "Skipping malformed market record");
                }
            }
        }
        markets
    }

    /// Convert a single market record. `None` if any field is unusable.
    pub fn parse_market(raw: &Value) -> Option<Market> {
        let id = match raw.get("id")? {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        let question = raw.get("question")?.as_str()?.to_string();
        if id.is_empty() || question.is_empty() {
            return None;
        }

        let end_time = match raw.get("endDateISO") {
            None | Some(Value::Null) => None,
            Some(v) => Some(parse_timestamp(v.as_str()?)?),
        };

        let status = match raw.get("status").and_then(Value::as_str) {
            None => MarketStatus::Open,
            Some(s) => s.parse().ok()?,
        };

        let tags = match raw.get("tags") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|t| match t {
                    Value::String(s) => Some(s.clone()),
                    Value::Object(o) => o.get("label").and_then(Value::as_str).map(String::from),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };

        let amount = |key: &str| -> Option<Decimal> {
            match raw.get(key) {
                None | Some(Value::Null) => Some(Decimal::ZERO),
                Some(v) => decimal_from_value(v).filter(|d| *d >= Decimal::ZERO),
            }
        };

        Some(Market {
            id,
            question,
            description: raw.get("description").and_then(Value::as_str).map(String::from),
            slug: raw.get("slug").and_then(Value::as_str).unwrap_or_default().to_string(),
            tags,
            liquidity: amount("liquidity")?,
            volume: amount("volume")?,
            end_time,
            status,
        })
    }

    /// Convert a /markets/{id}/orderbook response.
    pub fn parse_order_book(market_id: &str, body: &Value) -> OrderBook {
        let data = body.get("data").unwrap_or(body);
        let side = |key: &str| -> Vec<OrderBookEntry> {
            data.get(key)
                .and_then(Value::as_array)
                .map(|levels| levels.iter().filter_map(parse_level).collect())
                .unwrap_or_default()
        };

        OrderBook {
            market_id: market_id.to_string(),
            yes_bids: side("yesBids"),
            yes_asks: side("yesAsks"),
            no_bids: side("noBids"),
            no_asks: side("noAsks"),
            timestamp: Utc::now(),
        }
    }
}

/// Numbers and numeric strings both occur in API payloads.
fn decimal_from_value(v: &Value) -> Option<Decimal> {
    let text = match v {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

/// A `[price, size]` pair (or `{"price", "size"}` object) within [0, 1].
fn parse_level(v: &Value) -> Option<OrderBookEntry> {
    let (price, size) = match v {
        Value::Array(pair) if pair.len() >= 2 => (&pair[0], &pair[1]),
        Value::Object(o) => (o.get("price")?, o.get("size")?),
        _ => return None,
    };
    let entry = OrderBookEntry::new(decimal_from_value(price)?, decimal_from_value(size)?);
    entry.is_valid().then_some(entry)
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(23, 59, 59))
        .map(|naive| naive.and_utc())
}

// ---------------------------------------------------------------------------
// MarketDataSource trait implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl MarketDataSource for PolymarketClient {
    async fn list_markets(&self, filter: &MarketFilter, limit: usize) -> Result<Vec<Market>> {
        let mut query = vec![("limit", limit.to_string()), ("offset", "0".to_string())];
        if let Some(status) = filter.status {
            query.push(("status", status.as_str().to_string()));
        }
        if let Some(tag) = &filter.tag {
            query.push(("tag", tag.clone()));
        }

        let body = self.get_json("/markets", &query).await?;
        let markets: Vec<Market> = Self::parse_markets(&body)
            .into_iter()
            .filter(|m| filter.matches(m))
            .take(limit)
            .collect();

        info!(count = markets.len(), "Fetched Polymarket markets");
        Ok(markets)
    }

    async fn get_order_book(&self, market_id: &str) -> Option<OrderBook> {
        let path = format!("/markets/{}/orderbook", urlencoding::encode(market_id));
        match self.get_json(&path, &[]).await {
            Ok(body) => Some(Self::parse_order_book(market_id, &body)),
            Err(e) => {
                warn!(market_id = %market_id, error = %e, "Order book unavailable");
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
