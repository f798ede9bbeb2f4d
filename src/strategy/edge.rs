//! Mispricing detection.
//!
//! Three detectors run against each market's order book: cross-outcome
//! arbitrage, time decay into resolution, and thin-liquidity deviation.
//! Each is a pure function of the market snapshot, its book and `now`,
//! returning at most one `Opportunity`.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;
use tracing::debug;

use super::orderbook::OrderBookView;
use crate::types::{Market, OpportunityType, OrderBook, Opportunity, RiskTier, Side};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Arbitrage magnitude that must be exceeded before a signal is emitted.
const ARB_MIN_MAGNITUDE: Decimal = dec!(0.02);
const ARB_SCORE_SCALE: Decimal = dec!(10);
const ARB_TARGET_PRICE: Decimal = dec!(0.5);

/// Best price above which an outcome is considered near-certain.
const DECAY_PRICE_THRESHOLD: Decimal = dec!(0.80);
const DECAY_WINDOW_HOURS: i64 = 24;
const DECAY_SCORE: Decimal = dec!(0.7);
const DECAY_EXPECTED_RETURN: Decimal = dec!(0.15);

/// Markets with less liquidity than this are "thin".
const THIN_LIQUIDITY: Decimal = dec!(1000);
const THIN_DEVIATION: Decimal = dec!(0.2);
const THIN_YES_CUTOFF: Decimal = dec!(0.3);
const THIN_SCORE: Decimal = dec!(0.6);
const THIN_EXPECTED_RETURN: Decimal = dec!(0.10);

const FAIR_PRICE: Decimal = dec!(0.5);

// ---------------------------------------------------------------------------
// Detectors
// ---------------------------------------------------------------------------

fn new_opportunity(
    market: &Market,
    opportunity_type: OpportunityType,
    side: Side,
    entry_price: Decimal,
    now: DateTime<Utc>,
) -> Opportunity {
    Opportunity {
        id: format!("opp-{}", uuid::Uuid::new_v4()),
        market_id: market.id.clone(),
        opportunity_type,
        side,
        score: Decimal::ZERO,
        expected_return: Decimal::ZERO,
        risk: RiskTier::Medium,
        entry_price,
        target_price: None,
        stop_price: None,
        rationale: String::new(),
        detected_at: now,
        expires_at: None,
        metadata: BTreeMap::new(),
    }
}

/// Best bid on both outcomes, or `None` if either side has no bids.
fn both_prices(view: &OrderBookView<'_>) -> Option<(Decimal, Decimal)> {
    Some((view.best_bid(Side::Yes)?, view.best_bid(Side::No)?))
}

/// YES + NO mids outside the deadband by more than 2 points.
///
/// Trades the currently cheaper outcome (ties go to NO) with a score of
/// `min(magnitude × 10, 1)`.
pub fn detect_arbitrage(
    market: &Market,
    view: &OrderBookView<'_>,
    now: DateTime<Utc>,
) -> Option<Opportunity> {
    let arb = view.arbitrage()?;
    if arb.magnitude <= ARB_MIN_MAGNITUDE {
        return None;
    }

    let yes_price = view.best_bid(Side::Yes);
    let no_price = view.best_bid(Side::No);
    let (side, entry_price) = match (yes_price, no_price) {
        (Some(yes), Some(no)) if yes < no => (Side::Yes, yes),
        (_, Some(no)) => (Side::No, no),
        (Some(yes), None) => (Side::Yes, yes),
        (None, None) => return None,
    };

    let mut opp = new_opportunity(market, OpportunityType::Arbitrage, side, entry_price, now);
    opp.score = (arb.magnitude * ARB_SCORE_SCALE).min(Decimal::ONE);
    opp.expected_return = arb.magnitude;
    opp.risk = RiskTier::Low;
    opp.target_price = Some(ARB_TARGET_PRICE);
    opp.rationale = format!(
        "Outcome mids sum to {:.4} ({:?} arbitrage of {:.4})",
        arb.total, arb.kind, arb.magnitude
    );
    opp.metadata.insert("yes_mid".into(), arb.yes_mid.to_string());
    opp.metadata.insert("no_mid".into(), arb.no_mid.to_string());
    opp.metadata.insert("total".into(), arb.total.to_string());
    Some(opp)
}

/// One outcome priced above 0.80 with resolution less than a day away.
pub fn detect_time_decay(
    market: &Market,
    view: &OrderBookView<'_>,
    now: DateTime<Utc>,
) -> Option<Opportunity> {
    let (yes_price, no_price) = both_prices(view)?;
    let remaining = market.time_to_resolution(now)?;
    if remaining <= Duration::zero() || remaining >= Duration::hours(DECAY_WINDOW_HOURS) {
        return None;
    }

    let (side, entry_price) = if yes_price > DECAY_PRICE_THRESHOLD {
        (Side::Yes, yes_price)
    } else if no_price > DECAY_PRICE_THRESHOLD {
        (Side::No, no_price)
    } else {
        return None;
    };

    let hours_left = Decimal::from(remaining.num_minutes()) / dec!(60);
    let mut opp = new_opportunity(market, OpportunityType::TimeDecay, side, entry_price, now);
    opp.score = DECAY_SCORE;
    opp.expected_return = DECAY_EXPECTED_RETURN;
    opp.risk = RiskTier::Medium;
    opp.target_price = Some(Decimal::ONE);
    opp.expires_at = market.end_time;
    opp.rationale = format!(
        "{side} at {entry_price:.2} with {hours_left:.1}h to resolution"
    );
    opp.metadata.insert("hours_to_resolution".into(), format!("{hours_left:.2}"));
    opp.metadata.insert("price".into(), entry_price.to_string());
    Some(opp)
}

/// Thin market whose YES price strays more than 0.2 from even odds.
pub fn detect_thin_liquidity(
    market: &Market,
    view: &OrderBookView<'_>,
    now: DateTime<Utc>,
) -> Option<Opportunity> {
    if market.liquidity >= THIN_LIQUIDITY {
        return None;
    }
    let (yes_price, no_price) = both_prices(view)?;
    let deviation = (yes_price - FAIR_PRICE).abs();
    if deviation <= THIN_DEVIATION {
        return None;
    }

    let (side, entry_price) = if yes_price < THIN_YES_CUTOFF {
        (Side::Yes, yes_price)
    } else {
        (Side::No, no_price)
    };

    let mut opp = new_opportunity(market, OpportunityType::Liquidity, side, entry_price, now);
    opp.score = THIN_SCORE;
    opp.expected_return = THIN_EXPECTED_RETURN;
    opp.risk = RiskTier::High;
    opp.rationale = format!(
        "Thin market (liquidity {:.0}) with YES at {yes_price:.2}, {deviation:.2} from even odds",
        market.liquidity
    );
    opp.metadata.insert("liquidity".into(), market.liquidity.to_string());
    opp.metadata.insert("deviation".into(), deviation.to_string());
    Some(opp)
}

/// Run every detector against one market.
pub fn detect_all(market: &Market, book: &OrderBook, now: DateTime<Utc>) -> Vec<Opportunity> {
    let view = OrderBookView::new(book);
    let found: Vec<Opportunity> = [
        detect_arbitrage(market, &view, now),
        detect_time_decay(market, &view, now),
        detect_thin_liquidity(market, &view, now),
    ]
    .into_iter()
    .flatten()
    .collect();

    if !found.is_empty() {
        debug!(
            market_id = %market.id,
            count = found.len(),
            "Detectors fired"
        );
    }
    found
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MarketStatus, OrderBookEntry};

    fn make_market(liquidity: Decimal, end_time: Option<DateTime<Utc>>) -> Market {
        Market {
            id: "MKT-1".to_string(),
            question: "Will the test pass?".to_string(),
            description: None,
            slug: "will-the-test-pass".to_string(),
            tags: vec![],
            liquidity,
            volume: dec!(10000),
            end_time,
            status: MarketStatus::Open,
        }
    }

    /// Book with a single bid/ask level per outcome.
    fn make_book(yes: (Decimal, Decimal), no: (Decimal, Decimal)) -> OrderBook {
        let mut book = OrderBook::empty("MKT-1");
        book.yes_bids = vec![OrderBookEntry::new(yes.0, dec!(100))];
        book.yes_asks = vec![OrderBookEntry::new(yes.1, dec!(100))];
        book.no_bids = vec![OrderBookEntry::new(no.0, dec!(100))];
        book.no_asks = vec![OrderBookEntry::new(no.1, dec!(100))];
        book
    }

    // -- Arbitrage --

    #[test]
    fn test_arbitrage_fires_on_cheap_book() {
        let now = Utc::now();
        let market = make_market(dec!(50000), None);
        // mids 0.40 + 0.50 = 0.90 → buy arb of 0.10
        let book = make_book((dec!(0.39), dec!(0.41)), (dec!(0.49), dec!(0.51)));
        let opp = detect_arbitrage(&market, &OrderBookView::new(&book), now).unwrap();
        assert_eq!(opp.opportunity_type, OpportunityType::Arbitrage);
        assert_eq!(opp.side, Side::Yes);
        assert_eq!(opp.entry_price, dec!(0.39));
        assert_eq!(opp.expected_return, dec!(0.10));
        assert_eq!(opp.score, Decimal::ONE);
        assert_eq!(opp.risk, RiskTier::Low);
        assert_eq!(opp.target_price, Some(dec!(0.5)));
        assert!(opp.id.starts_with("opp-"));
    }

    #[test]
    fn test_arbitrage_score_scales_and_ties_go_to_no() {
        let now = Utc::now();
        let market = make_market(dec!(50000), None);
        // mids 0.47 + 0.50 = 0.97 → magnitude 0.03, equal best bids
        let book = make_book((dec!(0.46), dec!(0.48)), (dec!(0.46), dec!(0.54)));
        let opp = detect_arbitrage(&market, &OrderBookView::new(&book), now).unwrap();
        assert_eq!(opp.side, Side::No);
        assert_eq!(opp.score, dec!(0.30));
    }

    #[test]
    fn test_arbitrage_quiet_inside_deadband() {
        let market = make_market(dec!(50000), None);
        let book = make_book((dec!(0.49), dec!(0.51)), (dec!(0.49), dec!(0.51)));
        assert!(detect_arbitrage(&market, &OrderBookView::new(&book), Utc::now()).is_none());
    }

    // -- Time decay --

    #[test]
    fn test_time_decay_fires_near_resolution() {
        let now = Utc::now();
        let end = now + Duration::hours(6);
        let market = make_market(dec!(50000), Some(end));
        let book = make_book((dec!(0.85), dec!(0.87)), (dec!(0.12), dec!(0.14)));
        let opp = detect_time_decay(&market, &OrderBookView::new(&book), now).unwrap();
        assert_eq!(opp.side, Side::Yes);
        assert_eq!(opp.entry_price, dec!(0.85));
        assert_eq!(opp.score, dec!(0.7));
        assert_eq!(opp.expected_return, dec!(0.15));
        assert_eq!(opp.risk, RiskTier::Medium);
        assert_eq!(opp.target_price, Some(Decimal::ONE));
        assert_eq!(opp.expires_at, Some(end));
    }

    #[test]
    fn test_time_decay_picks_no_when_yes_is_cheap() {
        let now = Utc::now();
        let market = make_market(dec!(50000), Some(now + Duration::hours(2)));
        let book = make_book((dec!(0.10), dec!(0.12)), (dec!(0.88), dec!(0.90)));
        let opp = detect_time_decay(&market, &OrderBookView::new(&book), now).unwrap();
        assert_eq!(opp.side, Side::No);
    }

    #[test]
    fn test_time_decay_window_is_open_interval() {
        let now = Utc::now();
        let book = make_book((dec!(0.85), dec!(0.87)), (dec!(0.12), dec!(0.14)));
        let view = OrderBookView::new(&book);

        let far = make_market(dec!(50000), Some(now + Duration::hours(24)));
        assert!(detect_time_decay(&far, &view, now).is_none());

        let past = make_market(dec!(50000), Some(now - Duration::minutes(1)));
        assert!(detect_time_decay(&past, &view, now).is_none());

        let undated = make_market(dec!(50000), None);
        assert!(detect_time_decay(&undated, &view, now).is_none());
    }

    #[test]
    fn test_time_decay_needs_both_prices() {
        let now = Utc::now();
        let market = make_market(dec!(50000), Some(now + Duration::hours(2)));
        let mut book = make_book((dec!(0.85), dec!(0.87)), (dec!(0.12), dec!(0.14)));
        book.no_bids.clear();
        assert!(detect_time_decay(&market, &OrderBookView::new(&book), now).is_none());
    }

    // -- Thin liquidity --

    #[test]
    fn test_thin_liquidity_fires_on_cheap_yes() {
        let market = make_market(dec!(500), None);
        let book = make_book((dec!(0.25), dec!(0.27)), (dec!(0.70), dec!(0.75)));
        let opp = detect_thin_liquidity(&market, &OrderBookView::new(&book), Utc::now()).unwrap();
        assert_eq!(opp.opportunity_type, OpportunityType::Liquidity);
        assert_eq!(opp.side, Side::Yes);
        assert_eq!(opp.entry_price, dec!(0.25));
        assert_eq!(opp.score, dec!(0.6));
        assert_eq!(opp.expected_return, dec!(0.10));
        assert_eq!(opp.risk, RiskTier::High);
        assert!(opp.target_price.is_none());
    }

    #[test]
    fn test_thin_liquidity_rich_yes_trades_no() {
        let market = make_market(dec!(500), None);
        let book = make_book((dec!(0.75), dec!(0.77)), (dec!(0.22), dec!(0.24)));
        let opp = detect_thin_liquidity(&market, &OrderBookView::new(&book), Utc::now()).unwrap();
        assert_eq!(opp.side, Side::No);
        assert_eq!(opp.entry_price, dec!(0.22));
    }

    #[test]
    fn test_thin_liquidity_thresholds() {
        let book = make_book((dec!(0.25), dec!(0.27)), (dec!(0.70), dec!(0.75)));
        let view = OrderBookView::new(&book);
        let deep = make_market(dec!(1000), None);
        assert!(detect_thin_liquidity(&deep, &view, Utc::now()).is_none());

        // Deviation exactly 0.2 does not fire
        let edge_book = make_book((dec!(0.30), dec!(0.32)), (dec!(0.60), dec!(0.70)));
        let thin = make_market(dec!(500), None);
        assert!(detect_thin_liquidity(&thin, &OrderBookView::new(&edge_book), Utc::now()).is_none());
    }

    #[test]
    fn test_detect_all_combines() {
        let now = Utc::now();
        let market = make_market(dec!(500), Some(now + Duration::hours(3)));
        // YES 0.85 near resolution in a thin market: decay + liquidity fire,
        // mids 0.86 + 0.13 = 0.99 stay inside the deadband
        let book = make_book((dec!(0.85), dec!(0.87)), (dec!(0.12), dec!(0.14)));
        let found = detect_all(&market, &book, now);
        let kinds: Vec<_> = found.iter().map(|o| o.opportunity_type).collect();
        assert_eq!(kinds, vec![OpportunityType::TimeDecay, OpportunityType::Liquidity]);
    }
}
