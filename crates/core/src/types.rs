//! Market data and order types shared across the system.
//!
//! Order book snapshots are immutable readings; orders are created at
//! submission and mutated only by status-poll results, never regressing
//! out of a terminal state.

use crate::symbol::Symbol;
use crate::venue::VenueId;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// =============================================================================
// Side and Order Enums
// =============================================================================

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Buy the base currency.
    Buy,
    /// Sell the base currency.
    Sell,
}

impl Side {
    /// Returns the opposite side.
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }

    /// Returns the display string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    /// Resting or crossing order at a fixed price.
    Limit,
    /// Immediate execution at the best available price.
    Market,
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Limit => write!(f, "limit"),
            Self::Market => write!(f, "market"),
        }
    }
}

/// Order lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Submitted, not yet acknowledged by the venue.
    Pending,
    /// Acknowledged and resting on the book.
    Open,
    /// Some quantity filled, remainder still working.
    PartiallyFilled,
    /// Completely filled. Terminal.
    Filled,
    /// Cancelled by us or the venue. Terminal.
    Cancelled,
    /// Rejected by the venue. Terminal.
    Rejected,
    /// State could not be determined from the venue's response.
    Unknown,
}

impl OrderStatus {
    /// Returns true for states an order never leaves.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Filled | Self::Cancelled | Self::Rejected)
    }

    /// Returns true if the order may still receive fills.
    #[must_use]
    pub fn is_working(self) -> bool {
        matches!(self, Self::Pending | Self::Open | Self::PartiallyFilled)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Open => "open",
            Self::PartiallyFilled => "partially_filled",
            Self::Filled => "filled",
            Self::Cancelled => "cancelled",
            Self::Rejected => "rejected",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

// =============================================================================
// Order Book
// =============================================================================

/// A single price level in an order book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookLevel {
    /// Price in quote currency. Always positive.
    pub price: Decimal,
    /// Quantity in base currency. Always positive.
    pub quantity: Decimal,
}

impl BookLevel {
    /// Creates a level.
    #[must_use]
    pub fn new(price: Decimal, quantity: Decimal) -> Self {
        Self { price, quantity }
    }
}

/// Violations of the order book invariants.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BookError {
    /// A level had a non-positive price or quantity.
    #[error("non-positive entry at {side} level {index}")]
    NonPositiveEntry {
        /// "bid" or "ask".
        side: &'static str,
        /// Zero-based level index.
        index: usize,
    },

    /// Bids were not strictly descending or asks not strictly ascending.
    #[error("{side} levels out of order at index {index}")]
    OutOfOrder {
        /// "bid" or "ask".
        side: &'static str,
        /// Zero-based index of the offending level.
        index: usize,
    },
}

/// An immutable order book reading for one `(venue, symbol)` at a point
/// in time. Bids are strictly price-descending, asks strictly ascending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    /// Venue the book was read from.
    pub venue: VenueId,
    /// Canonical symbol.
    pub symbol: Symbol,
    /// Resting buy orders, best (highest) first.
    pub bids: Vec<BookLevel>,
    /// Resting sell orders, best (lowest) first.
    pub asks: Vec<BookLevel>,
    /// When the reading was taken.
    pub timestamp: DateTime<Utc>,
}

impl OrderBookSnapshot {
    /// Creates a snapshot, validating the book invariants.
    ///
    /// # Errors
    /// Returns [`BookError`] if any entry is non-positive or either side
    /// is out of order.
    pub fn new(
        venue: VenueId,
        symbol: Symbol,
        bids: Vec<BookLevel>,
        asks: Vec<BookLevel>,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, BookError> {
        let snapshot = Self {
            venue,
            symbol,
            bids,
            asks,
            timestamp,
        };
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Checks the book invariants.
    ///
    /// # Errors
    /// Returns the first violation found.
    pub fn validate(&self) -> Result<(), BookError> {
        for (side, levels, descending) in
            [("bid", &self.bids, true), ("ask", &self.asks, false)]
        {
            for (i, level) in levels.iter().enumerate() {
                if level.price <= Decimal::ZERO || level.quantity <= Decimal::ZERO {
                    return Err(BookError::NonPositiveEntry { side, index: i });
                }
                if i > 0 {
                    let prev = levels[i - 1].price;
                    let ordered = if descending {
                        level.price < prev
                    } else {
                        level.price > prev
                    };
                    if !ordered {
                        return Err(BookError::OutOfOrder { side, index: i });
                    }
                }
            }
        }
        Ok(())
    }

    /// Best (highest) bid, if any.
    #[must_use]
    pub fn best_bid(&self) -> Option<&BookLevel> {
        self.bids.first()
    }

    /// Best (lowest) ask, if any.
    #[must_use]
    pub fn best_ask(&self) -> Option<&BookLevel> {
        self.asks.first()
    }

    /// Mid price between best bid and best ask, if both sides exist.
    #[must_use]
    pub fn mid_price(&self) -> Option<Decimal> {
        let bid = self.best_bid()?.price;
        let ask = self.best_ask()?.price;
        Some((bid + ask) / Decimal::TWO)
    }

    /// Age of the snapshot relative to `now`. Zero for future timestamps.
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.timestamp).max(Duration::zero())
    }

    /// A snapshot at exactly `max_age` is already stale.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        self.age(now) >= max_age
    }

    /// Total quantity resting on the ask side.
    #[must_use]
    pub fn ask_depth(&self) -> Decimal {
        self.asks.iter().map(|l| l.quantity).sum()
    }

    /// Total quantity resting on the bid side.
    #[must_use]
    pub fn bid_depth(&self) -> Decimal {
        self.bids.iter().map(|l| l.quantity).sum()
    }
}

// =============================================================================
// Balance
// =============================================================================

/// Account balance for one currency on one venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    /// Currency code, uppercase.
    pub currency: String,
    /// Freely usable quantity.
    pub available: Decimal,
    /// Quantity locked in open orders.
    pub locked: Decimal,
}

impl Balance {
    /// Total balance.
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.available + self.locked
    }
}

// =============================================================================
// Order
// =============================================================================

/// An order as tracked by the engine.
///
/// Created when submitted; afterwards only [`Order::apply_update`]
/// mutates it, from status-poll results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Venue-assigned id; absent until the venue acknowledges.
    pub venue_order_id: Option<String>,
    /// Venue the order was placed on.
    pub venue: VenueId,
    /// Canonical symbol.
    pub symbol: Symbol,
    /// Buy or sell.
    pub side: Side,
    /// Limit or market.
    pub order_type: OrderType,
    /// Requested quantity in base currency.
    pub quantity: Decimal,
    /// Limit price; `None` for market orders.
    pub price: Option<Decimal>,
    /// Current lifecycle status.
    pub status: OrderStatus,
    /// Quantity filled so far.
    pub filled_quantity: Decimal,
    /// Average fill price across all fills, when known.
    pub avg_fill_price: Option<Decimal>,
    /// Fee observed on fills, in quote currency, when the venue reports it.
    pub fee: Option<Decimal>,
    /// When the order was created locally.
    pub created_at: DateTime<Utc>,
    /// When the order state last changed.
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Creates a freshly submitted order in `Pending` state.
    #[must_use]
    pub fn pending(
        venue: VenueId,
        symbol: Symbol,
        side: Side,
        order_type: OrderType,
        quantity: Decimal,
        price: Option<Decimal>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            venue_order_id: None,
            venue,
            symbol,
            side,
            order_type,
            quantity,
            price,
            status: OrderStatus::Pending,
            filled_quantity: Decimal::ZERO,
            avg_fill_price: None,
            fee: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true once the order can no longer change.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Quantity still unfilled.
    #[must_use]
    pub fn remaining_quantity(&self) -> Decimal {
        (self.quantity - self.filled_quantity).max(Decimal::ZERO)
    }

    /// Merges a freshly polled order state into this one.
    ///
    /// Terminal states are sticky: once filled, cancelled, or rejected,
    /// only `updated_at` moves. Filled quantity never decreases and an
    /// `Unknown` poll result never overwrites known state.
    pub fn apply_update(&mut self, polled: &Order) {
        self.updated_at = polled.updated_at.max(self.updated_at);

        if self.status.is_terminal() {
            return;
        }
        if self.venue_order_id.is_none() {
            self.venue_order_id = polled.venue_order_id.clone();
        }
        if polled.status != OrderStatus::Unknown {
            self.status = polled.status;
        }
        if polled.filled_quantity > self.filled_quantity {
            self.filled_quantity = polled.filled_quantity;
        }
        if polled.avg_fill_price.is_some() {
            self.avg_fill_price = polled.avg_fill_price;
        }
        if polled.fee.is_some() {
            self.fee = polled.fee;
        }
    }
}

// =============================================================================
// Trade Record
// =============================================================================

/// Terminal classification of an execution, stored with the trade record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeOutcome {
    /// Both legs filled at matching size.
    Success,
    /// One leg (or part of one) filled without its counterpart.
    Partial,
    /// No fills; attempt failed outright.
    Failed,
    /// Polling deadline elapsed; open legs were cancelled.
    Timeout,
    /// Execution was cancelled cooperatively; open legs were cancelled.
    Cancelled,
}

/// Record of one completed execution attempt, linking the two final
/// orders. Created once both legs reach a terminal state; handed to the
/// journal and never retained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Unique id for this attempt.
    pub id: Uuid,
    /// Canonical symbol.
    pub symbol: Symbol,
    /// Venue bought on.
    pub buy_venue: VenueId,
    /// Venue sold on.
    pub sell_venue: VenueId,
    /// Final state of the buy leg, if it was ever placed.
    pub buy_order: Option<Order>,
    /// Final state of the sell leg, if it was ever placed.
    pub sell_order: Option<Order>,
    /// Matched size: `min(filled_buy, filled_sell)`.
    pub matched_quantity: Decimal,
    /// Realised net profit in quote units over the matched size.
    pub realized_profit: Decimal,
    /// Residual directional exposure (positive = long base currency).
    pub exposure: Decimal,
    /// Currency the exposure is denominated in.
    pub exposure_currency: String,
    /// Net profit the opportunity promised at detection time.
    pub expected_profit: Decimal,
    /// Terminal classification.
    pub outcome: TradeOutcome,
    /// When the record was produced.
    pub recorded_at: DateTime<Utc>,
}

// =============================================================================
// Feature Record
// =============================================================================

/// Order book features extracted for the maker/taker advisor and logged
/// through the journal for offline training.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    /// Venue the features were extracted from.
    pub venue: VenueId,
    /// Canonical symbol.
    pub symbol: Symbol,
    /// Best bid price.
    pub best_bid: Decimal,
    /// Best ask price.
    pub best_ask: Decimal,
    /// Relative spread: `(ask - bid) / bid`.
    pub spread: Decimal,
    /// Quantity at the best bid.
    pub bid_top_quantity: Decimal,
    /// Quantity at the best ask.
    pub ask_top_quantity: Decimal,
    /// `(bid_depth - ask_depth) / (bid_depth + ask_depth)` over the
    /// visible book, in [-1, 1].
    pub depth_imbalance: Decimal,
    /// Snapshot timestamp the features were computed from.
    pub observed_at: DateTime<Utc>,
}

impl FeatureRecord {
    /// Extracts features from a snapshot. Returns `None` for one-sided
    /// or empty books.
    #[must_use]
    pub fn from_snapshot(snapshot: &OrderBookSnapshot) -> Option<Self> {
        let bid = snapshot.best_bid()?;
        let ask = snapshot.best_ask()?;
        let bid_depth = snapshot.bid_depth();
        let ask_depth = snapshot.ask_depth();
        let total = bid_depth + ask_depth;
        let imbalance = if total > Decimal::ZERO {
            (bid_depth - ask_depth) / total
        } else {
            Decimal::ZERO
        };
        Some(Self {
            venue: snapshot.venue,
            symbol: snapshot.symbol.clone(),
            best_bid: bid.price,
            best_ask: ask.price,
            spread: (ask.price - bid.price) / bid.price,
            bid_top_quantity: bid.quantity,
            ask_top_quantity: ask.quantity,
            depth_imbalance: imbalance,
            observed_at: snapshot.timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn btc_usdt() -> Symbol {
        Symbol::parse("BTCUSDT").unwrap()
    }

    fn sample_book(ts: DateTime<Utc>) -> OrderBookSnapshot {
        OrderBookSnapshot::new(
            VenueId::Wallex,
            btc_usdt(),
            vec![
                BookLevel::new(dec!(64990), dec!(0.5)),
                BookLevel::new(dec!(64980), dec!(1.2)),
            ],
            vec![
                BookLevel::new(dec!(65010), dec!(0.8)),
                BookLevel::new(dec!(65020), dec!(2.0)),
            ],
            ts,
        )
        .unwrap()
    }

    // ==================== Enum Tests ====================

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!(Side::Sell.opposite(), Side::Buy);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Rejected.is_terminal());
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(!OrderStatus::Open.is_terminal());
        assert!(!OrderStatus::PartiallyFilled.is_terminal());
        assert!(!OrderStatus::Unknown.is_terminal());
    }

    // ==================== Snapshot Tests ====================

    #[test]
    fn test_snapshot_valid() {
        let book = sample_book(Utc::now());
        assert_eq!(book.best_bid().unwrap().price, dec!(64990));
        assert_eq!(book.best_ask().unwrap().price, dec!(65010));
        assert_eq!(book.mid_price().unwrap(), dec!(65000));
        assert_eq!(book.bid_depth(), dec!(1.7));
        assert_eq!(book.ask_depth(), dec!(2.8));
    }

    #[test]
    fn test_snapshot_rejects_unordered_bids() {
        let err = OrderBookSnapshot::new(
            VenueId::Wallex,
            btc_usdt(),
            vec![
                BookLevel::new(dec!(64980), dec!(1)),
                BookLevel::new(dec!(64990), dec!(1)),
            ],
            vec![],
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err, BookError::OutOfOrder { side: "bid", index: 1 });
    }

    #[test]
    fn test_snapshot_rejects_equal_ask_prices() {
        let err = OrderBookSnapshot::new(
            VenueId::Wallex,
            btc_usdt(),
            vec![],
            vec![
                BookLevel::new(dec!(65010), dec!(1)),
                BookLevel::new(dec!(65010), dec!(1)),
            ],
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err, BookError::OutOfOrder { side: "ask", index: 1 });
    }

    #[test]
    fn test_snapshot_rejects_non_positive_entries() {
        let err = OrderBookSnapshot::new(
            VenueId::Wallex,
            btc_usdt(),
            vec![BookLevel::new(dec!(64990), Decimal::ZERO)],
            vec![],
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err, BookError::NonPositiveEntry { side: "bid", index: 0 });
    }

    #[test]
    fn test_staleness_boundary_is_stale() {
        let now = Utc::now();
        let book = sample_book(now - Duration::milliseconds(500));
        assert!(!book.is_stale(now, Duration::milliseconds(501)));
        // Exactly at max_age: stale.
        assert!(book.is_stale(now, Duration::milliseconds(500)));
        assert!(book.is_stale(now, Duration::milliseconds(499)));
    }

    // ==================== Order Tests ====================

    fn pending_order(now: DateTime<Utc>) -> Order {
        Order::pending(
            VenueId::Nobitex,
            Symbol::parse("BTCIRT").unwrap(),
            Side::Buy,
            OrderType::Limit,
            dec!(0.5),
            Some(dec!(4000000000)),
            now,
        )
    }

    #[test]
    fn test_order_update_progresses() {
        let now = Utc::now();
        let mut order = pending_order(now);
        let mut polled = order.clone();
        polled.venue_order_id = Some("42".into());
        polled.status = OrderStatus::PartiallyFilled;
        polled.filled_quantity = dec!(0.2);
        polled.updated_at = now + Duration::seconds(1);

        order.apply_update(&polled);
        assert_eq!(order.status, OrderStatus::PartiallyFilled);
        assert_eq!(order.filled_quantity, dec!(0.2));
        assert_eq!(order.venue_order_id.as_deref(), Some("42"));
        assert_eq!(order.remaining_quantity(), dec!(0.3));
    }

    #[test]
    fn test_order_never_regresses_from_terminal() {
        let now = Utc::now();
        let mut order = pending_order(now);
        let mut filled = order.clone();
        filled.status = OrderStatus::Filled;
        filled.filled_quantity = dec!(0.5);
        order.apply_update(&filled);

        let mut regress = order.clone();
        regress.status = OrderStatus::Open;
        regress.filled_quantity = dec!(0.1);
        regress.updated_at = now + Duration::seconds(5);
        order.apply_update(&regress);

        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.filled_quantity, dec!(0.5));
        // Only the timestamp moved.
        assert_eq!(order.updated_at, now + Duration::seconds(5));
    }

    #[test]
    fn test_order_filled_quantity_monotonic() {
        let now = Utc::now();
        let mut order = pending_order(now);
        let mut polled = order.clone();
        polled.status = OrderStatus::PartiallyFilled;
        polled.filled_quantity = dec!(0.3);
        order.apply_update(&polled);

        polled.filled_quantity = dec!(0.1);
        order.apply_update(&polled);
        assert_eq!(order.filled_quantity, dec!(0.3));
    }

    #[test]
    fn test_order_unknown_poll_keeps_status() {
        let now = Utc::now();
        let mut order = pending_order(now);
        let mut open = order.clone();
        open.status = OrderStatus::Open;
        order.apply_update(&open);

        let mut unknown = order.clone();
        unknown.status = OrderStatus::Unknown;
        order.apply_update(&unknown);
        assert_eq!(order.status, OrderStatus::Open);
    }

    // ==================== Feature Tests ====================

    #[test]
    fn test_features_from_snapshot() {
        let book = sample_book(Utc::now());
        let features = FeatureRecord::from_snapshot(&book).unwrap();
        assert_eq!(features.best_bid, dec!(64990));
        assert_eq!(features.best_ask, dec!(65010));
        assert!(features.spread > Decimal::ZERO);
        // More asks than bids resting: imbalance negative.
        assert!(features.depth_imbalance < Decimal::ZERO);
    }

    #[test]
    fn test_features_one_sided_book() {
        let book = OrderBookSnapshot::new(
            VenueId::Wallex,
            btc_usdt(),
            vec![BookLevel::new(dec!(64990), dec!(1))],
            vec![],
            Utc::now(),
        )
        .unwrap();
        assert!(FeatureRecord::from_snapshot(&book).is_none());
    }

    #[test]
    fn test_balance_total() {
        let balance = Balance {
            currency: "USDT".into(),
            available: dec!(900),
            locked: dec!(100),
        };
        assert_eq!(balance.total(), dec!(1000));
    }
}
