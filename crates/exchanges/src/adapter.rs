//! Uniform capability surface over heterogeneous venue APIs.
//!
//! Every adapter exposes the same operations; venue-specific formats,
//! authentication, and error conventions stay behind this trait. All
//! operations are async and safe to race with cancellation.

use async_trait::async_trait;
use rust_decimal::Decimal;
use spot_arb_core::{
    Balance, Order, OrderBookSnapshot, OrderType, Side, Symbol, VenueError, VenueId, VenueResult,
};

// =============================================================================
// Place Order Request
// =============================================================================

/// Parameters for placing one order.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceOrderRequest {
    /// Canonical symbol; the adapter renders the venue form.
    pub symbol: Symbol,
    /// Buy or sell.
    pub side: Side,
    /// Limit or market.
    pub order_type: OrderType,
    /// Quantity in base units. Must be positive.
    pub quantity: Decimal,
    /// Limit price. Required for limit orders.
    pub price: Option<Decimal>,
    /// Request a post-only (maker) order. Honoured only where the venue
    /// supports it; otherwise the adapter places a plain limit order.
    pub post_only: bool,
}

impl PlaceOrderRequest {
    /// Creates a limit order request.
    #[must_use]
    pub fn limit(symbol: Symbol, side: Side, quantity: Decimal, price: Decimal) -> Self {
        Self {
            symbol,
            side,
            order_type: OrderType::Limit,
            quantity,
            price: Some(price),
            post_only: false,
        }
    }

    /// Creates a market order request.
    #[must_use]
    pub fn market(symbol: Symbol, side: Side, quantity: Decimal) -> Self {
        Self {
            symbol,
            side,
            order_type: OrderType::Market,
            quantity,
            price: None,
            post_only: false,
        }
    }

    /// Requests post-only execution.
    #[must_use]
    pub fn with_post_only(mut self, post_only: bool) -> Self {
        self.post_only = post_only;
        self
    }

    /// Validates quantity and price constraints.
    ///
    /// # Errors
    /// Returns [`VenueError::InvalidInput`] naming the offending field.
    pub fn validate(&self) -> VenueResult<()> {
        if self.quantity <= Decimal::ZERO {
            return Err(VenueError::invalid_input(
                "quantity",
                format!("must be positive, got {}", self.quantity),
            ));
        }
        match (self.order_type, self.price) {
            (OrderType::Limit, None) => Err(VenueError::invalid_input(
                "price",
                "required for limit orders",
            )),
            (OrderType::Limit, Some(p)) if p <= Decimal::ZERO => Err(VenueError::invalid_input(
                "price",
                format!("must be positive, got {p}"),
            )),
            _ => Ok(()),
        }
    }
}

// =============================================================================
// Venue Adapter Trait
// =============================================================================

/// Uniform async interface to one trading venue.
#[async_trait]
pub trait VenueAdapter: Send + Sync {
    /// The venue this adapter talks to.
    fn venue(&self) -> VenueId;

    /// Fetches an order book snapshot. `depth >= 1`; the adapter clamps
    /// to a venue-supported value. Bids and asks come back sorted and
    /// non-empty on both sides when the market exists.
    async fn fetch_orderbook(&self, symbol: &Symbol, depth: usize)
        -> VenueResult<OrderBookSnapshot>;

    /// Places an order. The returned order has at least `Pending` status
    /// and, when the venue acknowledges synchronously, a venue id.
    async fn place_order(&self, request: &PlaceOrderRequest) -> VenueResult<Order>;

    /// Cancels an order. Idempotent for already-terminal orders: a venue
    /// response of "not found / already done" maps to `Ok(true)`.
    async fn cancel_order(&self, order_id: &str, symbol: Option<&Symbol>) -> VenueResult<bool>;

    /// Fetches the current state of an order.
    async fn get_order(&self, order_id: &str, symbol: Option<&Symbol>) -> VenueResult<Order>;

    /// Lists open orders, optionally filtered by symbol. Used at startup
    /// for orphan recovery.
    async fn get_open_orders(&self, symbol: Option<&Symbol>) -> VenueResult<Vec<Order>>;

    /// Fetches the balance for one currency.
    async fn get_balance(&self, currency: &str) -> VenueResult<Balance>;

    /// Maker fee rate. Infallible.
    fn maker_fee(&self) -> Decimal;

    /// Taker fee rate. Infallible.
    fn taker_fee(&self) -> Decimal;

    /// True when the adapter holds a usable credential bundle.
    fn is_authenticated(&self) -> bool;

    /// Whether the venue honours post-only limit orders.
    fn supports_post_only(&self) -> bool {
        self.venue().supports_post_only()
    }
}

/// Formats a decimal for a venue API: plain decimal string, no scientific
/// notation, trailing zeros trimmed.
#[must_use]
pub fn decimal_str(value: Decimal) -> String {
    let normalized = value.normalize();
    normalized.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::str::FromStr;

    fn btc_usdt() -> Symbol {
        Symbol::parse("BTCUSDT").unwrap()
    }

    #[test]
    fn test_limit_request_validates() {
        let req = PlaceOrderRequest::limit(btc_usdt(), Side::Buy, dec!(0.5), dec!(65000));
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_quantity() {
        let req = PlaceOrderRequest::market(btc_usdt(), Side::Sell, Decimal::ZERO);
        let err = req.validate().unwrap_err();
        assert!(matches!(err, VenueError::InvalidInput { field: "quantity", .. }));
    }

    #[test]
    fn test_rejects_limit_without_price() {
        let mut req = PlaceOrderRequest::limit(btc_usdt(), Side::Buy, dec!(1), dec!(65000));
        req.price = None;
        let err = req.validate().unwrap_err();
        assert!(matches!(err, VenueError::InvalidInput { field: "price", .. }));
    }

    #[test]
    fn test_rejects_non_positive_limit_price() {
        let req = PlaceOrderRequest::limit(btc_usdt(), Side::Buy, dec!(1), dec!(-5));
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_market_without_price_is_fine() {
        let req = PlaceOrderRequest::market(btc_usdt(), Side::Buy, dec!(1));
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_decimal_str_never_scientific() {
        // Values that float formatting would render as 1e-8 / 6.5e4.
        assert_eq!(decimal_str(Decimal::from_str("0.00000001").unwrap()), "0.00000001");
        assert_eq!(decimal_str(dec!(65000)), "65000");
        assert_eq!(decimal_str(dec!(65000.1200)), "65000.12");
        assert_eq!(decimal_str(dec!(0.5000)), "0.5");
    }
}
