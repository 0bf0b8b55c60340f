//! In-memory venue for tests and dry runs.
//!
//! Books, balances, and fill behaviour are scripted; fills land
//! deterministically at placement time. No network I/O.

use crate::adapter::{PlaceOrderRequest, VenueAdapter};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use spot_arb_core::{
    Balance, Order, OrderBookSnapshot, OrderStatus, Symbol, VenueError, VenueId, VenueResult,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// How scripted orders behave at placement.
#[derive(Debug, Clone, PartialEq)]
pub enum PaperBehavior {
    /// Fill the full quantity at placement, as if the order crossed the
    /// book instantly.
    FillImmediately,
    /// Fill this fraction of the quantity at placement and stay
    /// partially filled until cancelled.
    FillFraction(Decimal),
    /// Acknowledge and stay open forever.
    NeverFill,
    /// Reject placement with insufficient balance.
    RejectInsufficientBalance,
    /// Reject placement with a business rejection.
    RejectOrder(String),
    /// Fail placement with a network error.
    NetworkError,
}

/// Scripted venue adapter.
pub struct PaperVenue {
    venue: VenueId,
    behavior: RwLock<PaperBehavior>,
    books: RwLock<HashMap<Symbol, OrderBookSnapshot>>,
    balances: RwLock<HashMap<String, Balance>>,
    orders: RwLock<HashMap<String, Order>>,
    placed: RwLock<Vec<PlaceOrderRequest>>,
    orderbook_failures: AtomicU64,
    balance_failures: AtomicU64,
    next_id: AtomicU64,
    maker_fee: Decimal,
    taker_fee: Decimal,
}

impl PaperVenue {
    /// Creates a paper venue that fills everything immediately.
    #[must_use]
    pub fn new(venue: VenueId) -> Self {
        Self {
            venue,
            behavior: RwLock::new(PaperBehavior::FillImmediately),
            books: RwLock::new(HashMap::new()),
            balances: RwLock::new(HashMap::new()),
            orders: RwLock::new(HashMap::new()),
            placed: RwLock::new(Vec::new()),
            orderbook_failures: AtomicU64::new(0),
            balance_failures: AtomicU64::new(0),
            next_id: AtomicU64::new(1),
            maker_fee: venue.default_maker_fee(),
            taker_fee: venue.default_taker_fee(),
        }
    }

    /// Sets the fill behaviour for subsequent placements.
    pub fn set_behavior(&self, behavior: PaperBehavior) {
        *self.behavior.write() = behavior;
    }

    /// Installs a book snapshot served by `fetch_orderbook`.
    pub fn set_book(&self, snapshot: OrderBookSnapshot) {
        self.books.write().insert(snapshot.symbol.clone(), snapshot);
    }

    /// Installs a balance.
    pub fn set_balance(&self, currency: &str, available: Decimal, locked: Decimal) {
        self.balances.write().insert(
            currency.to_ascii_uppercase(),
            Balance {
                currency: currency.to_ascii_uppercase(),
                available,
                locked,
            },
        );
    }

    /// Makes the next `n` orderbook fetches fail with a network error.
    pub fn fail_next_orderbooks(&self, n: u64) {
        self.orderbook_failures.store(n, Ordering::SeqCst);
    }

    /// Makes the next `n` balance fetches fail with a 404.
    pub fn fail_next_balances(&self, n: u64) {
        self.balance_failures.store(n, Ordering::SeqCst);
    }

    /// Requests recorded by `place_order`, including rejected ones.
    #[must_use]
    pub fn placed_requests(&self) -> Vec<PlaceOrderRequest> {
        self.placed.read().clone()
    }

    /// Number of orders that reached the venue.
    #[must_use]
    pub fn accepted_order_count(&self) -> usize {
        self.orders.read().len()
    }

    fn take_failure(counter: &AtomicU64) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    /// Applies the scripted fill to a freshly placed order.
    fn apply_fill(&self, order: &mut Order, behavior: &PaperBehavior) {
        match behavior {
            PaperBehavior::FillImmediately => {
                order.status = OrderStatus::Filled;
                order.filled_quantity = order.quantity;
                order.avg_fill_price = order.price;
                order.fee = order.price.map(|p| p * order.quantity * self.taker_fee);
            }
            PaperBehavior::FillFraction(fraction) => {
                order.status = OrderStatus::PartiallyFilled;
                order.filled_quantity = order.quantity * *fraction;
                order.avg_fill_price = order.price;
            }
            PaperBehavior::NeverFill => {
                order.status = OrderStatus::Open;
            }
            // Rejection behaviours never reach here.
            _ => {}
        }
        order.updated_at = Utc::now();
    }
}

impl std::fmt::Debug for PaperVenue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaperVenue")
            .field("venue", &self.venue)
            .field("behavior", &*self.behavior.read())
            .field("orders", &self.orders.read().len())
            .finish()
    }
}

#[async_trait]
impl VenueAdapter for PaperVenue {
    fn venue(&self) -> VenueId {
        self.venue
    }

    async fn fetch_orderbook(
        &self,
        symbol: &Symbol,
        _depth: usize,
    ) -> VenueResult<OrderBookSnapshot> {
        if Self::take_failure(&self.orderbook_failures) {
            return Err(VenueError::Network("paper: scripted failure".into()));
        }
        self.books
            .read()
            .get(symbol)
            .cloned()
            .ok_or_else(|| VenueError::InvalidSymbol(format!("paper: no book for {symbol}")))
    }

    async fn place_order(&self, request: &PlaceOrderRequest) -> VenueResult<Order> {
        request.validate()?;
        self.placed.write().push(request.clone());

        let behavior = self.behavior.read().clone();
        match &behavior {
            PaperBehavior::RejectInsufficientBalance => {
                return Err(VenueError::InsufficientBalance {
                    required: request.quantity,
                    available: Decimal::ZERO,
                })
            }
            PaperBehavior::RejectOrder(reason) => {
                return Err(VenueError::OrderRejected(reason.clone()))
            }
            PaperBehavior::NetworkError => {
                return Err(VenueError::Network("paper: scripted outage".into()))
            }
            _ => {}
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let venue_order_id = format!("paper-{}-{id}", self.venue.as_str().to_lowercase());
        let mut order = Order::pending(
            self.venue,
            request.symbol.clone(),
            request.side,
            request.order_type,
            request.quantity,
            request.price,
            Utc::now(),
        );
        order.venue_order_id = Some(venue_order_id.clone());
        order.status = OrderStatus::Open;
        self.apply_fill(&mut order, &behavior);
        self.orders.write().insert(venue_order_id, order.clone());
        Ok(order)
    }

    async fn cancel_order(&self, order_id: &str, _symbol: Option<&Symbol>) -> VenueResult<bool> {
        let mut orders = self.orders.write();
        match orders.get_mut(order_id) {
            Some(order) => {
                if !order.is_terminal() {
                    order.status = OrderStatus::Cancelled;
                    order.updated_at = Utc::now();
                }
                Ok(true)
            }
            None => Ok(true),
        }
    }

    async fn get_order(&self, order_id: &str, _symbol: Option<&Symbol>) -> VenueResult<Order> {
        self.orders
            .read()
            .get(order_id)
            .cloned()
            .ok_or_else(|| VenueError::order_not_found(order_id))
    }

    async fn get_open_orders(&self, symbol: Option<&Symbol>) -> VenueResult<Vec<Order>> {
        Ok(self
            .orders
            .read()
            .values()
            .filter(|o| !o.is_terminal())
            .filter(|o| symbol.map_or(true, |s| &o.symbol == s))
            .cloned()
            .collect())
    }

    async fn get_balance(&self, currency: &str) -> VenueResult<Balance> {
        if Self::take_failure(&self.balance_failures) {
            return Err(VenueError::api(404, "paper: balance endpoint unavailable"));
        }
        Ok(self
            .balances
            .read()
            .get(&currency.to_ascii_uppercase())
            .cloned()
            .unwrap_or(Balance {
                currency: currency.to_ascii_uppercase(),
                available: Decimal::ZERO,
                locked: Decimal::ZERO,
            }))
    }

    fn maker_fee(&self) -> Decimal {
        self.maker_fee
    }

    fn taker_fee(&self) -> Decimal {
        self.taker_fee
    }

    fn is_authenticated(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use spot_arb_core::{BookLevel, Side};

    fn btc_usdt() -> Symbol {
        Symbol::parse("BTCUSDT").unwrap()
    }

    fn sample_book() -> OrderBookSnapshot {
        OrderBookSnapshot::new(
            VenueId::Wallex,
            btc_usdt(),
            vec![BookLevel::new(dec!(64990), dec!(1))],
            vec![BookLevel::new(dec!(65010), dec!(1))],
            Utc::now(),
        )
        .unwrap()
    }

    fn limit_buy() -> PlaceOrderRequest {
        PlaceOrderRequest::limit(btc_usdt(), Side::Buy, dec!(0.5), dec!(65000))
    }

    #[tokio::test]
    async fn test_fill_immediately_at_placement() {
        let venue = PaperVenue::new(VenueId::Wallex);
        let order = venue.place_order(&limit_buy()).await.unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.filled_quantity, dec!(0.5));
        assert_eq!(order.avg_fill_price, Some(dec!(65000)));

        // Polls see the same terminal state.
        let id = order.venue_order_id.unwrap();
        let polled = venue.get_order(&id, None).await.unwrap();
        assert_eq!(polled.status, OrderStatus::Filled);
    }

    #[tokio::test]
    async fn test_fill_fraction_stays_partial() {
        let venue = PaperVenue::new(VenueId::Wallex);
        venue.set_behavior(PaperBehavior::FillFraction(dec!(0.4)));
        let order = venue.place_order(&limit_buy()).await.unwrap();
        assert_eq!(order.status, OrderStatus::PartiallyFilled);
        assert_eq!(order.filled_quantity, dec!(0.2));

        // Still partial on the next poll.
        let id = order.venue_order_id.unwrap();
        let polled = venue.get_order(&id, None).await.unwrap();
        assert_eq!(polled.status, OrderStatus::PartiallyFilled);
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let venue = PaperVenue::new(VenueId::Wallex);
        let order = venue.place_order(&limit_buy()).await.unwrap();
        let id = order.venue_order_id.unwrap();

        assert!(venue.cancel_order(&id, None).await.unwrap());
        // Terminal order: cancelling again still succeeds and the fill
        // is untouched.
        assert!(venue.cancel_order(&id, None).await.unwrap());
        let polled = venue.get_order(&id, None).await.unwrap();
        assert_eq!(polled.status, OrderStatus::Filled);

        // Unknown id maps to success too.
        assert!(venue.cancel_order("missing", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_rejection_behaviours() {
        let venue = PaperVenue::new(VenueId::Wallex);
        venue.set_behavior(PaperBehavior::RejectInsufficientBalance);
        assert!(matches!(
            venue.place_order(&limit_buy()).await,
            Err(VenueError::InsufficientBalance { .. })
        ));

        venue.set_behavior(PaperBehavior::RejectOrder("post only would cross".into()));
        assert!(matches!(
            venue.place_order(&limit_buy()).await,
            Err(VenueError::OrderRejected(_))
        ));
        // Rejected placements still show up in the request log.
        assert_eq!(venue.placed_requests().len(), 2);
        assert_eq!(venue.accepted_order_count(), 0);
    }

    #[tokio::test]
    async fn test_scripted_orderbook_failures() {
        let venue = PaperVenue::new(VenueId::Wallex);
        venue.set_book(sample_book());
        venue.fail_next_orderbooks(2);
        assert!(venue.fetch_orderbook(&btc_usdt(), 20).await.is_err());
        assert!(venue.fetch_orderbook(&btc_usdt(), 20).await.is_err());
        assert!(venue.fetch_orderbook(&btc_usdt(), 20).await.is_ok());
    }

    #[tokio::test]
    async fn test_balance_scripting() {
        let venue = PaperVenue::new(VenueId::Wallex);
        venue.set_balance("USDT", dec!(1000), dec!(50));
        let balance = venue.get_balance("usdt").await.unwrap();
        assert_eq!(balance.available, dec!(1000));
        assert_eq!(balance.total(), dec!(1050));

        venue.fail_next_balances(1);
        assert!(venue.get_balance("USDT").await.is_err());
        assert!(venue.get_balance("USDT").await.is_ok());
    }

    #[tokio::test]
    async fn test_open_orders_filtering() {
        let venue = PaperVenue::new(VenueId::Wallex);
        venue.set_behavior(PaperBehavior::NeverFill);
        let _ = venue.place_order(&limit_buy()).await.unwrap();
        let eth = PlaceOrderRequest::limit(
            Symbol::parse("ETHUSDT").unwrap(),
            Side::Sell,
            dec!(2),
            dec!(3000),
        );
        let _ = venue.place_order(&eth).await.unwrap();

        assert_eq!(venue.get_open_orders(None).await.unwrap().len(), 2);
        assert_eq!(
            venue.get_open_orders(Some(&btc_usdt())).await.unwrap().len(),
            1
        );
    }
}
