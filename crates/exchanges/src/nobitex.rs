//! Nobitex adapter.
//!
//! Nobitex lists IRT markets with plain symbols (`BTCIRT`) and
//! authenticates with a pre-issued token in the `Authorization` header.
//! Public order books come from `/v3/orderbook/{symbol}`; trading and
//! wallet endpoints live under `/v2`.

use crate::adapter::{decimal_str, PlaceOrderRequest, VenueAdapter};
use crate::auth::BearerTokenAuth;
use crate::http::VenueHttp;
use crate::retry::{retry, RetryPolicy};
use crate::util::{decimal_from_value, level_from_pair, normalize_levels, resolve_symbol};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use spot_arb_core::{
    Balance, ExchangeSettings, Order, OrderBookSnapshot, OrderStatus, OrderType, Side, Symbol,
    VenueError, VenueId, VenueResult,
};
use tracing::debug;

// =============================================================================
// Raw API Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct RawOrderbookResponse {
    status: Option<String>,
    message: Option<String>,
    #[serde(default)]
    bids: Vec<Vec<serde_json::Value>>,
    #[serde(default)]
    asks: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct RawOrderResponse {
    status: Option<String>,
    message: Option<String>,
    order: Option<RawOrder>,
}

#[derive(Debug, Deserialize)]
struct RawOpenOrdersResponse {
    status: Option<String>,
    #[serde(default)]
    orders: Vec<RawOrder>,
}

#[derive(Debug, Deserialize)]
struct RawOrder {
    id: serde_json::Value,
    market: Option<String>,
    /// Nobitex calls the side "type".
    #[serde(rename = "type")]
    side: Option<String>,
    #[serde(rename = "orderType")]
    order_type: Option<String>,
    status: Option<String>,
    amount: Option<serde_json::Value>,
    price: Option<serde_json::Value>,
    #[serde(rename = "matchedAmount")]
    matched_amount: Option<serde_json::Value>,
    #[serde(rename = "averagePrice")]
    average_price: Option<serde_json::Value>,
    fee: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawWalletsResponse {
    status: Option<String>,
    #[serde(default)]
    wallets: serde_json::Map<String, serde_json::Value>,
}

/// Maps a Nobitex order status to the shared lifecycle.
fn map_status(status: &str) -> OrderStatus {
    match status {
        "Active" | "New" => OrderStatus::Open,
        "PartiallyMatched" => OrderStatus::PartiallyFilled,
        "Matched" | "Done" => OrderStatus::Filled,
        "Canceled" | "Cancelled" => OrderStatus::Cancelled,
        "Rejected" => OrderStatus::Rejected,
        _ => OrderStatus::Unknown,
    }
}

// =============================================================================
// Adapter
// =============================================================================

/// Nobitex venue adapter.
#[derive(Debug)]
pub struct NobitexAdapter {
    http: VenueHttp,
    auth: Option<BearerTokenAuth>,
    maker_fee: Decimal,
    taker_fee: Decimal,
    retry_policy: RetryPolicy,
}

impl NobitexAdapter {
    /// Creates the adapter from per-venue settings. A missing token puts
    /// it in read-only mode.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(settings: &ExchangeSettings) -> VenueResult<Self> {
        let auth = settings
            .credentials
            .token
            .as_ref()
            .filter(|t| !t.is_empty())
            .map(|t| BearerTokenAuth::new(t.clone()));
        Ok(Self {
            http: VenueHttp::new(VenueId::Nobitex, settings)?,
            auth,
            maker_fee: settings
                .maker_fee
                .unwrap_or_else(|| VenueId::Nobitex.default_maker_fee()),
            taker_fee: settings
                .taker_fee
                .unwrap_or_else(|| VenueId::Nobitex.default_taker_fee()),
            retry_policy: RetryPolicy::default(),
        })
    }

    /// Replaces the retry policy. Used by tests.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    fn auth(&self) -> VenueResult<&BearerTokenAuth> {
        self.auth
            .as_ref()
            .ok_or_else(|| VenueError::Auth("Nobitex: no token configured".into()))
    }

    fn render(&self, symbol: &Symbol) -> VenueResult<String> {
        symbol
            .render(VenueId::Nobitex)
            .map_err(|e| VenueError::InvalidSymbol(e.to_string()))
    }

    fn check_status(status: &Option<String>, message: &Option<String>) -> VenueResult<()> {
        match status.as_deref() {
            Some("ok") => Ok(()),
            other => Err(VenueError::api(
                200,
                format!(
                    "Nobitex status {:?}: {}",
                    other,
                    message.as_deref().unwrap_or("unknown error")
                ),
            )),
        }
    }

    fn order_from_raw(&self, raw: &RawOrder, fallback_symbol: &Symbol) -> Order {
        let symbol = raw
            .market
            .as_deref()
            .and_then(|m| Symbol::parse(m).ok())
            .unwrap_or_else(|| fallback_symbol.clone());
        let side = match raw.side.as_deref() {
            Some("sell") => Side::Sell,
            _ => Side::Buy,
        };
        let order_type = match raw.order_type.as_deref() {
            Some("market") => OrderType::Market,
            _ => OrderType::Limit,
        };
        let now = Utc::now();
        let mut order = Order::pending(
            VenueId::Nobitex,
            symbol,
            side,
            order_type,
            raw.amount
                .as_ref()
                .and_then(decimal_from_value)
                .unwrap_or(Decimal::ZERO),
            raw.price.as_ref().and_then(decimal_from_value),
            now,
        );
        order.venue_order_id = match &raw.id {
            serde_json::Value::Null => None,
            v => Some(v.to_string().trim_matches('"').to_string()),
        };
        order.status = raw
            .status
            .as_deref()
            .map_or(OrderStatus::Open, map_status);
        order.filled_quantity = raw
            .matched_amount
            .as_ref()
            .and_then(decimal_from_value)
            .unwrap_or(Decimal::ZERO);
        order.avg_fill_price = raw.average_price.as_ref().and_then(decimal_from_value);
        order.fee = raw.fee.as_ref().and_then(decimal_from_value);
        order
    }
}

#[async_trait]
impl VenueAdapter for NobitexAdapter {
    fn venue(&self) -> VenueId {
        VenueId::Nobitex
    }

    async fn fetch_orderbook(
        &self,
        symbol: &Symbol,
        depth: usize,
    ) -> VenueResult<OrderBookSnapshot> {
        let rendered = self.render(symbol)?;
        let depth = depth.clamp(1, VenueId::Nobitex.max_book_depth());
        let path = format!("/v3/orderbook/{rendered}");

        let http = &self.http;
        let path_ref: &str = &path;
        let raw: RawOrderbookResponse =
            retry(&self.retry_policy, "nobitex.orderbook", move || async move {
                http.acquire().await;
                debug!(venue = "Nobitex", path = path_ref, "fetching orderbook");
                let response = http.client().get(http.url(path_ref)).send().await?;
                http.handle_json(response).await
            })
            .await?;

        Self::check_status(&raw.status, &raw.message)?;

        let bids = normalize_levels(
            raw.bids.iter().filter_map(|p| level_from_pair(p)).collect(),
            true,
        );
        let asks = normalize_levels(
            raw.asks.iter().filter_map(|p| level_from_pair(p)).collect(),
            false,
        );
        if bids.is_empty() && asks.is_empty() {
            return Err(VenueError::InvalidSymbol(format!(
                "Nobitex returned an empty book for {rendered}"
            )));
        }

        OrderBookSnapshot::new(
            VenueId::Nobitex,
            symbol.clone(),
            bids.into_iter().take(depth).collect(),
            asks.into_iter().take(depth).collect(),
            Utc::now(),
        )
        .map_err(|e| VenueError::Serialization(format!("Nobitex book invariant: {e}")))
    }

    async fn place_order(&self, request: &PlaceOrderRequest) -> VenueResult<Order> {
        request.validate()?;
        let auth = self.auth()?;
        let rendered = self.render(&request.symbol)?;

        let mut payload = serde_json::json!({
            "type": request.side.as_str(),
            "execution": if request.post_only { "maker" } else { "taker" },
            "amount": decimal_str(request.quantity),
            "symbol": rendered,
        });
        if request.order_type == OrderType::Limit {
            if let Some(price) = request.price {
                payload["price"] = serde_json::Value::String(decimal_str(price));
            }
        } else {
            payload["execution"] = serde_json::Value::String("taker".into());
        }
        // Nobitex accepts the flag but does not enforce post-only; the
        // executor treats this leg as taker regardless.
        if request.post_only && request.order_type == OrderType::Limit {
            payload["postOnly"] = serde_json::Value::Bool(true);
        }

        self.http.acquire().await;
        let response = self
            .http
            .client()
            .post(self.http.url("/v2/orders/add"))
            .header("Authorization", auth.header_value())
            .json(&payload)
            .send()
            .await?;
        let raw: RawOrderResponse = self.http.handle_json(response).await?;
        Self::check_status(&raw.status, &raw.message)?;

        let raw_order = raw
            .order
            .ok_or_else(|| VenueError::OrderRejected("Nobitex returned no order".into()))?;
        let mut order = self.order_from_raw(&raw_order, &request.symbol);
        if order.status == OrderStatus::Unknown {
            order.status = OrderStatus::Pending;
        }
        Ok(order)
    }

    async fn cancel_order(&self, order_id: &str, _symbol: Option<&Symbol>) -> VenueResult<bool> {
        let auth = self.auth()?;
        self.http.acquire().await;
        let response = self
            .http
            .client()
            .post(self.http.url(&format!("/v2/orders/{order_id}/cancel")))
            .header("Authorization", auth.header_value())
            .send()
            .await?;
        if response.status().as_u16() == 404 {
            // Already gone: cancellation is idempotent.
            return Ok(true);
        }
        let raw: RawOrderResponse = self.http.handle_json(response).await?;
        Ok(raw.status.as_deref() == Some("ok"))
    }

    async fn get_order(&self, order_id: &str, symbol: Option<&Symbol>) -> VenueResult<Order> {
        let auth = self.auth()?;
        self.http.acquire().await;
        let response = self
            .http
            .client()
            .get(self.http.url(&format!("/v2/orders/{order_id}")))
            .header("Authorization", auth.header_value())
            .send()
            .await?;
        if response.status().as_u16() == 404 {
            return Err(VenueError::order_not_found(order_id));
        }
        let raw: RawOrderResponse = self.http.handle_json(response).await?;
        Self::check_status(&raw.status, &raw.message)?;
        let raw_order = raw
            .order
            .ok_or_else(|| VenueError::order_not_found(order_id))?;
        let fallback = resolve_symbol(symbol, raw_order.market.as_deref())?;
        Ok(self.order_from_raw(&raw_order, &fallback))
    }

    async fn get_open_orders(&self, symbol: Option<&Symbol>) -> VenueResult<Vec<Order>> {
        let auth = self.auth()?;
        self.http.acquire().await;
        let mut request = self
            .http
            .client()
            .get(self.http.url("/v2/orders/open"))
            .header("Authorization", auth.header_value());
        if let Some(s) = symbol {
            request = request.query(&[("market", self.render(s)?)]);
        }
        let response = request.send().await?;
        let raw: RawOpenOrdersResponse = self.http.handle_json(response).await?;
        Self::check_status(&raw.status, &None)?;
        Ok(raw
            .orders
            .iter()
            .filter_map(|o| {
                let fallback = resolve_symbol(symbol, o.market.as_deref()).ok()?;
                Some(self.order_from_raw(o, &fallback))
            })
            .collect())
    }

    async fn get_balance(&self, currency: &str) -> VenueResult<Balance> {
        let auth = self.auth()?;
        self.http.acquire().await;
        let response = self
            .http
            .client()
            .get(self.http.url("/v2/wallets"))
            .header("Authorization", auth.header_value())
            .send()
            .await?;
        let raw: RawWalletsResponse = self.http.handle_json(response).await?;
        Self::check_status(&raw.status, &None)?;

        let wanted = currency.to_ascii_uppercase();
        // Nobitex spells rial wallets "RLS".
        let keys = if wanted == "IRT" {
            vec![wanted.clone(), "RLS".to_string()]
        } else {
            vec![wanted.clone()]
        };
        for (name, wallet) in &raw.wallets {
            if keys.contains(&name.to_ascii_uppercase()) {
                let available = wallet
                    .get("balance")
                    .and_then(decimal_from_value)
                    .unwrap_or(Decimal::ZERO);
                let locked = wallet
                    .get("blocked")
                    .and_then(decimal_from_value)
                    .unwrap_or(Decimal::ZERO);
                return Ok(Balance {
                    currency: wanted,
                    available,
                    locked,
                });
            }
        }
        Ok(Balance {
            currency: wanted,
            available: Decimal::ZERO,
            locked: Decimal::ZERO,
        })
    }

    fn maker_fee(&self) -> Decimal {
        self.maker_fee
    }

    fn taker_fee(&self) -> Decimal {
        self.taker_fee
    }

    fn is_authenticated(&self) -> bool {
        self.auth.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_status_map() {
        assert_eq!(map_status("Active"), OrderStatus::Open);
        assert_eq!(map_status("PartiallyMatched"), OrderStatus::PartiallyFilled);
        assert_eq!(map_status("Matched"), OrderStatus::Filled);
        assert_eq!(map_status("Canceled"), OrderStatus::Cancelled);
        assert_eq!(map_status("Rejected"), OrderStatus::Rejected);
        assert_eq!(map_status("???"), OrderStatus::Unknown);
    }

    #[test]
    fn test_read_only_without_token() {
        let adapter = NobitexAdapter::new(&ExchangeSettings::default()).unwrap();
        assert!(!adapter.is_authenticated());
        assert!(adapter.auth().is_err());
    }

    #[test]
    fn test_authenticated_with_token() {
        let settings = ExchangeSettings {
            credentials: spot_arb_core::Credentials {
                token: Some("tok".into()),
                ..Default::default()
            },
            ..ExchangeSettings::default()
        };
        let adapter = NobitexAdapter::new(&settings).unwrap();
        assert!(adapter.is_authenticated());
    }

    #[test]
    fn test_fee_overrides() {
        let settings = ExchangeSettings {
            maker_fee: Some(dec!(0.0002)),
            taker_fee: Some(dec!(0.0008)),
            ..ExchangeSettings::default()
        };
        let adapter = NobitexAdapter::new(&settings).unwrap();
        assert_eq!(adapter.maker_fee(), dec!(0.0002));
        assert_eq!(adapter.taker_fee(), dec!(0.0008));
    }

    #[test]
    fn test_order_from_raw() {
        let adapter = NobitexAdapter::new(&ExchangeSettings::default()).unwrap();
        let raw: RawOrder = serde_json::from_value(serde_json::json!({
            "id": 991,
            "market": "BTCIRT",
            "type": "sell",
            "orderType": "limit",
            "status": "PartiallyMatched",
            "amount": "0.5",
            "price": "4100000000",
            "matchedAmount": "0.2",
            "averagePrice": "4100000001",
        }))
        .unwrap();
        let symbol = Symbol::parse("BTCIRT").unwrap();
        let order = adapter.order_from_raw(&raw, &symbol);
        assert_eq!(order.venue_order_id.as_deref(), Some("991"));
        assert_eq!(order.side, Side::Sell);
        assert_eq!(order.status, OrderStatus::PartiallyFilled);
        assert_eq!(order.quantity, dec!(0.5));
        assert_eq!(order.filled_quantity, dec!(0.2));
        assert_eq!(order.avg_fill_price, Some(dec!(4100000001)));
    }

    #[test]
    fn test_check_status_error_carries_message() {
        let err = NobitexAdapter::check_status(
            &Some("failed".into()),
            &Some("InsufficientBalance".into()),
        )
        .unwrap_err();
        assert!(err.to_string().contains("InsufficientBalance"));
    }
}
