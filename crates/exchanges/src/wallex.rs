//! Wallex adapter.
//!
//! Wallex lists TMN and USDT markets with plain symbols (`BTCTMN`) and
//! authenticates with an `x-api-key` header plus an HMAC-SHA256
//! signature over the sorted query string on GET/DELETE endpoints.
//! Responses are wrapped in `{ "success": bool, "result": ... }`.

use crate::adapter::{decimal_str, PlaceOrderRequest, VenueAdapter};
use crate::auth::HmacSha256Auth;
use crate::http::VenueHttp;
use crate::retry::{retry, RetryPolicy};
use crate::util::{decimal_from_value, normalize_levels, resolve_symbol};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use spot_arb_core::{
    Balance, BookLevel, ExchangeSettings, Order, OrderBookSnapshot, OrderStatus, OrderType, Side,
    Symbol, VenueError, VenueId, VenueResult,
};
use std::collections::BTreeMap;
use tracing::debug;

// =============================================================================
// Raw API Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct RawEnvelope<T> {
    success: Option<bool>,
    message: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct RawDepth {
    #[serde(default)]
    bid: Vec<RawDepthEntry>,
    #[serde(default)]
    ask: Vec<RawDepthEntry>,
}

#[derive(Debug, Deserialize)]
struct RawDepthEntry {
    price: serde_json::Value,
    quantity: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RawOrder {
    #[serde(rename = "orderId")]
    order_id: Option<serde_json::Value>,
    id: Option<serde_json::Value>,
    symbol: Option<String>,
    side: Option<String>,
    #[serde(rename = "type")]
    order_type: Option<String>,
    status: Option<String>,
    quantity: Option<serde_json::Value>,
    price: Option<serde_json::Value>,
    #[serde(rename = "executedQty")]
    executed_qty: Option<serde_json::Value>,
    #[serde(rename = "executedQuantity")]
    executed_quantity: Option<serde_json::Value>,
    #[serde(rename = "executedPrice")]
    executed_price: Option<serde_json::Value>,
    fee: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawBalances {
    #[serde(default)]
    balances: serde_json::Map<String, serde_json::Value>,
}

/// Maps a Wallex order status to the shared lifecycle.
fn map_status(status: &str) -> OrderStatus {
    match status {
        "NEW" => OrderStatus::Open,
        "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
        "FILLED" => OrderStatus::Filled,
        "CANCELED" | "CANCELLED" => OrderStatus::Cancelled,
        "REJECTED" => OrderStatus::Rejected,
        _ => OrderStatus::Unknown,
    }
}

// =============================================================================
// Adapter
// =============================================================================

/// Wallex venue adapter.
#[derive(Debug)]
pub struct WallexAdapter {
    http: VenueHttp,
    auth: Option<HmacSha256Auth>,
    maker_fee: Decimal,
    taker_fee: Decimal,
    retry_policy: RetryPolicy,
}

impl WallexAdapter {
    /// Creates the adapter from per-venue settings.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(settings: &ExchangeSettings) -> VenueResult<Self> {
        let creds = &settings.credentials;
        let auth = match (&creds.api_key, &creds.api_secret) {
            (Some(key), Some(secret)) if !key.is_empty() && !secret.is_empty() => {
                Some(HmacSha256Auth::new(key.clone(), secret.clone()))
            }
            _ => None,
        };
        Ok(Self {
            http: VenueHttp::new(VenueId::Wallex, settings)?,
            auth,
            maker_fee: settings
                .maker_fee
                .unwrap_or_else(|| VenueId::Wallex.default_maker_fee()),
            taker_fee: settings
                .taker_fee
                .unwrap_or_else(|| VenueId::Wallex.default_taker_fee()),
            retry_policy: RetryPolicy::default(),
        })
    }

    /// Replaces the retry policy. Used by tests.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    fn auth(&self) -> VenueResult<&HmacSha256Auth> {
        self.auth
            .as_ref()
            .ok_or_else(|| VenueError::Auth("Wallex: no API key configured".into()))
    }

    fn render(&self, symbol: &Symbol) -> VenueResult<String> {
        symbol
            .render(VenueId::Wallex)
            .map_err(|e| VenueError::InvalidSymbol(e.to_string()))
    }

    fn unwrap_envelope<T>(raw: RawEnvelope<T>) -> VenueResult<T> {
        if raw.success != Some(true) {
            return Err(VenueError::api(
                200,
                format!(
                    "Wallex success=false: {}",
                    raw.message.as_deref().unwrap_or("no message")
                ),
            ));
        }
        raw.result
            .ok_or_else(|| VenueError::Serialization("Wallex envelope without result".into()))
    }

    fn order_from_raw(raw: &RawOrder, fallback_symbol: &Symbol) -> Order {
        let symbol = raw
            .symbol
            .as_deref()
            .and_then(|s| Symbol::parse(s).ok())
            .unwrap_or_else(|| fallback_symbol.clone());
        let side = match raw.side.as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some("sell") => Side::Sell,
            _ => Side::Buy,
        };
        let order_type = match raw.order_type.as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some("market") => OrderType::Market,
            _ => OrderType::Limit,
        };
        let now = Utc::now();
        let mut order = Order::pending(
            VenueId::Wallex,
            symbol,
            side,
            order_type,
            raw.quantity
                .as_ref()
                .and_then(decimal_from_value)
                .unwrap_or(Decimal::ZERO),
            raw.price.as_ref().and_then(decimal_from_value),
            now,
        );
        order.venue_order_id = raw
            .order_id
            .as_ref()
            .or(raw.id.as_ref())
            .filter(|v| !v.is_null())
            .map(|v| v.to_string().trim_matches('"').to_string());
        order.status = raw
            .status
            .as_deref()
            .map_or(OrderStatus::Pending, map_status);
        order.filled_quantity = raw
            .executed_qty
            .as_ref()
            .or(raw.executed_quantity.as_ref())
            .and_then(decimal_from_value)
            .unwrap_or(Decimal::ZERO);
        order.avg_fill_price = raw.executed_price.as_ref().and_then(decimal_from_value);
        order.fee = raw.fee.as_ref().and_then(decimal_from_value);
        order
    }

    fn signed_query(
        &self,
        params: &BTreeMap<String, String>,
    ) -> VenueResult<(Vec<(String, String)>, String)> {
        let auth = self.auth()?;
        let canonical = HmacSha256Auth::canonical_query(params);
        let signature = auth.sign(&canonical)?;
        let pairs = params
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok((pairs, signature))
    }
}

#[async_trait]
impl VenueAdapter for WallexAdapter {
    fn venue(&self) -> VenueId {
        VenueId::Wallex
    }

    async fn fetch_orderbook(
        &self,
        symbol: &Symbol,
        depth: usize,
    ) -> VenueResult<OrderBookSnapshot> {
        let rendered = self.render(symbol)?;
        let depth = depth.clamp(1, VenueId::Wallex.max_book_depth());

        let http = &self.http;
        let rendered_ref: &str = &rendered;
        let raw: RawEnvelope<RawDepth> =
            retry(&self.retry_policy, "wallex.orderbook", move || async move {
                http.acquire().await;
                debug!(venue = "Wallex", symbol = rendered_ref, "fetching orderbook");
                let response = http
                    .client()
                    .get(http.url("/v1/depth"))
                    .query(&[("symbol", rendered_ref)])
                    .send()
                    .await?;
                http.handle_json(response).await
            })
            .await?;

        let result = Self::unwrap_envelope(raw)?;
        let to_levels = |entries: &[RawDepthEntry]| -> Vec<BookLevel> {
            entries
                .iter()
                .filter_map(|e| {
                    Some(BookLevel::new(
                        decimal_from_value(&e.price)?,
                        decimal_from_value(&e.quantity)?,
                    ))
                })
                .collect()
        };
        let bids = normalize_levels(to_levels(&result.bid), true);
        let asks = normalize_levels(to_levels(&result.ask), false);
        if bids.is_empty() && asks.is_empty() {
            return Err(VenueError::InvalidSymbol(format!(
                "Wallex returned an empty book for {rendered}"
            )));
        }

        OrderBookSnapshot::new(
            VenueId::Wallex,
            symbol.clone(),
            bids.into_iter().take(depth).collect(),
            asks.into_iter().take(depth).collect(),
            Utc::now(),
        )
        .map_err(|e| VenueError::Serialization(format!("Wallex book invariant: {e}")))
    }

    async fn place_order(&self, request: &PlaceOrderRequest) -> VenueResult<Order> {
        request.validate()?;
        let auth = self.auth()?;
        let rendered = self.render(&request.symbol)?;

        let mut payload = serde_json::json!({
            "symbol": rendered,
            "side": request.side.as_str().to_ascii_uppercase(),
            "type": request.order_type.to_string().to_ascii_uppercase(),
            "quantity": decimal_str(request.quantity),
        });
        if let Some(price) = request.price {
            payload["price"] = serde_json::Value::String(decimal_str(price));
        }
        // Wallex has no post-only flag; maker requests are downgraded by
        // the executor before they reach this adapter.

        self.http.acquire().await;
        let response = self
            .http
            .client()
            .post(self.http.url("/v1/account/orders"))
            .header("x-api-key", auth.api_key())
            .json(&payload)
            .send()
            .await?;
        let raw: RawEnvelope<RawOrder> = self.http.handle_json(response).await?;
        let raw_order = Self::unwrap_envelope(raw)?;
        let mut order = Self::order_from_raw(&raw_order, &request.symbol);
        if order.quantity == Decimal::ZERO {
            order.quantity = request.quantity;
        }
        if order.price.is_none() {
            order.price = request.price;
        }
        Ok(order)
    }

    async fn cancel_order(&self, order_id: &str, symbol: Option<&Symbol>) -> VenueResult<bool> {
        let mut params = BTreeMap::new();
        if let Some(s) = symbol {
            params.insert("symbol".to_string(), self.render(s)?);
        }
        let (pairs, signature) = self.signed_query(&params)?;
        let auth = self.auth()?;

        self.http.acquire().await;
        let response = self
            .http
            .client()
            .delete(self.http.url(&format!("/v1/orders/{order_id}")))
            .query(&pairs)
            .header("x-api-key", auth.api_key())
            .header("X-API-Sign", signature)
            .send()
            .await?;
        if response.status().as_u16() == 404 {
            return Ok(true);
        }
        let raw: RawEnvelope<serde_json::Value> = self.http.handle_json(response).await?;
        Ok(raw.success == Some(true))
    }

    async fn get_order(&self, order_id: &str, symbol: Option<&Symbol>) -> VenueResult<Order> {
        let mut params = BTreeMap::new();
        if let Some(s) = symbol {
            params.insert("symbol".to_string(), self.render(s)?);
        }
        let (pairs, signature) = self.signed_query(&params)?;
        let auth = self.auth()?;

        self.http.acquire().await;
        let response = self
            .http
            .client()
            .get(self.http.url(&format!("/v1/orders/{order_id}")))
            .query(&pairs)
            .header("x-api-key", auth.api_key())
            .header("X-API-Sign", signature)
            .send()
            .await?;
        if response.status().as_u16() == 404 {
            return Err(VenueError::order_not_found(order_id));
        }
        let raw: RawEnvelope<RawOrder> = self.http.handle_json(response).await?;
        let raw_order = Self::unwrap_envelope(raw)?;
        let fallback = resolve_symbol(symbol, raw_order.symbol.as_deref())?;
        Ok(Self::order_from_raw(&raw_order, &fallback))
    }

    async fn get_open_orders(&self, symbol: Option<&Symbol>) -> VenueResult<Vec<Order>> {
        let mut params = BTreeMap::new();
        params.insert("status".to_string(), "NEW".to_string());
        if let Some(s) = symbol {
            params.insert("symbol".to_string(), self.render(s)?);
        }
        let (pairs, signature) = self.signed_query(&params)?;
        let auth = self.auth()?;

        self.http.acquire().await;
        let response = self
            .http
            .client()
            .get(self.http.url("/v1/orders"))
            .query(&pairs)
            .header("x-api-key", auth.api_key())
            .header("X-API-Sign", signature)
            .send()
            .await?;
        // The result is a bare list of orders.
        let raw: RawEnvelope<Vec<RawOrder>> = self.http.handle_json(response).await?;
        let result = Self::unwrap_envelope(raw)?;
        Ok(result
            .iter()
            .filter_map(|o| {
                let fallback = resolve_symbol(symbol, o.symbol.as_deref()).ok()?;
                Some(Self::order_from_raw(o, &fallback))
            })
            .filter(|o| !o.is_terminal())
            .collect())
    }

    async fn get_balance(&self, currency: &str) -> VenueResult<Balance> {
        let (_, signature) = self.signed_query(&BTreeMap::new())?;
        let auth = self.auth()?;

        self.http.acquire().await;
        let response = self
            .http
            .client()
            .get(self.http.url("/v1/account/balances"))
            .header("x-api-key", auth.api_key())
            .header("X-API-Sign", signature)
            .send()
            .await?;
        let raw: RawEnvelope<RawBalances> = self.http.handle_json(response).await?;
        let result = Self::unwrap_envelope(raw)?;

        let wanted = currency.to_ascii_uppercase();
        // Wallex spells the toman "TMN".
        let keys = if wanted == "IRT" {
            vec![wanted.clone(), "TMN".to_string()]
        } else {
            vec![wanted.clone()]
        };
        for (name, entry) in &result.balances {
            if keys.contains(&name.to_ascii_uppercase()) {
                let available = entry
                    .get("value")
                    .or_else(|| entry.get("available"))
                    .and_then(decimal_from_value)
                    .unwrap_or(Decimal::ZERO);
                let locked = entry
                    .get("locked")
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
