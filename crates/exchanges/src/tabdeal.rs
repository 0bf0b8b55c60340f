//! Tabdeal adapter.
//!
//! Tabdeal exposes a Binance-shaped API: plain symbols (`BTCIRT`), the
//! key in an `X-MBX-APIKEY` header, and an HMAC-SHA256 signature over
//! the sorted query string (timestamp included) appended as a
//! `signature` parameter.

use crate::adapter::{decimal_str, PlaceOrderRequest, VenueAdapter};
use crate::auth::HmacSha256Auth;
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
use std::collections::BTreeMap;
use tracing::debug;

// =============================================================================
// Raw API Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct RawDepth {
    #[serde(default)]
    bids: Vec<Vec<serde_json::Value>>,
    #[serde(default)]
    asks: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct RawOrder {
    #[serde(rename = "orderId")]
    order_id: Option<serde_json::Value>,
    symbol: Option<String>,
    side: Option<String>,
    #[serde(rename = "type")]
    order_type: Option<String>,
    status: Option<String>,
    #[serde(rename = "origQty")]
    orig_qty: Option<serde_json::Value>,
    quantity: Option<serde_json::Value>,
    price: Option<serde_json::Value>,
    #[serde(rename = "executedQty")]
    executed_qty: Option<serde_json::Value>,
    #[serde(rename = "avgPrice")]
    avg_price: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawBalanceEntry {
    asset: Option<String>,
    currency: Option<String>,
    free: Option<serde_json::Value>,
    available: Option<serde_json::Value>,
    locked: Option<serde_json::Value>,
}

/// Maps a Binance-style order status to the shared lifecycle.
fn map_status(status: &str) -> OrderStatus {
    match status {
        "NEW" => OrderStatus::Open,
        "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
        "FILLED" => OrderStatus::Filled,
        "CANCELED" | "EXPIRED" => OrderStatus::Cancelled,
        "REJECTED" => OrderStatus::Rejected,
        "PENDING_NEW" => OrderStatus::Pending,
        _ => OrderStatus::Unknown,
    }
}

// =============================================================================
// Adapter
// =============================================================================

/// Tabdeal venue adapter.
#[derive(Debug)]
pub struct TabdealAdapter {
    http: VenueHttp,
    auth: Option<HmacSha256Auth>,
    maker_fee: Decimal,
    taker_fee: Decimal,
    retry_policy: RetryPolicy,
}

impl TabdealAdapter {
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
            http: VenueHttp::new(VenueId::Tabdeal, settings)?,
            auth,
            maker_fee: settings
                .maker_fee
                .unwrap_or_else(|| VenueId::Tabdeal.default_maker_fee()),
            taker_fee: settings
                .taker_fee
                .unwrap_or_else(|| VenueId::Tabdeal.default_taker_fee()),
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
            .ok_or_else(|| VenueError::Auth("Tabdeal: no API key configured".into()))
    }

    fn render(&self, symbol: &Symbol) -> VenueResult<String> {
        symbol
            .render(VenueId::Tabdeal)
            .map_err(|e| VenueError::InvalidSymbol(e.to_string()))
    }

    /// Adds a timestamp and signature to request parameters, Binance
    /// style: signature over the sorted query string, appended as its
    /// own parameter.
    fn signed_params(
        &self,
        mut params: BTreeMap<String, String>,
    ) -> VenueResult<Vec<(String, String)>> {
        let auth = self.auth()?;
        params.insert(
            "timestamp".to_string(),
            Utc::now().timestamp_millis().to_string(),
        );
        let canonical = HmacSha256Auth::canonical_query(&params);
        let signature = auth.sign(&canonical)?;
        let mut pairs: Vec<(String, String)> = params.into_iter().collect();
        pairs.push(("signature".to_string(), signature));
        Ok(pairs)
    }

    fn order_from_raw(raw: &RawOrder, fallback_symbol: &Symbol) -> Order {
        let symbol = raw
            .symbol
            .as_deref()
            .and_then(|s| Symbol::parse(s).ok())
            .unwrap_or_else(|| fallback_symbol.clone());
        let side = match raw.side.as_deref().map(str::to_ascii_uppercase).as_deref() {
            Some("SELL") => Side::Sell,
            _ => Side::Buy,
        };
        let order_type = match raw.order_type.as_deref().map(str::to_ascii_uppercase).as_deref() {
            Some("MARKET") => OrderType::Market,
            _ => OrderType::Limit,
        };
        let now = Utc::now();
        let mut order = Order::pending(
            VenueId::Tabdeal,
            symbol,
            side,
            order_type,
            raw.orig_qty
                .as_ref()
                .or(raw.quantity.as_ref())
                .and_then(decimal_from_value)
                .unwrap_or(Decimal::ZERO),
            raw.price.as_ref().and_then(decimal_from_value),
            now,
        );
        order.venue_order_id = raw
            .order_id
            .as_ref()
            .filter(|v| !v.is_null())
            .map(|v| v.to_string().trim_matches('"').to_string());
        order.status = raw
            .status
            .as_deref()
            .map_or(OrderStatus::Pending, map_status);
        order.filled_quantity = raw
            .executed_qty
            .as_ref()
            .and_then(decimal_from_value)
            .unwrap_or(Decimal::ZERO);
        order.avg_fill_price = raw
            .avg_price
            .as_ref()
            .and_then(decimal_from_value)
            .filter(|p| *p > Decimal::ZERO);
        order
    }
}

#[async_trait]
impl VenueAdapter for TabdealAdapter {
    fn venue(&self) -> VenueId {
        VenueId::Tabdeal
    }

    async fn fetch_orderbook(
        &self,
        symbol: &Symbol,
        depth: usize,
    ) -> VenueResult<OrderBookSnapshot> {
        let rendered = self.render(symbol)?;
        let depth = depth.clamp(1, VenueId::Tabdeal.max_book_depth());

        let http = &self.http;
        let rendered_ref: &str = &rendered;
        let limit_param = depth.to_string();
        let limit_ref: &str = &limit_param;
        let raw: RawDepth =
            retry(&self.retry_policy, "tabdeal.orderbook", move || async move {
                http.acquire().await;
                debug!(venue = "Tabdeal", symbol = rendered_ref, "fetching orderbook");
                let response = http
                    .client()
                    .get(http.url("/api/v1/depth"))
                    .query(&[("symbol", rendered_ref), ("limit", limit_ref)])
                    .send()
                    .await?;
                http.handle_json(response).await
            })
            .await?;

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
                "Tabdeal returned an empty book for {rendered}"
            )));
        }

        OrderBookSnapshot::new(
            VenueId::Tabdeal,
            symbol.clone(),
            bids.into_iter().take(depth).collect(),
            asks.into_iter().take(depth).collect(),
            Utc::now(),
        )
        .map_err(|e| VenueError::Serialization(format!("Tabdeal book invariant: {e}")))
    }

    async fn place_order(&self, request: &PlaceOrderRequest) -> VenueResult<Order> {
        request.validate()?;
        let rendered = self.render(&request.symbol)?;

        let mut params = BTreeMap::new();
        params.insert("symbol".to_string(), rendered);
        params.insert(
            "side".to_string(),
            request.side.as_str().to_ascii_uppercase(),
        );
        params.insert(
            "type".to_string(),
            request.order_type.to_string().to_ascii_uppercase(),
        );
        params.insert("quantity".to_string(), decimal_str(request.quantity));
        if let Some(price) = request.price {
            params.insert("price".to_string(), decimal_str(price));
            params.insert("timeInForce".to_string(), "GTC".to_string());
        }
        // Tabdeal has no post-only flag; maker requests are downgraded
        // by the executor before they reach this adapter.
        let pairs = self.signed_params(params)?;
        let auth = self.auth()?;

        self.http.acquire().await;
        let response = self
            .http
            .client()
            .post(self.http.url("/api/v1/orders"))
            .header("X-MBX-APIKEY", auth.api_key())
            .form(&pairs)
            .send()
            .await?;
        let raw: RawOrder = self.http.handle_json(response).await?;
        let mut order = Self::order_from_raw(&raw, &request.symbol);
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
        let pairs = self.signed_params(params)?;
        let auth = self.auth()?;

        self.http.acquire().await;
        let response = self
            .http
            .client()
            .delete(self.http.url(&format!("/api/v1/orders/{order_id}")))
            .query(&pairs)
            .header("X-MBX-APIKEY", auth.api_key())
            .send()
            .await?;
        if response.status().as_u16() == 404 {
            return Ok(true);
        }
        if response.status().is_success() {
            return Ok(true);
        }
        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        Err(VenueError::api(status, text))
    }

    async fn get_order(&self, order_id: &str, symbol: Option<&Symbol>) -> VenueResult<Order> {
        let mut params = BTreeMap::new();
        if let Some(s) = symbol {
            params.insert("symbol".to_string(), self.render(s)?);
        }
        let pairs = self.signed_params(params)?;
        let auth = self.auth()?;

        self.http.acquire().await;
        let response = self
            .http
            .client()
            .get(self.http.url(&format!("/api/v1/orders/{order_id}")))
            .query(&pairs)
            .header("X-MBX-APIKEY", auth.api_key())
            .send()
            .await?;
        if response.status().as_u16() == 404 {
            return Err(VenueError::order_not_found(order_id));
        }
        let raw: RawOrder = self.http.handle_json(response).await?;
        let fallback = resolve_symbol(symbol, raw.symbol.as_deref())?;
        Ok(Self::order_from_raw(&raw, &fallback))
    }

    async fn get_open_orders(&self, symbol: Option<&Symbol>) -> VenueResult<Vec<Order>> {
        let mut params = BTreeMap::new();
        if let Some(s) = symbol {
            params.insert("symbol".to_string(), self.render(s)?);
        }
        let pairs = self.signed_params(params)?;
        let auth = self.auth()?;

        self.http.acquire().await;
        // Binance-convention endpoint; Tabdeal mirrors Binance paths.
        let response = self
            .http
            .client()
            .get(self.http.url("/api/v1/openOrders"))
            .query(&pairs)
            .header("X-MBX-APIKEY", auth.api_key())
            .send()
            .await?;
        let raw: Vec<RawOrder> = self.http.handle_json(response).await?;
        Ok(raw
            .iter()
            .filter_map(|o| {
                let fallback = resolve_symbol(symbol, o.symbol.as_deref()).ok()?;
                Some(Self::order_from_raw(o, &fallback))
            })
            .collect())
    }

    async fn get_balance(&self, currency: &str) -> VenueResult<Balance> {
        let pairs = self.signed_params(BTreeMap::new())?;
        let auth = self.auth()?;

        self.http.acquire().await;
        let response = self
            .http
            .client()
            .get(self.http.url("/api/v1/account/balances"))
            .query(&pairs)
            .header("X-MBX-APIKEY", auth.api_key())
            .send()
            .await?;
        let raw: Vec<RawBalanceEntry> = self.http.handle_json(response).await?;

        let wanted = currency.to_ascii_uppercase();
        for entry in &raw {
            let name = entry
                .asset
                .as_deref()
                .or(entry.currency.as_deref())
                .unwrap_or("")
                .to_ascii_uppercase();
            if name == wanted {
                return Ok(Balance {
                    currency: wanted,
                    available: entry
                        .free
                        .as_ref()
                        .or(entry.available.as_ref())
                        .and_then(decimal_from_value)
                        .unwrap_or(Decimal::ZERO),
                    locked: entry
                        .locked
                        .as_ref()
                        .and_then(decimal_from_value)
                        .unwrap_or(Decimal::ZERO),
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
    use spot_arb_core::Credentials;

    #[test]
    fn test_status_map() {
        assert_eq!(map_status("NEW"), OrderStatus::Open);
        assert_eq!(map_status("PARTIALLY_FILLED"), OrderStatus::PartiallyFilled);
        assert_eq!(map_status("FILLED"), OrderStatus::Filled);
        assert_eq!(map_status("CANCELED"), OrderStatus::Cancelled);
        assert_eq!(map_status("EXPIRED"), OrderStatus::Cancelled);
        assert_eq!(map_status("PENDING_NEW"), OrderStatus::Pending);
    }

    #[test]
    fn test_signed_params_include_timestamp_and_signature() {
        let settings = ExchangeSettings {
            credentials: Credentials {
                api_key: Some("key".into()),
                api_secret: Some("secret".into()),
                ..Default::default()
            },
            ..ExchangeSettings::default()
        };
        let adapter = TabdealAdapter::new(&settings).unwrap();
        let mut params = BTreeMap::new();
        params.insert("symbol".to_string(), "BTCIRT".to_string());
        let pairs = adapter.signed_params(params).unwrap();

        assert!(pairs.iter().any(|(k, _)| k == "timestamp"));
        let (last_key, last_value) = pairs.last().unwrap();
        assert_eq!(last_key, "signature");
        assert_eq!(last_value.len(), 64);
    }

    #[test]
    fn test_order_from_raw_binance_fields() {
        let symbol = Symbol::parse("BTCIRT").unwrap();
        let raw: RawOrder = serde_json::from_value(serde_json::json!({
            "orderId": 314159,
            "symbol": "BTCIRT",
            "side": "BUY",
            "type": "LIMIT",
            "status": "FILLED",
            "origQty": "0.1",
            "price": "4000000000",
            "executedQty": "0.1",
            "avgPrice": "3999999999",
        }))
        .unwrap();
        let order = TabdealAdapter::order_from_raw(&raw, &symbol);
        assert_eq!(order.venue_order_id.as_deref(), Some("314159"));
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.quantity, dec!(0.1));
        assert_eq!(order.avg_fill_price, Some(dec!(3999999999)));
    }

    #[test]
    fn test_zero_avg_price_treated_as_unknown() {
        let symbol = Symbol::parse("BTCIRT").unwrap();
        let raw: RawOrder = serde_json::from_value(serde_json::json!({
            "orderId": 1,
            "status": "NEW",
            "avgPrice": "0",
        }))
        .unwrap();
        let order = TabdealAdapter::order_from_raw(&raw, &symbol);
        assert_eq!(order.avg_fill_price, None);
    }
}
