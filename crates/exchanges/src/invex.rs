//! Invex adapter.
//!
//! Invex lists IRR and USDT markets with underscore symbols (`BTC_IRR`)
//! and signs requests with RSA-PSS over the canonical JSON payload. The
//! payload carries an `expire_at` local-time timestamp; the signature is
//! injected into the transmitted body (or query, for GETs) as a new
//! `signature` key. The API key travels in `X-API-Key-Invex`.
//!
//! The balance endpoint is known to return 404 in practice; callers must
//! not treat a single balance failure as a connectivity signal.

use crate::adapter::{decimal_str, PlaceOrderRequest, VenueAdapter};
use crate::auth::RsaPssAuth;
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
use tracing::debug;

/// Depth values the venue accepts.
const VALID_DEPTHS: [usize; 3] = [5, 20, 50];

/// Signature expiry horizon.
const EXPIRE_MINUTES: i64 = 30;

// =============================================================================
// Raw API Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct RawDepthResponse {
    #[serde(default)]
    bid_orders: Vec<RawDepthEntry>,
    #[serde(default)]
    ask_orders: Vec<RawDepthEntry>,
}

#[derive(Debug, Deserialize)]
struct RawDepthEntry {
    price: serde_json::Value,
    quantity: Option<serde_json::Value>,
    amount: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawPlaceResponse {
    #[serde(rename = "orderId")]
    order_id_camel: Option<serde_json::Value>,
    order_id: Option<serde_json::Value>,
    id: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawOrderEnvelope {
    order: Option<RawOrder>,
}

#[derive(Debug, Deserialize)]
struct RawOrdersEnvelope {
    #[serde(default)]
    orders: Vec<RawOrder>,
}

#[derive(Debug, Deserialize)]
struct RawOrder {
    order_id: Option<serde_json::Value>,
    symbol: Option<String>,
    side: Option<String>,
    #[serde(rename = "type")]
    order_type: Option<String>,
    status: Option<String>,
    quantity: Option<serde_json::Value>,
    price: Option<serde_json::Value>,
    deal_quantity: Option<serde_json::Value>,
    deal_price: Option<serde_json::Value>,
    fee: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawAccount {
    currency: Option<String>,
    available: Option<serde_json::Value>,
    blocked: Option<serde_json::Value>,
}

/// Maps an Invex order status to the shared lifecycle.
fn map_status(status: &str) -> OrderStatus {
    match status {
        "NOT_FILLED" => OrderStatus::Open,
        "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
        "FULL_FILLED" => OrderStatus::Filled,
        "CANCELED_BY_USER" | "CANCELED_BY_MATCH_ENGINE" => OrderStatus::Cancelled,
        "REJECTED" => OrderStatus::Rejected,
        _ => OrderStatus::Unknown,
    }
}

/// Clamps a requested depth to the nearest venue-supported value, never
/// below the request when a larger supported value exists.
fn clamp_depth(requested: usize) -> usize {
    for valid in VALID_DEPTHS {
        if valid >= requested {
            return valid;
        }
    }
    *VALID_DEPTHS.last().expect("non-empty depth table")
}

// =============================================================================
// Adapter
// =============================================================================

/// Invex venue adapter.
#[derive(Debug)]
pub struct InvexAdapter {
    http: VenueHttp,
    auth: Option<RsaPssAuth>,
    maker_fee: Decimal,
    taker_fee: Decimal,
    retry_policy: RetryPolicy,
}

impl InvexAdapter {
    /// Creates the adapter from per-venue settings. The API secret is a
    /// hex-encoded DER private key.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built or the
    /// private key does not decode.
    pub fn new(settings: &ExchangeSettings) -> VenueResult<Self> {
        let creds = &settings.credentials;
        let auth = match (&creds.api_key, &creds.api_secret) {
            (Some(key), Some(secret)) if !key.is_empty() && !secret.is_empty() => {
                Some(RsaPssAuth::from_hex_der(key.clone(), secret)?)
            }
            _ => None,
        };
        Ok(Self {
            http: VenueHttp::new(VenueId::Invex, settings)?,
            auth,
            maker_fee: settings
                .maker_fee
                .unwrap_or_else(|| VenueId::Invex.default_maker_fee()),
            taker_fee: settings
                .taker_fee
                .unwrap_or_else(|| VenueId::Invex.default_taker_fee()),
            retry_policy: RetryPolicy::default(),
        })
    }

    /// Replaces the retry policy. Used by tests.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    fn auth(&self) -> VenueResult<&RsaPssAuth> {
        self.auth
            .as_ref()
            .ok_or_else(|| VenueError::Auth("Invex: no API key/secret configured".into()))
    }

    fn render(&self, symbol: &Symbol) -> VenueResult<String> {
        symbol
            .render(VenueId::Invex)
            .map_err(|e| VenueError::InvalidSymbol(e.to_string()))
    }

    /// Signs `fields` and returns them as query parameters (GET/DELETE
    /// endpoints take the signed payload in the query string).
    fn signed_params(
        &self,
        mut fields: serde_json::Map<String, serde_json::Value>,
    ) -> VenueResult<Vec<(String, String)>> {
        let auth = self.auth()?;
        fields.insert(
            "expire_at".to_string(),
            serde_json::Value::String(RsaPssAuth::make_expire_at(EXPIRE_MINUTES)),
        );
        let augmented = auth.sign_payload(fields)?;
        Ok(augmented
            .into_iter()
            .map(|(k, v)| {
                let value = match v {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                (k, value)
            })
            .collect())
    }

    fn order_from_raw(raw: &RawOrder, fallback_symbol: &Symbol) -> Order {
        let symbol = raw
            .symbol
            .as_deref()
            .and_then(|s| Symbol::parse(s).ok())
            .unwrap_or_else(|| fallback_symbol.clone());
        let side = match raw.side.as_deref() {
            Some("SELLER") => Side::Sell,
            _ => Side::Buy,
        };
        let order_type = match raw.order_type.as_deref() {
            Some(t) if t.starts_with("MARKET") => OrderType::Market,
            _ => OrderType::Limit,
        };
        let now = Utc::now();
        let mut order = Order::pending(
            VenueId::Invex,
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
            .filter(|v| !v.is_null())
            .map(|v| v.to_string().trim_matches('"').to_string());
        order.status = raw
            .status
            .as_deref()
            .map_or(OrderStatus::Pending, map_status);
        order.filled_quantity = raw
            .deal_quantity
            .as_ref()
            .and_then(decimal_from_value)
            .unwrap_or(Decimal::ZERO);
        order.avg_fill_price = raw.deal_price.as_ref().and_then(decimal_from_value);
        order.fee = raw.fee.as_ref().and_then(decimal_from_value);
        order
    }
}

#[async_trait]
impl VenueAdapter for InvexAdapter {
    fn venue(&self) -> VenueId {
        VenueId::Invex
    }

    async fn fetch_orderbook(
        &self,
        symbol: &Symbol,
        depth: usize,
    ) -> VenueResult<OrderBookSnapshot> {
        let rendered = self.render(symbol)?;
        let depth = depth.max(1);
        let venue_depth = clamp_depth(depth);

        let http = &self.http;
        let rendered_ref: &str = &rendered;
        let depth_param = venue_depth.to_string();
        let depth_ref: &str = &depth_param;
        let raw: RawDepthResponse =
            retry(&self.retry_policy, "invex.orderbook", move || async move {
                http.acquire().await;
                debug!(venue = "Invex", symbol = rendered_ref, depth = depth_ref, "fetching orderbook");
                let response = http
                    .client()
                    .get(http.url("/market-depth"))
                    .query(&[("symbol", rendered_ref), ("depth", depth_ref)])
                    .send()
                    .await?;
                http.handle_json(response).await
            })
            .await?;

        let to_levels = |entries: &[RawDepthEntry]| -> Vec<BookLevel> {
            entries
                .iter()
                .filter_map(|e| {
                    let qty = e.quantity.as_ref().or(e.amount.as_ref())?;
                    Some(BookLevel::new(
                        decimal_from_value(&e.price)?,
                        decimal_from_value(qty)?,
                    ))
                })
                .collect()
        };
        let bids = normalize_levels(to_levels(&raw.bid_orders), true);
        let asks = normalize_levels(to_levels(&raw.ask_orders), false);
        if bids.is_empty() && asks.is_empty() {
            return Err(VenueError::InvalidSymbol(format!(
                "Invex returned an empty book for {rendered}"
            )));
        }

        OrderBookSnapshot::new(
            VenueId::Invex,
            symbol.clone(),
            bids.into_iter().take(depth).collect(),
            asks.into_iter().take(depth).collect(),
            Utc::now(),
        )
        .map_err(|e| VenueError::Serialization(format!("Invex book invariant: {e}")))
    }

    async fn place_order(&self, request: &PlaceOrderRequest) -> VenueResult<Order> {
        request.validate()?;
        let auth = self.auth()?;
        let rendered = self.render(&request.symbol)?;

        let mut fields = serde_json::Map::new();
        fields.insert("symbol".into(), rendered.into());
        fields.insert(
            "side".into(),
            match request.side {
                Side::Buy => "BUYER",
                Side::Sell => "SELLER",
            }
            .into(),
        );
        fields.insert(
            "type".into(),
            match request.order_type {
                OrderType::Limit => "LIMIT",
                OrderType::Market => "MARKET_BY_AMOUNT",
            }
            .into(),
        );
        fields.insert("quantity".into(), decimal_str(request.quantity).into());
        if let Some(price) = request.price {
            fields.insert("price".into(), decimal_str(price).into());
        }
        // Invex has no post-only flag; maker requests are downgraded by
        // the executor before they reach this adapter.
        fields.insert(
            "expire_at".into(),
            RsaPssAuth::make_expire_at(EXPIRE_MINUTES).into(),
        );
        let body = auth.sign_payload(fields)?;

        self.http.acquire().await;
        let response = self
            .http
            .client()
            .post(self.http.url("/orders"))
            .header("X-API-Key-Invex", auth.api_key())
            .json(&serde_json::Value::Object(body))
            .send()
            .await?;
        let raw: RawPlaceResponse = self.http.handle_json(response).await?;

        let order_id = raw
            .order_id_camel
            .or(raw.order_id)
            .or(raw.id)
            .filter(|v| !v.is_null())
            .map(|v| v.to_string().trim_matches('"').to_string())
            .ok_or_else(|| VenueError::OrderRejected("Invex returned no order id".into()))?;

        let now = Utc::now();
        let mut order = Order::pending(
            VenueId::Invex,
            request.symbol.clone(),
            request.side,
            request.order_type,
            request.quantity,
            request.price,
            now,
        );
        order.venue_order_id = Some(order_id);
        Ok(order)
    }

    async fn cancel_order(&self, order_id: &str, symbol: Option<&Symbol>) -> VenueResult<bool> {
        let auth = self.auth()?;
        let mut fields = serde_json::Map::new();
        if let Some(s) = symbol {
            fields.insert("symbol".into(), self.render(s)?.into());
        }
        fields.insert(
            "expire_at".into(),
            RsaPssAuth::make_expire_at(EXPIRE_MINUTES).into(),
        );
        let body = auth.sign_payload(fields)?;

        self.http.acquire().await;
        let response = self
            .http
            .client()
            .delete(self.http.url(&format!("/orders/{order_id}")))
            .header("X-API-Key-Invex", auth.api_key())
            .json(&serde_json::Value::Object(body))
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
        let mut fields = serde_json::Map::new();
        fields.insert("order_id".into(), order_id.into());
        let params = self.signed_params(fields)?;
        let auth = self.auth()?;

        self.http.acquire().await;
        let response = self
            .http
            .client()
            .get(self.http.url("/order"))
            .query(&params)
            .header("X-API-Key-Invex", auth.api_key())
            .send()
            .await?;
        if response.status().as_u16() == 404 {
            return Err(VenueError::order_not_found(order_id));
        }
        let raw: RawOrderEnvelope = self.http.handle_json(response).await?;
        let raw_order = raw
            .order
            .ok_or_else(|| VenueError::order_not_found(order_id))?;
        let fallback = resolve_symbol(symbol, raw_order.symbol.as_deref())?;
        Ok(Self::order_from_raw(&raw_order, &fallback))
    }

    async fn get_open_orders(&self, symbol: Option<&Symbol>) -> VenueResult<Vec<Order>> {
        let mut fields = serde_json::Map::new();
        fields.insert("status".into(), "NOT_FILLED".into());
        fields.insert("page".into(), 1.into());
        fields.insert("page_size".into(), 100.into());
        if let Some(s) = symbol {
            fields.insert("symbol".into(), self.render(s)?.into());
        }
        let params = self.signed_params(fields)?;
        let auth = self.auth()?;

        self.http.acquire().await;
        let response = self
            .http
            .client()
            .get(self.http.url("/orders"))
            .query(&params)
            .header("X-API-Key-Invex", auth.api_key())
            .send()
            .await?;
        let raw: RawOrdersEnvelope = self.http.handle_json(response).await?;
        Ok(raw
            .orders
            .iter()
            .filter_map(|o| {
                let fallback = resolve_symbol(symbol, o.symbol.as_deref()).ok()?;
                Some(Self::order_from_raw(o, &fallback))
            })
            .collect())
    }

    async fn get_balance(&self, currency: &str) -> VenueResult<Balance> {
        let mut fields = serde_json::Map::new();
        fields.insert("currency".into(), currency.to_ascii_uppercase().into());
        let params = self.signed_params(fields)?;
        let auth = self.auth()?;

        self.http.acquire().await;
        let response = self
            .http
            .client()
            .get(self.http.url("/accounts"))
            .query(&params)
            .header("X-API-Key-Invex", auth.api_key())
            .send()
            .await?;
        let raw: RawAccount = self.http.handle_json(response).await?;
        Ok(Balance {
            currency: raw
                .currency
                .map(|c| c.to_ascii_uppercase())
                .unwrap_or_else(|| currency.to_ascii_uppercase()),
            available: raw
                .available
                .as_ref()
                .and_then(decimal_from_value)
                .unwrap_or(Decimal::ZERO),
            locked: raw
                .blocked
                .as_ref()
                .and_then(decimal_from_value)
                .unwrap_or(Decimal::ZERO),
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
    fn test_depth_clamping() {
        assert_eq!(clamp_depth(1), 5);
        assert_eq!(clamp_depth(5), 5);
        assert_eq!(clamp_depth(6), 20);
        assert_eq!(clamp_depth(20), 20);
        assert_eq!(clamp_depth(21), 50);
        assert_eq!(clamp_depth(500), 50);
    }

    #[test]
    fn test_status_map() {
        assert_eq!(map_status("NOT_FILLED"), OrderStatus::Open);
        assert_eq!(map_status("PARTIALLY_FILLED"), OrderStatus::PartiallyFilled);
        assert_eq!(map_status("FULL_FILLED"), OrderStatus::Filled);
        assert_eq!(map_status("CANCELED_BY_USER"), OrderStatus::Cancelled);
        assert_eq!(map_status("CANCELED_BY_MATCH_ENGINE"), OrderStatus::Cancelled);
        assert_eq!(map_status("nonsense"), OrderStatus::Unknown);
    }

    #[test]
    fn test_read_only_without_credentials() {
        let adapter = InvexAdapter::new(&ExchangeSettings::default()).unwrap();
        assert!(!adapter.is_authenticated());
        assert!(adapter.auth().is_err());
    }

    #[test]
    fn test_bad_secret_rejected_at_construction() {
        let settings = ExchangeSettings {
            credentials: spot_arb_core::Credentials {
                api_key: Some("key".into()),
                api_secret: Some("zz-not-hex".into()),
                ..Default::default()
            },
            ..ExchangeSettings::default()
        };
        assert!(matches!(
            InvexAdapter::new(&settings),
            Err(VenueError::Signing(_))
        ));
    }

    #[test]
    fn test_order_from_raw_seller_side() {
        let symbol = Symbol::parse("BTCIRR").unwrap();
        let raw: RawOrder = serde_json::from_value(serde_json::json!({
            "order_id": 5150,
            "symbol": "BTC_IRR",
            "side": "SELLER",
            "type": "LIMIT",
            "status": "FULL_FILLED",
            "quantity": "0.25",
            "price": "4200000000",
            "deal_quantity": "0.25",
            "deal_price": "4200000000",
        }))
        .unwrap();
        let order = InvexAdapter::order_from_raw(&raw, &symbol);
        assert_eq!(order.venue_order_id.as_deref(), Some("5150"));
        assert_eq!(order.side, Side::Sell);
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.filled_quantity, dec!(0.25));
        assert!(order.is_terminal());
        // Symbol parsed from the venue's underscore form, quote canonical.
        assert_eq!(order.symbol.quote_currency(), "IRT");
    }
}
