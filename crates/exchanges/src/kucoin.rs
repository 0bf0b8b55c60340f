//! KuCoin adapter.
//!
//! KuCoin lists USDT markets with hyphenated symbols (`BTC-USDT`) and
//! authenticates with the KC-API header set: a base64 HMAC-SHA256 over
//! `timestamp + method + path + body` plus a signed passphrase. It is
//! the only venue in the registry that honours `postOnly`.

use crate::adapter::{decimal_str, PlaceOrderRequest, VenueAdapter};
use crate::auth::PassphraseHmacAuth;
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
struct RawEnvelope<T> {
    code: Option<String>,
    msg: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct RawDepth {
    #[serde(default)]
    bids: Vec<Vec<serde_json::Value>>,
    #[serde(default)]
    asks: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct RawPlaceData {
    #[serde(rename = "orderId")]
    order_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawOrderData {
    id: Option<String>,
    symbol: Option<String>,
    side: Option<String>,
    #[serde(rename = "type")]
    order_type: Option<String>,
    size: Option<serde_json::Value>,
    price: Option<serde_json::Value>,
    #[serde(rename = "dealSize")]
    deal_size: Option<serde_json::Value>,
    #[serde(rename = "dealFunds")]
    deal_funds: Option<serde_json::Value>,
    fee: Option<serde_json::Value>,
    #[serde(rename = "isActive")]
    is_active: Option<bool>,
    #[serde(rename = "cancelExist")]
    cancel_exist: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct RawOrderPage {
    #[serde(default)]
    items: Vec<RawOrderData>,
}

#[derive(Debug, Deserialize)]
struct RawAccount {
    currency: Option<String>,
    #[serde(rename = "type")]
    account_type: Option<String>,
    available: Option<serde_json::Value>,
    holds: Option<serde_json::Value>,
}

/// Derives the shared lifecycle from KuCoin's `isActive`/`cancelExist`
/// flags and fill sizes.
fn derive_status(
    is_active: Option<bool>,
    cancel_exist: Option<bool>,
    size: Decimal,
    deal_size: Decimal,
) -> OrderStatus {
    match is_active {
        Some(true) => {
            if deal_size > Decimal::ZERO {
                OrderStatus::PartiallyFilled
            } else {
                OrderStatus::Open
            }
        }
        Some(false) => {
            if cancel_exist == Some(true) {
                OrderStatus::Cancelled
            } else if size > Decimal::ZERO && deal_size >= size {
                OrderStatus::Filled
            } else if deal_size > Decimal::ZERO {
                // Done with a partial fill and no cancel flag: treat as
                // filled for what executed.
                OrderStatus::Filled
            } else {
                OrderStatus::Cancelled
            }
        }
        None => OrderStatus::Unknown,
    }
}

// =============================================================================
// Adapter
// =============================================================================

/// KuCoin venue adapter.
#[derive(Debug)]
pub struct KucoinAdapter {
    http: VenueHttp,
    auth: Option<PassphraseHmacAuth>,
    maker_fee: Decimal,
    taker_fee: Decimal,
    retry_policy: RetryPolicy,
}

impl KucoinAdapter {
    /// Creates the adapter from per-venue settings. Authentication needs
    /// key, secret, and passphrase.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(settings: &ExchangeSettings) -> VenueResult<Self> {
        let creds = &settings.credentials;
        let auth = match (&creds.api_key, &creds.api_secret, &creds.passphrase) {
            (Some(key), Some(secret), Some(phrase))
                if !key.is_empty() && !secret.is_empty() && !phrase.is_empty() =>
            {
                Some(PassphraseHmacAuth::new(
                    key.clone(),
                    secret.clone(),
                    phrase.clone(),
                ))
            }
            _ => None,
        };
        Ok(Self {
            http: VenueHttp::new(VenueId::Kucoin, settings)?,
            auth,
            maker_fee: settings
                .maker_fee
                .unwrap_or_else(|| VenueId::Kucoin.default_maker_fee()),
            taker_fee: settings
                .taker_fee
                .unwrap_or_else(|| VenueId::Kucoin.default_taker_fee()),
            retry_policy: RetryPolicy::default(),
        })
    }

    /// Replaces the retry policy. Used by tests.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    fn auth(&self) -> VenueResult<&PassphraseHmacAuth> {
        self.auth
            .as_ref()
            .ok_or_else(|| VenueError::Auth("KuCoin: no credentials configured".into()))
    }

    fn render(&self, symbol: &Symbol) -> VenueResult<String> {
        symbol
            .render(VenueId::Kucoin)
            .map_err(|e| VenueError::InvalidSymbol(e.to_string()))
    }

    fn unwrap_envelope<T>(raw: RawEnvelope<T>) -> VenueResult<T> {
        match raw.code.as_deref() {
            Some("200000") | None => raw
                .data
                .ok_or_else(|| VenueError::Serialization("KuCoin envelope without data".into())),
            Some(code) => Err(VenueError::api(
                200,
                format!(
                    "KuCoin code {code}: {}",
                    raw.msg.as_deref().unwrap_or("no message")
                ),
            )),
        }
    }

    /// Applies the KC-API header set to a request.
    fn apply_headers(
        &self,
        builder: reqwest::RequestBuilder,
        method: &str,
        path: &str,
        body: &str,
    ) -> VenueResult<reqwest::RequestBuilder> {
        let headers = self.auth()?.sign(method, path, body)?;
        Ok(builder
            .header("KC-API-KEY", headers.api_key)
            .header("KC-API-SIGN", headers.signature)
            .header("KC-API-TIMESTAMP", headers.timestamp)
            .header("KC-API-PASSPHRASE", headers.passphrase)
            .header("KC-API-KEY-VERSION", "2"))
    }

    fn order_from_raw(raw: &RawOrderData, fallback_symbol: &Symbol) -> Order {
        let symbol = raw
            .symbol
            .as_deref()
            .and_then(|s| Symbol::parse(s).ok())
            .unwrap_or_else(|| fallback_symbol.clone());
        let side = match raw.side.as_deref() {
            Some("sell") => Side::Sell,
            _ => Side::Buy,
        };
        let order_type = match raw.order_type.as_deref() {
            Some("market") => OrderType::Market,
            _ => OrderType::Limit,
        };
        let size = raw
            .size
            .as_ref()
            .and_then(decimal_from_value)
            .unwrap_or(Decimal::ZERO);
        let deal_size = raw
            .deal_size
            .as_ref()
            .and_then(decimal_from_value)
            .unwrap_or(Decimal::ZERO);
        let now = Utc::now();
        let mut order = Order::pending(
            VenueId::Kucoin,
            symbol,
            side,
            order_type,
            size,
            raw.price.as_ref().and_then(decimal_from_value),
            now,
        );
        order.venue_order_id = raw.id.clone();
        order.status = derive_status(raw.is_active, raw.cancel_exist, size, deal_size);
        order.filled_quantity = deal_size;
        // KuCoin reports cumulative funds; average price is funds / size.
        order.avg_fill_price = raw
            .deal_funds
            .as_ref()
            .and_then(decimal_from_value)
            .filter(|f| *f > Decimal::ZERO && deal_size > Decimal::ZERO)
            .map(|funds| funds / deal_size);
        order.fee = raw.fee.as_ref().and_then(decimal_from_value);
        order
    }
}

#[async_trait]
impl VenueAdapter for KucoinAdapter {
    fn venue(&self) -> VenueId {
        VenueId::Kucoin
    }

    async fn fetch_orderbook(
        &self,
        symbol: &Symbol,
        depth: usize,
    ) -> VenueResult<OrderBookSnapshot> {
        let rendered = self.render(symbol)?;
        // Public book endpoint comes in two sizes.
        let bucket = if depth <= 20 { 20 } else { 100 };
        let path = format!("/api/v1/market/orderbook/level2_{bucket}");
        let depth = depth.clamp(1, VenueId::Kucoin.max_book_depth());

        let http = &self.http;
        let rendered_ref: &str = &rendered;
        let path_ref: &str = &path;
        let raw: RawEnvelope<RawDepth> =
            retry(&self.retry_policy, "kucoin.orderbook", move || async move {
                http.acquire().await;
                debug!(venue = "KuCoin", symbol = rendered_ref, "fetching orderbook");
                let response = http
                    .client()
                    .get(http.url(path_ref))
                    .query(&[("symbol", rendered_ref)])
                    .send()
                    .await?;
                http.handle_json(response).await
            })
            .await?;

        let data = Self::unwrap_envelope(raw)?;
        let bids = normalize_levels(
            data.bids.iter().filter_map(|p| level_from_pair(p)).collect(),
            true,
        );
        let asks = normalize_levels(
            data.asks.iter().filter_map(|p| level_from_pair(p)).collect(),
            false,
        );
        if bids.is_empty() && asks.is_empty() {
            return Err(VenueError::InvalidSymbol(format!(
                "KuCoin returned an empty book for {rendered}"
            )));
        }

        OrderBookSnapshot::new(
            VenueId::Kucoin,
            symbol.clone(),
            bids.into_iter().take(depth).collect(),
            asks.into_iter().take(depth).collect(),
            Utc::now(),
        )
        .map_err(|e| VenueError::Serialization(format!("KuCoin book invariant: {e}")))
    }

    async fn place_order(&self, request: &PlaceOrderRequest) -> VenueResult<Order> {
        request.validate()?;
        let rendered = self.render(&request.symbol)?;

        let mut payload = serde_json::json!({
            "clientOid": uuid_like_id(),
            "symbol": rendered,
            "side": request.side.as_str(),
            "type": request.order_type.to_string(),
            "size": decimal_str(request.quantity),
        });
        if let Some(price) = request.price {
            payload["price"] = serde_json::Value::String(decimal_str(price));
        }
        if request.post_only && request.order_type == OrderType::Limit {
            payload["postOnly"] = serde_json::Value::Bool(true);
        }
        let body = payload.to_string();
        let path = "/api/v1/orders";

        self.http.acquire().await;
        let builder = self
            .http
            .client()
            .post(self.http.url(path))
            .header("Content-Type", "application/json")
            .body(body.clone());
        let builder = self.apply_headers(builder, "POST", path, &body)?;
        let response = builder.send().await?;
        let raw: RawEnvelope<RawPlaceData> = self.http.handle_json(response).await?;
        let data = Self::unwrap_envelope(raw)?;

        let order_id = data
            .order_id
            .ok_or_else(|| VenueError::OrderRejected("KuCoin returned no order id".into()))?;
        let now = Utc::now();
        let mut order = Order::pending(
            VenueId::Kucoin,
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

    async fn cancel_order(&self, order_id: &str, _symbol: Option<&Symbol>) -> VenueResult<bool> {
        let path = format!("/api/v1/orders/{order_id}");
        self.http.acquire().await;
        let builder = self.http.client().delete(self.http.url(&path));
        let builder = self.apply_headers(builder, "DELETE", &path, "")?;
        let response = builder.send().await?;
        if response.status().as_u16() == 404 {
            return Ok(true);
        }
        let raw: RawEnvelope<serde_json::Value> = self.http.handle_json(response).await?;
        match raw.code.as_deref() {
            Some("200000") | None => Ok(true),
            // Order already done or unknown to the venue: idempotent success.
            Some("400100") => Ok(true),
            Some(code) => Err(VenueError::api(
                200,
                format!("KuCoin cancel failed with code {code}"),
            )),
        }
    }

    async fn get_order(&self, order_id: &str, symbol: Option<&Symbol>) -> VenueResult<Order> {
        let path = format!("/api/v1/orders/{order_id}");
        self.http.acquire().await;
        let builder = self.http.client().get(self.http.url(&path));
        let builder = self.apply_headers(builder, "GET", &path, "")?;
        let response = builder.send().await?;
        if response.status().as_u16() == 404 {
            return Err(VenueError::order_not_found(order_id));
        }
        let raw: RawEnvelope<RawOrderData> = self.http.handle_json(response).await?;
        let data = Self::unwrap_envelope(raw)?;
        let fallback = resolve_symbol(symbol, data.symbol.as_deref())?;
        Ok(Self::order_from_raw(&data, &fallback))
    }

    async fn get_open_orders(&self, symbol: Option<&Symbol>) -> VenueResult<Vec<Order>> {
        let mut path = "/api/v1/orders?status=active".to_string();
        if let Some(s) = symbol {
            path.push_str(&format!("&symbol={}", self.render(s)?));
        }
        self.http.acquire().await;
        let builder = self.http.client().get(self.http.url(&path));
        let builder = self.apply_headers(builder, "GET", &path, "")?;
        let response = builder.send().await?;
        let raw: RawEnvelope<RawOrderPage> = self.http.handle_json(response).await?;
        let data = Self::unwrap_envelope(raw)?;
        Ok(data
            .items
            .iter()
            .filter_map(|o| {
                let fallback = resolve_symbol(symbol, o.symbol.as_deref()).ok()?;
                Some(Self::order_from_raw(o, &fallback))
            })
            .collect())
    }

    async fn get_balance(&self, currency: &str) -> VenueResult<Balance> {
        let wanted = currency.to_ascii_uppercase();
        let path = format!("/api/v1/accounts?currency={wanted}");
        self.http.acquire().await;
        let builder = self.http.client().get(self.http.url(&path));
        let builder = self.apply_headers(builder, "GET", &path, "")?;
        let response = builder.send().await?;
        let raw: RawEnvelope<Vec<RawAccount>> = self.http.handle_json(response).await?;
        let accounts = Self::unwrap_envelope(raw)?;

        // Prefer the trade account; fall back to summing whatever exists.
        let mut available = Decimal::ZERO;
        let mut locked = Decimal::ZERO;
        for account in &accounts {
            if account.currency.as_deref().map(str::to_ascii_uppercase) != Some(wanted.clone()) {
                continue;
            }
            let acct_available = account
                .available
                .as_ref()
                .and_then(decimal_from_value)
                .unwrap_or(Decimal::ZERO);
            let acct_holds = account
                .holds
                .as_ref()
                .and_then(decimal_from_value)
                .unwrap_or(Decimal::ZERO);
            if account.account_type.as_deref() == Some("trade") {
                return Ok(Balance {
                    currency: wanted,
                    available: acct_available,
                    locked: acct_holds,
                });
            }
            available += acct_available;
            locked += acct_holds;
        }
        Ok(Balance {
            currency: wanted,
            available,
            locked,
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

/// Client order id for KuCoin's mandatory `clientOid` field.
fn uuid_like_id() -> String {
    format!(
        "{:x}{:x}",
        Utc::now().timestamp_micros(),
        rand::random::<u64>()
    )
}
