//! Application configuration.
//!
//! Loaded once at startup and treated as immutable for the process
//! lifetime; constructors receive it by value or behind an `Arc`.

use crate::venue::VenueId;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

// =============================================================================
// Exchange Settings
// =============================================================================

/// Credential bundle for one venue. Any missing field the venue's auth
/// scheme needs puts the adapter in read-only mode.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    /// API key id.
    #[serde(default)]
    pub api_key: Option<String>,
    /// API secret (HMAC key or encoded private key).
    #[serde(default)]
    pub api_secret: Option<String>,
    /// Extra passphrase (KuCoin).
    #[serde(default)]
    pub passphrase: Option<String>,
    /// Pre-issued bearer token (Nobitex).
    #[serde(default)]
    pub token: Option<String>,
}

/// Per-venue configuration overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeSettings {
    /// Credentials; empty bundle means read-only.
    #[serde(default)]
    pub credentials: Credentials,
    /// Maker fee override; venue default when absent.
    #[serde(default)]
    pub maker_fee: Option<Decimal>,
    /// Taker fee override; venue default when absent.
    #[serde(default)]
    pub taker_fee: Option<Decimal>,
    /// Base endpoint override; venue default when absent.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Requests per minute allowed against the venue.
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            credentials: Credentials::default(),
            maker_fee: None,
            taker_fee: None,
            endpoint: None,
            timeout_secs: default_timeout_secs(),
            requests_per_minute: default_requests_per_minute(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_requests_per_minute() -> u32 {
    60
}

// =============================================================================
// Trading Configuration
// =============================================================================

/// Thresholds and limits for detection and risk gating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    /// Minimum gross spread, in percent, for an opportunity.
    pub min_spread_percent: Decimal,
    /// Minimum net profit, in the reference currency.
    pub min_profit_reference: Decimal,
    /// Minimum order size in base units; thinner opportunities are dropped.
    pub min_order_size: Decimal,
    /// Maximum position value per venue, in quote units.
    pub max_position_per_venue: Decimal,
    /// Maximum total position value across venues.
    pub max_total_position: Decimal,
    /// Maximum realised daily loss before trading halts.
    pub daily_loss_limit: Decimal,
    /// Worst-case loss bound per trade.
    pub per_trade_loss_limit: Decimal,
    /// Maximum drawdown fraction from peak balance (0.0 to 1.0).
    pub max_drawdown: Decimal,
    /// Maximum tolerated slippage, in percent, before a leg is abandoned.
    pub slippage_tolerance_percent: Decimal,
    /// Snapshot staleness budget in milliseconds.
    pub max_snapshot_age_ms: u64,
    /// Placement retries for transport errors.
    pub max_retries: u32,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            min_spread_percent: dec!(0.5),
            min_profit_reference: dec!(1.0),
            min_order_size: dec!(0.0001),
            max_position_per_venue: dec!(5000),
            max_total_position: dec!(10000),
            daily_loss_limit: dec!(100),
            per_trade_loss_limit: dec!(20),
            max_drawdown: dec!(0.10),
            slippage_tolerance_percent: dec!(0.5),
            max_snapshot_age_ms: 3000,
            max_retries: 3,
        }
    }
}

impl TradingConfig {
    /// Staleness budget as a chrono duration.
    #[must_use]
    pub fn max_snapshot_age(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.max_snapshot_age_ms as i64)
    }
}

// =============================================================================
// Stream Configuration
// =============================================================================

/// Price stream settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Interval between book refreshes per pair, in milliseconds.
    pub polling_interval_ms: u64,
    /// Maximum concurrent requests per venue.
    pub per_venue_concurrency: usize,
    /// Consecutive unrecoverable errors before a pair stops.
    pub max_consecutive_errors: u32,
    /// Book depth requested from venues.
    pub depth: usize,
    /// Bound on how long `stop()` waits for in-flight refreshes.
    pub stop_timeout_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            polling_interval_ms: 1000,
            per_venue_concurrency: 2,
            max_consecutive_errors: 10,
            depth: 20,
            stop_timeout_ms: 5000,
        }
    }
}

impl StreamConfig {
    /// Polling interval as a std duration.
    #[must_use]
    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval_ms)
    }
}

// =============================================================================
// Breaker Configuration
// =============================================================================

/// Circuit breaker thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Sliding window for volatility measurement, in milliseconds.
    pub volatility_window_ms: u64,
    /// Maximum price movement over the window, in percent.
    pub volatility_max_percent: Decimal,
    /// Minimum samples before volatility is evaluated.
    pub volatility_min_samples: usize,
    /// Consecutive connectivity failures before a venue is excluded.
    pub connectivity_failures_to_trip: u32,
    /// Window size (operation count) for the error-rate breaker.
    pub error_rate_window: usize,
    /// Minimum samples before the error rate is evaluated.
    pub error_rate_min_samples: usize,
    /// Maximum failure ratio over the window (0.0 to 1.0).
    pub error_rate_max: f64,
    /// Cooldown before an open breaker moves to half-open, in milliseconds.
    pub cooldown_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            volatility_window_ms: 60_000,
            volatility_max_percent: dec!(5.0),
            volatility_min_samples: 10,
            connectivity_failures_to_trip: 5,
            error_rate_window: 50,
            error_rate_min_samples: 10,
            error_rate_max: 0.5,
            cooldown_ms: 300_000,
        }
    }
}

impl BreakerConfig {
    /// Cooldown as a std duration.
    #[must_use]
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    /// Volatility window as a std duration.
    #[must_use]
    pub fn volatility_window(&self) -> Duration {
        Duration::from_millis(self.volatility_window_ms)
    }
}

// =============================================================================
// Executor Configuration
// =============================================================================

/// Order executor timings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Interval between fill polls, in milliseconds.
    pub poll_interval_ms: u64,
    /// Total execution deadline, in milliseconds.
    pub total_deadline_ms: u64,
    /// Per network call timeout, in milliseconds.
    pub net_timeout_ms: u64,
    /// Re-fetch both books and re-score before placing orders.
    pub recheck_books: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            total_deadline_ms: 120_000,
            net_timeout_ms: 10_000,
            recheck_books: true,
        }
    }
}

impl ExecutorConfig {
    /// Poll interval as a std duration.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Total deadline as a std duration.
    #[must_use]
    pub fn total_deadline(&self) -> Duration {
        Duration::from_millis(self.total_deadline_ms)
    }

    /// Network timeout as a std duration.
    #[must_use]
    pub fn net_timeout(&self) -> Duration {
        Duration::from_millis(self.net_timeout_ms)
    }
}

// =============================================================================
// Rate Table
// =============================================================================

/// One quote→reference conversion rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateEntry {
    /// Quote currency code.
    pub from: String,
    /// Reference currency code.
    pub to: String,
    /// Units of `to` per unit of `from`.
    pub rate: Decimal,
}

// =============================================================================
// App Configuration
// =============================================================================

/// Top-level configuration, aggregating every section the core consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Per-venue settings keyed by venue.
    #[serde(default)]
    pub exchanges: HashMap<VenueId, ExchangeSettings>,
    /// Canonical symbols to trade.
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,
    /// Reference currency for profit thresholds.
    #[serde(default = "default_reference_currency")]
    pub reference_currency: String,
    /// Static quote→reference conversion rates.
    #[serde(default)]
    pub rates: Vec<RateEntry>,
    /// Trading thresholds and limits.
    #[serde(default)]
    pub trading: TradingConfig,
    /// Price stream settings.
    #[serde(default)]
    pub stream: StreamConfig,
    /// Circuit breaker thresholds.
    #[serde(default)]
    pub breakers: BreakerConfig,
    /// Executor timings.
    #[serde(default)]
    pub executor: ExecutorConfig,
}

fn default_symbols() -> Vec<String> {
    vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()]
}

fn default_reference_currency() -> String {
    "USDT".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            exchanges: HashMap::new(),
            symbols: default_symbols(),
            reference_currency: default_reference_currency(),
            rates: Vec::new(),
            trading: TradingConfig::default(),
            stream: StreamConfig::default(),
            breakers: BreakerConfig::default(),
            executor: ExecutorConfig::default(),
        }
    }
}

impl AppConfig {
    /// Settings for one venue, falling back to defaults.
    #[must_use]
    pub fn exchange(&self, venue: VenueId) -> ExchangeSettings {
        self.exchanges.get(&venue).cloned().unwrap_or_default()
    }
}
