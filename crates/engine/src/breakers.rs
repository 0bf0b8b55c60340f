//! Circuit breakers guarding detection and execution.
//!
//! Three independent breakers, each a `Closed → Open → HalfOpen → Closed`
//! state machine:
//!
//! - market volatility, per canonical symbol;
//! - venue connectivity, per venue;
//! - venue error rate, per venue.
//!
//! While open, a breaker blocks its scope and cannot close or re-trip
//! before its cooldown elapses; after the cooldown one probe decides
//! between closing and reopening.

use parking_lot::RwLock;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use spot_arb_core::{BreakerConfig, Symbol, VenueId};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Breaker lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Normal operation.
    Closed,
    /// Tripped; the protected scope is blocked.
    Open,
    /// Cooldown elapsed; one probe decides.
    HalfOpen,
}

impl Default for BreakerState {
    fn default() -> Self {
        Self::Closed
    }
}

/// Resolves the effective state, promoting `Open` to `HalfOpen` once the
/// cooldown has elapsed.
fn effective_state(
    state: BreakerState,
    opened_at: Option<Instant>,
    cooldown: Duration,
) -> BreakerState {
    match (state, opened_at) {
        (BreakerState::Open, Some(at)) if at.elapsed() >= cooldown => BreakerState::HalfOpen,
        _ => state,
    }
}

// =============================================================================
// Market Volatility Breaker
// =============================================================================

#[derive(Debug, Default)]
struct SymbolWindow {
    history: VecDeque<(Instant, Decimal)>,
    state: BreakerState,
    opened_at: Option<Instant>,
}

/// Trips a symbol when the price moves too far from where it sat a
/// window ago: `|price_now − price_old| / price_old` against the
/// configured maximum, with `price_old` the oldest retained sample.
#[derive(Debug)]
pub struct VolatilityBreaker {
    window: Duration,
    max_percent: Decimal,
    min_samples: usize,
    cooldown: Duration,
    symbols: RwLock<HashMap<Symbol, SymbolWindow>>,
}

impl VolatilityBreaker {
    /// Creates the breaker from configuration.
    #[must_use]
    pub fn new(config: &BreakerConfig) -> Self {
        Self {
            window: config.volatility_window(),
            max_percent: config.volatility_max_percent,
            min_samples: config.volatility_min_samples,
            cooldown: config.cooldown(),
            symbols: RwLock::new(HashMap::new()),
        }
    }

    /// Records an observed price for a symbol, evaluating the window.
    /// In `HalfOpen`, the price acts as the probe: in-bounds closes the
    /// breaker, out-of-bounds reopens it.
    pub fn record_price(&self, symbol: &Symbol, price: Decimal) {
        if price <= Decimal::ZERO {
            return;
        }
        let now = Instant::now();
        let mut symbols = self.symbols.write();
        let window = symbols.entry(symbol.clone()).or_default();

        let previous = window.history.back().map(|(_, p)| *p);
        window.history.push_back((now, price));
        while let Some((t, _)) = window.history.front() {
            if now.duration_since(*t) > self.window {
                window.history.pop_front();
            } else {
                break;
            }
        }

        match effective_state(window.state, window.opened_at, self.cooldown) {
            BreakerState::Closed => {
                if window.history.len() < self.min_samples {
                    return;
                }
                let oldest = window.history.front().map(|(_, p)| *p).unwrap_or(price);
                if oldest <= Decimal::ZERO {
                    return;
                }
                let change_percent = (price - oldest).abs() / oldest * dec!(100);
                if change_percent > self.max_percent {
                    warn!(
                        symbol = %symbol,
                        change_percent = %change_percent,
                        max_percent = %self.max_percent,
                        "volatility breaker tripped"
                    );
                    window.state = BreakerState::Open;
                    window.opened_at = Some(now);
                }
            }
            BreakerState::Open => {
                // Within cooldown: no flapping, nothing to evaluate.
                window.state = BreakerState::Open;
            }
            BreakerState::HalfOpen => {
                let in_bounds = previous.map_or(true, |prev| {
                    prev > Decimal::ZERO
                        && ((price - prev).abs() / prev * dec!(100)) <= self.max_percent
                });
                if in_bounds {
                    info!(symbol = %symbol, "volatility breaker closed after probe");
                    window.state = BreakerState::Closed;
                    window.opened_at = None;
                    // The episode is over; keep only the probe so the
                    // stale spike cannot re-trip the fresh window.
                    window.history.clear();
                    window.history.push_back((now, price));
                } else {
                    warn!(symbol = %symbol, "volatility probe out of bounds, reopening");
                    window.state = BreakerState::Open;
                    window.opened_at = Some(now);
                }
            }
        }
    }

    /// Effective state for a symbol.
    #[must_use]
    pub fn state(&self, symbol: &Symbol) -> BreakerState {
        let symbols = self.symbols.read();
        symbols.get(symbol).map_or(BreakerState::Closed, |w| {
            effective_state(w.state, w.opened_at, self.cooldown)
        })
    }

    /// True while orders on the symbol are blocked.
    #[must_use]
    pub fn is_tripped(&self, symbol: &Symbol) -> bool {
        self.state(symbol) == BreakerState::Open
    }

    /// Clears all state.
    pub fn reset(&self) {
        self.symbols.write().clear();
    }
}

// =============================================================================
// Venue Connectivity Breaker
// =============================================================================

#[derive(Debug, Default)]
struct VenueConnectivity {
    consecutive_failures: u32,
    state: BreakerState,
    opened_at: Option<Instant>,
}

/// Excludes a venue after consecutive network or authentication
/// failures. A successful probe after the cooldown re-admits it.
#[derive(Debug)]
pub struct ConnectivityBreaker {
    failures_to_trip: u32,
    cooldown: Duration,
    venues: RwLock<HashMap<VenueId, VenueConnectivity>>,
}

impl ConnectivityBreaker {
    /// Creates the breaker from configuration.
    #[must_use]
    pub fn new(config: &BreakerConfig) -> Self {
        Self {
            failures_to_trip: config.connectivity_failures_to_trip,
            cooldown: config.cooldown(),
            venues: RwLock::new(HashMap::new()),
        }
    }

    /// Records a successful venue operation.
    pub fn record_success(&self, venue: VenueId) {
        let mut venues = self.venues.write();
        let entry = venues.entry(venue).or_default();
        match effective_state(entry.state, entry.opened_at, self.cooldown) {
            BreakerState::HalfOpen => {
                info!(venue = %venue, "connectivity breaker closed after probe");
                entry.state = BreakerState::Closed;
                entry.opened_at = None;
                entry.consecutive_failures = 0;
            }
            BreakerState::Open => {}
            BreakerState::Closed => {
                entry.state = BreakerState::Closed;
                entry.consecutive_failures = 0;
            }
        }
    }

    /// Records a connectivity failure.
    pub fn record_failure(&self, venue: VenueId) {
        let mut venues = self.venues.write();
        let entry = venues.entry(venue).or_default();
        match effective_state(entry.state, entry.opened_at, self.cooldown) {
            BreakerState::Closed => {
                entry.consecutive_failures += 1;
                if entry.consecutive_failures >= self.failures_to_trip {
                    warn!(
                        venue = %venue,
                        failures = entry.consecutive_failures,
                        "connectivity breaker tripped"
                    );
                    entry.state = BreakerState::Open;
                    entry.opened_at = Some(Instant::now());
                }
            }
            BreakerState::HalfOpen => {
                warn!(venue = %venue, "connectivity probe failed, reopening");
                entry.state = BreakerState::Open;
                entry.opened_at = Some(Instant::now());
            }
            BreakerState::Open => {
                entry.state = BreakerState::Open;
            }
        }
    }

    /// Effective state for a venue.
    #[must_use]
    pub fn state(&self, venue: VenueId) -> BreakerState {
        let venues = self.venues.read();
        venues.get(&venue).map_or(BreakerState::Closed, |e| {
            effective_state(e.state, e.opened_at, self.cooldown)
        })
    }

    /// True while the venue is excluded from detection and execution.
    #[must_use]
    pub fn is_tripped(&self, venue: VenueId) -> bool {
        self.state(venue) == BreakerState::Open
    }

    /// Clears all state.
    pub fn reset(&self) {
        self.venues.write().clear();
    }
}

// =============================================================================
// Error Rate Breaker
// =============================================================================

#[derive(Debug, Default)]
struct VenueErrorRate {
    outcomes: VecDeque<bool>,
    state: BreakerState,
    opened_at: Option<Instant>,
}

/// Trips a venue when the failure ratio over the last `K` operations
/// exceeds the configured maximum.
#[derive(Debug)]
pub struct ErrorRateBreaker {
    window: usize,
    min_samples: usize,
    max_rate: f64,
    cooldown: Duration,
    venues: RwLock<HashMap<VenueId, VenueErrorRate>>,
}

impl ErrorRateBreaker {
    /// Creates the breaker from configuration.
    #[must_use]
    pub fn new(config: &BreakerConfig) -> Self {
        Self {
            window: config.error_rate_window.max(1),
            min_samples: config.error_rate_min_samples.max(1),
            max_rate: config.error_rate_max,
            cooldown: config.cooldown(),
            venues: RwLock::new(HashMap::new()),
        }
    }

    /// Records one operation outcome.
    pub fn record(&self, venue: VenueId, success: bool) {
        let mut venues = self.venues.write();
        let entry = venues.entry(venue).or_default();

        entry.outcomes.push_back(success);
        while entry.outcomes.len() > self.window {
            entry.outcomes.pop_front();
        }

        match effective_state(entry.state, entry.opened_at, self.cooldown) {
            BreakerState::Closed => {
                if entry.outcomes.len() < self.min_samples {
                    return;
                }
                let failures = entry.outcomes.iter().filter(|ok| !**ok).count();
                let rate = failures as f64 / entry.outcomes.len() as f64;
                if rate > self.max_rate {
                    warn!(
                        venue = %venue,
                        rate = rate,
                        max_rate = self.max_rate,
                        samples = entry.outcomes.len(),
                        "error-rate breaker tripped"
                    );
                    entry.state = BreakerState::Open;
                    entry.opened_at = Some(Instant::now());
                }
            }
            BreakerState::HalfOpen => {
                if success {
                    info!(venue = %venue, "error-rate breaker closed after probe");
                    entry.state = BreakerState::Closed;
                    entry.opened_at = None;
                    entry.outcomes.clear();
                } else {
                    entry.state = BreakerState::Open;
                    entry.opened_at = Some(Instant::now());
                }
            }
            BreakerState::Open => {
                entry.state = BreakerState::Open;
            }
        }
    }

    /// Effective state for a venue.
    #[must_use]
    pub fn state(&self, venue: VenueId) -> BreakerState {
        let venues = self.venues.read();
        venues.get(&venue).map_or(BreakerState::Closed, |e| {
            effective_state(e.state, e.opened_at, self.cooldown)
        })
    }

    /// True while the venue is blocked.
    #[must_use]
    pub fn is_tripped(&self, venue: VenueId) -> bool {
        self.state(venue) == BreakerState::Open
    }

    /// Clears all state.
    pub fn reset(&self) {
        self.venues.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn fast_config() -> BreakerConfig {
        BreakerConfig {
            volatility_window_ms: 60_000,
            volatility_max_percent: dec!(5.0),
            volatility_min_samples: 3,
            connectivity_failures_to_trip: 3,
            error_rate_window: 10,
            error_rate_min_samples: 4,
            error_rate_max: 0.5,
            cooldown_ms: 40,
        }
    }

    fn btc() -> Symbol {
        Symbol::parse("BTCUSDT").unwrap()
    }

    // ==================== Volatility ====================

    #[test]
    fn test_volatility_trips_on_window_move() {
        let breaker = VolatilityBreaker::new(&fast_config());
        breaker.record_price(&btc(), dec!(65000));
        breaker.record_price(&btc(), dec!(65100));
        assert_eq!(breaker.state(&btc()), BreakerState::Closed);

        // 10% above the window's oldest sample blows through the 5% limit.
        breaker.record_price(&btc(), dec!(71500));
        assert_eq!(breaker.state(&btc()), BreakerState::Open);
        assert!(breaker.is_tripped(&btc()));
    }

    #[test]
    fn test_volatility_round_trip_stays_closed() {
        // A spike that returns to the window-old price is not a net
        // move: |now − old| / old is what trips, not the excursion.
        let breaker = VolatilityBreaker::new(&fast_config());
        breaker.record_price(&btc(), dec!(100));
        breaker.record_price(&btc(), dec!(120));
        breaker.record_price(&btc(), dec!(100));
        assert_eq!(breaker.state(&btc()), BreakerState::Closed);
        assert!(!breaker.is_tripped(&btc()));
    }

    #[test]
    fn test_volatility_needs_min_samples() {
        let breaker = VolatilityBreaker::new(&fast_config());
        breaker.record_price(&btc(), dec!(65000));
        breaker.record_price(&btc(), dec!(80000));
        // Only two samples: not evaluated yet.
        assert_eq!(breaker.state(&btc()), BreakerState::Closed);
    }

    #[test]
    fn test_volatility_half_open_probe_closes() {
        let breaker = VolatilityBreaker::new(&fast_config());
        breaker.record_price(&btc(), dec!(65000));
        breaker.record_price(&btc(), dec!(65100));
        breaker.record_price(&btc(), dec!(71500));
        assert!(breaker.is_tripped(&btc()));

        thread::sleep(Duration::from_millis(50));
        assert_eq!(breaker.state(&btc()), BreakerState::HalfOpen);
        assert!(!breaker.is_tripped(&btc()));

        // In-bounds probe closes.
        breaker.record_price(&btc(), dec!(71400));
        assert_eq!(breaker.state(&btc()), BreakerState::Closed);
    }

    #[test]
    fn test_volatility_out_of_bounds_probe_reopens() {
        let breaker = VolatilityBreaker::new(&fast_config());
        breaker.record_price(&btc(), dec!(65000));
        breaker.record_price(&btc(), dec!(65100));
        breaker.record_price(&btc(), dec!(71500));
        thread::sleep(Duration::from_millis(50));
        assert_eq!(breaker.state(&btc()), BreakerState::HalfOpen);

        breaker.record_price(&btc(), dec!(80000));
        assert_eq!(breaker.state(&btc()), BreakerState::Open);
    }

    #[test]
    fn test_volatility_no_flapping_within_cooldown() {
        let breaker = VolatilityBreaker::new(&fast_config());
        breaker.record_price(&btc(), dec!(65000));
        breaker.record_price(&btc(), dec!(65100));
        breaker.record_price(&btc(), dec!(71500));
        assert!(breaker.is_tripped(&btc()));
        // Calm prices inside the cooldown must not close it.
        breaker.record_price(&btc(), dec!(71500));
        breaker.record_price(&btc(), dec!(71501));
        assert!(breaker.is_tripped(&btc()));
    }

    #[test]
    fn test_volatility_per_symbol_isolation() {
        let breaker = VolatilityBreaker::new(&fast_config());
        let eth = Symbol::parse("ETHUSDT").unwrap();
        breaker.record_price(&btc(), dec!(65000));
        breaker.record_price(&btc(), dec!(65100));
        breaker.record_price(&btc(), dec!(71500));
        assert!(breaker.is_tripped(&btc()));
        assert!(!breaker.is_tripped(&eth));
    }

    // ==================== Connectivity ====================

    #[test]
    fn test_connectivity_trips_after_consecutive_failures() {
        let breaker = ConnectivityBreaker::new(&fast_config());
        breaker.record_failure(VenueId::Invex);
        breaker.record_failure(VenueId::Invex);
        assert!(!breaker.is_tripped(VenueId::Invex));
        breaker.record_failure(VenueId::Invex);
        assert!(breaker.is_tripped(VenueId::Invex));
    }

    #[test]
    fn test_connectivity_success_resets_count() {
        let breaker = ConnectivityBreaker::new(&fast_config());
        breaker.record_failure(VenueId::Invex);
        breaker.record_failure(VenueId::Invex);
        breaker.record_success(VenueId::Invex);
        breaker.record_failure(VenueId::Invex);
        breaker.record_failure(VenueId::Invex);
        // Still only two consecutive failures.
        assert!(!breaker.is_tripped(VenueId::Invex));
    }

    #[test]
    fn test_connectivity_probe_cycle() {
        let breaker = ConnectivityBreaker::new(&fast_config());
        for _ in 0..3 {
            breaker.record_failure(VenueId::Wallex);
        }
        assert_eq!(breaker.state(VenueId::Wallex), BreakerState::Open);

        thread::sleep(Duration::from_millis(50));
        assert_eq!(breaker.state(VenueId::Wallex), BreakerState::HalfOpen);

        breaker.record_success(VenueId::Wallex);
        assert_eq!(breaker.state(VenueId::Wallex), BreakerState::Closed);
    }

    #[test]
    fn test_connectivity_failed_probe_reopens() {
        let breaker = ConnectivityBreaker::new(&fast_config());
        for _ in 0..3 {
            breaker.record_failure(VenueId::Wallex);
        }
        thread::sleep(Duration::from_millis(50));
        assert_eq!(breaker.state(VenueId::Wallex), BreakerState::HalfOpen);
        breaker.record_failure(VenueId::Wallex);
        assert_eq!(breaker.state(VenueId::Wallex), BreakerState::Open);
    }

    // ==================== Error Rate ====================

    #[test]
    fn test_error_rate_trips_above_ratio() {
        let breaker = ErrorRateBreaker::new(&fast_config());
        breaker.record(VenueId::Kucoin, true);
        breaker.record(VenueId::Kucoin, false);
        breaker.record(VenueId::Kucoin, false);
        assert!(!breaker.is_tripped(VenueId::Kucoin)); // below min samples
        breaker.record(VenueId::Kucoin, false);
        // 3/4 failures > 50%.
        assert!(breaker.is_tripped(VenueId::Kucoin));
    }

    #[test]
    fn test_error_rate_at_threshold_not_tripped() {
        let breaker = ErrorRateBreaker::new(&fast_config());
        breaker.record(VenueId::Kucoin, true);
        breaker.record(VenueId::Kucoin, false);
        breaker.record(VenueId::Kucoin, true);
        breaker.record(VenueId::Kucoin, false);
        // Exactly 50% is not "> max".
        assert!(!breaker.is_tripped(VenueId::Kucoin));
    }

    #[test]
    fn test_error_rate_window_slides() {
        let config = BreakerConfig {
            error_rate_window: 4,
            error_rate_min_samples: 4,
            ..fast_config()
        };
        let breaker = ErrorRateBreaker::new(&config);
        // Old failures roll out of the window.
        breaker.record(VenueId::Kucoin, false);
        breaker.record(VenueId::Kucoin, false);
        for _ in 0..4 {
            breaker.record(VenueId::Kucoin, true);
        }
        assert!(!breaker.is_tripped(VenueId::Kucoin));
    }

    #[test]
    fn test_error_rate_probe_cycle() {
        let breaker = ErrorRateBreaker::new(&fast_config());
        for _ in 0..5 {
            breaker.record(VenueId::Kucoin, false);
        }
        assert!(breaker.is_tripped(VenueId::Kucoin));

        thread::sleep(Duration::from_millis(50));
        assert_eq!(breaker.state(VenueId::Kucoin), BreakerState::HalfOpen);
        breaker.record(VenueId::Kucoin, true);
        assert_eq!(breaker.state(VenueId::Kucoin), BreakerState::Closed);
    }
}
