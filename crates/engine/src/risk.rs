//! Pre-trade risk gating.
//!
//! Every order attempt passes through [`RiskEngine::pre_trade_check`],
//! which evaluates the breaker states, position and loss limits, and
//! balances serially. The first failing check aborts the attempt with a
//! machine-readable reason; the detector is not re-invoked for that
//! opportunity.

use crate::breakers::{ConnectivityBreaker, ErrorRateBreaker, VolatilityBreaker};
use crate::detector::ArbitrageOpportunity;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use spot_arb_core::{Balance, BreakerConfig, Symbol, TradingConfig, VenueId};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, warn};

/// Safety margin applied to the required balance.
const BALANCE_MARGIN: Decimal = dec!(1.05);

// =============================================================================
// Rejection Reasons
// =============================================================================

/// Why an execution attempt was rejected before any order was placed.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RejectReason {
    /// A snapshot aged past the staleness budget.
    #[error("snapshot older than the staleness budget")]
    Stale,

    /// Re-scored books no longer clear the profit threshold.
    #[error("spread collapsed below the profit threshold")]
    SpreadCollapsed,

    /// The same opportunity was already submitted.
    #[error("duplicate opportunity submission")]
    DuplicateOpportunity,

    /// Operator halted trading.
    #[error("trading halted by operator")]
    TradingHalted,

    /// Volatility breaker open for the symbol.
    #[error("volatility breaker open for {symbol}")]
    VolatilityBreaker {
        /// The protected symbol.
        symbol: Symbol,
    },

    /// Connectivity breaker open for a venue.
    #[error("connectivity breaker open for {venue}")]
    ConnectivityBreaker {
        /// The excluded venue.
        venue: VenueId,
    },

    /// Error-rate breaker open for a venue.
    #[error("error-rate breaker open for {venue}")]
    ErrorRateBreaker {
        /// The excluded venue.
        venue: VenueId,
    },

    /// Projected venue position exceeds the per-venue cap.
    #[error("position limit on {venue}: {projected} > {limit}")]
    VenuePositionLimit {
        /// The venue at its cap.
        venue: VenueId,
        /// Projected position value.
        projected: Decimal,
        /// Configured limit.
        limit: Decimal,
    },

    /// Projected total position exceeds the global cap.
    #[error("total position limit: {projected} > {limit}")]
    TotalPositionLimit {
        /// Projected total position value.
        projected: Decimal,
        /// Configured limit.
        limit: Decimal,
    },

    /// Realised daily loss plus the worst case of this trade exceeds
    /// the daily limit.
    #[error("daily loss limit: {projected_loss} > {limit}")]
    DailyLossLimit {
        /// Projected loss including this trade's worst case.
        projected_loss: Decimal,
        /// Configured limit.
        limit: Decimal,
    },

    /// Worst-case loss of this trade alone exceeds the per-trade limit.
    #[error("per-trade loss limit: {worst_case} > {limit}")]
    PerTradeLossLimit {
        /// Worst-case loss bound.
        worst_case: Decimal,
        /// Configured limit.
        limit: Decimal,
    },

    /// Drawdown from peak balance exceeds the limit.
    #[error("drawdown limit: {drawdown} > {limit}")]
    DrawdownLimit {
        /// Current drawdown fraction.
        drawdown: Decimal,
        /// Configured limit.
        limit: Decimal,
    },

    /// Known balance is insufficient for the leg.
    #[error("insufficient {currency} balance on {venue}: {available} < {required}")]
    InsufficientBalance {
        /// The venue short of funds.
        venue: VenueId,
        /// Required currency.
        currency: String,
        /// Amount required (with margin).
        required: Decimal,
        /// Amount available.
        available: Decimal,
    },

    /// No balance has ever been observed for the venue and currency.
    #[error("no known {currency} balance on {venue}")]
    BalanceUnknown {
        /// The venue with no observation.
        venue: VenueId,
        /// The missing currency.
        currency: String,
    },
}

impl RejectReason {
    /// Machine-readable reason code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Stale => "stale",
            Self::SpreadCollapsed => "spread_collapsed",
            Self::DuplicateOpportunity => "duplicate_opportunity",
            Self::TradingHalted => "trading_halted",
            Self::VolatilityBreaker { .. } => "volatility_breaker",
            Self::ConnectivityBreaker { .. } => "connectivity_breaker",
            Self::ErrorRateBreaker { .. } => "error_rate_breaker",
            Self::VenuePositionLimit { .. } => "venue_position_limit",
            Self::TotalPositionLimit { .. } => "total_position_limit",
            Self::DailyLossLimit { .. } => "daily_loss_limit",
            Self::PerTradeLossLimit { .. } => "per_trade_loss_limit",
            Self::DrawdownLimit { .. } => "drawdown_limit",
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::BalanceUnknown { .. } => "balance_unknown",
        }
    }
}

// =============================================================================
// Risk Engine
// =============================================================================

#[derive(Debug, Default)]
struct RiskState {
    positions: HashMap<VenueId, Decimal>,
    daily_pnl: Decimal,
    initial_balance: Decimal,
    peak_balance: Decimal,
    halted: bool,
}

/// Breakers plus position, loss, and balance accounting.
#[derive(Debug)]
pub struct RiskEngine {
    config: TradingConfig,
    /// Per-symbol market volatility breaker.
    pub volatility: VolatilityBreaker,
    /// Per-venue connectivity breaker.
    pub connectivity: ConnectivityBreaker,
    /// Per-venue error-rate breaker.
    pub error_rate: ErrorRateBreaker,
    state: RwLock<RiskState>,
    balances: RwLock<HashMap<(VenueId, String), Balance>>,
}

impl RiskEngine {
    /// Creates the risk engine.
    #[must_use]
    pub fn new(config: TradingConfig, breakers: &BreakerConfig) -> Self {
        Self {
            config,
            volatility: VolatilityBreaker::new(breakers),
            connectivity: ConnectivityBreaker::new(breakers),
            error_rate: ErrorRateBreaker::new(breakers),
            state: RwLock::new(RiskState::default()),
            balances: RwLock::new(HashMap::new()),
        }
    }

    /// Seeds balance tracking for drawdown accounting.
    pub fn initialize_balance(&self, initial: Decimal) {
        let mut state = self.state.write();
        state.initial_balance = initial;
        state.peak_balance = initial;
    }

    /// Halts or resumes trading manually.
    pub fn set_halted(&self, halted: bool) {
        self.state.write().halted = halted;
    }

    /// Stores the last observed balance for a venue. Called by the
    /// executor whenever a balance fetch succeeds; a venue whose balance
    /// endpoint fails keeps its previous observation.
    pub fn update_balance(&self, venue: VenueId, balance: Balance) {
        self.balances
            .write()
            .insert((venue, balance.currency.clone()), balance);
    }

    /// Last known balance for a venue and currency.
    #[must_use]
    pub fn known_balance(&self, venue: VenueId, currency: &str) -> Option<Balance> {
        self.balances
            .read()
            .get(&(venue, currency.to_ascii_uppercase()))
            .cloned()
    }

    /// Worst-case loss bound for an opportunity, from the configured
    /// slippage tolerance.
    #[must_use]
    pub fn worst_case_loss(&self, opportunity: &ArbitrageOpportunity) -> Decimal {
        opportunity.position_value() * self.config.slippage_tolerance_percent / dec!(100)
    }

    /// Runs the pre-trade checks in order, returning the first failure.
    ///
    /// # Errors
    /// The specific [`RejectReason`] of the first failing check.
    pub fn pre_trade_check(&self, opportunity: &ArbitrageOpportunity) -> Result<(), RejectReason> {
        let state = self.state.read();

        if state.halted {
            return Err(RejectReason::TradingHalted);
        }

        // 1. Venue breakers on both legs.
        for venue in [opportunity.buy_venue, opportunity.sell_venue] {
            if self.connectivity.is_tripped(venue) {
                return Err(RejectReason::ConnectivityBreaker { venue });
            }
            if self.error_rate.is_tripped(venue) {
                return Err(RejectReason::ErrorRateBreaker { venue });
            }
        }

        // 2. Symbol volatility breaker.
        if self.volatility.is_tripped(&opportunity.symbol) {
            return Err(RejectReason::VolatilityBreaker {
                symbol: opportunity.symbol.clone(),
            });
        }

        let position_value = opportunity.position_value();

        // 3. Per-venue position caps.
        for venue in [opportunity.buy_venue, opportunity.sell_venue] {
            let current = state.positions.get(&venue).copied().unwrap_or(Decimal::ZERO);
            let projected = current + position_value;
            if projected > self.config.max_position_per_venue {
                return Err(RejectReason::VenuePositionLimit {
                    venue,
                    projected,
                    limit: self.config.max_position_per_venue,
                });
            }
        }

        // 4. Total position cap.
        let total: Decimal = state.positions.values().copied().sum();
        let projected_total = total + position_value;
        if projected_total > self.config.max_total_position {
            return Err(RejectReason::TotalPositionLimit {
                projected: projected_total,
                limit: self.config.max_total_position,
            });
        }

        // 5. Daily loss limit including this trade's worst case.
        let worst_case = self.worst_case_loss(opportunity);
        let realised_loss = (-state.daily_pnl).max(Decimal::ZERO);
        let projected_loss = realised_loss + worst_case;
        if projected_loss > self.config.daily_loss_limit {
            return Err(RejectReason::DailyLossLimit {
                projected_loss,
                limit: self.config.daily_loss_limit,
            });
        }

        // 6. Per-trade loss bound.
        if worst_case > self.config.per_trade_loss_limit {
            return Err(RejectReason::PerTradeLossLimit {
                worst_case,
                limit: self.config.per_trade_loss_limit,
            });
        }

        // 7. Drawdown.
        if state.peak_balance > Decimal::ZERO {
            let current = state.initial_balance + state.daily_pnl;
            let drawdown = (state.peak_balance - current) / state.peak_balance;
            if drawdown > self.config.max_drawdown {
                return Err(RejectReason::DrawdownLimit {
                    drawdown,
                    limit: self.config.max_drawdown,
                });
            }
        }

        drop(state);

        // 8. Balances: quote on the buy venue, base on the sell venue,
        // from the last known observation.
        let quote = opportunity.symbol.quote_currency().to_string();
        let base = opportunity.symbol.base().to_string();

        let quote_required = position_value * BALANCE_MARGIN;
        match self.known_balance(opportunity.buy_venue, &quote) {
            Some(balance) if balance.available >= quote_required => {}
            Some(balance) => {
                return Err(RejectReason::InsufficientBalance {
                    venue: opportunity.buy_venue,
                    currency: quote,
                    required: quote_required,
                    available: balance.available,
                })
            }
            None => {
                return Err(RejectReason::BalanceUnknown {
                    venue: opportunity.buy_venue,
                    currency: quote,
                })
            }
        }

        let base_required = opportunity.quantity * BALANCE_MARGIN;
        match self.known_balance(opportunity.sell_venue, &base) {
            Some(balance) if balance.available >= base_required => {}
            Some(balance) => {
                return Err(RejectReason::InsufficientBalance {
                    venue: opportunity.sell_venue,
                    currency: base,
                    required: base_required,
                    available: balance.available,
                })
            }
            None => {
                return Err(RejectReason::BalanceUnknown {
                    venue: opportunity.sell_venue,
                    currency: base,
                })
            }
        }

        debug!(
            symbol = %opportunity.symbol,
            buy_venue = %opportunity.buy_venue,
            sell_venue = %opportunity.sell_venue,
            position_value = %position_value,
            "pre-trade checks passed"
        );
        Ok(())
    }

    /// Records the result of a completed execution: position deltas in
    /// quote value per venue and the realised P&L.
    pub fn record_execution(
        &self,
        buy_venue: VenueId,
        sell_venue: VenueId,
        position_value: Decimal,
        realized_pnl: Decimal,
    ) {
        let mut state = self.state.write();
        if position_value > Decimal::ZERO {
            *state.positions.entry(buy_venue).or_insert(Decimal::ZERO) += position_value;
            *state.positions.entry(sell_venue).or_insert(Decimal::ZERO) += position_value;
        }
        state.daily_pnl += realized_pnl;
        let current = state.initial_balance + state.daily_pnl;
        if current > state.peak_balance {
            state.peak_balance = current;
        }
        if realized_pnl < Decimal::ZERO {
            warn!(pnl = %realized_pnl, daily = %state.daily_pnl, "realised loss recorded");
        }
    }

    /// Realised P&L since the last daily reset.
    #[must_use]
    pub fn daily_pnl(&self) -> Decimal {
        self.state.read().daily_pnl
    }

    /// Clears daily accounting. Called at the start of each trading day.
    pub fn reset_daily(&self) {
        let mut state = self.state.write();
        state.daily_pnl = Decimal::ZERO;
        state.positions.clear();
        state.peak_balance = state.initial_balance;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn opportunity(quantity: Decimal, buy_price: Decimal, sell_price: Decimal) -> ArbitrageOpportunity {
        ArbitrageOpportunity {
            symbol: Symbol::parse("BTCUSDT").unwrap(),
            buy_venue: VenueId::Wallex,
            sell_venue: VenueId::Kucoin,
            quantity,
            buy_price,
            sell_price,
            gross_spread_percent: dec!(0.46),
            buy_fee: dec!(0.001),
            sell_fee: dec!(0.001),
            net_profit_quote: dec!(169.70),
            net_profit_reference: dec!(169.70),
            converted: true,
            buy_snapshot_at: Utc::now(),
            sell_snapshot_at: Utc::now(),
        }
    }

    fn funded_engine(config: TradingConfig) -> RiskEngine {
        let engine = RiskEngine::new(config, &BreakerConfig::default());
        engine.initialize_balance(dec!(100000));
        engine.update_balance(
            VenueId::Wallex,
            Balance {
                currency: "USDT".into(),
                available: dec!(1000000),
                locked: Decimal::ZERO,
            },
        );
        engine.update_balance(
            VenueId::Kucoin,
            Balance {
                currency: "BTC".into(),
                available: dec!(10),
                locked: Decimal::ZERO,
            },
        );
        engine
    }

    fn roomy_config() -> TradingConfig {
        TradingConfig {
            max_position_per_venue: dec!(100000),
            max_total_position: dec!(200000),
            daily_loss_limit: dec!(1000),
            per_trade_loss_limit: dec!(500),
            max_drawdown: dec!(0.10),
            slippage_tolerance_percent: dec!(0.5),
            ..TradingConfig::default()
        }
    }

    #[test]
    fn test_all_checks_pass() {
        let engine = funded_engine(roomy_config());
        assert!(engine.pre_trade_check(&opportunity(dec!(0.5), dec!(65000), dec!(65300))).is_ok());
    }

    #[test]
    fn test_halted_rejects_first() {
        let engine = funded_engine(roomy_config());
        engine.set_halted(true);
        assert_eq!(
            engine.pre_trade_check(&opportunity(dec!(0.5), dec!(65000), dec!(65300))),
            Err(RejectReason::TradingHalted)
        );
    }

    #[test]
    fn test_connectivity_breaker_blocks() {
        let engine = funded_engine(roomy_config());
        for _ in 0..BreakerConfig::default().connectivity_failures_to_trip {
            engine.connectivity.record_failure(VenueId::Kucoin);
        }
        let err = engine
            .pre_trade_check(&opportunity(dec!(0.5), dec!(65000), dec!(65300)))
            .unwrap_err();
        assert_eq!(err.code(), "connectivity_breaker");
    }

    #[test]
    fn test_venue_position_limit() {
        let mut config = roomy_config();
        config.max_position_per_venue = dec!(10000);
        let engine = funded_engine(config);
        // 0.5 BTC at 65000 = 32500 > 10000.
        let err = engine
            .pre_trade_check(&opportunity(dec!(0.5), dec!(65000), dec!(65300)))
            .unwrap_err();
        assert_eq!(err.code(), "venue_position_limit");
    }

    #[test]
    fn test_total_position_limit_accumulates() {
        let mut config = roomy_config();
        config.max_position_per_venue = dec!(40000);
        config.max_total_position = dec!(50000);
        let engine = funded_engine(config);

        engine.record_execution(VenueId::Nobitex, VenueId::Tabdeal, dec!(20000), Decimal::ZERO);
        // Projected total = 40000 + 32500 > 50000.
        let err = engine
            .pre_trade_check(&opportunity(dec!(0.5), dec!(65000), dec!(65300)))
            .unwrap_err();
        assert_eq!(err.code(), "total_position_limit");
    }

    #[test]
    fn test_daily_loss_limit_includes_worst_case() {
        let mut config = roomy_config();
        config.daily_loss_limit = dec!(200);
        let engine = funded_engine(config);
        engine.record_execution(VenueId::Wallex, VenueId::Kucoin, Decimal::ZERO, dec!(-100));

        // Worst case = 32500 · 0.5% = 162.5; 100 + 162.5 > 200.
        let err = engine
            .pre_trade_check(&opportunity(dec!(0.5), dec!(65000), dec!(65300)))
            .unwrap_err();
        assert_eq!(err.code(), "daily_loss_limit");
    }

    #[test]
    fn test_per_trade_loss_limit() {
        let mut config = roomy_config();
        config.per_trade_loss_limit = dec!(100);
        let engine = funded_engine(config);
        // Worst case 162.5 > 100.
        let err = engine
            .pre_trade_check(&opportunity(dec!(0.5), dec!(65000), dec!(65300)))
            .unwrap_err();
        assert_eq!(err.code(), "per_trade_loss_limit");
    }

    #[test]
    fn test_drawdown_limit() {
        // Lose 15% of the initial balance: drawdown 0.15 > 0.10. The
        // daily loss limit is widened so it does not trigger first.
        let mut config = roomy_config();
        config.daily_loss_limit = dec!(100000);
        let engine = funded_engine(config);
        engine.record_execution(VenueId::Wallex, VenueId::Kucoin, Decimal::ZERO, dec!(-15000));
        let err = engine
            .pre_trade_check(&opportunity(dec!(0.5), dec!(65000), dec!(65300)))
            .unwrap_err();
        assert_eq!(err.code(), "drawdown_limit");
    }

    #[test]
    fn test_insufficient_balance() {
        let engine = funded_engine(roomy_config());
        engine.update_balance(
            VenueId::Wallex,
            Balance {
                currency: "USDT".into(),
                available: dec!(100),
                locked: Decimal::ZERO,
            },
        );
        let err = engine
            .pre_trade_check(&opportunity(dec!(0.5), dec!(65000), dec!(65300)))
            .unwrap_err();
        assert_eq!(err.code(), "insufficient_balance");
    }

    #[test]
    fn test_unknown_balance_rejected() {
        let engine = RiskEngine::new(roomy_config(), &BreakerConfig::default());
        engine.initialize_balance(dec!(100000));
        // No balances were ever observed.
        let err = engine
            .pre_trade_check(&opportunity(dec!(0.5), dec!(65000), dec!(65300)))
            .unwrap_err();
        assert_eq!(err.code(), "balance_unknown");
    }

    #[test]
    fn test_balance_margin_applied() {
        let engine = funded_engine(roomy_config());
        // Exactly the position value is not enough: a 5% margin applies.
        engine.update_balance(
            VenueId::Wallex,
            Balance {
                currency: "USDT".into(),
                available: dec!(32500),
                locked: Decimal::ZERO,
            },
        );
        let err = engine
            .pre_trade_check(&opportunity(dec!(0.5), dec!(65000), dec!(65300)))
            .unwrap_err();
        assert_eq!(err.code(), "insufficient_balance");
    }

    #[test]
    fn test_peak_tracks_profit() {
        let engine = funded_engine(roomy_config());
        engine.record_execution(VenueId::Wallex, VenueId::Kucoin, Decimal::ZERO, dec!(500));
        assert_eq!(engine.daily_pnl(), dec!(500));
        engine.reset_daily();
        assert_eq!(engine.daily_pnl(), Decimal::ZERO);
    }
}
