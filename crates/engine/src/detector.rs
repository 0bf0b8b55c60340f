//! Cross-venue arbitrage opportunity detection.
//!
//! Given recent snapshots, enumerates ordered venue pairs with
//! compatible symbols and scores the spread after pessimistic fees.
//! All monetary arithmetic is decimal; sizes truncate toward zero.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use spot_arb_core::{OrderBookSnapshot, QuoteFamily, RateEntry, Symbol, TradingConfig, VenueId};
use std::collections::HashMap;
use tracing::{debug, info, trace};

/// Scale used when truncating quantities toward zero.
const QUANTITY_SCALE: u32 = 8;

// =============================================================================
// Fee Table
// =============================================================================

/// Maker/taker fee rates for one venue.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeePair {
    /// Maker fee rate.
    pub maker: Decimal,
    /// Taker fee rate.
    pub taker: Decimal,
}

impl FeePair {
    /// Creates a pair.
    #[must_use]
    pub fn new(maker: Decimal, taker: Decimal) -> Self {
        Self { maker, taker }
    }

    /// The pessimistic rate used at detection time.
    #[must_use]
    pub fn pessimistic(&self) -> Decimal {
        self.maker.max(self.taker)
    }
}

// =============================================================================
// Rate Table
// =============================================================================

/// Static quote→reference conversion rates.
#[derive(Debug, Clone, Default)]
pub struct RateTable {
    rates: HashMap<(String, String), Decimal>,
}

impl RateTable {
    /// Builds the table from configuration entries.
    #[must_use]
    pub fn from_entries(entries: &[RateEntry]) -> Self {
        let mut rates = HashMap::new();
        for entry in entries {
            rates.insert(
                (
                    entry.from.to_ascii_uppercase(),
                    entry.to.to_ascii_uppercase(),
                ),
                entry.rate,
            );
        }
        Self { rates }
    }

    /// Converts an amount. Identity when the currencies match; `None`
    /// when the table lacks the pair.
    #[must_use]
    pub fn convert(&self, amount: Decimal, from: &str, to: &str) -> Option<Decimal> {
        if from.eq_ignore_ascii_case(to) {
            return Some(amount);
        }
        self.rates
            .get(&(from.to_ascii_uppercase(), to.to_ascii_uppercase()))
            .map(|rate| amount * rate)
    }
}

// =============================================================================
// Opportunity
// =============================================================================

/// A detected cross-venue arbitrage opportunity. Ephemeral: valid only
/// while both underlying snapshots are within the staleness budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbitrageOpportunity {
    /// Canonical symbol.
    pub symbol: Symbol,
    /// Venue to buy on.
    pub buy_venue: VenueId,
    /// Venue to sell on.
    pub sell_venue: VenueId,
    /// Executable quantity, bounded by depth on both sides and the
    /// position cap.
    pub quantity: Decimal,
    /// Best ask on the buy venue.
    pub buy_price: Decimal,
    /// Best bid on the sell venue.
    pub sell_price: Decimal,
    /// Gross spread in percent: `(sell − buy) / buy · 100`.
    pub gross_spread_percent: Decimal,
    /// Pessimistic fee rate on the buy leg.
    pub buy_fee: Decimal,
    /// Pessimistic fee rate on the sell leg.
    pub sell_fee: Decimal,
    /// Net profit in quote units.
    pub net_profit_quote: Decimal,
    /// Net profit in the reference currency; equals the quote profit
    /// when `converted` is false.
    pub net_profit_reference: Decimal,
    /// Whether the reference conversion was available.
    pub converted: bool,
    /// Timestamp of the buy-side snapshot.
    pub buy_snapshot_at: DateTime<Utc>,
    /// Timestamp of the sell-side snapshot.
    pub sell_snapshot_at: DateTime<Utc>,
}

impl ArbitrageOpportunity {
    /// Sum of the two snapshot ages.
    #[must_use]
    pub fn combined_age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.buy_snapshot_at).max(Duration::zero())
            + (now - self.sell_snapshot_at).max(Duration::zero())
    }

    /// Both snapshots strictly within the staleness budget.
    #[must_use]
    pub fn is_fresh(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        (now - self.buy_snapshot_at) < max_age && (now - self.sell_snapshot_at) < max_age
    }

    /// Key identifying this opportunity for replay protection: the
    /// market, the venue pair, and the snapshots that produced it.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}",
            self.symbol,
            self.buy_venue,
            self.sell_venue,
            self.buy_snapshot_at.timestamp_millis(),
            self.sell_snapshot_at.timestamp_millis()
        )
    }

    /// Position value of the buy leg in quote units.
    #[must_use]
    pub fn position_value(&self) -> Decimal {
        self.buy_price * self.quantity
    }
}

// =============================================================================
// Detector
// =============================================================================

/// Scans snapshots for profitable cross-venue spreads.
#[derive(Debug, Clone)]
pub struct Detector {
    config: TradingConfig,
    fees: HashMap<VenueId, FeePair>,
    rates: RateTable,
    reference_currency: String,
}

impl Detector {
    /// Creates a detector.
    #[must_use]
    pub fn new(
        config: TradingConfig,
        fees: HashMap<VenueId, FeePair>,
        rates: RateTable,
        reference_currency: impl Into<String>,
    ) -> Self {
        Self {
            config,
            fees,
            rates,
            reference_currency: reference_currency.into(),
        }
    }

    /// Returns the trading configuration.
    #[must_use]
    pub fn config(&self) -> &TradingConfig {
        &self.config
    }

    fn fee_for(&self, venue: VenueId) -> FeePair {
        self.fees.get(&venue).copied().unwrap_or_else(|| {
            FeePair::new(venue.default_maker_fee(), venue.default_taker_fee())
        })
    }

    /// Scores one ordered venue pair: buy the best ask of `buy_book`,
    /// sell into the best bid of `sell_book`.
    ///
    /// Returns `None` when any threshold rejects the pair.
    #[must_use]
    pub fn detect_pair(
        &self,
        buy_book: &OrderBookSnapshot,
        sell_book: &OrderBookSnapshot,
        now: DateTime<Utc>,
    ) -> Option<ArbitrageOpportunity> {
        if buy_book.venue == sell_book.venue || !buy_book.symbol.compatible(&sell_book.symbol) {
            return None;
        }
        let max_age = self.config.max_snapshot_age();
        if buy_book.is_stale(now, max_age) || sell_book.is_stale(now, max_age) {
            trace!(
                buy_venue = %buy_book.venue,
                sell_venue = %sell_book.venue,
                "stale snapshot, skipping pair"
            );
            return None;
        }

        let ask = buy_book.best_ask()?;
        let bid = sell_book.best_bid()?;
        if ask.price >= bid.price {
            return None;
        }

        let gross_spread_percent = (bid.price - ask.price) / ask.price * dec!(100);
        if gross_spread_percent < self.config.min_spread_percent {
            trace!(
                spread = %gross_spread_percent,
                min = %self.config.min_spread_percent,
                "gross spread below threshold"
            );
            return None;
        }

        // Size: bounded by top-level depth on both sides and the
        // per-venue position cap, truncated toward zero.
        let position_cap = (self.config.max_position_per_venue / ask.price)
            .trunc_with_scale(QUANTITY_SCALE);
        let quantity = ask
            .quantity
            .min(bid.quantity)
            .min(position_cap)
            .trunc_with_scale(QUANTITY_SCALE);
        if quantity < self.config.min_order_size {
            debug!(
                quantity = %quantity,
                min_order_size = %self.config.min_order_size,
                "top level too thin, dropping opportunity"
            );
            return None;
        }

        let buy_fee = self.fee_for(buy_book.venue).pessimistic();
        let sell_fee = self.fee_for(sell_book.venue).pessimistic();
        let net_profit_quote =
            quantity * (bid.price * (Decimal::ONE - sell_fee) - ask.price * (Decimal::ONE + buy_fee));

        let quote = buy_book.symbol.quote_currency();
        let (net_profit_reference, converted) =
            match self
                .rates
                .convert(net_profit_quote, quote, &self.reference_currency)
            {
                Some(converted_profit) => (converted_profit, true),
                None => (net_profit_quote, false),
            };

        // Strict inequality: a profit exactly at the threshold is not
        // worth the execution risk.
        if net_profit_reference <= self.config.min_profit_reference {
            debug!(
                net_profit = %net_profit_reference,
                min = %self.config.min_profit_reference,
                "net profit below threshold"
            );
            return None;
        }

        Some(ArbitrageOpportunity {
            symbol: buy_book.symbol.clone(),
            buy_venue: buy_book.venue,
            sell_venue: sell_book.venue,
            quantity,
            buy_price: ask.price,
            sell_price: bid.price,
            gross_spread_percent,
            buy_fee,
            sell_fee,
            net_profit_quote,
            net_profit_reference,
            converted,
            buy_snapshot_at: buy_book.timestamp,
            sell_snapshot_at: sell_book.timestamp,
        })
    }

    /// Scans a set of snapshots, one per `(venue, symbol)`, and returns
    /// every opportunity ranked best-first.
    ///
    /// Ranking: net reference profit descending, then lower combined
    /// snapshot age, then lexicographic `(buy venue, sell venue)`.
    #[must_use]
    pub fn scan(
        &self,
        snapshots: &[OrderBookSnapshot],
        now: DateTime<Utc>,
    ) -> Vec<ArbitrageOpportunity> {
        let mut markets: HashMap<(String, QuoteFamily), Vec<&OrderBookSnapshot>> = HashMap::new();
        for snapshot in snapshots {
            markets
                .entry(snapshot.symbol.market_key())
                .or_default()
                .push(snapshot);
        }

        let mut opportunities = Vec::new();
        for group in markets.values() {
            for buy_book in group {
                for sell_book in group {
                    if let Some(opp) = self.detect_pair(buy_book, sell_book, now) {
                        opportunities.push(opp);
                    }
                }
            }
        }

        opportunities.sort_by(|a, b| {
            b.net_profit_reference
                .cmp(&a.net_profit_reference)
                .then_with(|| a.combined_age(now).cmp(&b.combined_age(now)))
                .then_with(|| {
                    (a.buy_venue.as_str(), a.sell_venue.as_str())
                        .cmp(&(b.buy_venue.as_str(), b.sell_venue.as_str()))
                })
        });

        if let Some(best) = opportunities.first() {
            info!(
                symbol = %best.symbol,
                buy_venue = %best.buy_venue,
                sell_venue = %best.sell_venue,
                quantity = %best.quantity,
                gross_spread_percent = %best.gross_spread_percent,
                net_profit = %best.net_profit_reference,
                count = opportunities.len(),
                "arbitrage opportunities detected"
            );
        }

        opportunities
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spot_arb_core::BookLevel;

    fn fees_all(rate: Decimal) -> HashMap<VenueId, FeePair> {
        VenueId::ALL
            .iter()
            .map(|v| (*v, FeePair::new(rate, rate)))
            .collect()
    }

    fn config() -> TradingConfig {
        TradingConfig {
            min_spread_percent: dec!(0.30),
            min_profit_reference: Decimal::ZERO,
            min_order_size: dec!(0.0001),
            max_position_per_venue: dec!(1000000),
            ..TradingConfig::default()
        }
    }

    fn detector() -> Detector {
        Detector::new(config(), fees_all(dec!(0.001)), RateTable::default(), "USDT")
    }

    fn book(
        venue: VenueId,
        symbol: &str,
        bids: &[(Decimal, Decimal)],
        asks: &[(Decimal, Decimal)],
        ts: DateTime<Utc>,
    ) -> OrderBookSnapshot {
        OrderBookSnapshot::new(
            venue,
            Symbol::parse(symbol).unwrap(),
            bids.iter().map(|(p, q)| BookLevel::new(*p, *q)).collect(),
            asks.iter().map(|(p, q)| BookLevel::new(*p, *q)).collect(),
            ts,
        )
        .unwrap()
    }

    // ==================== Two-Venue Detection ====================

    #[test]
    fn test_two_venue_detection() {
        let now = Utc::now();
        // Buy on Wallex at 65000, sell on KuCoin at 65300, fees 0.1% each.
        let buy = book(
            VenueId::Wallex,
            "BTCUSDT",
            &[(dec!(64900), dec!(1))],
            &[(dec!(65000), dec!(1.0))],
            now,
        );
        let sell = book(
            VenueId::Kucoin,
            "BTCUSDT",
            &[(dec!(65300), dec!(1.0))],
            &[(dec!(65400), dec!(1))],
            now,
        );
        let opp = detector().detect_pair(&buy, &sell, now).unwrap();

        assert_eq!(opp.buy_venue, VenueId::Wallex);
        assert_eq!(opp.sell_venue, VenueId::Kucoin);
        assert_eq!(opp.quantity, dec!(1.0));
        // Gross spread = 300 / 65000 ≈ 0.4615%.
        assert!((opp.gross_spread_percent - dec!(0.4615)).abs() < dec!(0.001));
        // Net = 65300·0.999 − 65000·1.001 = 169.70.
        assert!((opp.net_profit_quote - dec!(169.70)).abs() < dec!(0.1));
        assert!(opp.converted); // USDT == reference, identity conversion
    }

    #[test]
    fn test_no_opportunity_when_ask_meets_bid() {
        let now = Utc::now();
        let buy = book(
            VenueId::Wallex,
            "BTCUSDT",
            &[],
            &[(dec!(65300), dec!(1))],
            now,
        );
        let sell = book(
            VenueId::Kucoin,
            "BTCUSDT",
            &[(dec!(65300), dec!(1))],
            &[],
            now,
        );
        assert!(detector().detect_pair(&buy, &sell, now).is_none());
    }

    #[test]
    fn test_spread_below_threshold_rejected() {
        let now = Utc::now();
        // 0.1% spread < 0.30% threshold.
        let buy = book(
            VenueId::Wallex,
            "BTCUSDT",
            &[],
            &[(dec!(65000), dec!(1))],
            now,
        );
        let sell = book(
            VenueId::Kucoin,
            "BTCUSDT",
            &[(dec!(65065), dec!(1))],
            &[],
            now,
        );
        assert!(detector().detect_pair(&buy, &sell, now).is_none());
    }

    // ==================== Quote-Family Compatibility ====================

    #[test]
    fn test_toman_family_treated_as_one_market() {
        let now = Utc::now();
        let mut cfg = config();
        cfg.max_position_per_venue = dec!(100000000000);
        let det = Detector::new(cfg, fees_all(dec!(0.001)), RateTable::default(), "USDT");

        let buy = book(
            VenueId::Nobitex,
            "BTCIRT",
            &[],
            &[(dec!(4000000000), dec!(0.5))],
            now,
        );
        let sell = book(
            VenueId::Wallex,
            "BTCTMN",
            &[(dec!(4100000000), dec!(0.5))],
            &[],
            now,
        );
        let opps = det.scan(&[buy, sell], now);
        assert_eq!(opps.len(), 1);
        assert_eq!(opps[0].buy_venue, VenueId::Nobitex);
        // No IRT→USDT rate configured: profit stays in quote units.
        assert!(!opps[0].converted);
        assert_eq!(opps[0].net_profit_quote, opps[0].net_profit_reference);
    }

    #[test]
    fn test_usdt_and_toman_never_matched() {
        let now = Utc::now();
        let buy = book(
            VenueId::Nobitex,
            "BTCIRT",
            &[],
            &[(dec!(4000000000), dec!(0.5))],
            now,
        );
        let sell = book(
            VenueId::Kucoin,
            "BTCUSDT",
            &[(dec!(65300), dec!(0.5))],
            &[],
            now,
        );
        assert!(detector().scan(&[buy, sell], now).is_empty());
    }

    // ==================== Staleness ====================

    #[test]
    fn test_stale_snapshot_rejected_at_boundary() {
        let now = Utc::now();
        let cfg = config();
        let max_age = cfg.max_snapshot_age();
        let det = detector();

        let fresh_sell = book(
            VenueId::Kucoin,
            "BTCUSDT",
            &[(dec!(65300), dec!(1))],
            &[],
            now,
        );
        // Snapshot exactly at the budget: stale.
        let boundary_buy = book(
            VenueId::Wallex,
            "BTCUSDT",
            &[],
            &[(dec!(65000), dec!(1))],
            now - max_age,
        );
        assert!(det.detect_pair(&boundary_buy, &fresh_sell, now).is_none());

        // One millisecond fresher: accepted.
        let fresh_buy = book(
            VenueId::Wallex,
            "BTCUSDT",
            &[],
            &[(dec!(65000), dec!(1))],
            now - max_age + Duration::milliseconds(1),
        );
        assert!(det.detect_pair(&fresh_buy, &fresh_sell, now).is_some());
    }

    // ==================== Thresholds & Sizing ====================

    #[test]
    fn test_net_profit_exactly_at_threshold_rejected() {
        let now = Utc::now();
        let mut cfg = config();
        // Zero fees make the numbers exact: 1.0 · (65001 − 65000) = 1.
        cfg.min_spread_percent = Decimal::ZERO;
        cfg.min_profit_reference = dec!(1);
        let det = Detector::new(cfg, fees_all(Decimal::ZERO), RateTable::default(), "USDT");

        let buy = book(
            VenueId::Wallex,
            "BTCUSDT",
            &[],
            &[(dec!(65000), dec!(1))],
            now,
        );
        let sell = book(
            VenueId::Kucoin,
            "BTCUSDT",
            &[(dec!(65001), dec!(1))],
            &[],
            now,
        );
        assert!(det.detect_pair(&buy, &sell, now).is_none());

        // One tick more profit passes.
        let sell = book(
            VenueId::Kucoin,
            "BTCUSDT",
            &[(dec!(65001.01), dec!(1))],
            &[],
            now,
        );
        assert!(det.detect_pair(&buy, &sell, now).is_some());
    }

    #[test]
    fn test_thin_top_level_dropped() {
        let now = Utc::now();
        let mut cfg = config();
        cfg.min_order_size = dec!(0.01);
        let det = Detector::new(cfg, fees_all(dec!(0.001)), RateTable::default(), "USDT");

        let buy = book(
            VenueId::Wallex,
            "BTCUSDT",
            &[],
            &[(dec!(65000), dec!(0.005))],
            now,
        );
        let sell = book(
            VenueId::Kucoin,
            "BTCUSDT",
            &[(dec!(65300), dec!(1))],
            &[],
            now,
        );
        // Thin side saturates below the minimum order size: dropped
        // entirely, not partially accepted.
        assert!(det.detect_pair(&buy, &sell, now).is_none());
    }

    #[test]
    fn test_quantity_capped_by_position_limit() {
        let now = Utc::now();
        let mut cfg = config();
        cfg.max_position_per_venue = dec!(6500); // 0.1 BTC at 65000
        let det = Detector::new(cfg, fees_all(Decimal::ZERO), RateTable::default(), "USDT");

        let buy = book(
            VenueId::Wallex,
            "BTCUSDT",
            &[],
            &[(dec!(65000), dec!(5))],
            now,
        );
        let sell = book(
            VenueId::Kucoin,
            "BTCUSDT",
            &[(dec!(65300), dec!(5))],
            &[],
            now,
        );
        let opp = det.detect_pair(&buy, &sell, now).unwrap();
        assert_eq!(opp.quantity, dec!(0.1));
    }

    // ==================== Conversion ====================

    #[test]
    fn test_reference_conversion_applied() {
        let now = Utc::now();
        let mut cfg = config();
        cfg.max_position_per_venue = dec!(100000000000);
        cfg.min_profit_reference = Decimal::ZERO;
        let rates = RateTable::from_entries(&[RateEntry {
            from: "IRT".into(),
            to: "USDT".into(),
            rate: dec!(0.0000009615),
        }]);
        let det = Detector::new(cfg, fees_all(Decimal::ZERO), rates, "USDT");

        let buy = book(
            VenueId::Nobitex,
            "BTCIRT",
            &[],
            &[(dec!(4000000000), dec!(1))],
            now,
        );
        let sell = book(
            VenueId::Tabdeal,
            "BTCIRT",
            &[(dec!(4100000000), dec!(1))],
            &[],
            now,
        );
        let opp = det.detect_pair(&buy, &sell, now).unwrap();
        assert!(opp.converted);
        assert_eq!(opp.net_profit_quote, dec!(100000000));
        assert_eq!(opp.net_profit_reference, dec!(100000000) * dec!(0.0000009615));
    }

    // ==================== Ranking ====================

    #[test]
    fn test_ranking_by_profit_then_age_then_venues() {
        let now = Utc::now();
        let det = detector();

        // Market 1: 300 spread. Market 2 (ETH): larger profit.
        let books = vec![
            book(
                VenueId::Wallex,
                "BTCUSDT",
                &[(dec!(64000), dec!(1))],
                &[(dec!(65000), dec!(1))],
                now,
            ),
            book(
                VenueId::Kucoin,
                "BTCUSDT",
                &[(dec!(65300), dec!(1))],
                &[(dec!(65500), dec!(1))],
                now,
            ),
            book(
                VenueId::Wallex,
                "ETHUSDT",
                &[(dec!(2900), dec!(100))],
                &[(dec!(3000), dec!(100))],
                now,
            ),
            book(
                VenueId::Kucoin,
                "ETHUSDT",
                &[(dec!(3100), dec!(100))],
                &[(dec!(3200), dec!(100))],
                now,
            ),
        ];
        let opps = det.scan(&books, now);
        assert_eq!(opps.len(), 2);
        // ETH: 100 · (3100·0.999 − 3000·1.001) ≈ 9390 beats BTC ≈ 169.
        assert_eq!(opps[0].symbol, Symbol::parse("ETHUSDT").unwrap());
        assert!(opps[0].net_profit_reference > opps[1].net_profit_reference);
    }

    #[test]
    fn test_ranking_tie_breaks_on_age() {
        let now = Utc::now();
        let mut cfg = config();
        cfg.min_spread_percent = Decimal::ZERO;
        cfg.min_profit_reference = Decimal::ZERO;
        let det = Detector::new(cfg, fees_all(Decimal::ZERO), RateTable::default(), "USDT");

        let old = now - Duration::milliseconds(900);
        // Same prices in both markets, so identical profit; the fresher
        // pair must rank first.
        let books = vec![
            book(VenueId::Wallex, "BTCUSDT", &[], &[(dec!(65000), dec!(1))], old),
            book(
                VenueId::Kucoin,
                "BTCUSDT",
                &[(dec!(65300), dec!(1))],
                &[],
                old,
            ),
            book(VenueId::Wallex, "ETHUSDT", &[], &[(dec!(65000), dec!(1))], now),
            book(
                VenueId::Kucoin,
                "ETHUSDT",
                &[(dec!(65300), dec!(1))],
                &[],
                now,
            ),
        ];
        let opps = det.scan(&books, now);
        assert_eq!(opps.len(), 2);
        assert_eq!(opps[0].symbol, Symbol::parse("ETHUSDT").unwrap());
    }

    // ==================== Fingerprint ====================

    #[test]
    fn test_fingerprint_changes_with_snapshots() {
        let now = Utc::now();
        let det = detector();
        let buy = book(
            VenueId::Wallex,
            "BTCUSDT",
            &[],
            &[(dec!(65000), dec!(1))],
            now,
        );
        let sell = book(
            VenueId::Kucoin,
            "BTCUSDT",
            &[(dec!(65300), dec!(1))],
            &[],
            now,
        );
        let a = det.detect_pair(&buy, &sell, now).unwrap();

        let sell_later = book(
            VenueId::Kucoin,
            "BTCUSDT",
            &[(dec!(65300), dec!(1))],
            &[],
            now + Duration::milliseconds(5),
        );
        let b = det.detect_pair(&buy, &sell_later, now + Duration::milliseconds(5)).unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
