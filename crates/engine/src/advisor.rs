//! Pluggable maker/taker advisor.
//!
//! The executor consults an advisor before placing each leg to decide
//! between a post-only maker order and a plain taker order. The advisor
//! is strictly optional and its failure is non-fatal: any error or
//! unhealthy state defaults the leg to taker.

use async_trait::async_trait;
use rust_decimal::Decimal;
use spot_arb_core::FeatureRecord;

/// Advice for one leg.
#[derive(Debug, Clone, PartialEq)]
pub struct MakerAdvice {
    /// Whether to attempt a post-only maker order.
    pub use_maker: bool,
    /// Confidence in the advice, 0.0 to 1.0.
    pub confidence: f64,
    /// Predicted fill price, when the advisor models one.
    pub predicted_fill_price: Option<Decimal>,
}

impl MakerAdvice {
    /// The default advice when no advisor is available: taker.
    #[must_use]
    pub fn taker() -> Self {
        Self {
            use_maker: false,
            confidence: 1.0,
            predicted_fill_price: None,
        }
    }
}

/// Predicts maker-vs-taker per order from order book features.
#[async_trait]
pub trait MakerTakerAdvisor: Send + Sync {
    /// Advises on one leg.
    async fn advise(&self, features: &FeatureRecord) -> anyhow::Result<MakerAdvice>;

    /// Whether the advisor is currently usable. Unhealthy advisors are
    /// skipped without being called.
    fn is_healthy(&self) -> bool {
        true
    }
}

/// Advisor returning a fixed answer. Useful in tests and as a manual
/// override.
#[derive(Debug, Clone)]
pub struct StaticAdvisor {
    advice: MakerAdvice,
}

impl StaticAdvisor {
    /// Creates an advisor that always answers `advice`.
    #[must_use]
    pub fn new(advice: MakerAdvice) -> Self {
        Self { advice }
    }

    /// Advisor that always requests maker orders.
    #[must_use]
    pub fn always_maker() -> Self {
        Self::new(MakerAdvice {
            use_maker: true,
            confidence: 1.0,
            predicted_fill_price: None,
        })
    }

    /// Advisor that always requests taker orders.
    #[must_use]
    pub fn always_taker() -> Self {
        Self::new(MakerAdvice::taker())
    }
}

#[async_trait]
impl MakerTakerAdvisor for StaticAdvisor {
    async fn advise(&self, _features: &FeatureRecord) -> anyhow::Result<MakerAdvice> {
        Ok(self.advice.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use spot_arb_core::{Symbol, VenueId};

    fn features() -> FeatureRecord {
        FeatureRecord {
            venue: VenueId::Wallex,
            symbol: Symbol::parse("BTCUSDT").unwrap(),
            best_bid: dec!(64990),
            best_ask: dec!(65010),
            spread: dec!(0.0003),
            bid_top_quantity: dec!(1),
            ask_top_quantity: dec!(1),
            depth_imbalance: Decimal::ZERO,
            observed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_static_advisor() {
        let maker = StaticAdvisor::always_maker();
        assert!(maker.advise(&features()).await.unwrap().use_maker);
        let taker = StaticAdvisor::always_taker();
        assert!(!taker.advise(&features()).await.unwrap().use_maker);
    }

    #[test]
    fn test_default_is_taker() {
        assert!(!MakerAdvice::taker().use_maker);
    }
}
