//! Row models for the journal tables.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use spot_arb_core::{FeatureRecord, Order, TradeRecord};
use uuid::Uuid;

/// One journaled order state.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OrderRow {
    /// Surrogate id.
    pub id: i64,
    /// Venue order id, when acknowledged.
    pub venue_order_id: Option<String>,
    /// Venue name.
    pub venue: String,
    /// Canonical symbol.
    pub symbol: String,
    /// "buy" or "sell".
    pub side: String,
    /// "limit" or "market".
    pub order_type: String,
    /// Lifecycle status at journaling time.
    pub status: String,
    /// Requested quantity.
    pub quantity: Decimal,
    /// Limit price, when any.
    pub price: Option<Decimal>,
    /// Filled quantity at journaling time.
    pub filled_quantity: Decimal,
    /// Average fill price, when known.
    pub avg_fill_price: Option<Decimal>,
    /// Observed fee, when reported.
    pub fee: Option<Decimal>,
    /// Order creation time.
    pub created_at: DateTime<Utc>,
    /// Last state change.
    pub updated_at: DateTime<Utc>,
}

/// One journaled trade record.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TradeRow {
    /// Trade id from the executor.
    pub id: Uuid,
    /// Canonical symbol.
    pub symbol: String,
    /// Venue bought on.
    pub buy_venue: String,
    /// Venue sold on.
    pub sell_venue: String,
    /// Buy-leg venue order id, when the leg was placed.
    pub buy_order_id: Option<String>,
    /// Sell-leg venue order id, when the leg was placed.
    pub sell_order_id: Option<String>,
    /// Matched size.
    pub matched_quantity: Decimal,
    /// Realised net profit over the matched size.
    pub realized_profit: Decimal,
    /// Residual exposure in base units.
    pub exposure: Decimal,
    /// Currency of the exposure.
    pub exposure_currency: String,
    /// Net profit promised at detection time.
    pub expected_profit: Decimal,
    /// Terminal classification.
    pub outcome: String,
    /// When the record was produced.
    pub recorded_at: DateTime<Utc>,
}

/// One journaled feature extraction.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FeatureRow {
    /// Surrogate id.
    pub id: i64,
    /// Venue name.
    pub venue: String,
    /// Canonical symbol.
    pub symbol: String,
    /// Best bid at observation.
    pub best_bid: Decimal,
    /// Best ask at observation.
    pub best_ask: Decimal,
    /// Relative spread.
    pub spread: Decimal,
    /// Quantity at the best bid.
    pub bid_top_quantity: Decimal,
    /// Quantity at the best ask.
    pub ask_top_quantity: Decimal,
    /// Book depth imbalance, −1 to 1.
    pub depth_imbalance: Decimal,
    /// Snapshot timestamp.
    pub observed_at: DateTime<Utc>,
}

/// Serialises an outcome the way the trade table stores it.
#[must_use]
pub fn outcome_str(record: &TradeRecord) -> &'static str {
    use spot_arb_core::TradeOutcome;
    match record.outcome {
        TradeOutcome::Success => "success",
        TradeOutcome::Partial => "partial",
        TradeOutcome::Failed => "failed",
        TradeOutcome::Timeout => "timeout",
        TradeOutcome::Cancelled => "cancelled",
    }
}

/// Extracts the venue order id of one leg.
#[must_use]
pub fn leg_order_id(order: &Option<Order>) -> Option<String> {
    order.as_ref().and_then(|o| o.venue_order_id.clone())
}

/// Feature record field accessors used when binding inserts.
#[must_use]
pub fn feature_symbol(features: &FeatureRecord) -> String {
    features.symbol.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use spot_arb_core::{Side, Symbol, TradeOutcome, VenueId};

    #[test]
    fn test_outcome_serialisation() {
        let mut record = TradeRecord {
            id: Uuid::new_v4(),
            symbol: Symbol::parse("BTCUSDT").unwrap(),
            buy_venue: VenueId::Wallex,
            sell_venue: VenueId::Kucoin,
            buy_order: None,
            sell_order: None,
            matched_quantity: dec!(0.5),
            realized_profit: dec!(84.85),
            exposure: Decimal::ZERO,
            exposure_currency: "BTC".into(),
            expected_profit: dec!(169.70),
            outcome: TradeOutcome::Success,
            recorded_at: Utc::now(),
        };
        assert_eq!(outcome_str(&record), "success");
        record.outcome = TradeOutcome::Cancelled;
        assert_eq!(outcome_str(&record), "cancelled");
    }

    #[test]
    fn test_leg_order_id() {
        assert_eq!(leg_order_id(&None), None);
        let mut order = Order::pending(
            VenueId::Wallex,
            Symbol::parse("BTCUSDT").unwrap(),
            Side::Buy,
            spot_arb_core::OrderType::Limit,
            dec!(1),
            Some(dec!(65000)),
            Utc::now(),
        );
        order.venue_order_id = Some("w-1".into());
        assert_eq!(leg_order_id(&Some(order)), Some("w-1".into()));
    }

    use rust_decimal::Decimal;
}
