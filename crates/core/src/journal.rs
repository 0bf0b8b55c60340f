//! Outbound journaling interface.
//!
//! The engine writes orders, trades, and advisor features through this
//! trait; schema and storage engine are the sink's concern. Journaling is
//! append-only and best-effort: a failed write is logged by the caller
//! and never alters a trade outcome.

use crate::types::{FeatureRecord, Order, TradeRecord};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// How journaled rows are labelled. A flag on the sink only; the
/// detector/executor pipeline never branches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JournalMode {
    /// Live trading records.
    Realistic,
    /// Paper trading records.
    Paper,
    /// Dry-run records.
    DryRun,
}

impl JournalMode {
    /// Table-name prefix used by persistent sinks.
    #[must_use]
    pub fn table_prefix(self) -> &'static str {
        match self {
            Self::Realistic => "realistic",
            Self::Paper => "paper",
            Self::DryRun => "dryrun",
        }
    }
}

/// Append-only journal of orders, trades, and features.
#[async_trait]
pub trait TradeJournal: Send + Sync {
    /// Records an order state. Called on placement and on every observed
    /// status change.
    async fn record_order(&self, order: &Order) -> anyhow::Result<()>;

    /// Records a completed execution attempt. At most one record per
    /// execution.
    async fn record_trade(&self, trade: &TradeRecord) -> anyhow::Result<()>;

    /// Records extracted order book features for offline training.
    async fn record_features(&self, features: &FeatureRecord) -> anyhow::Result<()>;
}

/// Journal that drops everything. Used in tests and dry runs without a
/// database.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullJournal;

#[async_trait]
impl TradeJournal for NullJournal {
    async fn record_order(&self, _order: &Order) -> anyhow::Result<()> {
        Ok(())
    }

    async fn record_trade(&self, _trade: &TradeRecord) -> anyhow::Result<()> {
        Ok(())
    }

    async fn record_features(&self, _features: &FeatureRecord) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::Symbol;
    use crate::types::TradeOutcome;
    use crate::venue::VenueId;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    #[test]
    fn test_mode_prefixes() {
        assert_eq!(JournalMode::Realistic.table_prefix(), "realistic");
        assert_eq!(JournalMode::Paper.table_prefix(), "paper");
        assert_eq!(JournalMode::DryRun.table_prefix(), "dryrun");
    }

    #[tokio::test]
    async fn test_null_journal_accepts_everything() {
        let journal = NullJournal;
        let record = TradeRecord {
            id: Uuid::new_v4(),
            symbol: Symbol::parse("BTCUSDT").unwrap(),
            buy_venue: VenueId::Wallex,
            sell_venue: VenueId::Kucoin,
            buy_order: None,
            sell_order: None,
            matched_quantity: Decimal::ZERO,
            realized_profit: Decimal::ZERO,
            exposure: Decimal::ZERO,
            exposure_currency: "BTC".into(),
            expected_profit: Decimal::ZERO,
            outcome: TradeOutcome::Failed,
            recorded_at: Utc::now(),
        };
        assert!(journal.record_trade(&record).await.is_ok());
    }
}
