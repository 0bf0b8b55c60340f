//! Postgres-backed journal sink.

use async_trait::async_trait;
use spot_arb_core::{FeatureRecord, JournalMode, Order, TradeJournal, TradeRecord};
use sqlx::PgPool;

use crate::repositories::{FeatureRepository, OrderRepository, TradeRepository};

/// Journal that appends to mode-prefixed Postgres tables. The mode only
/// selects where rows land; callers never branch on it.
#[derive(Debug, Clone)]
pub struct SqlJournal {
    orders: OrderRepository,
    trades: TradeRepository,
    features: FeatureRepository,
    mode: JournalMode,
}

impl SqlJournal {
    /// Creates the journal over a connection pool.
    #[must_use]
    pub fn new(pool: PgPool, mode: JournalMode) -> Self {
        Self {
            orders: OrderRepository::new(pool.clone(), mode),
            trades: TradeRepository::new(pool.clone(), mode),
            features: FeatureRepository::new(pool, mode),
            mode,
        }
    }

    /// The journaling mode this sink writes under.
    #[must_use]
    pub fn mode(&self) -> JournalMode {
        self.mode
    }

    /// The trade repository, for read-side tooling.
    #[must_use]
    pub fn trades(&self) -> &TradeRepository {
        &self.trades
    }
}

#[async_trait]
impl TradeJournal for SqlJournal {
    async fn record_order(&self, order: &Order) -> anyhow::Result<()> {
        self.orders.insert(order).await?;
        Ok(())
    }

    async fn record_trade(&self, trade: &TradeRecord) -> anyhow::Result<()> {
        self.trades.insert(trade).await
    }

    async fn record_features(&self, features: &FeatureRecord) -> anyhow::Result<()> {
        self.features.insert(features).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mode_selects_tables() {
        let pool = PgPool::connect_lazy("postgres://localhost/spot_arb").unwrap();
        let journal = SqlJournal::new(pool, JournalMode::Paper);
        assert_eq!(journal.mode(), JournalMode::Paper);
        assert_eq!(journal.trades().table(), "paper_trades");
    }
}
