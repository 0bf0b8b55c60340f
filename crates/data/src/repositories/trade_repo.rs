//! Trade journal repository.

use anyhow::Result;
use chrono::{DateTime, Utc};
use spot_arb_core::{JournalMode, TradeRecord};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{leg_order_id, outcome_str, TradeRow};

/// Append-only store of completed execution attempts.
#[derive(Debug, Clone)]
pub struct TradeRepository {
    pool: PgPool,
    table: String,
}

impl TradeRepository {
    /// Creates a repository writing to the mode's trade table.
    #[must_use]
    pub fn new(pool: PgPool, mode: JournalMode) -> Self {
        Self {
            pool,
            table: format!("{}_trades", mode.table_prefix()),
        }
    }

    /// The table this repository writes to.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Inserts one trade record.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn insert(&self, record: &TradeRecord) -> Result<()> {
        sqlx::query(&format!(
            r#"
            INSERT INTO {}
                (id, symbol, buy_venue, sell_venue, buy_order_id, sell_order_id,
                 matched_quantity, realized_profit, exposure, exposure_currency,
                 expected_profit, outcome, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
            self.table
        ))
        .bind(record.id)
        .bind(record.symbol.to_string())
        .bind(record.buy_venue.as_str())
        .bind(record.sell_venue.as_str())
        .bind(leg_order_id(&record.buy_order))
        .bind(leg_order_id(&record.sell_order))
        .bind(record.matched_quantity)
        .bind(record.realized_profit)
        .bind(record.exposure)
        .bind(&record.exposure_currency)
        .bind(record.expected_profit)
        .bind(outcome_str(record))
        .bind(record.recorded_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Gets one trade by id.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<TradeRow>> {
        let row = sqlx::query_as::<_, TradeRow>(&format!(
            r#"
            SELECT id, symbol, buy_venue, sell_venue, buy_order_id, sell_order_id,
                   matched_quantity, realized_profit, exposure, exposure_currency,
                   expected_profit, outcome, recorded_at
            FROM {}
            WHERE id = $1
            "#,
            self.table
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Queries trades for a symbol within a time range, newest first.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn query_by_symbol(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<TradeRow>> {
        let rows = sqlx::query_as::<_, TradeRow>(&format!(
            r#"
            SELECT id, symbol, buy_venue, sell_venue, buy_order_id, sell_order_id,
                   matched_quantity, realized_profit, exposure, exposure_currency,
                   expected_profit, outcome, recorded_at
            FROM {}
            WHERE symbol = $1 AND recorded_at >= $2 AND recorded_at <= $3
            ORDER BY recorded_at DESC
            "#,
            self.table
        ))
        .bind(symbol)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_table_names_follow_mode() {
        let lazy = PgPool::connect_lazy("postgres://localhost/spot_arb").unwrap();
        assert_eq!(
            TradeRepository::new(lazy.clone(), JournalMode::Realistic).table(),
            "realistic_trades"
        );
        assert_eq!(
            TradeRepository::new(lazy, JournalMode::Paper).table(),
            "paper_trades"
        );
    }
}
