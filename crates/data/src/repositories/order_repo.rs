//! Order journal repository.

use anyhow::Result;
use chrono::{DateTime, Utc};
use spot_arb_core::{JournalMode, Order};
use sqlx::PgPool;

use crate::models::OrderRow;

/// Append-only store of order states.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: PgPool,
    table: String,
}

impl OrderRepository {
    /// Creates a repository writing to the mode's order table.
    #[must_use]
    pub fn new(pool: PgPool, mode: JournalMode) -> Self {
        Self {
            pool,
            table: format!("{}_orders", mode.table_prefix()),
        }
    }

    /// The table this repository writes to.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Inserts one order state and returns the generated id.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn insert(&self, order: &Order) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(&format!(
            r#"
            INSERT INTO {}
                (venue_order_id, venue, symbol, side, order_type, status,
                 quantity, price, filled_quantity, avg_fill_price, fee,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING id
            "#,
            self.table
        ))
        .bind(&order.venue_order_id)
        .bind(order.venue.as_str())
        .bind(order.symbol.to_string())
        .bind(order.side.as_str())
        .bind(order.order_type.to_string())
        .bind(order.status.to_string())
        .bind(order.quantity)
        .bind(order.price)
        .bind(order.filled_quantity)
        .bind(order.avg_fill_price)
        .bind(order.fee)
        .bind(order.created_at)
        .bind(order.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    /// Queries the journaled states of one venue order, oldest first.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn history(
        &self,
        venue_order_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<OrderRow>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            SELECT id, venue_order_id, venue, symbol, side, order_type, status,
                   quantity, price, filled_quantity, avg_fill_price, fee,
                   created_at, updated_at
            FROM {}
            WHERE venue_order_id = $1 AND updated_at >= $2
            ORDER BY updated_at ASC, id ASC
            "#,
            self.table
        ))
        .bind(venue_order_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
