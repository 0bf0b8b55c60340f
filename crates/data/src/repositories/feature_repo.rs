//! Feature journal repository.

use anyhow::Result;
use spot_arb_core::{FeatureRecord, JournalMode};
use sqlx::PgPool;

use crate::models::feature_symbol;

/// Append-only store of extracted order book features.
#[derive(Debug, Clone)]
pub struct FeatureRepository {
    pool: PgPool,
    table: String,
}

impl FeatureRepository {
    /// Creates a repository writing to the mode's feature table.
    #[must_use]
    pub fn new(pool: PgPool, mode: JournalMode) -> Self {
        Self {
            pool,
            table: format!("{}_features", mode.table_prefix()),
        }
    }

    /// The table this repository writes to.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Inserts one feature record.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn insert(&self, features: &FeatureRecord) -> Result<()> {
        sqlx::query(&format!(
            r#"
            INSERT INTO {}
                (venue, symbol, best_bid, best_ask, spread,
                 bid_top_quantity, ask_top_quantity, depth_imbalance, observed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
            self.table
        ))
        .bind(features.venue.as_str())
        .bind(feature_symbol(features))
        .bind(features.best_bid)
        .bind(features.best_ask)
        .bind(features.spread)
        .bind(features.bid_top_quantity)
        .bind(features.ask_top_quantity)
        .bind(features.depth_imbalance)
        .bind(features.observed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
