//! Persistence for the cross-venue spot arbitrage engine.
//!
//! The engine writes orders, trades, and advisor features through the
//! narrow [`spot_arb_core::TradeJournal`] interface; this crate provides
//! the Postgres sink behind it. Tables are prefixed by journaling mode
//! (`realistic_`, `paper_`, `dryrun_`) and inserts are append-only.

pub mod journal;
pub mod models;
pub mod repositories;

pub use journal::SqlJournal;
pub use models::{FeatureRow, OrderRow, TradeRow};
pub use repositories::{FeatureRepository, OrderRepository, TradeRepository};
