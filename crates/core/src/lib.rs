//! Shared types for the cross-venue spot arbitrage engine.
//!
//! This crate defines the canonical instrument identity, the closed venue
//! set, market data and order types with their invariants, the venue
//! error taxonomy, application configuration, and the outbound journal
//! interface. Everything here is venue-agnostic: the adapters live in
//! `spot-arb-exchanges`, the trading logic in `spot-arb-engine`.

pub mod config;
pub mod error;
pub mod journal;
pub mod symbol;
pub mod types;
pub mod venue;

pub use config::{
    AppConfig, BreakerConfig, Credentials, ExchangeSettings, ExecutorConfig, RateEntry,
    StreamConfig, TradingConfig,
};
pub use error::{VenueError, VenueResult};
pub use journal::{JournalMode, NullJournal, TradeJournal};
pub use symbol::{QuoteFamily, Symbol, SymbolError};
pub use types::{
    Balance, BookError, BookLevel, FeatureRecord, Order, OrderBookSnapshot, OrderStatus,
    OrderType, Side, TradeOutcome, TradeRecord,
};
pub use venue::{AuthScheme, SymbolStyle, VenueId};
