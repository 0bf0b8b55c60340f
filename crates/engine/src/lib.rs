//! Trading core: price streaming, opportunity detection, risk gating,
//! and dual-leg execution.
//!
//! Data flows stream → detector → executor. The executor consults the
//! risk engine before every attempt, places the two legs concurrently,
//! polls them to a terminal state, and journals exactly one trade
//! record per execution. The optional maker/taker advisor is consulted
//! per leg and its failure is never fatal.

pub mod advisor;
pub mod breakers;
pub mod cancel;
pub mod detector;
pub mod executor;
pub mod orchestrator;
pub mod risk;
pub mod stream;

pub use advisor::{MakerAdvice, MakerTakerAdvisor, StaticAdvisor};
pub use breakers::{BreakerState, ConnectivityBreaker, ErrorRateBreaker, VolatilityBreaker};
pub use cancel::CancelToken;
pub use detector::{ArbitrageOpportunity, Detector, FeePair, RateTable};
pub use executor::{ExecutionResult, OrderExecutor};
pub use orchestrator::Orchestrator;
pub use risk::{RejectReason, RiskEngine};
pub use stream::{PairState, PriceStream, SnapshotListener};
