//! Price streaming loop.
//!
//! Maintains the latest order book snapshot for a configured set of
//! `(venue, symbol)` pairs. One polling task per pair; per-venue
//! semaphores cap concurrent requests to respect rate limits.
//!
//! Delivery guarantee: for a fixed pair, snapshots reach subscribers in
//! non-decreasing timestamp order (out-of-order readings are dropped).
//! Across pairs, ordering is unspecified.

use crate::cancel::CancelToken;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use spot_arb_core::{OrderBookSnapshot, StreamConfig, Symbol, TradingConfig, VenueId};
use spot_arb_exchanges::VenueAdapter;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Lifecycle of one polled pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairState {
    /// Not yet started.
    Idle,
    /// A refresh is in flight.
    Fetching,
    /// The latest snapshot is within the staleness budget.
    Fresh,
    /// The latest snapshot aged past the budget.
    Stale,
    /// Too many consecutive failures; the pair no longer refreshes.
    Stopped,
}

/// Callback invoked with each delivered snapshot. Runs on the stream's
/// polling tasks; implementations must not block.
pub type SnapshotListener = Arc<dyn Fn(&OrderBookSnapshot) + Send + Sync>;

type PairKey = (VenueId, Symbol);

#[derive(Default)]
struct StreamShared {
    latest: RwLock<HashMap<PairKey, OrderBookSnapshot>>,
    states: RwLock<HashMap<PairKey, PairState>>,
    listeners: RwLock<Vec<SnapshotListener>>,
}

impl StreamShared {
    fn set_state(&self, key: &PairKey, state: PairState) {
        self.states.write().insert(key.clone(), state);
    }
}

/// Periodic order book refresher with publish-subscribe delivery.
pub struct PriceStream {
    config: StreamConfig,
    max_age: chrono::Duration,
    adapters: HashMap<VenueId, Arc<dyn VenueAdapter>>,
    pairs: Vec<PairKey>,
    shared: Arc<StreamShared>,
    semaphores: HashMap<VenueId, Arc<Semaphore>>,
    cancel: CancelToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl PriceStream {
    /// Creates a stream over the given pairs.
    #[must_use]
    pub fn new(
        config: StreamConfig,
        trading: &TradingConfig,
        adapters: HashMap<VenueId, Arc<dyn VenueAdapter>>,
        pairs: Vec<(VenueId, Symbol)>,
    ) -> Self {
        let semaphores = adapters
            .keys()
            .map(|venue| {
                (
                    *venue,
                    Arc::new(Semaphore::new(config.per_venue_concurrency.max(1))),
                )
            })
            .collect();
        let shared = Arc::new(StreamShared::default());
        {
            let mut states = shared.states.write();
            for pair in &pairs {
                states.insert(pair.clone(), PairState::Idle);
            }
        }
        Self {
            config,
            max_age: trading.max_snapshot_age(),
            adapters,
            pairs,
            shared,
            semaphores,
            cancel: CancelToken::new(),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Registers a snapshot listener. Listeners registered after
    /// `start()` receive subsequent deliveries only.
    pub fn subscribe(&self, listener: SnapshotListener) {
        self.shared.listeners.write().push(listener);
    }

    /// Spawns one polling task per pair.
    pub fn start(&self) {
        let mut handles = self.handles.lock();
        if !handles.is_empty() {
            warn!("price stream already running");
            return;
        }
        info!(pairs = self.pairs.len(), "starting price stream");
        for pair in &self.pairs {
            let Some(adapter) = self.adapters.get(&pair.0).cloned() else {
                warn!(venue = %pair.0, "no adapter configured for pair, skipping");
                continue;
            };
            let semaphore = self
                .semaphores
                .get(&pair.0)
                .cloned()
                .unwrap_or_else(|| Arc::new(Semaphore::new(1)));
            handles.push(tokio::spawn(poll_pair(
                pair.clone(),
                adapter,
                semaphore,
                self.shared.clone(),
                self.config.clone(),
                self.max_age,
                self.cancel.clone(),
            )));
        }
    }

    /// Signals every polling task to stop and waits for in-flight
    /// refreshes to settle, bounded by the configured stop timeout.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.handles.lock());
        let deadline = std::time::Duration::from_millis(self.config.stop_timeout_ms);
        for mut handle in handles {
            if tokio::time::timeout(deadline, &mut handle).await.is_err() {
                warn!("polling task did not settle before the stop timeout, aborting");
                handle.abort();
            }
        }
        info!("price stream stopped");
    }

    /// Latest snapshot for a pair, regardless of age.
    #[must_use]
    pub fn latest(&self, venue: VenueId, symbol: &Symbol) -> Option<OrderBookSnapshot> {
        self.shared
            .latest
            .read()
            .get(&(venue, symbol.clone()))
            .cloned()
    }

    /// Latest snapshot for a pair, only if within the staleness budget.
    #[must_use]
    pub fn latest_fresh(
        &self,
        venue: VenueId,
        symbol: &Symbol,
        now: DateTime<Utc>,
    ) -> Option<OrderBookSnapshot> {
        self.latest(venue, symbol)
            .filter(|s| !s.is_stale(now, self.max_age))
    }

    /// Every snapshot currently within the staleness budget.
    #[must_use]
    pub fn all_fresh(&self, now: DateTime<Utc>) -> Vec<OrderBookSnapshot> {
        self.shared
            .latest
            .read()
            .values()
            .filter(|s| !s.is_stale(now, self.max_age))
            .cloned()
            .collect()
    }

    /// Current state of one pair.
    #[must_use]
    pub fn pair_state(&self, venue: VenueId, symbol: &Symbol) -> PairState {
        self.shared
            .states
            .read()
            .get(&(venue, symbol.clone()))
            .copied()
            .unwrap_or(PairState::Idle)
    }
}

impl std::fmt::Debug for PriceStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriceStream")
            .field("pairs", &self.pairs.len())
            .field("polling_interval_ms", &self.config.polling_interval_ms)
            .finish_non_exhaustive()
    }
}

/// Polling loop for one `(venue, symbol)` pair.
async fn poll_pair(
    pair: PairKey,
    adapter: Arc<dyn VenueAdapter>,
    semaphore: Arc<Semaphore>,
    shared: Arc<StreamShared>,
    config: StreamConfig,
    max_age: chrono::Duration,
    cancel: CancelToken,
) {
    let (venue, symbol) = &pair;
    let mut consecutive_errors: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            break;
        }
        shared.set_state(&pair, PairState::Fetching);

        let fetched = {
            let permit = tokio::select! {
                permit = semaphore.clone().acquire_owned() => permit,
                () = cancel.cancelled() => break,
            };
            let Ok(_permit) = permit else { break };
            // Permit held only for the request itself, not the sleep.
            adapter.fetch_orderbook(symbol, config.depth).await
        };

        match fetched {
            Ok(snapshot) => {
                consecutive_errors = 0;
                let deliver = {
                    let mut latest = shared.latest.write();
                    match latest.get(&pair) {
                        // Out-of-order reading: keep the newer snapshot.
                        Some(prev) if snapshot.timestamp < prev.timestamp => false,
                        _ => {
                            latest.insert(pair.clone(), snapshot.clone());
                            true
                        }
                    }
                };
                if deliver {
                    shared.set_state(&pair, PairState::Fresh);
                    for listener in shared.listeners.read().iter() {
                        listener(&snapshot);
                    }
                }
            }
            Err(err) => {
                consecutive_errors += 1;
                warn!(
                    venue = %venue,
                    symbol = %symbol,
                    consecutive_errors,
                    error = %err,
                    "orderbook refresh failed"
                );
                if consecutive_errors >= config.max_consecutive_errors {
                    warn!(venue = %venue, symbol = %symbol, "pair stopped after repeated failures");
                    shared.set_state(&pair, PairState::Stopped);
                    break;
                }
            }
        }

        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(config.polling_interval()) => {}
        }

        // Mark the pair stale when the last reading aged out while we
        // slept; the detector re-checks staleness regardless.
        let now = Utc::now();
        let is_stale = shared
            .latest
            .read()
            .get(&pair)
            .map_or(false, |s| s.is_stale(now, max_age));
        if is_stale {
            shared.set_state(&pair, PairState::Stale);
            debug!(venue = %venue, symbol = %symbol, "snapshot aged past the staleness budget");
        }
    }
}
