//! Dual-leg order execution.
//!
//! `execute` takes a detected opportunity through the full protocol:
//! freshness recheck, risk gate, advisor consultation, concurrent
//! placement of both legs, poll-to-fill, orphan cancellation, and
//! compensation accounting. Exactly one trade record is journaled per
//! execution; journaling failures never alter the outcome.

use crate::advisor::MakerTakerAdvisor;
use crate::cancel::CancelToken;
use crate::detector::{ArbitrageOpportunity, Detector};
use crate::risk::{RejectReason, RiskEngine};
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use spot_arb_core::{
    ExecutorConfig, FeatureRecord, Order, Side, TradeJournal, TradeOutcome, TradeRecord,
    TradingConfig, VenueError, VenueId, VenueResult,
};
use spot_arb_exchanges::{retry, PlaceOrderRequest, RetryPolicy, VenueAdapter};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Upper bound on remembered opportunity fingerprints.
const FINGERPRINT_CAPACITY: usize = 16_384;

// =============================================================================
// Execution Result
// =============================================================================

/// Terminal classification of one execution attempt.
#[derive(Debug, Clone)]
pub enum ExecutionResult {
    /// Both legs filled at matching size.
    Success {
        /// The journaled trade.
        trade: TradeRecord,
    },

    /// Rejected before any order was placed.
    Rejected {
        /// The failing check.
        reason: RejectReason,
    },

    /// Residual directional exposure remains; operators decide how to
    /// compensate.
    Partial {
        /// The journaled trade.
        trade: TradeRecord,
        /// Residual exposure in base units (positive = long).
        exposure: Decimal,
        /// Currency of the exposure.
        exposure_currency: String,
        /// Side of the exposure: `Buy` when long the base currency.
        exposure_side: Side,
    },

    /// Nothing filled; the attempt failed outright.
    Failed {
        /// Human-readable detail.
        reason: String,
    },

    /// The polling deadline elapsed with no fills; open legs were
    /// cancelled.
    Timeout {
        /// The journaled trade.
        trade: TradeRecord,
    },

    /// Cooperative cancellation tore the execution down.
    Cancelled,
}

impl ExecutionResult {
    /// True when both legs filled at matching size.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

// =============================================================================
// Order Executor
// =============================================================================

/// Executes opportunities as two matched opposing orders.
pub struct OrderExecutor {
    adapters: HashMap<VenueId, Arc<dyn VenueAdapter>>,
    detector: Detector,
    risk: Arc<RiskEngine>,
    advisor: Option<Arc<dyn MakerTakerAdvisor>>,
    journal: Arc<dyn TradeJournal>,
    config: ExecutorConfig,
    trading: TradingConfig,
    advisor_failures: AtomicU64,
    post_only_downgrades: AtomicU64,
    active_orders: Mutex<HashMap<String, Order>>,
    fingerprints: Mutex<(VecDeque<String>, HashSet<String>)>,
}

impl OrderExecutor {
    /// Creates an executor.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        adapters: HashMap<VenueId, Arc<dyn VenueAdapter>>,
        detector: Detector,
        risk: Arc<RiskEngine>,
        advisor: Option<Arc<dyn MakerTakerAdvisor>>,
        journal: Arc<dyn TradeJournal>,
        config: ExecutorConfig,
        trading: TradingConfig,
    ) -> Self {
        Self {
            adapters,
            detector,
            risk,
            advisor,
            journal,
            config,
            trading,
            advisor_failures: AtomicU64::new(0),
            post_only_downgrades: AtomicU64::new(0),
            active_orders: Mutex::new(HashMap::new()),
            fingerprints: Mutex::new((VecDeque::new(), HashSet::new())),
        }
    }

    /// Times the advisor failed and the executor fell back to taker.
    #[must_use]
    pub fn advisor_failures(&self) -> u64 {
        self.advisor_failures.load(Ordering::SeqCst)
    }

    /// Maker requests silently downgraded to taker because the venue
    /// does not honour post-only.
    #[must_use]
    pub fn post_only_downgrades(&self) -> u64 {
        self.post_only_downgrades.load(Ordering::SeqCst)
    }

    /// In-flight orders, keyed by venue order id.
    #[must_use]
    pub fn active_orders(&self) -> Vec<Order> {
        self.active_orders.lock().values().cloned().collect()
    }

    fn adapter(&self, venue: VenueId) -> VenueResult<Arc<dyn VenueAdapter>> {
        self.adapters
            .get(&venue)
            .cloned()
            .ok_or_else(|| VenueError::InvalidInput {
                field: "venue",
                message: format!("no adapter configured for {venue}"),
            })
    }

    /// Registers an opportunity fingerprint, returning false when it was
    /// already seen. Replaying the same opportunity never produces two
    /// trades.
    fn register_fingerprint(&self, fingerprint: &str) -> bool {
        let mut guard = self.fingerprints.lock();
        let (order, set) = &mut *guard;
        if set.contains(fingerprint) {
            return false;
        }
        set.insert(fingerprint.to_string());
        order.push_back(fingerprint.to_string());
        while order.len() > FINGERPRINT_CAPACITY {
            if let Some(evicted) = order.pop_front() {
                set.remove(&evicted);
            }
        }
        true
    }

    fn track_order(&self, order: &Order) {
        if let Some(id) = &order.venue_order_id {
            let mut registry = self.active_orders.lock();
            if order.is_terminal() {
                registry.remove(id);
            } else {
                registry.insert(id.clone(), order.clone());
            }
        }
    }

    async fn journal_order(&self, order: &Order) {
        if let Err(err) = self.journal.record_order(order).await {
            warn!(error = %err, "order journaling failed");
        }
    }

    async fn journal_features(&self, features: &FeatureRecord) {
        if let Err(err) = self.journal.record_features(features).await {
            warn!(error = %err, "feature journaling failed");
        }
    }

    async fn journal_trade(&self, trade: &TradeRecord) {
        if let Err(err) = self.journal.record_trade(trade).await {
            warn!(error = %err, "trade journaling failed");
        }
    }

    /// Decides maker-vs-taker for one leg. Advisor absence, ill health,
    /// or failure defaults to taker; venues without post-only support
    /// silently downgrade.
    async fn decide_leg(
        &self,
        features: Option<&FeatureRecord>,
        adapter: &Arc<dyn VenueAdapter>,
    ) -> bool {
        let Some(advisor) = &self.advisor else {
            return false;
        };
        if !advisor.is_healthy() {
            return false;
        }
        let Some(features) = features else {
            return false;
        };
        match advisor.advise(features).await {
            Ok(advice) => {
                if advice.use_maker && !adapter.supports_post_only() {
                    self.post_only_downgrades.fetch_add(1, Ordering::SeqCst);
                    debug!(
                        venue = %adapter.venue(),
                        confidence = advice.confidence,
                        "venue does not honour post-only, downgrading leg to taker"
                    );
                    false
                } else {
                    advice.use_maker
                }
            }
            Err(err) => {
                self.advisor_failures.fetch_add(1, Ordering::SeqCst);
                warn!(error = %err, "advisor failed, defaulting leg to taker");
                false
            }
        }
    }

    /// Places one leg, retrying transport errors only, with a per-call
    /// network timeout. Breaker accounting happens here.
    async fn place_leg(
        &self,
        adapter: &Arc<dyn VenueAdapter>,
        request: &PlaceOrderRequest,
    ) -> VenueResult<Order> {
        let venue = adapter.venue();
        let policy = RetryPolicy::default().with_max_retries(self.trading.max_retries);
        let net_timeout = self.config.net_timeout();

        let adapter_ref: &Arc<dyn VenueAdapter> = adapter;
        let result = retry(&policy, "executor.place_order", move || async move {
            match tokio::time::timeout(net_timeout, adapter_ref.place_order(request)).await {
                Ok(inner) => inner,
                Err(_) => Err(VenueError::Timeout(format!(
                    "order placement on {venue} exceeded {net_timeout:?}"
                ))),
            }
        })
        .await;

        match &result {
            Ok(order) => {
                self.risk.connectivity.record_success(venue);
                self.risk.error_rate.record(venue, true);
                info!(
                    venue = %venue,
                    order_id = order.venue_order_id.as_deref().unwrap_or("-"),
                    side = %order.side,
                    quantity = %order.quantity,
                    price = %order.price.unwrap_or(Decimal::ZERO),
                    "leg placed"
                );
                self.track_order(order);
                self.journal_order(order).await;
            }
            Err(err) => {
                if err.is_connectivity() {
                    self.risk.connectivity.record_failure(venue);
                }
                self.risk.error_rate.record(venue, false);
                warn!(venue = %venue, error = %err, "leg placement failed");
            }
        }
        result
    }

    /// Polls one leg once, merging the result into `order`.
    async fn poll_leg(&self, adapter: &Arc<dyn VenueAdapter>, order: &mut Order) {
        let Some(order_id) = order.venue_order_id.clone() else {
            return;
        };
        let venue = adapter.venue();
        let poll = tokio::time::timeout(
            self.config.net_timeout(),
            adapter.get_order(&order_id, Some(&order.symbol)),
        )
        .await;
        match poll {
            Ok(Ok(polled)) => {
                self.risk.connectivity.record_success(venue);
                self.risk.error_rate.record(venue, true);
                let before = order.status;
                order.apply_update(&polled);
                if order.status != before {
                    debug!(
                        venue = %venue,
                        order_id = %order_id,
                        from = %before,
                        to = %order.status,
                        filled = %order.filled_quantity,
                        "leg status changed"
                    );
                    self.journal_order(order).await;
                }
                self.track_order(order);
            }
            Ok(Err(err)) => {
                if err.is_connectivity() {
                    self.risk.connectivity.record_failure(venue);
                }
                self.risk.error_rate.record(venue, false);
                warn!(venue = %venue, order_id = %order_id, error = %err, "status poll failed");
            }
            Err(_) => {
                self.risk.connectivity.record_failure(venue);
                self.risk.error_rate.record(venue, false);
                warn!(venue = %venue, order_id = %order_id, "status poll timed out");
            }
        }
    }

    /// Cancels a leg, retrying until the venue reports the order absent
    /// or terminal, then refreshes its final state to capture any fill
    /// that landed before the cancel.
    async fn cancel_leg(&self, adapter: &Arc<dyn VenueAdapter>, order: &mut Order) {
        let Some(order_id) = order.venue_order_id.clone() else {
            // Never acknowledged: nothing to cancel.
            if !order.is_terminal() {
                order.status = spot_arb_core::OrderStatus::Cancelled;
                order.updated_at = Utc::now();
            }
            return;
        };
        let venue = adapter.venue();

        for attempt in 0..=self.trading.max_retries {
            match adapter.cancel_order(&order_id, Some(&order.symbol)).await {
                Ok(_) => break,
                Err(VenueError::OrderNotFound { .. }) => break,
                Err(err) if err.is_transient() && attempt < self.trading.max_retries => {
                    warn!(venue = %venue, order_id = %order_id, error = %err, "cancel retry");
                    tokio::time::sleep(self.config.poll_interval()).await;
                }
                Err(err) => {
                    error!(venue = %venue, order_id = %order_id, error = %err, "cancel failed");
                    break;
                }
            }
        }

        // Final state: the cancel may have raced a fill.
        self.poll_leg(adapter, order).await;
        if !order.is_terminal() {
            order.status = spot_arb_core::OrderStatus::Cancelled;
            order.updated_at = Utc::now();
        }
        self.track_order(order);
        self.journal_order(order).await;
    }

    /// Executes an opportunity end to end.
    pub async fn execute(
        &self,
        opportunity: &ArbitrageOpportunity,
        cancel: &CancelToken,
    ) -> ExecutionResult {
        let fingerprint = opportunity.fingerprint();
        if !self.register_fingerprint(&fingerprint) {
            debug!(fingerprint = %fingerprint, "duplicate opportunity submission");
            return ExecutionResult::Rejected {
                reason: RejectReason::DuplicateOpportunity,
            };
        }
        self.execute_inner(opportunity, cancel).await
    }

    async fn execute_inner(
        &self,
        opportunity: &ArbitrageOpportunity,
        cancel: &CancelToken,
    ) -> ExecutionResult {
        let now = Utc::now();
        let max_age = self.trading.max_snapshot_age();

        // 1. Freshness.
        if !opportunity.is_fresh(now, max_age) {
            return ExecutionResult::Rejected {
                reason: RejectReason::Stale,
            };
        }

        let buy_adapter = match self.adapter(opportunity.buy_venue) {
            Ok(a) => a,
            Err(e) => return ExecutionResult::Failed { reason: e.to_string() },
        };
        let sell_adapter = match self.adapter(opportunity.sell_venue) {
            Ok(a) => a,
            Err(e) => return ExecutionResult::Failed { reason: e.to_string() },
        };

        // 2. Optional re-fetch and re-score before committing capital.
        let mut opp = opportunity.clone();
        let mut buy_features = None;
        let mut sell_features = None;
        if self.config.recheck_books {
            let depth = 20;
            let (buy_book, sell_book) = tokio::join!(
                buy_adapter.fetch_orderbook(&opp.symbol, depth),
                sell_adapter.fetch_orderbook(&opp.symbol, depth),
            );
            let (buy_book, sell_book) = match (buy_book, sell_book) {
                (Ok(b), Ok(s)) => (b, s),
                (Err(e), _) | (_, Err(e)) => {
                    warn!(error = %e, "book recheck failed, aborting before placement");
                    return ExecutionResult::Failed {
                        reason: format!("book recheck failed: {e}"),
                    };
                }
            };

            let recheck_now = Utc::now();
            match self.detector.detect_pair(&buy_book, &sell_book, recheck_now) {
                Some(mut rescored) => {
                    if rescored.quantity > opp.quantity {
                        // Never grow beyond what was originally risked.
                        let factor = opp.quantity / rescored.quantity;
                        rescored.net_profit_quote *= factor;
                        rescored.net_profit_reference *= factor;
                        rescored.quantity = opp.quantity;
                    }
                    opp = rescored;
                }
                None => {
                    info!(
                        symbol = %opp.symbol,
                        buy_venue = %opp.buy_venue,
                        sell_venue = %opp.sell_venue,
                        "spread collapsed between detection and execution"
                    );
                    return ExecutionResult::Rejected {
                        reason: RejectReason::SpreadCollapsed,
                    };
                }
            }

            buy_features = FeatureRecord::from_snapshot(&buy_book);
            sell_features = FeatureRecord::from_snapshot(&sell_book);
            if let Some(f) = &buy_features {
                self.journal_features(f).await;
            }
            if let Some(f) = &sell_features {
                self.journal_features(f).await;
            }
        }

        // 3. Risk gate.
        if let Err(reason) = self.risk.pre_trade_check(&opp) {
            warn!(code = reason.code(), detail = %reason, "pre-trade check failed");
            return ExecutionResult::Rejected { reason };
        }

        // 4. Advisor consultation per leg.
        let buy_maker = self.decide_leg(buy_features.as_ref(), &buy_adapter).await;
        let sell_maker = self.decide_leg(sell_features.as_ref(), &sell_adapter).await;

        if cancel.is_cancelled() {
            return ExecutionResult::Cancelled;
        }

        // 5. Concurrent dual-leg placement.
        let buy_request =
            PlaceOrderRequest::limit(opp.symbol.clone(), Side::Buy, opp.quantity, opp.buy_price)
                .with_post_only(buy_maker);
        let sell_request =
            PlaceOrderRequest::limit(opp.symbol.clone(), Side::Sell, opp.quantity, opp.sell_price)
                .with_post_only(sell_maker);

        info!(
            symbol = %opp.symbol,
            buy_venue = %opp.buy_venue,
            sell_venue = %opp.sell_venue,
            quantity = %opp.quantity,
            buy_price = %opp.buy_price,
            sell_price = %opp.sell_price,
            expected_profit = %opp.net_profit_reference,
            buy_maker,
            sell_maker,
            "executing arbitrage"
        );

        let (buy_placed, sell_placed) = tokio::join!(
            self.place_leg(&buy_adapter, &buy_request),
            self.place_leg(&sell_adapter, &sell_request),
        );

        let (mut buy_order, mut sell_order) = match (buy_placed, sell_placed) {
            (Ok(b), Ok(s)) => (b, s),
            (Ok(mut b), Err(sell_err)) => {
                warn!(error = %sell_err, "sell leg failed, cancelling buy leg");
                self.cancel_leg(&buy_adapter, &mut b).await;
                return self
                    .finish(&opp, Some(b), None, buy_maker, sell_maker, false)
                    .await;
            }
            (Err(buy_err), Ok(mut s)) => {
                warn!(error = %buy_err, "buy leg failed, cancelling sell leg");
                self.cancel_leg(&sell_adapter, &mut s).await;
                return self
                    .finish(&opp, None, Some(s), buy_maker, sell_maker, false)
                    .await;
            }
            (Err(buy_err), Err(sell_err)) => {
                let trade = build_trade(&opp, None, None, Decimal::ZERO, TradeOutcome::Failed);
                self.journal_trade(&trade).await;
                return ExecutionResult::Failed {
                    reason: format!("both legs rejected: buy: {buy_err}; sell: {sell_err}"),
                };
            }
        };

        // 6. Poll to fill until both terminal or the deadline elapses.
        let deadline = Instant::now() + self.config.total_deadline();
        let mut timed_out = false;
        while !(buy_order.is_terminal() && sell_order.is_terminal()) {
            if Instant::now() >= deadline {
                timed_out = true;
                break;
            }
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("execution cancelled, tearing down polling");
                    if !buy_order.is_terminal() {
                        self.cancel_leg(&buy_adapter, &mut buy_order).await;
                    }
                    if !sell_order.is_terminal() {
                        self.cancel_leg(&sell_adapter, &mut sell_order).await;
                    }
                    let summary = reconcile(&opp, &buy_order, &sell_order);
                    let trade = build_trade(
                        &opp,
                        Some(buy_order),
                        Some(sell_order),
                        summary.realized_profit(&opp, buy_maker, sell_maker, &self.fee_rates()),
                        TradeOutcome::Cancelled,
                    );
                    self.journal_trade(&trade).await;
                    return ExecutionResult::Cancelled;
                }
                () = tokio::time::sleep(self.config.poll_interval()) => {}
            }
            if !buy_order.is_terminal() {
                self.poll_leg(&buy_adapter, &mut buy_order).await;
            }
            if !sell_order.is_terminal() {
                self.poll_leg(&sell_adapter, &mut sell_order).await;
            }
        }

        // 7. Deadline: cancel whatever is still working.
        if timed_out {
            if !buy_order.is_terminal() {
                self.cancel_leg(&buy_adapter, &mut buy_order).await;
            }
            if !sell_order.is_terminal() {
                self.cancel_leg(&sell_adapter, &mut sell_order).await;
            }
        }

        self.finish(
            &opp,
            Some(buy_order),
            Some(sell_order),
            buy_maker,
            sell_maker,
            timed_out,
        )
        .await
    }

    fn fee_rates(&self) -> HashMap<VenueId, (Decimal, Decimal)> {
        self.adapters
            .iter()
            .map(|(venue, adapter)| (*venue, (adapter.maker_fee(), adapter.taker_fee())))
            .collect()
    }

    /// Reconciles the final leg states, journals the single trade
    /// record, updates risk accounting, and classifies the outcome.
    async fn finish(
        &self,
        opp: &ArbitrageOpportunity,
        buy_order: Option<Order>,
        sell_order: Option<Order>,
        buy_maker: bool,
        sell_maker: bool,
        timed_out: bool,
    ) -> ExecutionResult {
        let buy_ref = buy_order.as_ref();
        let sell_ref = sell_order.as_ref();

        let summary = match (buy_ref, sell_ref) {
            (Some(b), Some(s)) => reconcile(opp, b, s),
            (Some(b), None) => reconcile_single(opp, b, Side::Buy),
            (None, Some(s)) => reconcile_single(opp, s, Side::Sell),
            (None, None) => ReconcileSummary::default(),
        };

        let realized = summary.realized_profit(opp, buy_maker, sell_maker, &self.fee_rates());
        let position_value = summary.matched * opp.buy_price;
        self.risk
            .record_execution(opp.buy_venue, opp.sell_venue, position_value, realized);

        let outcome = if summary.matched > Decimal::ZERO && summary.exposure == Decimal::ZERO {
            TradeOutcome::Success
        } else if summary.exposure != Decimal::ZERO {
            TradeOutcome::Partial
        } else if timed_out {
            TradeOutcome::Timeout
        } else {
            TradeOutcome::Failed
        };

        let trade = build_trade(opp, buy_order, sell_order, realized, outcome);
        self.journal_trade(&trade).await;

        match outcome {
            TradeOutcome::Success => {
                info!(
                    trade_id = %trade.id,
                    matched = %trade.matched_quantity,
                    realized = %trade.realized_profit,
                    "arbitrage completed"
                );
                ExecutionResult::Success { trade }
            }
            TradeOutcome::Partial => {
                let exposure_side = if summary.exposure > Decimal::ZERO {
                    Side::Buy
                } else {
                    Side::Sell
                };
                warn!(
                    trade_id = %trade.id,
                    exposure = %summary.exposure,
                    currency = %opp.symbol.base(),
                    "residual exposure left for operator compensation"
                );
                ExecutionResult::Partial {
                    exposure: summary.exposure.abs(),
                    exposure_currency: opp.symbol.base().to_string(),
                    exposure_side,
                    trade,
                }
            }
            TradeOutcome::Timeout => ExecutionResult::Timeout { trade },
            _ => ExecutionResult::Failed {
                reason: "no fills on either leg".to_string(),
            },
        }
    }
}

impl std::fmt::Debug for OrderExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderExecutor")
            .field("venues", &self.adapters.keys().collect::<Vec<_>>())
            .field("advisor", &self.advisor.is_some())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Reconciliation
// =============================================================================

/// Fill summary across the two legs.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReconcileSummary {
    /// Matched size: `min(filled_buy, filled_sell)`.
    pub matched: Decimal,
    /// Residual exposure in base units: `filled_buy − filled_sell`.
    pub exposure: Decimal,
    /// Effective buy price over the matched size.
    pub buy_price: Decimal,
    /// Effective sell price over the matched size.
    pub sell_price: Decimal,
}

impl ReconcileSummary {
    /// Realised net profit over the matched size, applying the fee rate
    /// each leg actually traded at (maker when the leg went out
    /// post-only, taker otherwise).
    #[must_use]
    pub fn realized_profit(
        &self,
        opp: &ArbitrageOpportunity,
        buy_maker: bool,
        sell_maker: bool,
        fees: &HashMap<VenueId, (Decimal, Decimal)>,
    ) -> Decimal {
        if self.matched <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let rate = |venue: VenueId, maker: bool| {
            let (maker_fee, taker_fee) = fees
                .get(&venue)
                .copied()
                .unwrap_or((venue.default_maker_fee(), venue.default_taker_fee()));
            if maker {
                maker_fee
            } else {
                taker_fee
            }
        };
        let buy_fee = rate(opp.buy_venue, buy_maker);
        let sell_fee = rate(opp.sell_venue, sell_maker);
        self.matched
            * (self.sell_price * (Decimal::ONE - sell_fee)
                - self.buy_price * (Decimal::ONE + buy_fee))
    }
}

/// Reconciles two final leg states.
#[must_use]
pub fn reconcile(
    opp: &ArbitrageOpportunity,
    buy_order: &Order,
    sell_order: &Order,
) -> ReconcileSummary {
    let matched = buy_order.filled_quantity.min(sell_order.filled_quantity);
    ReconcileSummary {
        matched,
        exposure: buy_order.filled_quantity - sell_order.filled_quantity,
        buy_price: buy_order.avg_fill_price.unwrap_or(opp.buy_price),
        sell_price: sell_order.avg_fill_price.unwrap_or(opp.sell_price),
    }
}

/// Reconciles when only one leg ever reached a venue.
#[must_use]
pub fn reconcile_single(
    opp: &ArbitrageOpportunity,
    order: &Order,
    side: Side,
) -> ReconcileSummary {
    let signed = match side {
        Side::Buy => order.filled_quantity,
        Side::Sell => -order.filled_quantity,
    };
    ReconcileSummary {
        matched: Decimal::ZERO,
        exposure: signed,
        buy_price: opp.buy_price,
        sell_price: opp.sell_price,
    }
}

/// Builds the single trade record for an execution attempt.
#[must_use]
fn build_trade(
    opp: &ArbitrageOpportunity,
    buy_order: Option<Order>,
    sell_order: Option<Order>,
    realized_profit: Decimal,
    outcome: TradeOutcome,
) -> TradeRecord {
    let filled = |o: &Option<Order>| {
        o.as_ref()
            .map(|o| o.filled_quantity)
            .unwrap_or(Decimal::ZERO)
    };
    let matched = filled(&buy_order).min(filled(&sell_order));
    let exposure = filled(&buy_order) - filled(&sell_order);
    TradeRecord {
        id: Uuid::new_v4(),
        symbol: opp.symbol.clone(),
        buy_venue: opp.buy_venue,
        sell_venue: opp.sell_venue,
        buy_order,
        sell_order,
        matched_quantity: matched,
        realized_profit,
        exposure,
        exposure_currency: opp.symbol.base().to_string(),
        expected_profit: opp.net_profit_reference,
        outcome,
        recorded_at: Utc::now(),
    }
}
