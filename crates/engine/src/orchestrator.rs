//! Wires the price stream, detector, and executor together.
//!
//! Snapshot updates feed the volatility breaker and trigger a scan;
//! the top-ranked opportunity goes to the executor with single-flight
//! per market. Startup adopts and cancels orphan orders left over from
//! a previous run.

use crate::cancel::CancelToken;
use crate::detector::Detector;
use crate::executor::{ExecutionResult, OrderExecutor};
use crate::risk::RiskEngine;
use crate::stream::PriceStream;
use chrono::Utc;
use parking_lot::Mutex;
use spot_arb_core::{QuoteFamily, Symbol, VenueId};
use spot_arb_exchanges::VenueAdapter;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

type MarketKey = (String, QuoteFamily);

/// Top-level trading loop.
pub struct Orchestrator {
    stream: Arc<PriceStream>,
    detector: Detector,
    executor: Arc<OrderExecutor>,
    risk: Arc<RiskEngine>,
    adapters: HashMap<VenueId, Arc<dyn VenueAdapter>>,
    busy_markets: Arc<Mutex<HashSet<MarketKey>>>,
}

impl Orchestrator {
    /// Creates the orchestrator.
    #[must_use]
    pub fn new(
        stream: Arc<PriceStream>,
        detector: Detector,
        executor: Arc<OrderExecutor>,
        risk: Arc<RiskEngine>,
        adapters: HashMap<VenueId, Arc<dyn VenueAdapter>>,
    ) -> Self {
        Self {
            stream,
            detector,
            executor,
            risk,
            adapters,
            busy_markets: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Adopts orders left open by a previous run and cancels them.
    /// An orphan's counterpart leg is gone, so the safe recovery is to
    /// take it off the book.
    pub async fn recover_orphans(&self) {
        for (venue, adapter) in &self.adapters {
            if !adapter.is_authenticated() {
                continue;
            }
            match adapter.get_open_orders(None).await {
                Ok(orders) if orders.is_empty() => {}
                Ok(orders) => {
                    warn!(venue = %venue, count = orders.len(), "cancelling orphan orders");
                    for order in orders {
                        if let Some(id) = &order.venue_order_id {
                            if let Err(err) = adapter.cancel_order(id, Some(&order.symbol)).await {
                                warn!(
                                    venue = %venue,
                                    order_id = %id,
                                    error = %err,
                                    "orphan cancellation failed"
                                );
                            }
                        }
                    }
                }
                Err(err) => {
                    warn!(venue = %venue, error = %err, "orphan recovery listing failed");
                }
            }
        }
    }

    /// Refreshes last-known balances for the risk gate. A failing
    /// balance endpoint keeps the previous observation and is not a
    /// connectivity signal.
    pub async fn refresh_balances(&self, currencies: &[String]) {
        for (venue, adapter) in &self.adapters {
            if !adapter.is_authenticated() {
                continue;
            }
            for currency in currencies {
                match adapter.get_balance(currency).await {
                    Ok(balance) => self.risk.update_balance(*venue, balance),
                    Err(err) => {
                        warn!(
                            venue = %venue,
                            currency = %currency,
                            error = %err,
                            "balance refresh failed, keeping last known"
                        );
                    }
                }
            }
        }
    }

    /// Runs the stream-scan-execute loop until cancelled.
    pub async fn run(&self, cancel: CancelToken) {
        self.recover_orphans().await;

        // Snapshot updates arrive on the stream's polling tasks; the
        // listener must not block, so it only feeds the volatility
        // breaker and queues the market for scanning.
        let (update_tx, mut update_rx) = mpsc::unbounded_channel::<MarketKey>();
        let risk = self.risk.clone();
        self.stream.subscribe(Arc::new(move |snapshot| {
            if let Some(mid) = snapshot.mid_price() {
                risk.volatility.record_price(&snapshot.symbol, mid);
            }
            let _ = update_tx.send(snapshot.symbol.market_key());
        }));

        self.stream.start();
        info!("orchestrator running");

        loop {
            let market = tokio::select! {
                () = cancel.cancelled() => break,
                market = update_rx.recv() => match market {
                    Some(market) => market,
                    None => break,
                },
            };
            self.scan_market(&market, &cancel);
        }

        self.stream.stop().await;
        info!("orchestrator stopped");
    }

    /// Scans one market and dispatches the best opportunity, at most
    /// one execution in flight per market.
    fn scan_market(&self, market: &MarketKey, cancel: &CancelToken) {
        let now = Utc::now();
        let snapshots: Vec<_> = self
            .stream
            .all_fresh(now)
            .into_iter()
            .filter(|s| s.symbol.market_key() == *market)
            .collect();
        if snapshots.len() < 2 {
            return;
        }

        let opportunities = self.detector.scan(&snapshots, now);
        let Some(best) = opportunities.into_iter().next() else {
            return;
        };

        {
            let mut busy = self.busy_markets.lock();
            if !busy.insert(market.clone()) {
                return;
            }
        }

        let executor = self.executor.clone();
        let busy_markets = self.busy_markets.clone();
        let market = market.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let result = executor.execute(&best, &cancel).await;
            match &result {
                ExecutionResult::Success { trade } => info!(
                    trade_id = %trade.id,
                    profit = %trade.realized_profit,
                    "execution succeeded"
                ),
                ExecutionResult::Rejected { reason } => {
                    info!(code = reason.code(), "execution rejected");
                }
                ExecutionResult::Partial { exposure, exposure_currency, .. } => warn!(
                    exposure = %exposure,
                    currency = %exposure_currency,
                    "execution left exposure"
                ),
                ExecutionResult::Failed { reason } => warn!(reason = %reason, "execution failed"),
                ExecutionResult::Timeout { trade } => {
                    warn!(trade_id = %trade.id, "execution timed out");
                }
                ExecutionResult::Cancelled => info!("execution cancelled"),
            }
            busy_markets.lock().remove(&market);
        });
    }

    /// Symbols the orchestrator needs balances for, derived from the
    /// configured pairs.
    #[must_use]
    pub fn balance_currencies(symbols: &[Symbol]) -> Vec<String> {
        let mut currencies: Vec<String> = symbols
            .iter()
            .flat_map(|s| [s.base().to_string(), s.quote_currency().to_string()])
            .collect();
        currencies.sort();
        currencies.dedup();
        currencies
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("venues", &self.adapters.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balance_currencies_deduped() {
        let symbols = vec![
            Symbol::parse("BTCUSDT").unwrap(),
            Symbol::parse("ETHUSDT").unwrap(),
            Symbol::parse("BTCIRT").unwrap(),
        ];
        let currencies = Orchestrator::balance_currencies(&symbols);
        assert_eq!(currencies, vec!["BTC", "ETH", "IRT", "USDT"]);
    }
}
