//! Paper executor: simulated fills with real position accounting.
//!
//! BUY opens (or adds to) a position keyed by wallet, market and outcome
//! side; SELL closes up to the available size at the signal price and
//! realizes `(exit − avg_entry) · closed`. Exposure and daily P&L move only
//! through the cache's atomic counters.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use super::{ExecutionResult, Executor};
use crate::brain::decision::Verdict;
use crate::models::{TradeAction, TradeSignal};
use crate::storage::Cache;

/// One aggregate open position. Closes reduce size and cost proportionally,
/// which marks the underlying opens closed pro-rata.
#[derive(Debug, Clone, Default)]
pub struct PaperPosition {
    pub size: f64,
    pub cost: f64,
}

impl PaperPosition {
    pub fn avg_entry_price(&self) -> f64 {
        if self.size > 0.0 {
            self.cost / self.size
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClosedFill {
    pub closed_size: f64,
    pub realized_pnl: f64,
    pub avg_entry_price: f64,
}

pub struct PaperExecutor {
    cache: Arc<Cache>,
    positions: Mutex<HashMap<(String, String, String), PaperPosition>>,
}

impl PaperExecutor {
    pub fn new(cache: Arc<Cache>) -> Self {
        Self {
            cache,
            positions: Mutex::new(HashMap::new()),
        }
    }

    fn key(signal: &TradeSignal) -> (String, String, String) {
        (
            signal.wallet.clone(),
            signal.market_id.clone(),
            signal.side.as_str().to_string(),
        )
    }

    pub fn position(&self, signal: &TradeSignal) -> Option<PaperPosition> {
        self.positions.lock().get(&Self::key(signal)).cloned()
    }

    fn open(&self, signal: &TradeSignal, size: f64, price: f64) {
        let mut positions = self.positions.lock();
        let position = positions.entry(Self::key(signal)).or_default();
        position.size += size;
        position.cost += size * price;
    }

    /// Close up to `size` of the tracked position. Returns None when nothing
    /// is open for this (wallet, market, side).
    fn close(&self, signal: &TradeSignal, size: f64, exit_price: f64) -> Option<ClosedFill> {
        let mut positions = self.positions.lock();
        let key = Self::key(signal);
        let position = positions.get_mut(&key)?;
        if position.size <= 0.0 {
            positions.remove(&key);
            return None;
        }

        let avg_entry = position.avg_entry_price();
        let closed = size.min(position.size);
        let fraction = closed / position.size;

        position.cost -= position.cost * fraction;
        position.size -= closed;
        if position.size <= 1e-9 {
            positions.remove(&key);
        }

        Some(ClosedFill {
            closed_size: closed,
            realized_pnl: (exit_price - avg_entry) * closed,
            avg_entry_price: avg_entry,
        })
    }
}

#[async_trait]
impl Executor for PaperExecutor {
    async fn execute(&self, signal: &TradeSignal, verdict: &Verdict) -> ExecutionResult {
        if !verdict.execute {
            info!(reason = %verdict.reasoning, "paper trade rejected");
            return ExecutionResult::failure(
                true,
                format!("Trade rejected: {}", verdict.reasoning),
            );
        }

        match signal.action {
            TradeAction::Buy => {
                let executed_size = verdict.size;
                let executed_price = signal.price;
                self.open(signal, executed_size, executed_price);
                self.cache.update_open_exposure(executed_size);

                info!(
                    market = %signal.market_id,
                    side = signal.side.as_str(),
                    size = executed_size,
                    price = executed_price,
                    "paper trade executed"
                );
                ExecutionResult {
                    success: true,
                    executed_size,
                    executed_price,
                    paper_mode: true,
                    message: format!(
                        "Paper trade executed: {} {:.4} @ {:.4}",
                        signal.side.as_str(),
                        executed_size,
                        executed_price
                    ),
                }
            }
            TradeAction::Sell => {
                let Some(fill) = self.close(signal, verdict.size, signal.price) else {
                    return ExecutionResult::failure(
                        true,
                        format!(
                            "No open {} position on {} to close",
                            signal.side.as_str(),
                            signal.market_id
                        ),
                    );
                };

                self.cache.update_open_exposure(-fill.closed_size);
                self.cache.update_daily_pnl(fill.realized_pnl);

                info!(
                    market = %signal.market_id,
                    side = signal.side.as_str(),
                    closed = fill.closed_size,
                    realized = fill.realized_pnl,
                    "paper position closed"
                );
                ExecutionResult {
                    success: true,
                    executed_size: fill.closed_size,
                    executed_price: signal.price,
                    paper_mode: true,
                    message: format!(
                        "Paper position closed: {} {:.4} @ {:.4} (entry {:.4}, realized {:+.2})",
                        signal.side.as_str(),
                        fill.closed_size,
                        signal.price,
                        fill.avg_entry_price,
                        fill.realized_pnl
                    ),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Side, SignalSource};
    use chrono::Utc;

    fn signal(action: TradeAction, price: f64) -> TradeSignal {
        TradeSignal {
            wallet: "0xaaa".to_string(),
            market_id: "cond-1".to_string(),
            token_id: "tok-1".to_string(),
            side: Side::Yes,
            action,
            size: 50.0,
            price,
            source: SignalSource::Clob,
            timestamp: Utc::now(),
            tx_hash: String::new(),
        }
    }

    #[tokio::test]
    async fn buy_fills_at_signal_price_and_bumps_exposure() {
        let cache = Arc::new(Cache::new());
        let executor = PaperExecutor::new(cache.clone());

        let result = executor
            .execute(&signal(TradeAction::Buy, 0.40), &Verdict::approve(75.0, 0.8, "go"))
            .await;

        assert!(result.success);
        assert!(result.paper_mode);
        assert_eq!(result.executed_size, 75.0);
        assert_eq!(result.executed_price, 0.40);
        assert_eq!(cache.open_exposure(), 75.0);
    }

    #[tokio::test]
    async fn rejection_executes_nothing() {
        let cache = Arc::new(Cache::new());
        let executor = PaperExecutor::new(cache.clone());

        let result = executor
            .execute(&signal(TradeAction::Buy, 0.40), &Verdict::reject("low confidence"))
            .await;

        assert!(!result.success);
        assert!(result.message.contains("low confidence"));
        assert_eq!(cache.open_exposure(), 0.0);
    }

    #[tokio::test]
    async fn sell_closes_and_realizes_pnl() {
        let cache = Arc::new(Cache::new());
        let executor = PaperExecutor::new(cache.clone());

        executor
            .execute(&signal(TradeAction::Buy, 0.40), &Verdict::approve(100.0, 0.8, "go"))
            .await;
        let result = executor
            .execute(&signal(TradeAction::Sell, 0.60), &Verdict::approve(40.0, 0.8, "take profit"))
            .await;

        assert!(result.success);
        assert_eq!(result.executed_size, 40.0);
        // (0.60 - 0.40) * 40
        assert!((cache.daily_pnl() - 8.0).abs() < 1e-9);
        assert!((cache.open_exposure() - 60.0).abs() < 1e-9);

        let remaining = executor.position(&signal(TradeAction::Sell, 0.6)).unwrap();
        assert!((remaining.size - 60.0).abs() < 1e-9);
        assert!((remaining.avg_entry_price() - 0.40).abs() < 1e-9);
    }

    #[tokio::test]
    async fn sell_caps_at_available_size() {
        let cache = Arc::new(Cache::new());
        let executor = PaperExecutor::new(cache.clone());

        executor
            .execute(&signal(TradeAction::Buy, 0.50), &Verdict::approve(30.0, 0.8, "go"))
            .await;
        let result = executor
            .execute(&signal(TradeAction::Sell, 0.55), &Verdict::approve(100.0, 0.8, "close"))
            .await;

        assert!(result.success);
        assert_eq!(result.executed_size, 30.0);
        assert!(executor.position(&signal(TradeAction::Sell, 0.55)).is_none());
        assert!(cache.open_exposure().abs() < 1e-9);
    }

    #[tokio::test]
    async fn sell_without_position_fails() {
        let cache = Arc::new(Cache::new());
        let executor = PaperExecutor::new(cache.clone());

        let result = executor
            .execute(&signal(TradeAction::Sell, 0.55), &Verdict::approve(10.0, 0.8, "close"))
            .await;
        assert!(!result.success);
        assert!(result.message.contains("No open"));
    }

    #[tokio::test]
    async fn averaged_entries_blend_cost_basis() {
        let cache = Arc::new(Cache::new());
        let executor = PaperExecutor::new(cache.clone());

        executor
            .execute(&signal(TradeAction::Buy, 0.40), &Verdict::approve(50.0, 0.8, "go"))
            .await;
        executor
            .execute(&signal(TradeAction::Buy, 0.60), &Verdict::approve(50.0, 0.8, "add"))
            .await;

        let position = executor.position(&signal(TradeAction::Buy, 0.0)).unwrap();
        assert!((position.avg_entry_price() - 0.50).abs() < 1e-9);

        executor
            .execute(&signal(TradeAction::Sell, 0.70), &Verdict::approve(100.0, 0.8, "close"))
            .await;
        // (0.70 - 0.50) * 100
        assert!((cache.daily_pnl() - 20.0).abs() < 1e-9);
    }
}
