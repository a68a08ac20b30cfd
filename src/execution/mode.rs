//! Mode-aware executor.
//!
//! Routes each approved verdict to the paper or live executor based on the
//! current trading mode. Live execution degrades to paper when the live
//! executor is missing or live mode is unconfirmed; an active emergency
//! stop fails the trade outright without touching any venue.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{ExecutionResult, Executor};
use crate::brain::decision::Verdict;
use crate::config::TradingMode;
use crate::models::TradeSignal;
use crate::storage::Cache;

pub struct ModeAwareExecutor {
    cache: Arc<Cache>,
    paper: Arc<dyn Executor>,
    live: Option<Arc<dyn Executor>>,
}

impl ModeAwareExecutor {
    pub fn new(cache: Arc<Cache>, paper: Arc<dyn Executor>, live: Option<Arc<dyn Executor>>) -> Self {
        Self { cache, paper, live }
    }
}

#[async_trait]
impl Executor for ModeAwareExecutor {
    async fn execute(&self, signal: &TradeSignal, verdict: &Verdict) -> ExecutionResult {
        match self.cache.mode() {
            TradingMode::Live => {
                let Some(live) = &self.live else {
                    warn!("live executor not configured, falling back to paper mode");
                    return self.paper.execute(signal, verdict).await;
                };

                if !self.cache.live_confirmed() {
                    warn!("live mode not confirmed, falling back to paper mode");
                    return self.paper.execute(signal, verdict).await;
                }

                let stop = self.cache.emergency_stop();
                if stop.active {
                    let reason = stop.reason.unwrap_or_else(|| "unknown".to_string());
                    warn!(reason = %reason, "emergency stop active, refusing execution");
                    return ExecutionResult::failure(
                        false,
                        format!("Execution blocked by emergency stop: {}", reason),
                    );
                }

                live.execute(signal, verdict).await
            }
            // Paused behaves like paper: decisions keep flowing through the
            // simulator, nothing reaches a venue.
            TradingMode::Paper | TradingMode::Paused => {
                debug!("executing in paper mode");
                self.paper.execute(signal, verdict).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Side, SignalSource, TradeAction};
    use chrono::Utc;

    struct TaggedExecutor {
        paper_mode: bool,
        tag: &'static str,
    }

    #[async_trait]
    impl Executor for TaggedExecutor {
        async fn execute(&self, _signal: &TradeSignal, _verdict: &Verdict) -> ExecutionResult {
            ExecutionResult {
                success: true,
                executed_size: 1.0,
                executed_price: 0.5,
                paper_mode: self.paper_mode,
                message: self.tag.to_string(),
            }
        }
    }

    fn signal() -> TradeSignal {
        TradeSignal {
            wallet: "0xaaa".to_string(),
            market_id: "cond-1".to_string(),
            token_id: "tok-1".to_string(),
            side: Side::Yes,
            action: TradeAction::Buy,
            size: 10.0,
            price: 0.5,
            source: SignalSource::Clob,
            timestamp: Utc::now(),
            tx_hash: String::new(),
        }
    }

    fn paper() -> Arc<dyn Executor> {
        Arc::new(TaggedExecutor {
            paper_mode: true,
            tag: "paper",
        })
    }

    fn live() -> Arc<dyn Executor> {
        Arc::new(TaggedExecutor {
            paper_mode: false,
            tag: "live",
        })
    }

    #[tokio::test]
    async fn paper_mode_routes_to_paper() {
        let cache = Arc::new(Cache::new());
        let executor = ModeAwareExecutor::new(cache, paper(), Some(live()));
        let result = executor
            .execute(&signal(), &Verdict::approve(10.0, 0.8, "go"))
            .await;
        assert_eq!(result.message, "paper");
    }

    #[tokio::test]
    async fn live_mode_without_live_executor_falls_back() {
        let cache = Arc::new(Cache::new());
        cache.set_mode(TradingMode::Live);
        cache.set_live_confirmed(true);
        let executor = ModeAwareExecutor::new(cache, paper(), None);
        let result = executor
            .execute(&signal(), &Verdict::approve(10.0, 0.8, "go"))
            .await;
        assert!(result.paper_mode);
    }

    #[tokio::test]
    async fn live_mode_unconfirmed_falls_back_to_paper() {
        let cache = Arc::new(Cache::new());
        cache.set_mode(TradingMode::Live);
        let executor = ModeAwareExecutor::new(cache, paper(), Some(live()));
        let result = executor
            .execute(&signal(), &Verdict::approve(10.0, 0.8, "go"))
            .await;
        assert!(result.paper_mode);
        assert_eq!(result.message, "paper");
    }

    #[tokio::test]
    async fn confirmed_live_mode_routes_to_live() {
        let cache = Arc::new(Cache::new());
        cache.set_mode(TradingMode::Live);
        cache.set_live_confirmed(true);
        let executor = ModeAwareExecutor::new(cache, paper(), Some(live()));
        let result = executor
            .execute(&signal(), &Verdict::approve(10.0, 0.8, "go"))
            .await;
        assert_eq!(result.message, "live");
        assert!(!result.paper_mode);
    }

    #[tokio::test]
    async fn emergency_stop_fails_without_submission() {
        let cache = Arc::new(Cache::new());
        cache.set_mode(TradingMode::Live);
        cache.set_live_confirmed(true);
        cache.set_emergency_stop("halted by operator");

        let executor = ModeAwareExecutor::new(cache, paper(), Some(live()));
        let result = executor
            .execute(&signal(), &Verdict::approve(10.0, 0.8, "go"))
            .await;
        assert!(!result.success);
        assert!(result.message.contains("halted by operator"));
    }

    #[tokio::test]
    async fn paused_mode_stays_on_paper() {
        let cache = Arc::new(Cache::new());
        cache.set_mode(TradingMode::Paused);
        let executor = ModeAwareExecutor::new(cache, paper(), Some(live()));
        let result = executor
            .execute(&signal(), &Verdict::approve(10.0, 0.8, "go"))
            .await;
        assert_eq!(result.message, "paper");
    }
}
