//! Live executor: real order submission through the order manager.
//!
//! Each approved verdict becomes one Order driven through the retry-capable
//! lifecycle. Fills and partials bump the shared exposure counter; anything
//! else comes back as a failure result with the order's last failure reason.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info};

use super::manager::OrderManager;
use super::order::OrderStatus;
use super::{ExecutionResult, Executor};
use crate::brain::decision::Verdict;
use crate::models::TradeSignal;
use crate::storage::Cache;

pub struct LiveExecutor {
    manager: Arc<OrderManager>,
    cache: Arc<Cache>,
}

impl LiveExecutor {
    pub fn new(manager: Arc<OrderManager>, cache: Arc<Cache>) -> Self {
        Self { manager, cache }
    }
}

#[async_trait]
impl Executor for LiveExecutor {
    async fn execute(&self, signal: &TradeSignal, verdict: &Verdict) -> ExecutionResult {
        if !verdict.execute {
            return ExecutionResult::failure(
                false,
                format!("Trade rejected: {}", verdict.reasoning),
            );
        }

        info!(
            market = %signal.market_id,
            side = signal.side.as_str(),
            size = verdict.size,
            "submitting LIVE order"
        );

        let order = match self
            .manager
            .create_order(
                &signal.dedup_id(),
                &signal.market_id,
                signal.action,
                verdict.size,
                signal.price,
            )
            .await
        {
            Ok(order) => order,
            Err(e) => {
                error!(error = %e, "failed to persist live order");
                return ExecutionResult::failure(false, format!("Live execution failed: {}", e));
            }
        };

        let order = match self.manager.execute_with_retry(order).await {
            Ok(order) => order,
            Err(e) => {
                error!(error = %e, "live order lifecycle failed");
                return ExecutionResult::failure(false, format!("Live execution failed: {}", e));
            }
        };

        match order.status {
            OrderStatus::Filled | OrderStatus::Partial => {
                self.cache.update_open_exposure(order.filled_size);
                ExecutionResult {
                    success: true,
                    executed_size: order.filled_size,
                    executed_price: order.filled_price.unwrap_or(signal.price),
                    paper_mode: false,
                    message: format!("Live trade {}", order.status.as_str()),
                }
            }
            status => ExecutionResult::failure(
                false,
                format!(
                    "Live trade {}: {}",
                    status.as_str(),
                    order.failure_reason.unwrap_or_else(|| "no fill".to_string())
                ),
            ),
        }
    }
}
