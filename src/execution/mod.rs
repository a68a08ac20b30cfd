//! Trade execution: paper simulation, live submission, order lifecycle and
//! the safety interlocks that sit in front of live mode.

pub mod live;
pub mod manager;
pub mod mode;
pub mod order;
pub mod paper;
pub mod safety;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::brain::decision::Verdict;
use crate::models::TradeSignal;

/// Result of one execution attempt, simulated or live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub executed_size: f64,
    pub executed_price: f64,
    pub paper_mode: bool,
    pub message: String,
}

impl ExecutionResult {
    pub fn failure(paper_mode: bool, message: impl Into<String>) -> Self {
        Self {
            success: false,
            executed_size: 0.0,
            executed_price: 0.0,
            paper_mode,
            message: message.into(),
        }
    }
}

/// The one contract every executor satisfies.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, signal: &TradeSignal, verdict: &Verdict) -> ExecutionResult;
}
