//! Decision orchestrator: the single pipeline entry per signal.
//!
//! Context → advisor verdict → slippage pre-check → risk validation →
//! mode-aware execution, with a Trade row persisted at decision time whether
//! or not anything executed. The orchestrator never retries; retrying is an
//! order-level concern.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::advisor::Advisor;
use super::context::{ContextBuilder, ContextExtras};
use crate::execution::{ExecutionResult, Executor};
use crate::models::TradeSignal;
use crate::risk::RiskManager;
use crate::shutdown::Shutdown;
use crate::signals::SignalQueue;
use crate::storage::database::NewTrade;
use crate::storage::Store;
use crate::venues::polymarket::PolymarketClient;
use crate::venues::MarketInfo;

/// Market metadata lookup used to enrich the context with category/title and
/// resolution time. Optional; failures degrade to empty extras.
#[async_trait]
pub trait MarketInfoService: Send + Sync {
    async fn market_info(&self, market_id: &str) -> Option<MarketInfo>;
}

#[async_trait]
impl MarketInfoService for PolymarketClient {
    async fn market_info(&self, market_id: &str) -> Option<MarketInfo> {
        self.get_market(market_id).await.ok()
    }
}

pub struct DecisionEngine {
    context_builder: ContextBuilder,
    advisor: Arc<dyn Advisor>,
    risk: Arc<RiskManager>,
    executor: Arc<dyn Executor>,
    store: Store,
    market_info: Option<Arc<dyn MarketInfoService>>,
}

impl DecisionEngine {
    pub fn new(
        context_builder: ContextBuilder,
        advisor: Arc<dyn Advisor>,
        risk: Arc<RiskManager>,
        executor: Arc<dyn Executor>,
        store: Store,
    ) -> Self {
        Self {
            context_builder,
            advisor,
            risk,
            executor,
            store,
            market_info: None,
        }
    }

    pub fn with_market_info(mut self, service: Arc<dyn MarketInfoService>) -> Self {
        self.market_info = Some(service);
        self
    }

    async fn extras_for(&self, signal: &TradeSignal) -> ContextExtras {
        let mut extras = ContextExtras::default();
        if let Some(service) = &self.market_info {
            if let Some(info) = service.market_info(&signal.market_id).await {
                extras.market_category = info.category;
                extras.market_title = info.question;
                extras.resolution_time = info.end_date;
            }
        }
        extras
    }

    /// Run one signal through the full pipeline.
    pub async fn process(&self, signal: &TradeSignal) -> ExecutionResult {
        info!(
            wallet = %truncate(&signal.wallet, 10),
            market = %signal.market_id,
            side = signal.side.as_str(),
            size = signal.size,
            "processing signal"
        );

        let extras = self.extras_for(signal).await;
        let context = self.context_builder.build(signal, &extras).await;
        debug!(market = %signal.market_id, "context built");

        let verdict = self.advisor.evaluate(&context).await;
        info!(
            execute = verdict.execute,
            size = verdict.size,
            confidence = verdict.confidence,
            "advisor verdict"
        );
        let advisor_decision = verdict.execute;
        let advisor_confidence = verdict.confidence;

        let verdict = self.risk.validate_slippage(verdict, context.market_spread);
        let validated = self.risk.validate(verdict);

        if !validated.execute {
            let rejected_by = if advisor_decision { "risk manager" } else { "advisor" };
            warn!(by = rejected_by, reason = %validated.reasoning, "trade rejected");

            let result = ExecutionResult::failure(
                true,
                format!("Trade rejected by {}: {}", rejected_by, validated.reasoning),
            );
            self.record_trade(signal, advisor_decision, advisor_confidence, &validated.reasoning, &result)
                .await;
            return result;
        }

        let result = self.executor.execute(signal, &validated).await;
        info!(
            success = result.success,
            size = result.executed_size,
            price = result.executed_price,
            "execution result"
        );

        self.record_trade(signal, advisor_decision, advisor_confidence, &validated.reasoning, &result)
            .await;
        result
    }

    async fn record_trade(
        &self,
        signal: &TradeSignal,
        ai_decision: bool,
        ai_confidence: f64,
        reasoning: &str,
        result: &ExecutionResult,
    ) {
        let trade = NewTrade {
            wallet_address: signal.wallet.clone(),
            market_id: signal.market_id.clone(),
            token_id: signal.token_id.clone(),
            side: signal.side,
            action: signal.action,
            size: signal.size,
            price: signal.price,
            source: signal.source,
            ai_decision: Some(ai_decision),
            ai_confidence: Some(ai_confidence),
            ai_reasoning: Some(reasoning.to_string()),
            executed: result.success,
            executed_size: result.success.then_some(result.executed_size),
            executed_price: result.success.then_some(result.executed_price),
            paper_mode: result.paper_mode,
        };
        if let Err(e) = self.store.insert_trade(&trade).await {
            error!(error = %e, "failed to persist trade record");
        }
    }

    /// Decision worker: drain the queue until shutdown. Safe to run several
    /// concurrently; ordering is then whatever the dequeue order gives.
    pub async fn run_worker(self: Arc<Self>, queue: Arc<SignalQueue>, mut shutdown: Shutdown) {
        info!("decision worker started");
        loop {
            tokio::select! {
                _ = shutdown.triggered() => break,
                signal = queue.get(None) => {
                    if let Some(signal) = signal {
                        self.process(&signal).await;
                    }
                }
            }
        }
        info!("decision worker stopped");
    }
}

fn truncate(s: &str, n: usize) -> &str {
    &s[..s.len().min(n)]
}
