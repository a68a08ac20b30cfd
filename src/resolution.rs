//! Resolution worker: finalises P&L for resolved markets.
//!
//! Periodically sweeps executed trades that have no P&L yet, asks the
//! primary venue whether their market closed, and settles each against the
//! winning outcome: `size · (1 − entry)` when our side won, `−size · entry`
//! when it lost. Wallet aggregates are updated in the same pass.
//!
//! Outcome labels are mapped explicitly; a label outside the known set is
//! logged and the trade is left unresolved rather than silently coerced.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::brain::orchestrator::MarketInfoService;
use crate::models::Side;
use crate::shutdown::Shutdown;
use crate::storage::database::TradeRecord;
use crate::storage::Store;
use crate::venues::MarketInfo;

/// Explicit outcome-label mapping. Unknown labels return None and must be
/// handled by the caller.
pub fn side_for_outcome(outcome: &str) -> Option<Side> {
    match outcome.to_ascii_lowercase().as_str() {
        "yes" | "up" => Some(Side::Yes),
        "no" | "down" => Some(Side::No),
        _ => None,
    }
}

pub fn settlement_pnl(trade_side: Side, winning_side: Side, size: f64, entry_price: f64) -> f64 {
    if trade_side == winning_side {
        size * (1.0 - entry_price)
    } else {
        -size * entry_price
    }
}

pub struct ResolutionWorker {
    store: Store,
    markets: Arc<dyn MarketInfoService>,
    poll_interval: Duration,
}

impl ResolutionWorker {
    pub fn new(store: Store, markets: Arc<dyn MarketInfoService>, poll_interval: Duration) -> Self {
        Self {
            store,
            markets,
            poll_interval,
        }
    }

    pub async fn run(self, mut shutdown: Shutdown) {
        info!(
            interval_secs = self.poll_interval.as_secs(),
            "resolution worker started"
        );
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.triggered() => break,
                _ = ticker.tick() => {
                    match self.resolve_once().await {
                        Ok(0) => {}
                        Ok(n) => info!(resolved = n, "trades settled"),
                        Err(e) => warn!(error = %e, "resolution pass failed"),
                    }
                }
            }
        }
        info!("resolution worker stopped");
    }

    /// One settlement pass. Returns the number of trades finalised.
    pub async fn resolve_once(&self) -> anyhow::Result<usize> {
        let pending = self.store.trades_without_pnl().await?;
        if pending.is_empty() {
            return Ok(0);
        }

        // One metadata fetch per distinct market.
        let mut markets: HashMap<String, Option<MarketInfo>> = HashMap::new();
        for trade in &pending {
            if !markets.contains_key(&trade.market_id) {
                let info = self.markets.market_info(&trade.market_id).await;
                markets.insert(trade.market_id.clone(), info);
            }
        }

        let mut resolved = 0;
        for trade in &pending {
            let Some(Some(market)) = markets.get(&trade.market_id) else {
                continue;
            };
            if !market.closed {
                continue;
            }
            let Some(outcome) = market.winning_outcome() else {
                continue;
            };
            let Some(winning_side) = side_for_outcome(outcome) else {
                warn!(
                    market = %trade.market_id,
                    outcome,
                    "unmapped winning outcome label, leaving trade unresolved"
                );
                continue;
            };

            if self.settle(trade, winning_side).await? {
                resolved += 1;
            }
        }
        Ok(resolved)
    }

    async fn settle(&self, trade: &TradeRecord, winning_side: Side) -> anyhow::Result<bool> {
        let size = trade.executed_size.unwrap_or(trade.size);
        let entry_price = trade.executed_price.unwrap_or(trade.price);
        let pnl = settlement_pnl(trade.side, winning_side, size, entry_price);

        if !self.store.finalize_trade_pnl(trade.id, pnl).await? {
            return Ok(false);
        }
        self.store
            .apply_trade_outcome(trade.wallet_id, pnl, size)
            .await?;

        info!(
            trade_id = trade.id,
            market = %trade.market_id,
            pnl = format!("{:+.2}", pnl),
            "trade settled"
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SignalSource, TradeAction};
    use crate::storage::database::NewTrade;
    use crate::venues::MarketToken;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct MockMarkets {
        markets: Mutex<HashMap<String, MarketInfo>>,
    }

    #[async_trait]
    impl MarketInfoService for MockMarkets {
        async fn market_info(&self, market_id: &str) -> Option<MarketInfo> {
            self.markets.lock().get(market_id).cloned()
        }
    }

    fn market(id: &str, closed: bool, winner: Option<&str>) -> MarketInfo {
        MarketInfo {
            condition_id: id.to_string(),
            question: "?".to_string(),
            category: String::new(),
            end_date: None,
            tokens: vec![
                MarketToken {
                    token_id: "t-yes".to_string(),
                    outcome: "Yes".to_string(),
                    winner: winner == Some("Yes"),
                },
                MarketToken {
                    token_id: "t-no".to_string(),
                    outcome: winner.filter(|w| *w != "Yes").unwrap_or("No").to_string(),
                    winner: winner.map_or(false, |w| w != "Yes"),
                },
            ],
            closed,
            active: !closed,
        }
    }

    fn executed_trade(market_id: &str, side: Side, size: f64, price: f64) -> NewTrade {
        NewTrade {
            wallet_address: "0xaaa".to_string(),
            market_id: market_id.to_string(),
            token_id: "tok".to_string(),
            side,
            action: TradeAction::Buy,
            size,
            price,
            source: SignalSource::Clob,
            ai_decision: Some(true),
            ai_confidence: Some(0.8),
            ai_reasoning: None,
            executed: true,
            executed_size: Some(size),
            executed_price: Some(price),
            paper_mode: true,
        }
    }

    fn worker(store: Store, markets: HashMap<String, MarketInfo>) -> ResolutionWorker {
        ResolutionWorker::new(
            store,
            Arc::new(MockMarkets {
                markets: Mutex::new(markets),
            }),
            Duration::from_secs(300),
        )
    }

    #[test]
    fn outcome_mapping_is_explicit() {
        assert_eq!(side_for_outcome("Yes"), Some(Side::Yes));
        assert_eq!(side_for_outcome("UP"), Some(Side::Yes));
        assert_eq!(side_for_outcome("no"), Some(Side::No));
        assert_eq!(side_for_outcome("Down"), Some(Side::No));
        assert_eq!(side_for_outcome("Mbappe"), None);
        assert_eq!(side_for_outcome(""), None);
    }

    #[test]
    fn settlement_formula() {
        assert!((settlement_pnl(Side::Yes, Side::Yes, 50.0, 0.4) - 30.0).abs() < 1e-9);
        assert!((settlement_pnl(Side::Yes, Side::No, 50.0, 0.4) + 20.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn winning_trade_settles_positively() {
        let store = Store::in_memory().unwrap();
        store
            .insert_trade(&executed_trade("m1", Side::Yes, 50.0, 0.4))
            .await
            .unwrap();

        let worker = worker(
            store.clone(),
            HashMap::from([("m1".to_string(), market("m1", true, Some("Yes")))]),
        );
        assert_eq!(worker.resolve_once().await.unwrap(), 1);

        let trades = store.recent_trades(10, true).await.unwrap();
        assert_eq!(trades[0].pnl, Some(30.0));

        let metrics = store.wallet_metrics("0xaaa").await.unwrap().unwrap();
        assert_eq!(metrics.total_trades, 1);
        assert_eq!(metrics.win_rate, 1.0);
        assert!((metrics.total_pnl - 30.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn losing_trade_settles_negatively() {
        let store = Store::in_memory().unwrap();
        store
            .insert_trade(&executed_trade("m1", Side::No, 50.0, 0.4))
            .await
            .unwrap();

        let worker = worker(
            store.clone(),
            HashMap::from([("m1".to_string(), market("m1", true, Some("Yes")))]),
        );
        worker.resolve_once().await.unwrap();

        let trades = store.recent_trades(10, true).await.unwrap();
        assert_eq!(trades[0].pnl, Some(-20.0));
    }

    #[tokio::test]
    async fn open_markets_are_left_alone() {
        let store = Store::in_memory().unwrap();
        store
            .insert_trade(&executed_trade("m1", Side::Yes, 50.0, 0.4))
            .await
            .unwrap();

        let worker = worker(
            store.clone(),
            HashMap::from([("m1".to_string(), market("m1", false, None))]),
        );
        assert_eq!(worker.resolve_once().await.unwrap(), 0);
        assert_eq!(store.trades_without_pnl().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_outcome_label_is_skipped_not_coerced() {
        let store = Store::in_memory().unwrap();
        store
            .insert_trade(&executed_trade("m1", Side::Yes, 50.0, 0.4))
            .await
            .unwrap();

        let worker = worker(
            store.clone(),
            HashMap::from([("m1".to_string(), market("m1", true, Some("Tie")))]),
        );
        assert_eq!(worker.resolve_once().await.unwrap(), 0);
        // Still pending so a corrected mapping can settle it later.
        assert_eq!(store.trades_without_pnl().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn up_label_maps_to_yes() {
        let store = Store::in_memory().unwrap();
        store
            .insert_trade(&executed_trade("m1", Side::Yes, 10.0, 0.5))
            .await
            .unwrap();

        let mut info = market("m1", true, None);
        info.tokens = vec![MarketToken {
            token_id: "t-up".to_string(),
            outcome: "Up".to_string(),
            winner: true,
        }];
        let worker = worker(store.clone(), HashMap::from([("m1".to_string(), info)]));
        assert_eq!(worker.resolve_once().await.unwrap(), 1);

        let trades = store.recent_trades(10, true).await.unwrap();
        assert_eq!(trades[0].pnl, Some(5.0));
    }
}
