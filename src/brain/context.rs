//! Decision context assembly.
//!
//! Pulls together everything the advisor needs to judge one signal: the
//! signal itself, wallet performance and operator controls, market
//! conditions and quality, the filter verdict, and the current risk state.
//! The wallet tracker, filter manager and market analyzer are optional;
//! absence means neutral defaults and never branches deeper than here.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use crate::intelligence::filters::{FilterManager, FilterVerdict};
use crate::intelligence::market::MarketAnalyzer;
use crate::intelligence::wallet_tracker::WalletTracker;
use crate::models::{SignalSource, TradeSignal};
use crate::storage::{Cache, Store};
use crate::venues::polymarket::PolymarketClient;
use crate::venues::Orderbook;

/// Market-data verbs the context builder needs from the primary adapter.
#[async_trait]
pub trait MarketDataService: Send + Sync {
    async fn liquidity(&self, token_id: &str) -> f64;
    async fn spread(&self, token_id: &str) -> f64;
}

/// Adapter-backed market data that refreshes the volatile price cache as a
/// side effect. Venue errors degrade to zeros; the risk checks downstream
/// treat unknown markets conservatively.
pub struct CachedMarketData {
    client: Arc<PolymarketClient>,
    cache: Arc<Cache>,
}

impl CachedMarketData {
    pub fn new(client: Arc<PolymarketClient>, cache: Arc<Cache>) -> Self {
        Self { client, cache }
    }

    async fn book(&self, token_id: &str) -> Option<Orderbook> {
        match self.client.get_orderbook(token_id).await {
            Ok(book) => {
                if let Some(mid) = book.midpoint() {
                    self.cache.set_market_price(token_id, mid);
                }
                Some(book)
            }
            Err(e) => {
                debug!(token_id, error = %e, "orderbook fetch failed");
                None
            }
        }
    }
}

#[async_trait]
impl MarketDataService for CachedMarketData {
    async fn liquidity(&self, token_id: &str) -> f64 {
        self.book(token_id)
            .await
            .map(|b| b.notional_liquidity())
            .unwrap_or(0.0)
    }

    async fn spread(&self, token_id: &str) -> f64 {
        self.book(token_id).await.map(|b| b.spread()).unwrap_or(0.0)
    }
}

/// Wallet confidence verb; implemented by the tracker.
#[async_trait]
pub trait WalletScore: Send + Sync {
    async fn wallet_score(&self, address: &str) -> f64;
}

#[async_trait]
impl WalletScore for WalletTracker {
    async fn wallet_score(&self, address: &str) -> f64 {
        WalletTracker::wallet_score(self, address).await
    }
}

/// Filter verb; implemented by the filter manager.
#[async_trait]
pub trait FilterGate: Send + Sync {
    async fn evaluate(&self, market_id: &str, category: &str, title: &str) -> FilterVerdict;
}

#[async_trait]
impl FilterGate for FilterManager {
    async fn evaluate(&self, market_id: &str, category: &str, title: &str) -> FilterVerdict {
        FilterManager::evaluate(self, market_id, category, title)
            .await
            .unwrap_or_else(|_| FilterVerdict::allowed())
    }
}

/// Per-signal extras the producers can attach.
#[derive(Debug, Clone, Default)]
pub struct ContextExtras {
    pub market_category: String,
    pub market_title: String,
    pub orderbook: Option<Orderbook>,
    pub price_history: Vec<f64>,
    pub resolution_time: Option<DateTime<Utc>>,
    pub arbitrage_spread: Option<f64>,
    pub arbitrage_direction: Option<String>,
    pub price_lag_change: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct DecisionContext {
    // Signal
    pub signal_type: &'static str,
    pub signal_wallet: String,
    pub signal_market_id: String,
    pub signal_side: String,
    pub signal_size: f64,
    pub signal_price: f64,

    // Wallet performance
    pub wallet_win_rate: f64,
    pub wallet_avg_roi: f64,
    pub wallet_total_trades: i64,
    pub wallet_recent_performance: f64,
    pub wallet_confidence_score: f64,

    // Wallet controls
    pub wallet_enabled: bool,
    pub wallet_scale_factor: f64,
    pub wallet_max_trade_size: Option<f64>,
    pub wallet_min_confidence: f64,

    // Market
    pub market_liquidity: f64,
    pub market_spread: f64,
    pub market_quality_score: f64,
    pub market_allowed: bool,
    pub market_filter_reason: Option<String>,

    // Risk state
    pub risk_daily_pnl: f64,
    pub risk_open_exposure: f64,
    pub risk_max_daily_loss: f64,

    // Type-specific extras
    pub arbitrage_spread: Option<f64>,
    pub arbitrage_direction: Option<String>,
    pub price_lag_change: Option<f64>,
}

impl DecisionContext {
    /// Nested record handed to the advisor.
    pub fn to_value(&self) -> Value {
        let mut result = json!({
            "signal": {
                "type": self.signal_type,
                "wallet": self.signal_wallet,
                "market_id": self.signal_market_id,
                "side": self.signal_side,
                "size": self.signal_size,
                "price": self.signal_price,
            },
            "wallet_metrics": {
                "win_rate": self.wallet_win_rate,
                "avg_roi": self.wallet_avg_roi,
                "total_trades": self.wallet_total_trades,
                "recent_performance": self.wallet_recent_performance,
                "confidence_score": self.wallet_confidence_score,
            },
            "wallet_controls": {
                "enabled": self.wallet_enabled,
                "scale_factor": self.wallet_scale_factor,
                "max_trade_size": self.wallet_max_trade_size,
                "min_confidence": self.wallet_min_confidence,
            },
            "market_data": {
                "liquidity": self.market_liquidity,
                "spread": self.market_spread,
                "quality_score": self.market_quality_score,
                "allowed": self.market_allowed,
                "filter_reason": self.market_filter_reason,
            },
            "risk_state": {
                "daily_pnl": self.risk_daily_pnl,
                "open_exposure": self.risk_open_exposure,
                "max_daily_loss": self.risk_max_daily_loss,
            },
        });

        match self.signal_type {
            "ARBITRAGE" => {
                result["arbitrage"] = json!({
                    "spread": self.arbitrage_spread,
                    "direction": self.arbitrage_direction,
                });
            }
            "PRICE_LAG" => {
                result["price_lag"] = json!({
                    "binance_change": self.price_lag_change,
                });
            }
            _ => {}
        }
        result
    }
}

fn signal_type_of(source: SignalSource) -> &'static str {
    match source {
        SignalSource::Clob | SignalSource::Chain => "COPY_TRADE",
        SignalSource::Arbitrage => "ARBITRAGE",
        SignalSource::PriceLag => "PRICE_LAG",
    }
}

pub struct ContextBuilder {
    cache: Arc<Cache>,
    store: Store,
    market_data: Arc<dyn MarketDataService>,
    max_daily_loss: f64,
    wallet_tracker: Option<Arc<dyn WalletScore>>,
    filter_gate: Option<Arc<dyn FilterGate>>,
    market_analyzer: Option<MarketAnalyzer>,
}

impl ContextBuilder {
    pub fn new(
        cache: Arc<Cache>,
        store: Store,
        market_data: Arc<dyn MarketDataService>,
        max_daily_loss: f64,
    ) -> Self {
        Self {
            cache,
            store,
            market_data,
            max_daily_loss,
            wallet_tracker: None,
            filter_gate: None,
            market_analyzer: None,
        }
    }

    pub fn with_wallet_tracker(mut self, tracker: Arc<dyn WalletScore>) -> Self {
        self.wallet_tracker = Some(tracker);
        self
    }

    pub fn with_filter_gate(mut self, gate: Arc<dyn FilterGate>) -> Self {
        self.filter_gate = Some(gate);
        self
    }

    pub fn with_market_analyzer(mut self, analyzer: MarketAnalyzer) -> Self {
        self.market_analyzer = Some(analyzer);
        self
    }

    pub async fn build(&self, signal: &TradeSignal, extras: &ContextExtras) -> DecisionContext {
        // Wallet performance; zeros when the wallet has no history yet.
        let metrics = self.store.wallet_metrics(&signal.wallet).await.ok().flatten();
        let (win_rate, avg_roi, total_trades, recent_performance) = metrics
            .map(|m| {
                let recent = if m.total_trades > 0 {
                    m.total_pnl / m.total_trades as f64
                } else {
                    0.0
                };
                (m.win_rate, m.avg_roi, m.total_trades, recent)
            })
            .unwrap_or((0.0, 0.0, 0, 0.0));

        // Wallet controls; permissive defaults for unknown wallets.
        let wallet = self.store.get_wallet(&signal.wallet).await.ok().flatten();
        let (enabled, scale_factor, max_trade_size, min_confidence) = wallet
            .map(|w| (w.enabled, w.scale_factor, w.max_trade_size, w.min_confidence))
            .unwrap_or((true, 1.0, None, 0.0));

        let confidence = match &self.wallet_tracker {
            Some(tracker) => tracker.wallet_score(&signal.wallet).await,
            None => 0.5,
        };

        let liquidity = self.market_data.liquidity(&signal.token_id).await;
        let spread = self.market_data.spread(&signal.token_id).await;

        let quality = match (&self.market_analyzer, &extras.orderbook) {
            (Some(analyzer), Some(book)) => analyzer
                .quality(book, &extras.price_history, extras.resolution_time)
                .overall_score(),
            _ => 0.5,
        };

        let filter_verdict = match &self.filter_gate {
            Some(gate) => {
                gate.evaluate(
                    &signal.market_id,
                    &extras.market_category,
                    &extras.market_title,
                )
                .await
            }
            None => FilterVerdict::allowed(),
        };

        DecisionContext {
            signal_type: signal_type_of(signal.source),
            signal_wallet: signal.wallet.clone(),
            signal_market_id: signal.market_id.clone(),
            signal_side: signal.side.as_str().to_string(),
            signal_size: signal.size,
            signal_price: signal.price,
            wallet_win_rate: win_rate,
            wallet_avg_roi: avg_roi,
            wallet_total_trades: total_trades,
            wallet_recent_performance: recent_performance,
            wallet_confidence_score: confidence,
            wallet_enabled: enabled,
            wallet_scale_factor: scale_factor,
            wallet_max_trade_size: max_trade_size,
            wallet_min_confidence: min_confidence,
            market_liquidity: liquidity,
            market_spread: spread,
            market_quality_score: quality,
            market_allowed: filter_verdict.allowed,
            market_filter_reason: filter_verdict.reason,
            risk_daily_pnl: self.cache.daily_pnl(),
            risk_open_exposure: self.cache.open_exposure(),
            risk_max_daily_loss: self.max_daily_loss,
            arbitrage_spread: extras.arbitrage_spread,
            arbitrage_direction: extras.arbitrage_direction.clone(),
            price_lag_change: extras.price_lag_change,
        }
    }
}
