//! Cross-venue arbitrage monitor
//!
//! Compares the secondary venue's YES probability against the primary
//! venue's midpoint for every active market mapping. When the spread clears
//! the threshold it emits one synthetic signal per mapping per tick; size
//! scales linearly with the spread, saturating at a 10% spread.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::ArbitrageConfig;
use crate::models::{Side, SignalSource, TradeAction, TradeSignal};
use crate::shutdown::Shutdown;
use crate::signals::SignalQueue;
use crate::storage::{database::MarketMappingRecord, Cache, Store};
use crate::venues::kalshi::KalshiClient;
use crate::venues::polymarket::PolymarketClient;
use crate::venues::VenueResult;

pub const ARBITRAGE_WALLET: &str = "arbitrage_detector";

/// Spread at which the synthetic signal reaches full size.
const SPREAD_SATURATION: f64 = 0.10;

/// Secondary-venue probability source.
#[async_trait]
pub trait SecondaryFeed: Send + Sync {
    async fn yes_probability(&self, ticker: &str) -> VenueResult<Option<f64>>;
}

#[async_trait]
impl SecondaryFeed for KalshiClient {
    async fn yes_probability(&self, ticker: &str) -> VenueResult<Option<f64>> {
        Ok(self.get_market(ticker).await?.map(|m| m.yes_probability()))
    }
}

/// Primary-venue midpoint source.
#[async_trait]
pub trait MidpointFeed: Send + Sync {
    async fn midpoint(&self, market_id: &str) -> VenueResult<f64>;
}

#[async_trait]
impl MidpointFeed for PolymarketClient {
    async fn midpoint(&self, market_id: &str) -> VenueResult<f64> {
        self.get_midpoint(market_id).await
    }
}

/// One detected opportunity, before conversion to a signal.
#[derive(Debug, Clone)]
pub struct Opportunity {
    pub polymarket_id: String,
    pub kalshi_id: String,
    pub description: String,
    pub kalshi_yes: f64,
    pub poly_yes: f64,
    /// secondary minus primary; positive means the primary venue is cheap.
    pub spread: f64,
}

pub struct ArbitrageMonitor {
    store: Store,
    cache: Arc<Cache>,
    queue: Arc<SignalQueue>,
    secondary: Arc<dyn SecondaryFeed>,
    primary: Arc<dyn MidpointFeed>,
    min_spread: f64,
    max_signal_size: f64,
    poll_interval: Duration,
}

impl ArbitrageMonitor {
    pub fn new(
        store: Store,
        cache: Arc<Cache>,
        queue: Arc<SignalQueue>,
        secondary: Arc<dyn SecondaryFeed>,
        primary: Arc<dyn MidpointFeed>,
        config: &ArbitrageConfig,
    ) -> Self {
        Self {
            store,
            cache,
            queue,
            secondary,
            primary,
            min_spread: config.min_spread,
            max_signal_size: config.max_signal_size,
            poll_interval: Duration::from_secs(config.poll_interval_secs),
        }
    }

    pub async fn run(self, mut shutdown: Shutdown) {
        info!(
            interval_secs = self.poll_interval.as_secs(),
            min_spread = self.min_spread,
            "arbitrage monitor started"
        );
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.triggered() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.scan().await {
                        warn!(error = %e, "arbitrage scan failed");
                    }
                }
            }
        }
        info!("arbitrage monitor stopped");
    }

    /// One scan over all active mappings. Returns detected opportunities.
    pub async fn scan(&self) -> anyhow::Result<Vec<Opportunity>> {
        let mappings = self.store.active_market_mappings().await?;
        if mappings.is_empty() {
            debug!("no active market mappings to scan");
            return Ok(Vec::new());
        }

        let mut opportunities = Vec::new();
        for mapping in mappings {
            match self.check_mapping(&mapping).await {
                Ok(Some(opp)) => {
                    let signal = self.build_signal(&opp);
                    if self.queue.put(signal).await {
                        info!(
                            market = %opp.polymarket_id,
                            spread = format!("{:+.3}", opp.spread),
                            "arbitrage signal emitted"
                        );
                    }
                    opportunities.push(opp);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(mapping = %mapping.polymarket_id, error = %e, "mapping check failed");
                }
            }
        }
        Ok(opportunities)
    }

    async fn check_mapping(
        &self,
        mapping: &MarketMappingRecord,
    ) -> anyhow::Result<Option<Opportunity>> {
        let Some(kalshi_yes) = self.secondary.yes_probability(&mapping.kalshi_id).await? else {
            return Ok(None);
        };
        let poly_yes = self.primary.midpoint(&mapping.polymarket_id).await?;
        if poly_yes <= 0.0 {
            return Ok(None);
        }
        self.cache.set_market_price(&mapping.polymarket_id, poly_yes);

        let spread = kalshi_yes - poly_yes;
        if spread.abs() < self.min_spread {
            return Ok(None);
        }

        Ok(Some(Opportunity {
            polymarket_id: mapping.polymarket_id.clone(),
            kalshi_id: mapping.kalshi_id.clone(),
            description: mapping.description.clone(),
            kalshi_yes,
            poly_yes,
            spread,
        }))
    }

    /// Positive spread: the secondary venue thinks YES is worth more, so buy
    /// YES on the primary. Negative: buy NO at its complement price.
    pub fn build_signal(&self, opp: &Opportunity) -> TradeSignal {
        let side = if opp.spread > 0.0 { Side::Yes } else { Side::No };
        let price = match side {
            Side::Yes => opp.poly_yes,
            Side::No => 1.0 - opp.poly_yes,
        };
        let size = self.max_signal_size * (opp.spread.abs() / SPREAD_SATURATION).min(1.0);

        TradeSignal {
            wallet: ARBITRAGE_WALLET.to_string(),
            market_id: opp.polymarket_id.clone(),
            token_id: opp.polymarket_id.clone(),
            side,
            action: TradeAction::Buy,
            size,
            price,
            source: SignalSource::Arbitrage,
            timestamp: Utc::now(),
            tx_hash: String::new(),
        }
    }
}
