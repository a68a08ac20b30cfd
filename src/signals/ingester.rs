//! Wallet trade ingester
//!
//! One polling task per enabled wallet. Each task keeps a per-wallet cursor
//! (persisted in the volatile store so restarts resume where they left off)
//! and an in-memory seen-set of dedup ids pruned on a sliding window. Venue
//! errors are logged and the cycle continues with the same cursor; the queue
//! dedup makes the resulting at-least-once delivery safe.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::models::{Side, SignalSource, TradeAction, TradeSignal};
use crate::shutdown::Shutdown;
use crate::signals::SignalQueue;
use crate::storage::{Cache, Store};
use crate::venues::polymarket::{PolymarketClient, WalletTrade};
use crate::venues::VenueResult;

/// The slice of the primary adapter the ingester needs.
#[async_trait]
pub trait TradeFeed: Send + Sync {
    async fn wallet_trades(
        &self,
        address: &str,
        limit: u32,
        since_ts: Option<i64>,
    ) -> VenueResult<Vec<WalletTrade>>;
}

#[async_trait]
impl TradeFeed for PolymarketClient {
    async fn wallet_trades(
        &self,
        address: &str,
        limit: u32,
        since_ts: Option<i64>,
    ) -> VenueResult<Vec<WalletTrade>> {
        self.get_wallet_trades(address, limit, since_ts).await
    }
}

/// Map a raw venue trade onto the signal model.
///
/// When the venue reports the outcome directly it is used verbatim and the
/// book side becomes the action. When only the book side is available the
/// conventional mapping applies: BUY holds YES, SELL holds NO.
pub fn parse_trade_event(trade: &WalletTrade, wallet: &str, source: SignalSource) -> TradeSignal {
    let action = TradeAction::parse(&trade.side).unwrap_or(TradeAction::Buy);
    let side = match trade.outcome.as_deref() {
        Some(outcome) => match outcome.to_ascii_lowercase().as_str() {
            "yes" | "up" => Side::Yes,
            "no" | "down" => Side::No,
            _ => match action {
                TradeAction::Buy => Side::Yes,
                TradeAction::Sell => Side::No,
            },
        },
        None => match action {
            TradeAction::Buy => Side::Yes,
            TradeAction::Sell => Side::No,
        },
    };

    TradeSignal {
        wallet: wallet.to_lowercase(),
        market_id: trade.market.clone(),
        token_id: trade.asset_id.clone(),
        side,
        action,
        size: trade.size,
        price: trade.price,
        source,
        timestamp: DateTime::<Utc>::from_timestamp(trade.timestamp, 0).unwrap_or_else(Utc::now),
        tx_hash: trade.tx_hash.clone(),
    }
}

/// Sliding-window set of already-emitted dedup ids.
struct SeenWindow {
    order: VecDeque<(String, Instant)>,
    set: HashSet<String>,
    window: Duration,
}

impl SeenWindow {
    fn new(window: Duration) -> Self {
        Self {
            order: VecDeque::new(),
            set: HashSet::new(),
            window,
        }
    }

    /// Returns false when the id was already present.
    fn insert(&mut self, id: String) -> bool {
        let now = Instant::now();
        while let Some((front, at)) = self.order.front() {
            if now.duration_since(*at) >= self.window {
                let front = front.clone();
                self.order.pop_front();
                self.set.remove(&front);
            } else {
                break;
            }
        }
        if self.set.contains(&id) {
            return false;
        }
        self.set.insert(id.clone());
        self.order.push_back((id, now));
        true
    }
}

/// Polls one wallet and pushes fresh signals into the queue.
pub struct WalletPoller {
    address: String,
    feed: Arc<dyn TradeFeed>,
    cache: Arc<Cache>,
    queue: Arc<SignalQueue>,
    seen: SeenWindow,
    fetch_limit: u32,
}

impl WalletPoller {
    pub fn new(
        address: &str,
        feed: Arc<dyn TradeFeed>,
        cache: Arc<Cache>,
        queue: Arc<SignalQueue>,
        dedup_window: Duration,
    ) -> Self {
        Self {
            address: address.to_lowercase(),
            feed,
            cache,
            queue,
            seen: SeenWindow::new(dedup_window),
            fetch_limit: 50,
        }
    }

    /// One polling cycle. Returns the number of signals enqueued.
    pub async fn poll_once(&mut self) -> usize {
        let cursor = self.cache.wallet_cursor(&self.address);

        let trades = match self
            .feed
            .wallet_trades(&self.address, self.fetch_limit, cursor)
            .await
        {
            Ok(trades) => trades,
            Err(e) => {
                // Cursor stays put; next tick retries the same range.
                warn!(wallet = %self.address, error = %e, "wallet poll failed");
                return 0;
            }
        };

        let mut trades = trades;
        trades.sort_by_key(|t| t.timestamp);

        let mut cursor = cursor.unwrap_or(0);
        let mut emitted = 0;
        for trade in &trades {
            let signal = parse_trade_event(trade, &self.address, SignalSource::Clob);
            cursor = cursor.max(trade.timestamp);

            if !self.seen.insert(signal.dedup_id()) {
                continue;
            }
            if self.queue.put(signal).await {
                emitted += 1;
            }
        }

        if cursor > 0 {
            self.cache.set_wallet_cursor(&self.address, cursor);
        }
        if emitted > 0 {
            debug!(wallet = %self.address, emitted, "signals enqueued");
        }
        emitted
    }

    pub async fn run(mut self, poll_interval: Duration, mut shutdown: Shutdown) {
        let mut ticker = interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.triggered() => break,
                _ = ticker.tick() => {
                    self.poll_once().await;
                }
            }
        }
        debug!(wallet = %self.address, "wallet poller stopped");
    }
}

/// Spawns one poller per enabled wallet.
pub struct IngesterService {
    store: Store,
    cache: Arc<Cache>,
    queue: Arc<SignalQueue>,
    feed: Arc<dyn TradeFeed>,
    poll_interval: Duration,
    dedup_window: Duration,
}

impl IngesterService {
    pub fn new(
        store: Store,
        cache: Arc<Cache>,
        queue: Arc<SignalQueue>,
        feed: Arc<dyn TradeFeed>,
        poll_interval: Duration,
        dedup_window: Duration,
    ) -> Self {
        Self {
            store,
            cache,
            queue,
            feed,
            poll_interval,
            dedup_window,
        }
    }

    pub async fn start(&self, shutdown: &Shutdown) -> anyhow::Result<Vec<JoinHandle<()>>> {
        let wallets = self.store.list_enabled_wallets().await?;
        info!(count = wallets.len(), "starting wallet pollers");

        let mut handles = Vec::with_capacity(wallets.len());
        for wallet in wallets {
            let poller = WalletPoller::new(
                &wallet.address,
                self.feed.clone(),
                self.cache.clone(),
                self.queue.clone(),
                self.dedup_window,
            );
            handles.push(tokio::spawn(poller.run(self.poll_interval, shutdown.clone())));
        }
        Ok(handles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct MockFeed {
        batches: Mutex<VecDeque<VenueResult<Vec<WalletTrade>>>>,
        requested_cursors: Mutex<Vec<Option<i64>>>,
    }

    impl MockFeed {
        fn new(batches: Vec<VenueResult<Vec<WalletTrade>>>) -> Self {
            Self {
                batches: Mutex::new(batches.into()),
                requested_cursors: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TradeFeed for MockFeed {
        async fn wallet_trades(
            &self,
            _address: &str,
            _limit: u32,
            since_ts: Option<i64>,
        ) -> VenueResult<Vec<WalletTrade>> {
            self.requested_cursors.lock().push(since_ts);
            self.batches.lock().pop_front().unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn venue_trade(ts: i64, side: &str, outcome: Option<&str>, size: f64) -> WalletTrade {
        WalletTrade {
            market: "cond-1".to_string(),
            asset_id: "tok-1".to_string(),
            side: side.to_string(),
            outcome: outcome.map(|s| s.to_string()),
            size,
            price: 0.5,
            timestamp: ts,
            tx_hash: format!("0x{}", ts),
            maker: None,
            taker: None,
        }
    }

    fn poller(feed: Arc<dyn TradeFeed>, cache: Arc<Cache>, queue: Arc<SignalQueue>) -> WalletPoller {
        WalletPoller::new("0xABC", feed, cache, queue, Duration::from_secs(300))
    }

    #[test]
    fn side_and_action_mapping() {
        let signal = parse_trade_event(&venue_trade(1, "BUY", None, 5.0), "0xA", SignalSource::Clob);
        assert_eq!(signal.side, Side::Yes);
        assert_eq!(signal.action, TradeAction::Buy);

        let signal = parse_trade_event(&venue_trade(1, "SELL", None, 5.0), "0xA", SignalSource::Clob);
        assert_eq!(signal.side, Side::No);
        assert_eq!(signal.action, TradeAction::Sell);

        // Outcome reported directly: keep it, action still carries book side.
        let signal =
            parse_trade_event(&venue_trade(1, "SELL", Some("Yes"), 5.0), "0xA", SignalSource::Clob);
        assert_eq!(signal.side, Side::Yes);
        assert_eq!(signal.action, TradeAction::Sell);

        let signal =
            parse_trade_event(&venue_trade(1, "BUY", Some("Down"), 5.0), "0xA", SignalSource::Clob);
        assert_eq!(signal.side, Side::No);
    }

    #[test]
    fn wallet_is_lowercased() {
        let signal = parse_trade_event(&venue_trade(1, "BUY", None, 5.0), "0xDeAd", SignalSource::Clob);
        assert_eq!(signal.wallet, "0xdead");
    }

    #[tokio::test]
    async fn poll_advances_cursor_and_enqueues_in_order() {
        let feed = Arc::new(MockFeed::new(vec![Ok(vec![
            venue_trade(200, "BUY", None, 2.0),
            venue_trade(100, "BUY", None, 1.0),
        ])]));
        let cache = Arc::new(Cache::new());
        let queue = Arc::new(SignalQueue::new(100, Duration::from_secs(300)));

        let mut poller = poller(feed.clone(), cache.clone(), queue.clone());
        assert_eq!(poller.poll_once().await, 2);

        // Emitted in timestamp order even though the feed returned newest-first.
        assert_eq!(queue.get_nowait().await.unwrap().size, 1.0);
        assert_eq!(queue.get_nowait().await.unwrap().size, 2.0);

        assert_eq!(cache.wallet_cursor("0xabc"), Some(200));
    }

    #[tokio::test]
    async fn seen_set_suppresses_repeat_fetches() {
        let batch = vec![venue_trade(100, "BUY", None, 1.0)];
        let feed = Arc::new(MockFeed::new(vec![Ok(batch.clone()), Ok(batch)]));
        let cache = Arc::new(Cache::new());
        let queue = Arc::new(SignalQueue::new(100, Duration::from_secs(300)));

        let mut poller = poller(feed, cache, queue.clone());
        assert_eq!(poller.poll_once().await, 1);
        assert_eq!(poller.poll_once().await, 0);
        assert_eq!(queue.size().await, 1);
    }

    #[tokio::test]
    async fn venue_error_keeps_cursor() {
        let feed = Arc::new(MockFeed::new(vec![
            Ok(vec![venue_trade(100, "BUY", None, 1.0)]),
            Err(crate::venues::VenueError::Status {
                status: 503,
                body: "unavailable".to_string(),
            }),
            Ok(Vec::new()),
        ]));
        let cache = Arc::new(Cache::new());
        let queue = Arc::new(SignalQueue::new(100, Duration::from_secs(300)));

        let mut poller = poller(feed.clone(), cache.clone(), queue);
        poller.poll_once().await;
        poller.poll_once().await; // fails
        poller.poll_once().await;

        let cursors = feed.requested_cursors.lock().clone();
        assert_eq!(cursors, vec![None, Some(100), Some(100)]);
    }
}
