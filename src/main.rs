//! mirrorbot entrypoint: wire the components, spawn the long-lived tasks,
//! serve the operator API, and shut everything down cleanly on SIGINT.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mirrorbot::api::{self, AppState};
use mirrorbot::brain::advisor::{Advisor, ClaudeAdvisor, DisabledAdvisor};
use mirrorbot::brain::context::{CachedMarketData, ContextBuilder};
use mirrorbot::brain::DecisionEngine;
use mirrorbot::config::{Config, TradingMode};
use mirrorbot::execution::live::LiveExecutor;
use mirrorbot::execution::manager::OrderManager;
use mirrorbot::execution::mode::ModeAwareExecutor;
use mirrorbot::execution::paper::PaperExecutor;
use mirrorbot::execution::safety::SafetyGuard;
use mirrorbot::execution::Executor;
use mirrorbot::intelligence::filters::FilterManager;
use mirrorbot::intelligence::market::MarketAnalyzer;
use mirrorbot::intelligence::wallet_tracker::WalletTracker;
use mirrorbot::resolution::ResolutionWorker;
use mirrorbot::risk::RiskManager;
use mirrorbot::shutdown;
use mirrorbot::signals::arbitrage::ArbitrageMonitor;
use mirrorbot::signals::ingester::IngesterService;
use mirrorbot::signals::SignalQueue;
use mirrorbot::storage::{Cache, Store};
use mirrorbot::venues::kalshi::KalshiClient;
use mirrorbot::venues::polymarket::PolymarketClient;

#[derive(Debug, Parser)]
#[command(name = "mirrorbot", about = "Copy-trading engine for prediction markets")]
struct Args {
    /// Override the HTTP port.
    #[arg(long)]
    port: Option<u16>,
    /// Override the trading mode (paper|live|paused).
    #[arg(long)]
    mode: Option<String>,
    /// Override the database path.
    #[arg(long)]
    database: Option<String>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();

    let args = Args::parse();
    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "configuration error");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(config).await {
        error!(error = %e, "fatal error");
        std::process::exit(1);
    }
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = Config::from_env()?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(mode) = &args.mode {
        config.mode = TradingMode::parse(mode)
            .with_context(|| format!("invalid mode {:?} (expected paper|live|paused)", mode))?;
    }
    if let Some(db) = &args.database {
        config.database_path = db.clone();
    }
    Ok(config)
}

async fn run(config: Config) -> Result<()> {
    info!(mode = config.mode.as_str(), "🚀 mirrorbot starting");

    let store = Store::new(&config.database_path).context("open state store")?;
    let cache = Arc::new(Cache::new());
    cache.set_mode(config.mode);

    let polymarket =
        Arc::new(PolymarketClient::new(&config.polymarket).context("build polymarket client")?);
    let queue = Arc::new(SignalQueue::new(
        config.queue_capacity,
        Duration::from_secs(config.dedup_window_secs),
    ));

    let safety = Arc::new(SafetyGuard::new(cache.clone()));
    let filters = Arc::new(FilterManager::new(store.clone()));
    let tracker = Arc::new(WalletTracker::new(store.clone()));

    // Decision pipeline.
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.advisor.timeout_secs))
        .build()
        .context("build advisor HTTP client")?;
    let advisor: Arc<dyn Advisor> = match ClaudeAdvisor::new(http, &config.advisor) {
        Some(advisor) => Arc::new(advisor),
        None => {
            warn!("no advisor API key configured; all signals will be rejected");
            Arc::new(DisabledAdvisor)
        }
    };

    let risk = Arc::new(RiskManager::new(cache.clone(), &config.risk));
    let paper = Arc::new(PaperExecutor::new(cache.clone()));

    let has_credentials = config.polymarket.has_credentials();
    let order_manager = if has_credentials {
        Some(Arc::new(OrderManager::new(store.clone(), polymarket.clone())))
    } else {
        None
    };
    let live: Option<Arc<dyn Executor>> = order_manager
        .clone()
        .map(|mgr| Arc::new(LiveExecutor::new(mgr, cache.clone())) as Arc<dyn Executor>);
    if config.mode == TradingMode::Live && live.is_none() {
        warn!("live mode requested without venue credentials; running on paper fallback");
    }

    let executor = Arc::new(ModeAwareExecutor::new(cache.clone(), paper, live));
    let context_builder = ContextBuilder::new(
        cache.clone(),
        store.clone(),
        Arc::new(CachedMarketData::new(polymarket.clone(), cache.clone())),
        config.risk.max_daily_loss,
    )
    .with_wallet_tracker(tracker)
    .with_filter_gate(filters.clone())
    .with_market_analyzer(MarketAnalyzer::default());

    let engine = Arc::new(
        DecisionEngine::new(context_builder, advisor, risk, executor, store.clone())
            .with_market_info(polymarket.clone()),
    );

    // Long-lived tasks.
    let (shutdown_handle, shutdown) = shutdown::channel();
    let mut tasks = Vec::new();

    tasks.push(tokio::spawn(
        engine
            .clone()
            .run_worker(queue.clone(), shutdown_handle.subscribe()),
    ));

    let ingester = IngesterService::new(
        store.clone(),
        cache.clone(),
        queue.clone(),
        polymarket.clone(),
        Duration::from_secs(config.wallet_poll_interval_secs),
        Duration::from_secs(config.dedup_window_secs),
    );
    tasks.extend(ingester.start(&shutdown).await?);

    if config.arbitrage.enabled {
        match KalshiClient::new(&config.kalshi) {
            Ok(kalshi) => {
                let monitor = ArbitrageMonitor::new(
                    store.clone(),
                    cache.clone(),
                    queue.clone(),
                    Arc::new(kalshi),
                    polymarket.clone(),
                    &config.arbitrage,
                );
                tasks.push(tokio::spawn(monitor.run(shutdown_handle.subscribe())));
            }
            Err(e) => warn!(error = %e, "arbitrage enabled but kalshi client failed to build"),
        }
    }

    // Daily P&L rolls over at midnight UTC.
    {
        let cache = cache.clone();
        let mut shutdown = shutdown_handle.subscribe();
        tasks.push(tokio::spawn(async move {
            loop {
                let now = chrono::Utc::now();
                let next_midnight = (now + chrono::Duration::days(1))
                    .date_naive()
                    .and_hms_opt(0, 0, 0)
                    .map(|t| t.and_utc())
                    .unwrap_or(now + chrono::Duration::days(1));
                let wait = (next_midnight - now)
                    .to_std()
                    .unwrap_or(Duration::from_secs(86_400));
                tokio::select! {
                    _ = shutdown.triggered() => break,
                    _ = tokio::time::sleep(wait) => {
                        info!("resetting daily P&L counter");
                        cache.reset_daily_pnl();
                    }
                }
            }
        }));
    }

    let resolution = ResolutionWorker::new(
        store.clone(),
        polymarket.clone(),
        Duration::from_secs(config.resolution_interval_secs),
    );
    tasks.push(tokio::spawn(resolution.run(shutdown_handle.subscribe())));

    // Operator surface.
    let app = api::router(AppState {
        store,
        cache,
        queue,
        safety,
        filters,
        orders: order_manager,
        has_live_credentials: has_credentials,
    });
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind {}", addr))?;
    info!(addr = %addr, "operator API listening");

    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        let mut shutdown = shutdown;
        shutdown.triggered().await;
    });
    let server = tokio::spawn(async move { server.await });

    tokio::signal::ctrl_c().await.ok();
    info!("shutdown signal received");
    shutdown_handle.trigger();

    for task in tasks {
        task.await.ok();
    }
    if let Ok(Err(e)) = server.await {
        error!(error = %e, "server terminated with error");
    }
    info!("mirrorbot stopped");
    Ok(())
}
