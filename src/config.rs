//! Application configuration
//!
//! All knobs come from the environment (with `.env` support via dotenv),
//! prefixed `MIRRORBOT_`. Missing values fall back to safe paper-trading
//! defaults; an invalid trading mode is a fatal startup error.

use anyhow::{bail, Result};

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}

/// Trading mode. Entering `live` additionally requires the operator to set
/// the live-confirmed flag at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradingMode {
    Paper,
    Live,
    Paused,
}

impl TradingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradingMode::Paper => "paper",
            TradingMode::Live => "live",
            TradingMode::Paused => "paused",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "paper" => Some(Self::Paper),
            "live" => Some(Self::Live),
            "paused" => Some(Self::Paused),
            _ => None,
        }
    }
}

/// Hard risk limits enforced by the risk manager.
#[derive(Debug, Clone)]
pub struct RiskConfig {
    /// Maximum daily loss in USD (positive number).
    pub max_daily_loss: f64,
    /// Maximum total open exposure in USD.
    pub max_total_exposure: f64,
    /// Maximum size for a single trade in USD.
    pub max_single_trade: f64,
    /// Maximum tolerated spread before a trade is rejected (0.03 = 3%).
    pub max_slippage: f64,
}

impl RiskConfig {
    fn from_env() -> Result<Self> {
        let cfg = Self {
            max_daily_loss: env_parse("MIRRORBOT_RISK_MAX_DAILY_LOSS", 500.0),
            max_total_exposure: env_parse("MIRRORBOT_RISK_MAX_TOTAL_EXPOSURE", 2000.0),
            max_single_trade: env_parse("MIRRORBOT_RISK_MAX_SINGLE_TRADE", 100.0),
            max_slippage: env_parse("MIRRORBOT_RISK_MAX_SLIPPAGE", 0.03),
        };
        for (name, v) in [
            ("MIRRORBOT_RISK_MAX_DAILY_LOSS", cfg.max_daily_loss),
            ("MIRRORBOT_RISK_MAX_TOTAL_EXPOSURE", cfg.max_total_exposure),
            ("MIRRORBOT_RISK_MAX_SINGLE_TRADE", cfg.max_single_trade),
        ] {
            if v <= 0.0 {
                bail!("{} must be positive, got {}", name, v);
            }
        }
        Ok(cfg)
    }
}

/// Cross-venue arbitrage scanner settings.
#[derive(Debug, Clone)]
pub struct ArbitrageConfig {
    pub enabled: bool,
    /// Minimum absolute spread to trigger a signal (0.03 = 3%).
    pub min_spread: f64,
    /// Seconds between scans.
    pub poll_interval_secs: u64,
    /// Maximum USD per synthetic arbitrage signal.
    pub max_signal_size: f64,
}

/// Advisor (Claude messages API) settings.
#[derive(Debug, Clone)]
pub struct AdvisorConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

/// Primary venue (Polymarket) endpoints and optional trading credentials.
#[derive(Debug, Clone)]
pub struct PolymarketConfig {
    pub gamma_base: String,
    pub clob_base: String,
    pub data_base: String,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub api_passphrase: Option<String>,
}

impl PolymarketConfig {
    pub fn has_credentials(&self) -> bool {
        self.api_key.is_some() && self.api_secret.is_some()
    }
}

/// Secondary venue (Kalshi) endpoint and signing material.
#[derive(Debug, Clone)]
pub struct KalshiConfig {
    pub base_url: String,
    pub api_key_id: Option<String>,
    pub private_key_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub mode: TradingMode,
    pub database_path: String,
    pub port: u16,
    /// Seconds between wallet polling cycles.
    pub wallet_poll_interval_secs: u64,
    /// Seconds between resolution worker passes.
    pub resolution_interval_secs: u64,
    /// Signal queue capacity.
    pub queue_capacity: usize,
    /// Seconds a dedup entry suppresses duplicates.
    pub dedup_window_secs: u64,
    pub risk: RiskConfig,
    pub arbitrage: ArbitrageConfig,
    pub advisor: AdvisorConfig,
    pub polymarket: PolymarketConfig,
    pub kalshi: KalshiConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let mode_raw = env_or("MIRRORBOT_MODE", "paper");
        let Some(mode) = TradingMode::parse(&mode_raw) else {
            bail!("invalid MIRRORBOT_MODE {:?} (expected paper|live|paused)", mode_raw);
        };

        Ok(Self {
            mode,
            database_path: env_or("MIRRORBOT_DATABASE_PATH", "./mirrorbot.db"),
            port: env_parse("MIRRORBOT_PORT", 8090u16),
            wallet_poll_interval_secs: env_parse("MIRRORBOT_WALLET_POLL_INTERVAL", 5u64),
            resolution_interval_secs: env_parse("MIRRORBOT_RESOLUTION_INTERVAL", 300u64),
            queue_capacity: env_parse("MIRRORBOT_QUEUE_CAPACITY", 1000usize),
            dedup_window_secs: env_parse("MIRRORBOT_DEDUP_WINDOW", 300u64),
            risk: RiskConfig::from_env()?,
            arbitrage: ArbitrageConfig {
                enabled: env_parse("MIRRORBOT_ARB_ENABLED", false),
                min_spread: env_parse("MIRRORBOT_ARB_MIN_SPREAD", 0.03),
                poll_interval_secs: env_parse("MIRRORBOT_ARB_POLL_INTERVAL", 30u64),
                max_signal_size: env_parse("MIRRORBOT_ARB_MAX_SIGNAL_SIZE", 100.0),
            },
            advisor: AdvisorConfig {
                api_key: env_opt("MIRRORBOT_ANTHROPIC_API_KEY"),
                model: env_or("MIRRORBOT_ADVISOR_MODEL", "claude-sonnet-4-20250514"),
                max_tokens: env_parse("MIRRORBOT_ADVISOR_MAX_TOKENS", 512u32),
                timeout_secs: env_parse("MIRRORBOT_ADVISOR_TIMEOUT", 30u64),
            },
            polymarket: PolymarketConfig {
                gamma_base: env_or(
                    "MIRRORBOT_POLYMARKET_GAMMA_URL",
                    "https://gamma-api.polymarket.com",
                ),
                clob_base: env_or(
                    "MIRRORBOT_POLYMARKET_CLOB_URL",
                    "https://clob.polymarket.com",
                ),
                data_base: env_or(
                    "MIRRORBOT_POLYMARKET_DATA_URL",
                    "https://data-api.polymarket.com",
                ),
                api_key: env_opt("MIRRORBOT_POLYMARKET_API_KEY"),
                api_secret: env_opt("MIRRORBOT_POLYMARKET_API_SECRET"),
                api_passphrase: env_opt("MIRRORBOT_POLYMARKET_API_PASSPHRASE"),
            },
            kalshi: KalshiConfig {
                base_url: env_or(
                    "MIRRORBOT_KALSHI_URL",
                    "https://api.elections.kalshi.com/trade-api/v2",
                ),
                api_key_id: env_opt("MIRRORBOT_KALSHI_API_KEY_ID"),
                private_key_path: env_opt("MIRRORBOT_KALSHI_PRIVATE_KEY_PATH"),
            },
        })
    }
}
