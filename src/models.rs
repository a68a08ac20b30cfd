//! Shared signal model
//!
//! A `TradeSignal` is a detected trade event awaiting a decision. Signals are
//! deduplicated across sources by a minute-granular digest so the same trade
//! observed on the CLOB feed and on-chain collapses to one signal.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Where a signal was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    Clob,
    Chain,
    Arbitrage,
    PriceLag,
}

impl SignalSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalSource::Clob => "clob",
            SignalSource::Chain => "chain",
            SignalSource::Arbitrage => "arbitrage",
            SignalSource::PriceLag => "price_lag",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "clob" => Some(Self::Clob),
            "chain" => Some(Self::Chain),
            "arbitrage" => Some(Self::Arbitrage),
            "price_lag" => Some(Self::PriceLag),
            _ => None,
        }
    }
}

/// Which outcome token the trade holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Yes,
    No,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Yes => "YES",
            Side::No => "NO",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "YES" => Some(Self::Yes),
            "NO" => Some(Self::No),
            _ => None,
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            Side::Yes => Side::No,
            Side::No => Side::Yes,
        }
    }
}

/// Open-vs-close direction of the trade. Close-position accounting keys off
/// this; P&L accounting keys off the outcome `Side`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeAction {
    Buy,
    Sell,
}

impl TradeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeAction::Buy => "BUY",
            TradeAction::Sell => "SELL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "BUY" => Some(Self::Buy),
            "SELL" => Some(Self::Sell),
            _ => None,
        }
    }
}

/// Trade signal detected from a tracked wallet (or synthesized by a detector).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSignal {
    /// Wallet address, canonical lowercase. Synthetic sources use a fixed
    /// pseudo-address such as `arbitrage_detector`.
    pub wallet: String,
    pub market_id: String,
    pub token_id: String,
    pub side: Side,
    pub action: TradeAction,
    pub size: f64,
    pub price: f64,
    pub source: SignalSource,
    pub timestamp: DateTime<Utc>,
    pub tx_hash: String,
}

impl TradeSignal {
    /// Deduplication ID: 16 hex chars of a SHA-256 over wallet, market, side,
    /// action, size, and the timestamp rounded down to the minute. Source is
    /// deliberately excluded so CLOB and chain observations of the same trade
    /// collide.
    pub fn dedup_id(&self) -> String {
        let minute = self
            .timestamp
            .with_second(0)
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(self.timestamp);
        let key = format!(
            "{}:{}:{}:{}:{}:{}",
            self.wallet,
            self.market_id,
            self.side.as_str(),
            self.action.as_str(),
            self.size,
            minute.format("%Y-%m-%dT%H:%M:%S%:z"),
        );
        let digest = Sha256::digest(key.as_bytes());
        hex::encode(digest)[..16].to_string()
    }
}
