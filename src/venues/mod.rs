//! Venue adapters
//!
//! Normalized read/write access to the primary venue (Polymarket: market
//! metadata, orderbooks, wallet trades, authenticated order endpoints) and
//! the secondary venue (Kalshi: read-only market data). Adapters surface
//! typed errors and never retry internally; recovery policy belongs to the
//! callers (ingester: next tick, order manager: bounded backoff).

pub mod kalshi;
pub mod polymarket;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VenueError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("venue returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("authentication rejected: {0}")]
    Auth(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("malformed response: {0}")]
    Parse(String),
}

pub type VenueResult<T> = std::result::Result<T, VenueError>;

/// One price level of a normalized orderbook.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: f64,
    pub size: f64,
}

/// Orderbook normal form: prices in [0, 1], sizes positive, bids sorted
/// descending and asks ascending by price.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Orderbook {
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

impl Orderbook {
    /// Drop invalid levels and enforce the sort order.
    pub fn normalize(mut self) -> Self {
        let valid = |l: &BookLevel| (0.0..=1.0).contains(&l.price) && l.size > 0.0;
        self.bids.retain(valid);
        self.asks.retain(valid);
        self.bids
            .sort_by(|a, b| b.price.partial_cmp(&a.price).unwrap_or(std::cmp::Ordering::Equal));
        self.asks
            .sort_by(|a, b| a.price.partial_cmp(&b.price).unwrap_or(std::cmp::Ordering::Equal));
        self
    }

    pub fn best_bid(&self) -> Option<f64> {
        self.bids.first().map(|l| l.price)
    }

    pub fn best_ask(&self) -> Option<f64> {
        self.asks.first().map(|l| l.price)
    }

    pub fn midpoint(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid + ask) / 2.0),
            _ => None,
        }
    }

    /// Best-ask minus best-bid; zero when either side is empty.
    pub fn spread(&self) -> f64 {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => (ask - bid).max(0.0),
            _ => 0.0,
        }
    }

    /// Total resting size across both sides.
    pub fn total_depth(&self) -> f64 {
        self.bids.iter().chain(self.asks.iter()).map(|l| l.size).sum()
    }

    /// Notional liquidity: sum of price*size over both sides.
    pub fn notional_liquidity(&self) -> f64 {
        self.bids
            .iter()
            .chain(self.asks.iter())
            .map(|l| l.price * l.size)
            .sum()
    }
}

/// One outcome token of a primary-venue market.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketToken {
    pub token_id: String,
    pub outcome: String,
    pub winner: bool,
}

/// Primary-venue market metadata in the shape the core consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketInfo {
    pub condition_id: String,
    pub question: String,
    pub category: String,
    pub end_date: Option<chrono::DateTime<chrono::Utc>>,
    pub tokens: Vec<MarketToken>,
    pub closed: bool,
    pub active: bool,
}

impl MarketInfo {
    /// Outcome label of the winning token, if the market has resolved.
    pub fn winning_outcome(&self) -> Option<&str> {
        self.tokens
            .iter()
            .find(|t| t.winner)
            .map(|t| t.outcome.as_str())
    }
}
