//! Wallet performance scoring.
//!
//! A tracked wallet earns a confidence score in [0, 1] from four
//! sub-scores: win rate, ROI (normalised against a 50% cap), entry timing,
//! and consistency of returns. The weighted blend (0.3/0.3/0.2/0.2) feeds
//! the decision context; wallets without history score a neutral 0.5.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::Store;

/// One historical trade observation used for scoring.
#[derive(Debug, Clone, Default)]
pub struct TradeOutcome {
    pub size: f64,
    pub profit: f64,
    /// Unix seconds of position entry.
    pub entry_time: i64,
    /// Unix seconds when the subsequent price move started (0 if unknown).
    pub price_move_start: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletScorecard {
    pub wallet_address: String,
    pub win_rate: f64,
    pub roi: f64,
    pub timing_score: f64,
    pub consistency: f64,
    pub total_trades: usize,
    pub updated_at: DateTime<Utc>,
}

impl WalletScorecard {
    pub fn confidence_score(&self) -> f64 {
        self.confidence_with_weights(0.3, 0.3, 0.2, 0.2)
    }

    pub fn confidence_with_weights(
        &self,
        win_rate_w: f64,
        roi_w: f64,
        timing_w: f64,
        consistency_w: f64,
    ) -> f64 {
        // ROI capped at 50% for full marks.
        let normalized_roi = self.roi.clamp(0.0, 0.5) / 0.5;
        self.win_rate * win_rate_w
            + normalized_roi * roi_w
            + self.timing_score * timing_w
            + self.consistency * consistency_w
    }
}

pub fn win_rate(trades: &[TradeOutcome]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let wins = trades.iter().filter(|t| t.profit > 0.0).count();
    wins as f64 / trades.len() as f64
}

pub fn roi(trades: &[TradeOutcome]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let total_profit: f64 = trades.iter().map(|t| t.profit).sum();
    let total_invested: f64 = trades.iter().map(|t| t.size).sum();
    if total_invested == 0.0 {
        return 0.0;
    }
    total_profit / total_invested
}

/// How early the wallet enters before the move starts. A 60 second average
/// lead is a perfect score.
pub fn timing_score(trades: &[TradeOutcome]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let deltas: Vec<f64> = trades
        .iter()
        .filter(|t| t.entry_time > 0 && t.price_move_start > t.entry_time)
        .map(|t| (t.price_move_start - t.entry_time) as f64)
        .collect();
    if deltas.is_empty() {
        return 0.5;
    }
    let avg = deltas.iter().sum::<f64>() / deltas.len() as f64;
    (avg / 60.0).min(1.0)
}

/// Lower variance of per-trade profit means higher consistency; a profit
/// standard deviation of 100 maps to zero.
pub fn consistency(trades: &[TradeOutcome]) -> f64 {
    if trades.len() < 2 {
        return 0.5;
    }
    let profits: Vec<f64> = trades.iter().map(|t| t.profit).collect();
    let mean = profits.iter().sum::<f64>() / profits.len() as f64;
    let variance = profits.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / profits.len() as f64;
    (1.0 - variance.sqrt() / 100.0).max(0.0)
}

pub fn score_trades(wallet_address: &str, trades: &[TradeOutcome]) -> WalletScorecard {
    WalletScorecard {
        wallet_address: wallet_address.to_lowercase(),
        win_rate: win_rate(trades),
        roi: roi(trades),
        timing_score: timing_score(trades),
        consistency: consistency(trades),
        total_trades: trades.len(),
        updated_at: Utc::now(),
    }
}

/// Store-backed score lookup used by the context builder.
pub struct WalletTracker {
    store: Store,
}

impl WalletTracker {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Confidence derived from the persisted aggregates. Timing and
    /// consistency are not tracked durably, so they contribute their neutral
    /// midpoints. Unknown wallets score 0.5.
    pub async fn wallet_score(&self, address: &str) -> f64 {
        match self.store.wallet_metrics(address).await {
            Ok(Some(metrics)) => {
                let card = WalletScorecard {
                    wallet_address: address.to_lowercase(),
                    win_rate: metrics.win_rate,
                    roi: metrics.avg_roi,
                    timing_score: 0.5,
                    consistency: 0.5,
                    total_trades: metrics.total_trades as usize,
                    updated_at: metrics.updated_at,
                };
                card.confidence_score()
            }
            _ => 0.5,
        }
    }
}
