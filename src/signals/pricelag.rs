//! Price-lag detection for crypto prediction markets.
//!
//! When the spot market moves hard but the prediction market's probability
//! has not caught up, the lagging market is a candidate entry. The detector
//! keeps the last observed spot price per symbol and compares each new print
//! against it.

use chrono::Utc;
use std::collections::HashMap;

use crate::models::{Side, SignalSource, TradeAction, TradeSignal};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceDirection {
    Up,
    Down,
    Neutral,
}

#[derive(Debug, Clone)]
pub struct PriceLagOpportunity {
    pub market_id: String,
    pub symbol: String,
    pub spot_change: f64,
    pub current_probability: f64,
    pub direction: PriceDirection,
    pub confidence: f64,
}

pub struct PriceLagDetector {
    /// Minimum spot move to consider (0.02 = 2%).
    min_price_move: f64,
    /// Size (USD) of emitted signals.
    signal_size: f64,
    last_prices: HashMap<String, f64>,
}

impl PriceLagDetector {
    pub fn new(min_price_move: f64, signal_size: f64) -> Self {
        Self {
            min_price_move,
            signal_size,
            last_prices: HashMap::new(),
        }
    }

    pub fn price_change(old: f64, new: f64) -> f64 {
        if old == 0.0 {
            return 0.0;
        }
        (new - old) / old
    }

    pub fn expected_direction(&self, change: f64) -> PriceDirection {
        if change >= self.min_price_move {
            PriceDirection::Up
        } else if change <= -self.min_price_move {
            PriceDirection::Down
        } else {
            PriceDirection::Neutral
        }
    }

    /// Larger moves score higher: 10% spot move saturates at 1.0, floored at
    /// 0.3 so marginal triggers stay visible to the advisor.
    pub fn confidence(change: f64) -> f64 {
        (change.abs() / 0.10).min(1.0).max(0.3)
    }

    /// Feed a spot print and test the paired market for lag. The market lags
    /// when it has moved less than half the spot change away from baseline.
    pub fn observe(
        &mut self,
        symbol: &str,
        spot_price: f64,
        market_id: &str,
        market_probability: f64,
        baseline_probability: f64,
    ) -> Option<PriceLagOpportunity> {
        let previous = *self
            .last_prices
            .entry(symbol.to_string())
            .or_insert(spot_price);
        self.last_prices.insert(symbol.to_string(), spot_price);

        let change = Self::price_change(previous, spot_price);
        let direction = self.expected_direction(change);
        if direction == PriceDirection::Neutral {
            return None;
        }

        let market_change = market_probability - baseline_probability;
        let lagging = match direction {
            PriceDirection::Up => market_change < change.abs() * 0.5,
            PriceDirection::Down => market_change > -change.abs() * 0.5,
            PriceDirection::Neutral => false,
        };
        if !lagging {
            return None;
        }

        Some(PriceLagOpportunity {
            market_id: market_id.to_string(),
            symbol: symbol.to_string(),
            spot_change: change,
            current_probability: market_probability,
            direction,
            confidence: Self::confidence(change),
        })
    }

    pub fn build_signal(&self, opp: &PriceLagOpportunity) -> TradeSignal {
        let side = match opp.direction {
            PriceDirection::Up => Side::Yes,
            _ => Side::No,
        };
        let price = match side {
            Side::Yes => opp.current_probability,
            Side::No => 1.0 - opp.current_probability,
        };
        TradeSignal {
            wallet: "price_lag_detector".to_string(),
            market_id: opp.market_id.clone(),
            token_id: opp.market_id.clone(),
            side,
            action: TradeAction::Buy,
            size: self.signal_size,
            price,
            source: SignalSource::PriceLag,
            timestamp: Utc::now(),
            tx_hash: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_and_direction() {
        assert!((PriceLagDetector::price_change(100.0, 105.0) - 0.05).abs() < 1e-12);
        assert_eq!(PriceLagDetector::price_change(0.0, 5.0), 0.0);

        let det = PriceLagDetector::new(0.02, 50.0);
        assert_eq!(det.expected_direction(0.03), PriceDirection::Up);
        assert_eq!(det.expected_direction(-0.03), PriceDirection::Down);
        assert_eq!(det.expected_direction(0.01), PriceDirection::Neutral);
    }

    #[test]
    fn confidence_scales_and_floors() {
        assert!((PriceLagDetector::confidence(0.10) - 1.0).abs() < 1e-12);
        assert!((PriceLagDetector::confidence(0.05) - 0.5).abs() < 1e-12);
        assert!((PriceLagDetector::confidence(0.001) - 0.3).abs() < 1e-12);
    }

    #[test]
    fn lag_detected_on_stale_market() {
        let mut det = PriceLagDetector::new(0.02, 50.0);
        // First print seeds the cache; no change yet.
        assert!(det.observe("BTCUSDT", 100_000.0, "m1", 0.5, 0.5).is_none());
        // 5% up move while the market sits at baseline.
        let opp = det
            .observe("BTCUSDT", 105_000.0, "m1", 0.5, 0.5)
            .expect("lag");
        assert_eq!(opp.direction, PriceDirection::Up);
        assert!((opp.spot_change - 0.05).abs() < 1e-9);
    }

    #[test]
    fn no_lag_when_market_kept_up() {
        let mut det = PriceLagDetector::new(0.02, 50.0);
        det.observe("BTCUSDT", 100_000.0, "m1", 0.5, 0.5);
        // Market already moved +4% against a 5% spot move: not lagging.
        assert!(det.observe("BTCUSDT", 105_000.0, "m1", 0.54, 0.5).is_none());
    }

    #[test]
    fn down_move_builds_no_signal() {
        let mut det = PriceLagDetector::new(0.02, 50.0);
        det.observe("ETHUSDT", 5000.0, "m2", 0.6, 0.6);
        let opp = det.observe("ETHUSDT", 4500.0, "m2", 0.6, 0.6).expect("lag");
        let signal = det.build_signal(&opp);
        assert_eq!(signal.side, Side::No);
        assert_eq!(signal.source, SignalSource::PriceLag);
        assert!((signal.price - 0.4).abs() < 1e-9);
    }
}
