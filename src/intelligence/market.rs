//! Market quality scoring.
//!
//! Four sub-scores in [0, 1] blended 0.3 liquidity / 0.3 spread /
//! 0.2 volatility-stability / 0.2 time-to-resolution. Thin, wide, jumpy or
//! about-to-resolve markets score low and the advisor sees it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::venues::Orderbook;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketQuality {
    pub liquidity_score: f64,
    pub spread_score: f64,
    pub volatility_score: f64,
    pub time_decay_score: f64,
}

impl MarketQuality {
    pub fn overall_score(&self) -> f64 {
        self.liquidity_score * 0.3
            + self.spread_score * 0.3
            + self.volatility_score * 0.2
            + self.time_decay_score * 0.2
    }
}

#[derive(Debug, Clone)]
pub struct MarketAnalyzer {
    /// Total depth at which liquidity scores 1.0.
    pub min_liquidity: f64,
    /// Spread (as a fraction of midpoint) at which the spread score hits 0.
    pub max_spread_pct: f64,
    /// Price standard deviation at which stability hits 0.
    pub max_volatility: f64,
    /// Hours to resolution for a full time-decay score.
    pub min_hours_to_resolution: f64,
}

impl Default for MarketAnalyzer {
    fn default() -> Self {
        Self {
            min_liquidity: 10_000.0,
            max_spread_pct: 0.05,
            max_volatility: 0.3,
            min_hours_to_resolution: 24.0,
        }
    }
}

impl MarketAnalyzer {
    pub fn liquidity_score(&self, book: &Orderbook) -> f64 {
        if book.bids.is_empty() || book.asks.is_empty() {
            return 0.0;
        }
        (book.total_depth() / self.min_liquidity).min(1.0)
    }

    pub fn spread_score(&self, book: &Orderbook) -> f64 {
        let (Some(best_bid), Some(best_ask)) = (book.best_bid(), book.best_ask()) else {
            return 0.0;
        };
        if best_bid <= 0.0 || best_ask <= best_bid {
            return 0.0;
        }
        let midpoint = (best_bid + best_ask) / 2.0;
        let spread_pct = (best_ask - best_bid) / midpoint;
        (1.0 - spread_pct / self.max_spread_pct).clamp(0.0, 1.0)
    }

    pub fn volatility_score(&self, prices: &[f64]) -> f64 {
        if prices.len() < 2 {
            return 0.5;
        }
        let std_dev = prices.iter().population_std_dev();
        (1.0 - std_dev / self.max_volatility).clamp(0.0, 1.0)
    }

    pub fn time_decay_score(&self, resolution_time: DateTime<Utc>) -> f64 {
        let remaining = resolution_time - Utc::now();
        let hours = remaining.num_seconds() as f64 / 3600.0;
        if hours <= 0.0 {
            return 0.0;
        }
        (hours / self.min_hours_to_resolution).min(1.0)
    }

    pub fn quality(
        &self,
        book: &Orderbook,
        price_history: &[f64],
        resolution_time: Option<DateTime<Utc>>,
    ) -> MarketQuality {
        MarketQuality {
            liquidity_score: self.liquidity_score(book),
            spread_score: self.spread_score(book),
            volatility_score: self.volatility_score(price_history),
            time_decay_score: resolution_time
                .map(|t| self.time_decay_score(t))
                .unwrap_or(0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::venues::BookLevel;

    fn book(bid: f64, ask: f64, depth_per_level: f64) -> Orderbook {
        Orderbook {
            bids: vec![BookLevel { price: bid, size: depth_per_level }],
            asks: vec![BookLevel { price: ask, size: depth_per_level }],
        }
        .normalize()
    }

    #[test]
    fn liquidity_saturates_at_min_liquidity() {
        let analyzer = MarketAnalyzer::default();
        assert_eq!(analyzer.liquidity_score(&book(0.49, 0.51, 5000.0)), 1.0);
        assert_eq!(analyzer.liquidity_score(&book(0.49, 0.51, 2500.0)), 0.5);
        assert_eq!(analyzer.liquidity_score(&Orderbook::default()), 0.0);
    }

    #[test]
    fn tight_spread_scores_high() {
        let analyzer = MarketAnalyzer::default();
        // 2% spread on a 0.5 midpoint against a 5% ceiling.
        let score = analyzer.spread_score(&book(0.495, 0.505, 10.0));
        assert!((score - (1.0 - 0.02 / 0.05)).abs() < 1e-9);

        // Spread as wide as the ceiling floors at zero.
        let score = analyzer.spread_score(&book(0.4875, 0.5125, 10.0));
        assert!(score < 1e-9);
    }

    #[test]
    fn degenerate_books_score_zero_spread() {
        let analyzer = MarketAnalyzer::default();
        assert_eq!(analyzer.spread_score(&Orderbook::default()), 0.0);
    }

    #[test]
    fn flat_prices_are_perfectly_stable() {
        let analyzer = MarketAnalyzer::default();
        assert_eq!(analyzer.volatility_score(&[0.5, 0.5, 0.5, 0.5]), 1.0);
        // Not enough history: neutral.
        assert_eq!(analyzer.volatility_score(&[0.5]), 0.5);
        // Wild swings floor at zero.
        assert_eq!(analyzer.volatility_score(&[0.1, 0.9, 0.1, 0.9]), 0.0);
    }

    #[test]
    fn time_decay_boundaries() {
        let analyzer = MarketAnalyzer::default();
        assert_eq!(
            analyzer.time_decay_score(Utc::now() - chrono::Duration::hours(1)),
            0.0
        );
        let far = analyzer.time_decay_score(Utc::now() + chrono::Duration::hours(48));
        assert_eq!(far, 1.0);
        let near = analyzer.time_decay_score(Utc::now() + chrono::Duration::hours(12));
        assert!((near - 0.5).abs() < 0.01);
    }

    #[test]
    fn overall_score_uses_documented_weights() {
        let quality = MarketQuality {
            liquidity_score: 1.0,
            spread_score: 0.5,
            volatility_score: 0.8,
            time_decay_score: 0.2,
        };
        let expected = 0.3 + 0.15 + 0.16 + 0.04;
        assert!((quality.overall_score() - expected).abs() < 1e-9);
    }

    #[test]
    fn overall_score_bounded() {
        let analyzer = MarketAnalyzer::default();
        let q = analyzer.quality(&book(0.49, 0.51, 99_999.0), &[0.5, 0.5], None);
        let overall = q.overall_score();
        assert!((0.0..=1.0).contains(&overall));
    }
}
