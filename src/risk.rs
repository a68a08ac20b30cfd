//! Risk Management Module
//!
//! Stateless validation of advisor verdicts against the hard limits, reading
//! only the volatile risk counters. Violations either reject the verdict
//! (daily loss, exposure ceiling, slippage) or cap its size (single-trade
//! cap, remaining exposure capacity). Rejections are values, not errors.

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::brain::decision::Verdict;
use crate::config::RiskConfig;
use crate::models::TradeAction;
use crate::storage::Cache;
use crate::venues::Orderbook;

/// Machine-readable risk violation kinds, embedded in rejection messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskViolation {
    DailyLossExceeded,
    ExposureExceeded,
    TradeSizeExceeded,
    SlippageExceeded,
}

impl RiskViolation {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskViolation::DailyLossExceeded => "daily_loss_exceeded",
            RiskViolation::ExposureExceeded => "exposure_exceeded",
            RiskViolation::TradeSizeExceeded => "trade_size_exceeded",
            RiskViolation::SlippageExceeded => "slippage_exceeded",
        }
    }
}

#[derive(Debug, Error)]
pub enum LiquidityError {
    #[error("insufficient liquidity: needed {needed}, available {available}")]
    InsufficientLiquidity { needed: f64, available: f64 },
}

pub struct RiskManager {
    cache: Arc<Cache>,
    pub max_daily_loss: f64,
    pub max_total_exposure: f64,
    pub max_single_trade: f64,
    pub max_slippage: f64,
}

impl RiskManager {
    pub fn new(cache: Arc<Cache>, config: &RiskConfig) -> Self {
        Self {
            cache,
            max_daily_loss: config.max_daily_loss,
            max_total_exposure: config.max_total_exposure,
            max_single_trade: config.max_single_trade,
            max_slippage: config.max_slippage,
        }
    }

    /// Validate and possibly adjust a verdict.
    ///
    /// Checks in order: pass rejections through, block on daily loss, cap at
    /// the single-trade limit, block on exhausted exposure, cap to remaining
    /// capacity. Adjusted verdicts carry a note in their reasoning.
    pub fn validate(&self, verdict: Verdict) -> Verdict {
        debug!(execute = verdict.execute, size = verdict.size, "risk validation");

        if !verdict.execute {
            return verdict;
        }

        let daily_pnl = self.cache.daily_pnl();
        if daily_pnl <= -self.max_daily_loss {
            warn!(
                kind = RiskViolation::DailyLossExceeded.as_str(),
                daily_pnl, "risk violation"
            );
            return Verdict::reject(format!(
                "Trade blocked: {} (daily P&L: {:.2}, limit: -{:.2})",
                RiskViolation::DailyLossExceeded.as_str(),
                daily_pnl,
                self.max_daily_loss,
            ));
        }

        let mut adjusted = verdict.size;
        if adjusted > self.max_single_trade {
            warn!(
                kind = RiskViolation::TradeSizeExceeded.as_str(),
                requested = adjusted,
                limit = self.max_single_trade,
                "capping trade size"
            );
            adjusted = self.max_single_trade;
        }

        let exposure = self.cache.open_exposure();
        let remaining = self.max_total_exposure - exposure;
        if remaining <= 0.0 {
            warn!(
                kind = RiskViolation::ExposureExceeded.as_str(),
                exposure, "risk violation"
            );
            return Verdict::reject(format!(
                "Trade blocked: {} (current exposure: {:.2}, limit: {:.2})",
                RiskViolation::ExposureExceeded.as_str(),
                exposure,
                self.max_total_exposure,
            ));
        }
        if adjusted > remaining {
            warn!(
                from = adjusted,
                to = remaining,
                "reducing size to remaining exposure capacity"
            );
            adjusted = remaining;
        }

        if adjusted != verdict.size {
            info!(from = verdict.size, to = adjusted, "size adjusted by risk manager");
            let mut out = verdict;
            out.reasoning = format!("{} [Size adjusted by risk manager]", out.reasoning);
            out.size = adjusted;
            return out;
        }

        verdict
    }

    /// Pre-check, applied before the main validation: reject when the market
    /// spread is strictly beyond the slippage tolerance.
    pub fn validate_slippage(&self, verdict: Verdict, spread: f64) -> Verdict {
        if !verdict.execute {
            return verdict;
        }
        if spread > self.max_slippage {
            warn!(
                kind = RiskViolation::SlippageExceeded.as_str(),
                spread,
                limit = self.max_slippage,
                "risk violation"
            );
            return Verdict::reject(format!(
                "Trade blocked: {} (spread: {:.2}%, limit: {:.2}%)",
                RiskViolation::SlippageExceeded.as_str(),
                spread * 100.0,
                self.max_slippage * 100.0,
            ));
        }
        verdict
    }
}

/// Estimate the average fill price of a market order against the book:
/// asks for BUY, bids for SELL, consuming levels until `size` is filled.
pub fn estimate_fill_price(
    book: &Orderbook,
    action: TradeAction,
    size: f64,
) -> Result<f64, LiquidityError> {
    let levels = match action {
        TradeAction::Buy => &book.asks,
        TradeAction::Sell => &book.bids,
    };

    let mut remaining = size;
    let mut total_cost = 0.0;
    for level in levels {
        let fill = remaining.min(level.size);
        total_cost += fill * level.price;
        remaining -= fill;
        if remaining <= 0.0 {
            break;
        }
    }

    if remaining > 0.0 {
        return Err(LiquidityError::InsufficientLiquidity {
            needed: size,
            available: size - remaining,
        });
    }
    Ok(total_cost / size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::venues::BookLevel;

    fn manager(cache: Arc<Cache>) -> RiskManager {
        RiskManager::new(
            cache,
            &RiskConfig {
                max_daily_loss: 500.0,
                max_total_exposure: 2000.0,
                max_single_trade: 300.0,
                max_slippage: 0.05,
            },
        )
    }

    fn approve(size: f64) -> Verdict {
        Verdict::approve(size, 0.8, "looks good")
    }

    #[test]
    fn rejections_pass_through_unchanged() {
        let cache = Arc::new(Cache::new());
        cache.update_daily_pnl(-9999.0);
        let verdict = Verdict::reject("advisor said no");
        let out = manager(cache).validate(verdict.clone());
        assert_eq!(out, verdict);
    }

    #[test]
    fn daily_loss_at_exact_limit_rejects() {
        let cache = Arc::new(Cache::new());
        cache.update_daily_pnl(-500.0);
        let out = manager(cache).validate(approve(50.0));
        assert!(!out.execute);
        assert!(out.reasoning.contains("daily_loss_exceeded"));
    }

    #[test]
    fn daily_loss_message_carries_both_numbers() {
        let cache = Arc::new(Cache::new());
        cache.update_daily_pnl(-550.0);
        let out = manager(cache).validate(approve(50.0));
        assert!(out.reasoning.contains("-550.00"));
        assert!(out.reasoning.contains("-500.00"));
    }

    #[test]
    fn daily_loss_inside_limit_passes() {
        let cache = Arc::new(Cache::new());
        cache.update_daily_pnl(-499.99);
        let out = manager(cache).validate(approve(50.0));
        assert!(out.execute);
        assert_eq!(out.size, 50.0);
    }

    #[test]
    fn size_at_exact_cap_is_not_adjusted() {
        let cache = Arc::new(Cache::new());
        let out = manager(cache).validate(approve(300.0));
        assert!(out.execute);
        assert_eq!(out.size, 300.0);
        assert!(!out.reasoning.contains("adjusted"));
    }

    #[test]
    fn oversized_trade_is_capped_with_note() {
        let cache = Arc::new(Cache::new());
        let out = manager(cache).validate(approve(500.0));
        assert!(out.execute);
        assert_eq!(out.size, 300.0);
        assert!(out.reasoning.contains("Size adjusted by risk manager"));
    }

    #[test]
    fn exposure_at_exact_ceiling_rejects() {
        let cache = Arc::new(Cache::new());
        cache.update_open_exposure(2000.0);
        let out = manager(cache).validate(approve(10.0));
        assert!(!out.execute);
        assert!(out.reasoning.contains("exposure_exceeded"));
    }

    #[test]
    fn size_capped_then_capped_again_to_remaining_capacity() {
        let cache = Arc::new(Cache::new());
        cache.update_open_exposure(1900.0);
        let out = manager(cache).validate(approve(500.0));
        assert!(out.execute);
        assert_eq!(out.size, 100.0);
        assert!(out.reasoning.contains("Size adjusted by risk manager"));
    }

    #[test]
    fn validated_size_never_exceeds_caps() {
        for (exposure, requested) in [(0.0, 250.0), (1500.0, 800.0), (1999.0, 1.5)] {
            let cache = Arc::new(Cache::new());
            cache.update_open_exposure(exposure);
            let out = manager(cache).validate(approve(requested));
            assert!(out.execute);
            assert!(out.size <= 300.0);
            assert!(out.size <= 2000.0 - exposure + 1e-9);
        }
    }

    #[test]
    fn slippage_boundary_semantics() {
        let cache = Arc::new(Cache::new());
        let mgr = manager(cache);

        let out = mgr.validate_slippage(approve(50.0), 0.05);
        assert!(out.execute, "spread at exactly the limit is accepted");

        let out = mgr.validate_slippage(approve(50.0), 0.0501);
        assert!(!out.execute);
        assert!(out.reasoning.contains("slippage_exceeded"));
    }

    #[test]
    fn slippage_skips_rejected_verdicts() {
        let cache = Arc::new(Cache::new());
        let verdict = Verdict::reject("no");
        let out = manager(cache).validate_slippage(verdict.clone(), 0.5);
        assert_eq!(out, verdict);
    }

    fn book() -> Orderbook {
        Orderbook {
            bids: vec![
                BookLevel { price: 0.48, size: 10.0 },
                BookLevel { price: 0.45, size: 20.0 },
            ],
            asks: vec![
                BookLevel { price: 0.52, size: 10.0 },
                BookLevel { price: 0.55, size: 20.0 },
            ],
        }
        .normalize()
    }

    #[test]
    fn fill_price_walks_ask_levels_for_buys() {
        let avg = estimate_fill_price(&book(), TradeAction::Buy, 20.0).unwrap();
        // 10 @ 0.52 + 10 @ 0.55
        assert!((avg - 0.535).abs() < 1e-9);
    }

    #[test]
    fn fill_price_walks_bid_levels_for_sells() {
        let avg = estimate_fill_price(&book(), TradeAction::Sell, 15.0).unwrap();
        // 10 @ 0.48 + 5 @ 0.45
        assert!((avg - (10.0 * 0.48 + 5.0 * 0.45) / 15.0).abs() < 1e-9);
    }

    #[test]
    fn exhausted_book_reports_available_size() {
        let err = estimate_fill_price(&book(), TradeAction::Buy, 100.0).unwrap_err();
        match err {
            LiquidityError::InsufficientLiquidity { needed, available } => {
                assert_eq!(needed, 100.0);
                assert_eq!(available, 30.0);
            }
        }
    }
}
