//! Auto-disable checks for underperforming wallets.
//!
//! A wallet is disabled when its confidence collapses, its 7-day drawdown
//! blows through the limit, or it goes quiet for too long. The check only
//! recommends; the caller flips the wallet's enabled flag.

use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct DisableCheck {
    pub should_disable: bool,
    pub reason: Option<String>,
}

impl DisableCheck {
    fn keep() -> Self {
        Self {
            should_disable: false,
            reason: None,
        }
    }

    fn disable(reason: String) -> Self {
        Self {
            should_disable: true,
            reason: Some(reason),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AutoDisableChecker {
    pub min_confidence: f64,
    /// Negative fraction, e.g. -0.20 for a 20% drawdown limit.
    pub max_drawdown: f64,
    pub inactive_days: i64,
}

impl Default for AutoDisableChecker {
    fn default() -> Self {
        Self {
            min_confidence: 0.3,
            max_drawdown: -0.20,
            inactive_days: 30,
        }
    }
}

impl AutoDisableChecker {
    pub fn check(
        &self,
        wallet_address: &str,
        confidence_score: f64,
        drawdown_7d: f64,
        last_trade_days_ago: i64,
    ) -> DisableCheck {
        if confidence_score < self.min_confidence {
            warn!(
                wallet = wallet_address,
                confidence_score, "wallet below confidence threshold"
            );
            return DisableCheck::disable(format!(
                "Confidence score {:.2} below threshold {:.2}",
                confidence_score, self.min_confidence
            ));
        }

        if drawdown_7d < self.max_drawdown {
            warn!(wallet = wallet_address, drawdown_7d, "wallet exceeds drawdown limit");
            return DisableCheck::disable(format!(
                "Drawdown {:.1}% exceeds limit {:.1}%",
                drawdown_7d * 100.0,
                self.max_drawdown * 100.0
            ));
        }

        if last_trade_days_ago > self.inactive_days {
            warn!(
                wallet = wallet_address,
                last_trade_days_ago, "wallet inactive too long"
            );
            return DisableCheck::disable(format!(
                "Inactive for {} days",
                last_trade_days_ago
            ));
        }

        DisableCheck::keep()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn healthy_wallet_stays_enabled() {
        let checker = AutoDisableChecker::default();
        let result = checker.check("0xaaa", 0.7, -0.05, 3);
        assert!(!result.should_disable);
    }

    #[test]
    fn low_confidence_disables() {
        let checker = AutoDisableChecker::default();
        let result = checker.check("0xaaa", 0.2, 0.0, 1);
        assert!(result.should_disable);
        assert!(result.reason.unwrap().contains("Confidence"));
    }

    #[test]
    fn deep_drawdown_disables() {
        let checker = AutoDisableChecker::default();
        let result = checker.check("0xaaa", 0.8, -0.25, 1);
        assert!(result.should_disable);
        assert!(result.reason.unwrap().contains("Drawdown"));
    }

    #[test]
    fn drawdown_at_exact_limit_is_kept() {
        let checker = AutoDisableChecker::default();
        assert!(!checker.check("0xaaa", 0.8, -0.20, 1).should_disable);
    }

    #[test]
    fn inactivity_disables() {
        let checker = AutoDisableChecker::default();
        let result = checker.check("0xaaa", 0.8, 0.0, 31);
        assert!(result.should_disable);
        assert!(result.reason.unwrap().contains("Inactive"));
    }
}
