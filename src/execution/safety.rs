//! Safety guard: the interlocks in front of live trading.
//!
//! Live mode requires three factors: credentials present, the operator's
//! live confirmation, and no active emergency stop. The emergency stop is a
//! latch recorded with reason and time; resetting it is explicit and
//! idempotent.

use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::storage::cache::EmergencyStop;
use crate::storage::Cache;

#[derive(Debug, Error)]
pub enum SafetyError {
    #[error("live mode blocked: {0}")]
    LiveModeBlocked(String),
}

pub struct SafetyGuard {
    cache: Arc<Cache>,
}

impl SafetyGuard {
    pub fn new(cache: Arc<Cache>) -> Self {
        Self { cache }
    }

    pub fn is_stopped(&self) -> bool {
        self.cache.is_stopped()
    }

    pub fn emergency_stop(&self) -> EmergencyStop {
        self.cache.emergency_stop()
    }

    /// Three-factor check before any live submission.
    pub fn check_live_mode_allowed(&self, has_credentials: bool) -> Result<(), SafetyError> {
        if !has_credentials {
            return Err(SafetyError::LiveModeBlocked(
                "live mode requires API credentials".to_string(),
            ));
        }
        if !self.cache.live_confirmed() {
            return Err(SafetyError::LiveModeBlocked(
                "live mode requires explicit confirmation".to_string(),
            ));
        }
        self.check_execution_allowed()
    }

    pub fn check_execution_allowed(&self) -> Result<(), SafetyError> {
        let stop = self.cache.emergency_stop();
        if stop.active {
            return Err(SafetyError::LiveModeBlocked(format!(
                "emergency stop active: {}",
                stop.reason.unwrap_or_else(|| "unknown".to_string())
            )));
        }
        Ok(())
    }

    pub fn activate_emergency_stop(&self, reason: &str) {
        warn!(reason, "EMERGENCY STOP ACTIVATED");
        self.cache.set_emergency_stop(reason);
    }

    pub fn reset_emergency_stop(&self) {
        info!("emergency stop reset");
        self.cache.reset_emergency_stop();
    }

    /// True while the operator has not yet acknowledged the first-live-trade
    /// warning.
    pub fn check_first_live_trade(&self) -> bool {
        !self.cache.first_live_trade_acknowledged()
    }

    pub fn acknowledge_first_live_trade(&self) {
        info!("first live trade warning acknowledged");
        self.cache.acknowledge_first_live_trade();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> (SafetyGuard, Arc<Cache>) {
        let cache = Arc::new(Cache::new());
        (SafetyGuard::new(cache.clone()), cache)
    }

    #[test]
    fn live_mode_needs_credentials() {
        let (guard, cache) = guard();
        cache.set_live_confirmed(true);
        assert!(guard.check_live_mode_allowed(false).is_err());
        assert!(guard.check_live_mode_allowed(true).is_ok());
    }

    #[test]
    fn live_mode_needs_confirmation() {
        let (guard, _cache) = guard();
        let err = guard.check_live_mode_allowed(true).unwrap_err();
        assert!(err.to_string().contains("confirmation"));
    }

    #[test]
    fn emergency_stop_blocks_execution() {
        let (guard, cache) = guard();
        cache.set_live_confirmed(true);

        guard.activate_emergency_stop("fat finger");
        let err = guard.check_live_mode_allowed(true).unwrap_err();
        assert!(err.to_string().contains("fat finger"));

        guard.reset_emergency_stop();
        assert!(guard.check_live_mode_allowed(true).is_ok());
    }

    #[test]
    fn double_activation_keeps_latest_reason() {
        let (guard, _cache) = guard();
        guard.activate_emergency_stop("first");
        guard.activate_emergency_stop("second");

        let stop = guard.emergency_stop();
        assert!(stop.active);
        assert_eq!(stop.reason.as_deref(), Some("second"));
    }

    #[test]
    fn reset_is_idempotent() {
        let (guard, _cache) = guard();
        guard.reset_emergency_stop();
        guard.reset_emergency_stop();
        assert!(!guard.is_stopped());
    }

    #[test]
    fn first_live_trade_warning_flow() {
        let (guard, _cache) = guard();
        assert!(guard.check_first_live_trade());
        guard.acknowledge_first_live_trade();
        assert!(!guard.check_first_live_trade());
    }
}
