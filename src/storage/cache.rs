//! Volatile keyspace for realtime trading state.
//!
//! In-process replacement for an external KV store: a single lock around the
//! keyspace gives atomic read-modify-write for the risk counters and
//! read-your-own-writes inside a pipeline stage. Numeric counters are mutated
//! only through `incr_by_float`; price entries carry a 60 second TTL.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::config::TradingMode;

const KEY_DAILY_PNL: &str = "risk:daily_pnl";
const KEY_OPEN_EXPOSURE: &str = "risk:open_exposure";
const KEY_MODE: &str = "system:mode";
const KEY_EMERGENCY_STOP: &str = "system:emergency_stop";
const KEY_LIVE_CONFIRMED: &str = "system:live_confirmed";
const KEY_FIRST_LIVE_ACK: &str = "system:first_live_trade_acknowledged";

const PRICE_TTL: Duration = Duration::from_secs(60);

/// Emergency-stop latch, stored with its reason and activation time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmergencyStop {
    pub active: bool,
    pub reason: Option<String>,
    pub time: Option<DateTime<Utc>>,
}

struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn live(&self) -> bool {
        self.expires_at.map_or(true, |t| Instant::now() < t)
    }
}

#[derive(Default)]
pub struct Cache {
    inner: Mutex<HashMap<String, Entry>>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    // Generic operations

    pub fn get(&self, key: &str) -> Option<Value> {
        let mut map = self.inner.lock();
        match map.get(key) {
            Some(entry) if entry.live() => Some(entry.value.clone()),
            Some(_) => {
                map.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn set(&self, key: &str, value: Value, ttl: Option<Duration>) {
        let entry = Entry {
            value,
            expires_at: ttl.map(|d| Instant::now() + d),
        };
        self.inner.lock().insert(key.to_string(), entry);
    }

    pub fn delete(&self, key: &str) -> bool {
        self.inner.lock().remove(key).is_some()
    }

    /// Atomic increment of a float-valued key. This is the only mutation path
    /// for the risk counters; get-then-set would lose updates under
    /// concurrent paper executions.
    pub fn incr_by_float(&self, key: &str, delta: f64) -> f64 {
        let mut map = self.inner.lock();
        let current = map
            .get(key)
            .filter(|e| e.live())
            .and_then(|e| e.value.as_f64())
            .unwrap_or(0.0);
        let updated = current + delta;
        map.insert(
            key.to_string(),
            Entry {
                value: Value::from(updated),
                expires_at: None,
            },
        );
        updated
    }

    // Risk state

    pub fn daily_pnl(&self) -> f64 {
        self.get(KEY_DAILY_PNL).and_then(|v| v.as_f64()).unwrap_or(0.0)
    }

    pub fn update_daily_pnl(&self, delta: f64) -> f64 {
        self.incr_by_float(KEY_DAILY_PNL, delta)
    }

    pub fn reset_daily_pnl(&self) {
        self.set(KEY_DAILY_PNL, Value::from(0.0), None);
    }

    pub fn open_exposure(&self) -> f64 {
        self.get(KEY_OPEN_EXPOSURE)
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0)
    }

    pub fn update_open_exposure(&self, delta: f64) -> f64 {
        self.incr_by_float(KEY_OPEN_EXPOSURE, delta)
    }

    // System state

    pub fn mode(&self) -> TradingMode {
        self.get(KEY_MODE)
            .and_then(|v| v.as_str().and_then(TradingMode::parse))
            .unwrap_or(TradingMode::Paper)
    }

    pub fn set_mode(&self, mode: TradingMode) {
        self.set(KEY_MODE, Value::from(mode.as_str()), None);
    }

    pub fn emergency_stop(&self) -> EmergencyStop {
        self.get(KEY_EMERGENCY_STOP)
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or(EmergencyStop {
                active: false,
                reason: None,
                time: None,
            })
    }

    pub fn is_stopped(&self) -> bool {
        self.emergency_stop().active
    }

    /// Activating twice keeps the latch set with the most recent reason.
    pub fn set_emergency_stop(&self, reason: &str) {
        let stop = EmergencyStop {
            active: true,
            reason: Some(reason.to_string()),
            time: Some(Utc::now()),
        };
        self.set(
            KEY_EMERGENCY_STOP,
            serde_json::to_value(&stop).unwrap_or(Value::Null),
            None,
        );
    }

    pub fn reset_emergency_stop(&self) {
        let stop = EmergencyStop {
            active: false,
            reason: None,
            time: None,
        };
        self.set(
            KEY_EMERGENCY_STOP,
            serde_json::to_value(&stop).unwrap_or(Value::Null),
            None,
        );
    }

    pub fn live_confirmed(&self) -> bool {
        self.get(KEY_LIVE_CONFIRMED)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    pub fn set_live_confirmed(&self, confirmed: bool) {
        self.set(KEY_LIVE_CONFIRMED, Value::from(confirmed), None);
    }

    pub fn first_live_trade_acknowledged(&self) -> bool {
        self.get(KEY_FIRST_LIVE_ACK)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    pub fn acknowledge_first_live_trade(&self) {
        self.set(KEY_FIRST_LIVE_ACK, Value::from(true), None);
    }

    // Wallet state

    pub fn wallet_cursor(&self, address: &str) -> Option<i64> {
        self.get(&format!("wallet:{}:last_cursor", address.to_lowercase()))
            .and_then(|v| v.as_i64())
    }

    pub fn set_wallet_cursor(&self, address: &str, cursor: i64) {
        self.set(
            &format!("wallet:{}:last_cursor", address.to_lowercase()),
            Value::from(cursor),
            None,
        );
    }

    // Market state

    pub fn market_price(&self, market_id: &str) -> Option<f64> {
        self.get(&format!("market:{}:price", market_id))
            .and_then(|v| v.as_f64())
    }

    pub fn set_market_price(&self, market_id: &str, price: f64) {
        self.set(
            &format!("market:{}:price", market_id),
            Value::from(price),
            Some(PRICE_TTL),
        );
    }
}
