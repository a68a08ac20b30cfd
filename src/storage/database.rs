//! SQLite-backed state store.
//!
//! One table per durable entity: wallets, wallet_metrics, trades, orders,
//! market_filters, market_mappings. Every mutation runs in a transaction and
//! read-modify-write paths hold the connection for the whole update. Wallet
//! addresses are canonicalised to lowercase before any comparison.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::execution::order::{Order, OrderStatus};
use crate::models::{Side, SignalSource, TradeAction};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletRecord {
    pub id: i64,
    pub address: String,
    pub alias: Option<String>,
    pub enabled: bool,
    pub scale_factor: f64,
    pub max_trade_size: Option<f64>,
    pub min_confidence: f64,
    pub created_at: DateTime<Utc>,
}

/// Mutable wallet control fields; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WalletControls {
    pub enabled: Option<bool>,
    pub scale_factor: Option<f64>,
    pub max_trade_size: Option<Option<f64>>,
    pub min_confidence: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletMetricsRecord {
    pub wallet_id: i64,
    pub win_rate: f64,
    pub avg_roi: f64,
    pub total_trades: i64,
    pub total_pnl: f64,
    pub updated_at: DateTime<Utc>,
}

/// Trade observation plus the operator's response, created at decision time
/// even when the decision was a rejection.
#[derive(Debug, Clone, Serialize)]
pub struct TradeRecord {
    pub id: i64,
    pub wallet_id: i64,
    pub wallet_address: String,
    pub market_id: String,
    pub token_id: String,
    pub side: Side,
    pub action: TradeAction,
    pub size: f64,
    pub price: f64,
    pub source: SignalSource,
    pub detected_at: DateTime<Utc>,
    pub ai_decision: Option<bool>,
    pub ai_confidence: Option<f64>,
    pub ai_reasoning: Option<String>,
    pub executed: bool,
    pub executed_size: Option<f64>,
    pub executed_price: Option<f64>,
    pub paper_mode: bool,
    pub pnl: Option<f64>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewTrade {
    pub wallet_address: String,
    pub market_id: String,
    pub token_id: String,
    pub side: Side,
    pub action: TradeAction,
    pub size: f64,
    pub price: f64,
    pub source: SignalSource,
    pub ai_decision: Option<bool>,
    pub ai_confidence: Option<f64>,
    pub ai_reasoning: Option<String>,
    pub executed: bool,
    pub executed_size: Option<f64>,
    pub executed_price: Option<f64>,
    pub paper_mode: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketFilterRecord {
    pub id: i64,
    pub filter_type: String,
    pub value: String,
    pub action: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketMappingRecord {
    pub id: i64,
    pub polymarket_id: String,
    pub kalshi_id: String,
    pub description: String,
    pub active: bool,
}

#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).context("open state store")?;
        Self::init(conn)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory store")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL").ok();
        conn.pragma_update(None, "foreign_keys", "ON").ok();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS wallets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                address TEXT NOT NULL UNIQUE,
                alias TEXT,
                enabled INTEGER NOT NULL DEFAULT 1,
                scale_factor REAL NOT NULL DEFAULT 1.0,
                max_trade_size REAL,
                min_confidence REAL NOT NULL DEFAULT 0.0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_wallets_address ON wallets(address)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS wallet_metrics (
                wallet_id INTEGER PRIMARY KEY REFERENCES wallets(id) ON DELETE CASCADE,
                win_rate REAL NOT NULL DEFAULT 0.0,
                avg_roi REAL NOT NULL DEFAULT 0.0,
                total_trades INTEGER NOT NULL DEFAULT 0,
                total_pnl REAL NOT NULL DEFAULT 0.0,
                updated_at INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                wallet_id INTEGER NOT NULL REFERENCES wallets(id) ON DELETE CASCADE,
                market_id TEXT NOT NULL,
                token_id TEXT NOT NULL,
                side TEXT NOT NULL,
                action TEXT NOT NULL,
                size REAL NOT NULL,
                price REAL NOT NULL,
                source TEXT NOT NULL,
                detected_at INTEGER NOT NULL,
                ai_decision INTEGER,
                ai_confidence REAL,
                ai_reasoning TEXT,
                executed INTEGER NOT NULL DEFAULT 0,
                executed_size REAL,
                executed_price REAL,
                paper_mode INTEGER NOT NULL DEFAULT 1,
                pnl REAL,
                resolved_at INTEGER
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_trades_wallet ON trades(wallet_id)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_trades_market ON trades(market_id)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS orders (
                id TEXT PRIMARY KEY,
                signal_id TEXT NOT NULL,
                market_id TEXT NOT NULL,
                side TEXT NOT NULL,
                requested_size REAL NOT NULL,
                requested_price REAL NOT NULL,
                external_id TEXT,
                status TEXT NOT NULL,
                filled_size REAL NOT NULL DEFAULT 0.0,
                filled_price REAL,
                attempts INTEGER NOT NULL DEFAULT 0,
                max_attempts INTEGER NOT NULL DEFAULT 3,
                failure_reason TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(status)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_orders_external ON orders(external_id)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS market_filters (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                filter_type TEXT NOT NULL,
                value TEXT NOT NULL,
                action TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS market_mappings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                polymarket_id TEXT NOT NULL,
                kalshi_id TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                active INTEGER NOT NULL DEFAULT 1,
                created_at INTEGER NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_mappings_pair
                ON market_mappings(polymarket_id, kalshi_id)",
            [],
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // Wallets

    pub async fn add_wallet(&self, address: &str, alias: Option<&str>) -> Result<WalletRecord> {
        let address = address.to_lowercase();
        let now = Utc::now().timestamp();
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO wallets (address, alias, enabled, scale_factor, min_confidence,
                                  created_at, updated_at)
             VALUES (?1, ?2, 1, 1.0, 0.0, ?3, ?3)",
            params![address, alias, now],
        )
        .context("insert wallet")?;
        let id = conn.last_insert_rowid();
        drop(conn);
        self.get_wallet(&address)
            .await?
            .with_context(|| format!("wallet {} vanished after insert (id {})", address, id))
    }

    pub async fn remove_wallet(&self, address: &str) -> Result<bool> {
        let address = address.to_lowercase();
        let conn = self.conn.lock().await;
        let n = conn.execute("DELETE FROM wallets WHERE address = ?1", params![address])?;
        Ok(n > 0)
    }

    pub async fn get_wallet(&self, address: &str) -> Result<Option<WalletRecord>> {
        let address = address.to_lowercase();
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT id, address, alias, enabled, scale_factor, max_trade_size,
                    min_confidence, created_at
             FROM wallets WHERE address = ?1",
        )?;
        let wallet = stmt
            .query_row(params![address], wallet_from_row)
            .optional()?;
        Ok(wallet)
    }

    pub async fn list_wallets(&self) -> Result<Vec<WalletRecord>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT id, address, alias, enabled, scale_factor, max_trade_size,
                    min_confidence, created_at
             FROM wallets ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map([], wallet_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub async fn list_enabled_wallets(&self) -> Result<Vec<WalletRecord>> {
        Ok(self
            .list_wallets()
            .await?
            .into_iter()
            .filter(|w| w.enabled)
            .collect())
    }

    /// Update wallet control fields atomically; returns false when the wallet
    /// does not exist.
    pub async fn update_wallet_controls(
        &self,
        address: &str,
        controls: &WalletControls,
    ) -> Result<bool> {
        let address = address.to_lowercase();
        let now = Utc::now().timestamp();
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM wallets WHERE address = ?1",
                params![address],
                |r| r.get(0),
            )
            .optional()?;
        let Some(id) = existing else {
            return Ok(false);
        };

        if let Some(enabled) = controls.enabled {
            tx.execute(
                "UPDATE wallets SET enabled = ?1, updated_at = ?2 WHERE id = ?3",
                params![enabled, now, id],
            )?;
        }
        if let Some(scale) = controls.scale_factor {
            if scale < 0.0 {
                bail!("scale_factor must be non-negative, got {}", scale);
            }
            tx.execute(
                "UPDATE wallets SET scale_factor = ?1, updated_at = ?2 WHERE id = ?3",
                params![scale, now, id],
            )?;
        }
        if let Some(max_trade) = &controls.max_trade_size {
            tx.execute(
                "UPDATE wallets SET max_trade_size = ?1, updated_at = ?2 WHERE id = ?3",
                params![max_trade, now, id],
            )?;
        }
        if let Some(min_conf) = controls.min_confidence {
            if !(0.0..=1.0).contains(&min_conf) {
                bail!("min_confidence must be in [0, 1], got {}", min_conf);
            }
            tx.execute(
                "UPDATE wallets SET min_confidence = ?1, updated_at = ?2 WHERE id = ?3",
                params![min_conf, now, id],
            )?;
        }

        tx.commit()?;
        Ok(true)
    }

    // Wallet metrics

    pub async fn wallet_metrics(&self, address: &str) -> Result<Option<WalletMetricsRecord>> {
        let address = address.to_lowercase();
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT m.wallet_id, m.win_rate, m.avg_roi, m.total_trades, m.total_pnl,
                    m.updated_at
             FROM wallet_metrics m JOIN wallets w ON w.id = m.wallet_id
             WHERE w.address = ?1",
        )?;
        let metrics = stmt
            .query_row(params![address], |row| {
                Ok(WalletMetricsRecord {
                    wallet_id: row.get(0)?,
                    win_rate: row.get(1)?,
                    avg_roi: row.get(2)?,
                    total_trades: row.get(3)?,
                    total_pnl: row.get(4)?,
                    updated_at: ts_to_datetime(row.get(5)?),
                })
            })
            .optional()?;
        Ok(metrics)
    }

    pub async fn upsert_wallet_metrics(&self, metrics: &WalletMetricsRecord) -> Result<()> {
        let now = Utc::now().timestamp();
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO wallet_metrics (wallet_id, win_rate, avg_roi, total_trades,
                                         total_pnl, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(wallet_id) DO UPDATE SET
                win_rate = ?2, avg_roi = ?3, total_trades = ?4, total_pnl = ?5,
                updated_at = ?6",
            params![
                metrics.wallet_id,
                metrics.win_rate,
                metrics.avg_roi,
                metrics.total_trades,
                metrics.total_pnl,
                now
            ],
        )?;
        Ok(())
    }

    /// Fold a resolved-trade outcome into the wallet aggregates. Win-rate and
    /// average ROI are recomputed incrementally inside one transaction so
    /// concurrent resolutions cannot interleave.
    pub async fn apply_trade_outcome(
        &self,
        wallet_id: i64,
        pnl: f64,
        trade_size: f64,
    ) -> Result<()> {
        let now = Utc::now().timestamp();
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let existing: Option<(f64, f64, i64, f64)> = tx
            .query_row(
                "SELECT win_rate, avg_roi, total_trades, total_pnl
                 FROM wallet_metrics WHERE wallet_id = ?1",
                params![wallet_id],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .optional()?;

        let (win_rate, avg_roi, total_trades, total_pnl) =
            existing.unwrap_or((0.0, 0.0, 0, 0.0));
        let won = if pnl > 0.0 { 1.0 } else { 0.0 };
        let roi = if trade_size > 0.0 { pnl / trade_size } else { 0.0 };
        let n = total_trades as f64;

        let new_total = total_trades + 1;
        let new_win_rate = (win_rate * n + won) / (n + 1.0);
        let new_avg_roi = (avg_roi * n + roi) / (n + 1.0);
        let new_total_pnl = total_pnl + pnl;

        tx.execute(
            "INSERT INTO wallet_metrics (wallet_id, win_rate, avg_roi, total_trades,
                                         total_pnl, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(wallet_id) DO UPDATE SET
                win_rate = ?2, avg_roi = ?3, total_trades = ?4, total_pnl = ?5,
                updated_at = ?6",
            params![wallet_id, new_win_rate, new_avg_roi, new_total, new_total_pnl, now],
        )?;
        tx.commit()?;
        Ok(())
    }

    // Trades

    /// Insert a trade observation. Wallets are auto-registered (disabled,
    /// synthetic sources included) so rejected signals from unknown wallets
    /// still leave an audit row.
    pub async fn insert_trade(&self, trade: &NewTrade) -> Result<i64> {
        let address = trade.wallet_address.to_lowercase();
        let now = Utc::now().timestamp();
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let wallet_id: Option<i64> = tx
            .query_row(
                "SELECT id FROM wallets WHERE address = ?1",
                params![address],
                |r| r.get(0),
            )
            .optional()?;
        let wallet_id = match wallet_id {
            Some(id) => id,
            None => {
                tx.execute(
                    "INSERT INTO wallets (address, alias, enabled, scale_factor,
                                          min_confidence, created_at, updated_at)
                     VALUES (?1, NULL, 0, 1.0, 0.0, ?2, ?2)",
                    params![address, now],
                )?;
                tx.last_insert_rowid()
            }
        };

        tx.execute(
            "INSERT INTO trades (wallet_id, market_id, token_id, side, action, size,
                                 price, source, detected_at, ai_decision, ai_confidence,
                                 ai_reasoning, executed, executed_size, executed_price,
                                 paper_mode)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                wallet_id,
                trade.market_id,
                trade.token_id,
                trade.side.as_str(),
                trade.action.as_str(),
                trade.size,
                trade.price,
                trade.source.as_str(),
                now,
                trade.ai_decision,
                trade.ai_confidence,
                trade.ai_reasoning,
                trade.executed,
                trade.executed_size,
                trade.executed_price,
                trade.paper_mode,
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(id)
    }

    pub async fn recent_trades(&self, limit: usize, executed_only: bool) -> Result<Vec<TradeRecord>> {
        let conn = self.conn.lock().await;
        let sql = if executed_only {
            "SELECT t.id, t.wallet_id, w.address, t.market_id, t.token_id, t.side,
                    t.action, t.size, t.price, t.source, t.detected_at, t.ai_decision,
                    t.ai_confidence, t.ai_reasoning, t.executed, t.executed_size,
                    t.executed_price, t.paper_mode, t.pnl, t.resolved_at
             FROM trades t JOIN wallets w ON w.id = t.wallet_id
             WHERE t.executed = 1
             ORDER BY t.detected_at DESC, t.id DESC LIMIT ?1"
        } else {
            "SELECT t.id, t.wallet_id, w.address, t.market_id, t.token_id, t.side,
                    t.action, t.size, t.price, t.source, t.detected_at, t.ai_decision,
                    t.ai_confidence, t.ai_reasoning, t.executed, t.executed_size,
                    t.executed_price, t.paper_mode, t.pnl, t.resolved_at
             FROM trades t JOIN wallets w ON w.id = t.wallet_id
             ORDER BY t.detected_at DESC, t.id DESC LIMIT ?1"
        };
        let mut stmt = conn.prepare_cached(sql)?;
        let rows = stmt.query_map(params![limit as i64], trade_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Executed trades still awaiting resolution.
    pub async fn trades_without_pnl(&self) -> Result<Vec<TradeRecord>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT t.id, t.wallet_id, w.address, t.market_id, t.token_id, t.side,
                    t.action, t.size, t.price, t.source, t.detected_at, t.ai_decision,
                    t.ai_confidence, t.ai_reasoning, t.executed, t.executed_size,
                    t.executed_price, t.paper_mode, t.pnl, t.resolved_at
             FROM trades t JOIN wallets w ON w.id = t.wallet_id
             WHERE t.executed = 1 AND t.pnl IS NULL",
        )?;
        let rows = stmt.query_map([], trade_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub async fn finalize_trade_pnl(&self, trade_id: i64, pnl: f64) -> Result<bool> {
        let now = Utc::now().timestamp();
        let conn = self.conn.lock().await;
        let n = conn.execute(
            "UPDATE trades SET pnl = ?1, resolved_at = ?2 WHERE id = ?3",
            params![pnl, now, trade_id],
        )?;
        Ok(n > 0)
    }

    // Orders

    pub async fn insert_order(&self, order: &Order) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO orders (id, signal_id, market_id, side, requested_size,
                                 requested_price, external_id, status, filled_size,
                                 filled_price, attempts, max_attempts, failure_reason,
                                 created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                order.id,
                order.signal_id,
                order.market_id,
                order.side.as_str(),
                order.requested_size,
                order.requested_price,
                order.external_id,
                order.status.as_str(),
                order.filled_size,
                order.filled_price,
                order.attempts,
                order.max_attempts,
                order.failure_reason,
                order.created_at.timestamp(),
                order.updated_at.timestamp(),
            ],
        )
        .context("insert order")?;
        Ok(())
    }

    pub async fn update_order(&self, order: &Order) -> Result<()> {
        let conn = self.conn.lock().await;
        let n = conn.execute(
            "UPDATE orders SET external_id = ?2, status = ?3, filled_size = ?4,
                    filled_price = ?5, attempts = ?6, failure_reason = ?7,
                    updated_at = ?8
             WHERE id = ?1",
            params![
                order.id,
                order.external_id,
                order.status.as_str(),
                order.filled_size,
                order.filled_price,
                order.attempts,
                order.failure_reason,
                order.updated_at.timestamp(),
            ],
        )?;
        if n == 0 {
            bail!("order {} not found", order.id);
        }
        Ok(())
    }

    pub async fn get_order(&self, order_id: &str) -> Result<Option<Order>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT id, signal_id, market_id, side, requested_size, requested_price,
                    external_id, status, filled_size, filled_price, attempts,
                    max_attempts, failure_reason, created_at, updated_at
             FROM orders WHERE id = ?1",
        )?;
        let order = stmt.query_row(params![order_id], order_from_row).optional()?;
        Ok(order)
    }

    pub async fn list_orders(
        &self,
        status: Option<OrderStatus>,
        limit: usize,
    ) -> Result<Vec<Order>> {
        let conn = self.conn.lock().await;
        let mut out = Vec::new();
        match status {
            Some(status) => {
                let mut stmt = conn.prepare_cached(
                    "SELECT id, signal_id, market_id, side, requested_size,
                            requested_price, external_id, status, filled_size,
                            filled_price, attempts, max_attempts, failure_reason,
                            created_at, updated_at
                     FROM orders WHERE status = ?1
                     ORDER BY created_at DESC LIMIT ?2",
                )?;
                let rows = stmt.query_map(params![status.as_str(), limit as i64], order_from_row)?;
                for row in rows {
                    out.push(row?);
                }
            }
            None => {
                let mut stmt = conn.prepare_cached(
                    "SELECT id, signal_id, market_id, side, requested_size,
                            requested_price, external_id, status, filled_size,
                            filled_price, attempts, max_attempts, failure_reason,
                            created_at, updated_at
                     FROM orders ORDER BY created_at DESC LIMIT ?1",
                )?;
                let rows = stmt.query_map(params![limit as i64], order_from_row)?;
                for row in rows {
                    out.push(row?);
                }
            }
        }
        Ok(out)
    }

    // Market filters

    pub async fn list_market_filters(&self) -> Result<Vec<MarketFilterRecord>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT id, filter_type, value, action FROM market_filters
             ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(MarketFilterRecord {
                id: row.get(0)?,
                filter_type: row.get(1)?,
                value: row.get(2)?,
                action: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub async fn add_market_filter(
        &self,
        filter_type: &str,
        value: &str,
        action: &str,
    ) -> Result<MarketFilterRecord> {
        let now = Utc::now().timestamp();
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO market_filters (filter_type, value, action, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![filter_type, value, action, now],
        )?;
        Ok(MarketFilterRecord {
            id: conn.last_insert_rowid(),
            filter_type: filter_type.to_string(),
            value: value.to_string(),
            action: action.to_string(),
        })
    }

    pub async fn remove_market_filter(&self, filter_id: i64) -> Result<bool> {
        let conn = self.conn.lock().await;
        let n = conn.execute("DELETE FROM market_filters WHERE id = ?1", params![filter_id])?;
        Ok(n > 0)
    }

    // Market mappings

    pub async fn list_market_mappings(&self) -> Result<Vec<MarketMappingRecord>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT id, polymarket_id, kalshi_id, description, active
             FROM market_mappings ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(MarketMappingRecord {
                id: row.get(0)?,
                polymarket_id: row.get(1)?,
                kalshi_id: row.get(2)?,
                description: row.get(3)?,
                active: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub async fn active_market_mappings(&self) -> Result<Vec<MarketMappingRecord>> {
        Ok(self
            .list_market_mappings()
            .await?
            .into_iter()
            .filter(|m| m.active)
            .collect())
    }

    pub async fn add_market_mapping(
        &self,
        polymarket_id: &str,
        kalshi_id: &str,
        description: &str,
        active: bool,
    ) -> Result<MarketMappingRecord> {
        let now = Utc::now().timestamp();
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO market_mappings (polymarket_id, kalshi_id, description,
                                          active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![polymarket_id, kalshi_id, description, active, now],
        )?;
        Ok(MarketMappingRecord {
            id: conn.last_insert_rowid(),
            polymarket_id: polymarket_id.to_string(),
            kalshi_id: kalshi_id.to_string(),
            description: description.to_string(),
            active,
        })
    }

    pub async fn remove_market_mapping(&self, mapping_id: i64) -> Result<bool> {
        let conn = self.conn.lock().await;
        let n = conn.execute(
            "DELETE FROM market_mappings WHERE id = ?1",
            params![mapping_id],
        )?;
        Ok(n > 0)
    }

    pub async fn wallet_count(&self) -> Result<usize> {
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM wallets", [], |r| r.get(0))?;
        Ok(count as usize)
    }
}

fn ts_to_datetime(ts: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(ts, 0).unwrap_or_else(Utc::now)
}

fn wallet_from_row(row: &Row<'_>) -> rusqlite::Result<WalletRecord> {
    Ok(WalletRecord {
        id: row.get(0)?,
        address: row.get(1)?,
        alias: row.get(2)?,
        enabled: row.get(3)?,
        scale_factor: row.get(4)?,
        max_trade_size: row.get(5)?,
        min_confidence: row.get(6)?,
        created_at: ts_to_datetime(row.get(7)?),
    })
}

fn trade_from_row(row: &Row<'_>) -> rusqlite::Result<TradeRecord> {
    let side: String = row.get(5)?;
    let action: String = row.get(6)?;
    let source: String = row.get(9)?;
    Ok(TradeRecord {
        id: row.get(0)?,
        wallet_id: row.get(1)?,
        wallet_address: row.get(2)?,
        market_id: row.get(3)?,
        token_id: row.get(4)?,
        side: Side::parse(&side).unwrap_or(Side::Yes),
        action: TradeAction::parse(&action).unwrap_or(TradeAction::Buy),
        size: row.get(7)?,
        price: row.get(8)?,
        source: SignalSource::parse(&source).unwrap_or(SignalSource::Clob),
        detected_at: ts_to_datetime(row.get(10)?),
        ai_decision: row.get(11)?,
        ai_confidence: row.get(12)?,
        ai_reasoning: row.get(13)?,
        executed: row.get(14)?,
        executed_size: row.get(15)?,
        executed_price: row.get(16)?,
        paper_mode: row.get(17)?,
        pnl: row.get(18)?,
        resolved_at: {
            let ts: Option<i64> = row.get(19)?;
            ts.map(ts_to_datetime)
        },
    })
}

fn order_from_row(row: &Row<'_>) -> rusqlite::Result<Order> {
    let side: String = row.get(3)?;
    let status: String = row.get(7)?;
    Ok(Order {
        id: row.get(0)?,
        signal_id: row.get(1)?,
        market_id: row.get(2)?,
        side: TradeAction::parse(&side).unwrap_or(TradeAction::Buy),
        requested_size: row.get(4)?,
        requested_price: row.get(5)?,
        external_id: row.get(6)?,
        status: OrderStatus::parse(&status).unwrap_or(OrderStatus::Pending),
        filled_size: row.get(8)?,
        filled_price: row.get(9)?,
        attempts: row.get(10)?,
        max_attempts: row.get(11)?,
        failure_reason: row.get(12)?,
        created_at: ts_to_datetime(row.get(13)?),
        updated_at: ts_to_datetime(row.get(14)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::order::Order;

    async fn store() -> Store {
        Store::in_memory().unwrap()
    }

    #[tokio::test]
    async fn wallet_crud_canonicalises_address() {
        let store = store().await;
        let wallet = store.add_wallet("0xABCdef", Some("whale")).await.unwrap();
        assert_eq!(wallet.address, "0xabcdef");
        assert!(wallet.enabled);
        assert_eq!(wallet.scale_factor, 1.0);

        let found = store.get_wallet("0xAbCdEf").await.unwrap();
        assert!(found.is_some());

        assert!(store.remove_wallet("0XABCDEF").await.unwrap());
        assert!(store.get_wallet("0xabcdef").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_wallet_is_rejected() {
        let store = store().await;
        store.add_wallet("0xaaa", None).await.unwrap();
        assert!(store.add_wallet("0xAAA", None).await.is_err());
    }

    #[tokio::test]
    async fn wallet_controls_update() {
        let store = store().await;
        store.add_wallet("0xaaa", None).await.unwrap();

        let updated = store
            .update_wallet_controls(
                "0xaaa",
                &WalletControls {
                    enabled: Some(false),
                    scale_factor: Some(0.5),
                    max_trade_size: Some(Some(75.0)),
                    min_confidence: Some(0.6),
                },
            )
            .await
            .unwrap();
        assert!(updated);

        let wallet = store.get_wallet("0xaaa").await.unwrap().unwrap();
        assert!(!wallet.enabled);
        assert_eq!(wallet.scale_factor, 0.5);
        assert_eq!(wallet.max_trade_size, Some(75.0));
        assert_eq!(wallet.min_confidence, 0.6);

        let missing = store
            .update_wallet_controls("0xbbb", &WalletControls::default())
            .await
            .unwrap();
        assert!(!missing);
    }

    #[tokio::test]
    async fn invalid_controls_are_rejected() {
        let store = store().await;
        store.add_wallet("0xaaa", None).await.unwrap();
        let result = store
            .update_wallet_controls(
                "0xaaa",
                &WalletControls {
                    min_confidence: Some(1.5),
                    ..Default::default()
                },
            )
            .await;
        assert!(result.is_err());
    }

    fn sample_trade(executed: bool) -> NewTrade {
        NewTrade {
            wallet_address: "0xAAA".to_string(),
            market_id: "cond-1".to_string(),
            token_id: "tok-1".to_string(),
            side: Side::Yes,
            action: TradeAction::Buy,
            size: 50.0,
            price: 0.4,
            source: SignalSource::Clob,
            ai_decision: Some(executed),
            ai_confidence: Some(0.8),
            ai_reasoning: Some("test".to_string()),
            executed,
            executed_size: executed.then_some(50.0),
            executed_price: executed.then_some(0.4),
            paper_mode: true,
        }
    }

    #[tokio::test]
    async fn trades_auto_register_unknown_wallets() {
        let store = store().await;
        store.insert_trade(&sample_trade(true)).await.unwrap();

        let wallet = store.get_wallet("0xaaa").await.unwrap().unwrap();
        assert!(!wallet.enabled, "auto-registered wallets start disabled");

        let trades = store.recent_trades(10, false).await.unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].wallet_address, "0xaaa");
    }

    #[tokio::test]
    async fn executed_only_filter() {
        let store = store().await;
        store.insert_trade(&sample_trade(true)).await.unwrap();
        store.insert_trade(&sample_trade(false)).await.unwrap();

        assert_eq!(store.recent_trades(10, false).await.unwrap().len(), 2);
        let executed = store.recent_trades(10, true).await.unwrap();
        assert_eq!(executed.len(), 1);
        assert!(executed[0].executed);
    }

    #[tokio::test]
    async fn pnl_finalisation_flow() {
        let store = store().await;
        let id = store.insert_trade(&sample_trade(true)).await.unwrap();

        let pending = store.trades_without_pnl().await.unwrap();
        assert_eq!(pending.len(), 1);

        assert!(store.finalize_trade_pnl(id, 30.0).await.unwrap());
        assert!(store.trades_without_pnl().await.unwrap().is_empty());

        let trades = store.recent_trades(10, true).await.unwrap();
        assert_eq!(trades[0].pnl, Some(30.0));
        assert!(trades[0].resolved_at.is_some());
    }

    #[tokio::test]
    async fn trade_outcome_updates_aggregates() {
        let store = store().await;
        let wallet = store.add_wallet("0xaaa", None).await.unwrap();

        store.apply_trade_outcome(wallet.id, 30.0, 50.0).await.unwrap();
        store.apply_trade_outcome(wallet.id, -20.0, 50.0).await.unwrap();

        let metrics = store.wallet_metrics("0xaaa").await.unwrap().unwrap();
        assert_eq!(metrics.total_trades, 2);
        assert_eq!(metrics.win_rate, 0.5);
        assert!((metrics.total_pnl - 10.0).abs() < 1e-9);
        assert!((metrics.avg_roi - 0.1).abs() < 1e-9);
    }

    #[tokio::test]
    async fn order_persistence_round_trip() {
        let store = store().await;
        let mut order = Order::new("sig-1", "cond-1", TradeAction::Buy, 100.0, 0.55, 3);
        store.insert_order(&order).await.unwrap();

        order.mark_submitted("ext-1");
        store.update_order(&order).await.unwrap();

        let loaded = store.get_order(&order.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, OrderStatus::Submitted);
        assert_eq!(loaded.external_id.as_deref(), Some("ext-1"));
        assert_eq!(loaded.attempts, 1);

        let submitted = store
            .list_orders(Some(OrderStatus::Submitted), 10)
            .await
            .unwrap();
        assert_eq!(submitted.len(), 1);
        assert!(store
            .list_orders(Some(OrderStatus::Filled), 10)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn file_backed_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");
        let path = path.to_str().unwrap();
        {
            let store = Store::new(path).unwrap();
            store.add_wallet("0xaaa", Some("whale")).await.unwrap();
        }
        let store = Store::new(path).unwrap();
        let wallet = store.get_wallet("0xaaa").await.unwrap().unwrap();
        assert_eq!(wallet.alias.as_deref(), Some("whale"));
    }

    #[tokio::test]
    async fn filters_and_mappings_crud() {
        let store = store().await;
        let filter = store
            .add_market_filter("keyword", "election", "deny")
            .await
            .unwrap();
        assert_eq!(store.list_market_filters().await.unwrap().len(), 1);
        assert!(store.remove_market_filter(filter.id).await.unwrap());
        assert!(!store.remove_market_filter(filter.id).await.unwrap());

        let mapping = store
            .add_market_mapping("cond-1", "BTCUSD-25JAN", "btc 100k", true)
            .await
            .unwrap();
        store
            .add_market_mapping("cond-2", "ETHUSD-25JAN", "eth 5k", false)
            .await
            .unwrap();
        assert_eq!(store.list_market_mappings().await.unwrap().len(), 2);
        assert_eq!(store.active_market_mappings().await.unwrap().len(), 1);
        assert!(store.remove_market_mapping(mapping.id).await.unwrap());
    }
}
