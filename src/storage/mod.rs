//! Durable and volatile state.
//!
//! `database` owns the SQLite-backed entities (wallets, trades, orders,
//! filters, mappings); `cache` owns the fast in-process keyspace (risk
//! counters, mode, emergency stop, cursors, price cache).

pub mod cache;
pub mod database;

pub use cache::Cache;
pub use database::Store;
