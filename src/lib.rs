//! mirrorbot — copy-trading and arbitrage engine for prediction markets.
//!
//! Signals flow from the wallet ingester and the cross-venue arbitrage
//! monitor through a deduplicating queue into the decision pipeline
//! (context → advisor → risk → executor), with durable state in SQLite and
//! volatile risk state in an in-process cache.

pub mod api;
pub mod brain;
pub mod config;
pub mod execution;
pub mod intelligence;
pub mod models;
pub mod resolution;
pub mod risk;
pub mod shutdown;
pub mod signals;
pub mod storage;
pub mod venues;

pub use config::Config;
pub use models::{Side, SignalSource, TradeAction, TradeSignal};
