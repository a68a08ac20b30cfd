//! Signal detection and transport.
//!
//! Producers (wallet ingester, arbitrage monitor, price-lag detector) feed
//! the bounded dedup queue; decision workers drain it.

pub mod arbitrage;
pub mod ingester;
pub mod pricelag;
pub mod queue;

pub use queue::SignalQueue;
