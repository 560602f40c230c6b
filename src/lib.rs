//! Grid Trader
//!
//! A rule-based position-sizing and order-proposal engine for a
//! BIAS/ATR-driven grid strategy on a basket of exchange-traded funds.
//! Classifies the market regime, sizes a volatility-adaptive grid, applies
//! risk overrides and emits a deterministic plan of suggested orders.

pub mod config;
pub mod data;
pub mod engine;
pub mod indicators;
pub mod ledger;
pub mod types;

pub use config::Config;
pub use engine::{StrategyEngine, TriggeredSignal};
pub use ledger::{GridLedger, GridPair};
pub use types::*;
