//! SoulSpark Trading Bot Library
//!
//! Autonomous multi-wallet token sniper: feed discovery, safety gating,
//! fan-out buys, and per-position take-profit/stop-loss/timeout exits.

pub mod chain;
pub mod config;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod events;
pub mod monitor;
pub mod safety;
pub mod settings;
pub mod state;
pub mod token_info;
pub mod trading;
pub mod wallet;

// Re-export commonly used types
pub use config::Config;
pub use engine::{EngineStatus, TradingEngine};
pub use error::{Error, Result};
