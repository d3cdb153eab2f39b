//! DEX Sentinel Library
//!
//! Per-market decision loops: order book ticks become a bounded feature
//! history, a forecaster scores it, and risk and anomaly checks filter the
//! result into at most one trade per polling cycle.

pub mod cli;
pub mod config;
pub mod error;
pub mod exchange;
pub mod market;
pub mod position;
pub mod predictor;
pub mod strategy;
pub mod telemetry;
pub mod worker;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
