//! Per-worker session statistics

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub ticks: u64,
    /// Iterations skipped because the exchange had no data
    pub missed_ticks: u64,
    pub predictions: u64,
    pub predictor_failures: u64,
    pub anomaly_alerts: u64,
    pub orders_filled: u64,
    pub orders_rejected: u64,
    pub winning_trades: u32,
    pub losing_trades: u32,
    pub realized_pnl: f64,
}

impl SessionStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a closing (sell) fill
    pub fn record_trade(&mut self, pnl: f64) {
        if pnl >= 0.0 {
            self.winning_trades += 1;
        } else {
            self.losing_trades += 1;
        }
        self.realized_pnl += pnl;
    }

    pub fn closed_trades(&self) -> u32 {
        self.winning_trades + self.losing_trades
    }

    pub fn win_rate(&self) -> f64 {
        let total = self.closed_trades();
        if total == 0 {
            return 0.0;
        }
        (self.winning_trades as f64 / total as f64) * 100.0
    }
}
