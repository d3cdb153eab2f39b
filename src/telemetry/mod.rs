//! Per-tick telemetry
//!
//! Workers emit structured events into a bounded channel; one consumer task
//! renders them as log lines. Emission never blocks a worker.

pub mod sink;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::strategy::Action;

pub use sink::{spawn_logger, TelemetrySink};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryEvent {
    pub market_id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventKind {
    /// One per processed tick
    Tick {
        mid_price: f64,
        spread: f64,
        prediction: Option<f64>,
        action: Action,
        /// True only when the exchange confirmed the order
        executed: bool,
    },
    Warning { message: String },
    OrderFailed { action: Action, reason: String },
    Alert { reason: String },
}

impl TelemetryEvent {
    pub fn new(market_id: &str, kind: EventKind) -> Self {
        Self {
            market_id: market_id.to_string(),
            timestamp: Utc::now(),
            kind,
        }
    }

    /// Operator-facing tag
    pub fn label(&self) -> &'static str {
        match &self.kind {
            EventKind::Tick { action, .. } => match action {
                Action::Hold => "[HOLD]",
                Action::SellAll => "[EMERGENCY SELL]",
                Action::Buy { .. } | Action::SellPartial { .. } => "[TRADE]",
            },
            EventKind::Warning { .. } => "[WARNING]",
            EventKind::OrderFailed { .. } => "[ORDER FAILED]",
            EventKind::Alert { .. } => "[ALERT]",
        }
    }
}
