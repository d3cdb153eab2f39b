//! Bounded, drop-newest telemetry channel and its log consumer

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{EventKind, TelemetryEvent};
use crate::strategy::Action;

/// Cloneable sender shared by every worker
#[derive(Clone)]
pub struct TelemetrySink {
    tx: mpsc::Sender<TelemetryEvent>,
    dropped: Arc<AtomicU64>,
}

impl TelemetrySink {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<TelemetryEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }

    /// Fire and forget. A full or closed channel drops the event.
    pub fn emit(&self, event: TelemetryEvent) {
        if let Err(e) = self.tx.try_send(event) {
            let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            match e {
                mpsc::error::TrySendError::Full(_) => {
                    debug!(dropped = total, "Telemetry channel full, event dropped")
                }
                mpsc::error::TrySendError::Closed(_) => {
                    debug!(dropped = total, "Telemetry consumer gone, event dropped")
                }
            }
        }
    }

    /// Events lost to backpressure so far
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Render events until every sink is dropped; returns the count rendered
pub fn spawn_logger(mut rx: mpsc::Receiver<TelemetryEvent>) -> JoinHandle<u64> {
    tokio::spawn(async move {
        let mut rendered = 0u64;
        while let Some(event) = rx.recv().await {
            render(&event);
            rendered += 1;
        }
        rendered
    })
}

fn render(event: &TelemetryEvent) {
    let market = event.market_id.as_str();
    let label = event.label();

    match &event.kind {
        EventKind::Tick {
            mid_price,
            spread,
            prediction,
            action,
            executed,
        } => {
            let prediction = prediction
                .map(|p| format!("{:.3}", p))
                .unwrap_or_else(|| "-".to_string());
            match action {
                Action::Hold => info!(
                    market,
                    "{} mid={:.6} spread={:.6} p={}", label, mid_price, spread, prediction
                ),
                Action::SellAll => warn!(
                    market,
                    executed = *executed,
                    "{} mid={:.6} spread={:.6}",
                    label,
                    mid_price,
                    spread
                ),
                _ => info!(
                    market,
                    executed = *executed,
                    "{} {} @ {:.6} p={}",
                    label,
                    action,
                    mid_price,
                    prediction
                ),
            }
        }
        EventKind::Warning { message } => warn!(market, "{} {}", label, message),
        EventKind::OrderFailed { action, reason } => {
            error!(market, "{} {}: {}", label, action, reason)
        }
        EventKind::Alert { reason } => warn!(market, "{} {}", label, reason),
    }
}
