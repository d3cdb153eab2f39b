//! Per-market worker loop
//!
//! One iteration: fetch -> features -> train/predict -> risk + anomaly ->
//! decide -> order -> telemetry -> sleep. Stopping is cooperative: the token
//! is checked at the top of each iteration and raced against the sleep, but
//! an in-flight fetch or order always completes.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::exchange::Exchange;
use crate::market::{FeatureEngine, FeatureVector, History, Tick};
use crate::position::{PositionState, SessionStats};
use crate::predictor::Predictor;
use crate::strategy::{
    Action, DecisionPolicy, DecisionReason, OrderSide, RiskAction, RiskManager, RugPullDetector,
    RugSignal,
};
use crate::telemetry::{EventKind, TelemetryEvent, TelemetrySink};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Running,
    Stopping,
    Stopped,
}

/// What a single iteration did
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepOutcome {
    /// Exchange had no data; nothing was mutated
    NoData,
    /// History too short to predict; resolved to Hold
    Warmup,
    Decided { action: Action, executed: bool },
}

/// Final state of a stopped worker
#[derive(Debug, Clone, Serialize)]
pub struct WorkerReport {
    pub market_id: String,
    pub position: PositionState,
    pub stats: SessionStats,
    pub ticks_recorded: u64,
}

pub struct WorkerLoop {
    market_id: String,
    exchange: Arc<dyn Exchange>,
    predictor: Box<dyn Predictor>,
    telemetry: TelemetrySink,

    features: FeatureEngine,
    detector: RugPullDetector,
    risk: RiskManager,
    policy: DecisionPolicy,

    history: History,
    position: PositionState,
    stats: SessionStats,

    history_length: usize,
    future_steps: usize,
    sleep_time: Duration,

    state: Arc<watch::Sender<WorkerState>>,
}

impl WorkerLoop {
    pub fn new(
        market_id: impl Into<String>,
        config: &Config,
        exchange: Arc<dyn Exchange>,
        predictor: Box<dyn Predictor>,
        telemetry: TelemetrySink,
    ) -> Self {
        let (state, _) = watch::channel(WorkerState::Running);

        Self {
            market_id: market_id.into(),
            exchange,
            predictor,
            telemetry,
            features: FeatureEngine::new(),
            detector: RugPullDetector::new(&config.anomaly),
            risk: RiskManager::new(&config.risk),
            policy: DecisionPolicy::new(&config.anomaly, &config.trading),
            history: History::for_model(
                config.model.history_length,
                config.model.future_steps,
                config.model.batch_size,
            ),
            position: PositionState::new(),
            stats: SessionStats::new(),
            history_length: config.model.history_length,
            future_steps: config.model.future_steps,
            sleep_time: config.trading.sleep_time(),
            state: Arc::new(state),
        }
    }

    pub fn market_id(&self) -> &str {
        &self.market_id
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn position(&self) -> &PositionState {
        &self.position
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Run on the tokio runtime until `cancel` fires
    pub fn spawn(self, cancel: CancellationToken) -> WorkerHandle {
        let market_id = self.market_id.clone();
        let state = Arc::clone(&self.state);
        let join = tokio::spawn(self.run(cancel.clone()));

        WorkerHandle {
            market_id,
            cancel,
            state,
            join,
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) -> WorkerReport {
        info!(
            market = %self.market_id,
            exchange = self.exchange.name(),
            predictor = self.predictor.name(),
            "Worker started"
        );

        while !cancel.is_cancelled() {
            self.step().await;

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.sleep_time) => {}
            }
        }

        mark_stopping(&self.state);
        self.state.send_replace(WorkerState::Stopped);

        info!(
            market = %self.market_id,
            ticks = self.stats.ticks,
            position = self.position.size(),
            pnl = self.stats.realized_pnl,
            "Worker stopped"
        );

        WorkerReport {
            market_id: self.market_id,
            position: self.position,
            stats: self.stats,
            ticks_recorded: self.history.total_appended(),
        }
    }

    /// One full iteration, without the trailing sleep
    pub async fn step(&mut self) -> StepOutcome {
        let tick = match self.exchange.fetch_tick(&self.market_id).await {
            Ok(tick) => tick,
            Err(e) => {
                self.stats.missed_ticks += 1;
                warn!(market = %self.market_id, "No market data: {}", e);
                self.emit(EventKind::Warning {
                    message: format!("no market data: {}", e),
                });
                return StepOutcome::NoData;
            }
        };
        self.stats.ticks += 1;

        let vector = self.features.derive(&self.history, &tick);
        self.history.push(vector);

        if self.history.len() <= self.history_length + self.future_steps {
            debug!(
                market = %self.market_id,
                len = self.history.len(),
                "Warming up"
            );
            // No prediction yet, but the anomaly override still applies
            let rug = self.detector.check(&self.history);
            let decision = self.policy.evaluate(
                None,
                self.position.size(),
                &tick,
                RiskAction::None,
                rug.is_some(),
            );
            self.report_anomaly(decision.reason, &tick, rug);
            self.emit_tick(&tick, None, Action::Hold, false);
            return StepOutcome::Warmup;
        }

        let prediction = self.forecast();

        let risk = match self.position.avg_entry_price() {
            Some(avg) => self.risk.evaluate(self.position.size(), avg, tick.mid_price),
            None => RiskAction::None,
        };
        let rug = self.detector.check(&self.history);
        let decision = self.policy.evaluate(
            prediction,
            self.position.size(),
            &tick,
            risk,
            rug.is_some(),
        );
        self.report_anomaly(decision.reason, &tick, rug);

        let executed = self.execute(decision.action, &tick).await;
        self.emit_tick(&tick, prediction, decision.action, executed);

        StepOutcome::Decided {
            action: decision.action,
            executed,
        }
    }

    fn report_anomaly(&mut self, reason: DecisionReason, tick: &Tick, rug: Option<RugSignal>) {
        let DecisionReason::AnomalyOverride { wide_spread, .. } = reason else {
            return;
        };

        self.stats.anomaly_alerts += 1;
        let mut reasons = Vec::new();
        if wide_spread {
            reasons.push(format!("spread {:.6} above threshold", tick.spread));
        }
        if let Some(signal) = rug {
            reasons.push(format!("rug pull: {}", signal));
        }
        let reason = reasons.join(", ");
        warn!(market = %self.market_id, "Anomaly: {}", reason);
        self.emit(EventKind::Alert { reason });
    }

    /// Train on the retained history, then predict on the trailing window.
    ///
    /// Any predictor failure is absorbed as "no prediction" for this tick.
    fn forecast(&mut self) -> Option<f64> {
        let result = train_and_predict(
            self.predictor.as_mut(),
            self.history.as_slice(),
            self.history_length,
        );

        match result {
            Ok(p) => {
                self.stats.predictions += 1;
                Some(p)
            }
            Err(e) => {
                self.stats.predictor_failures += 1;
                warn!(market = %self.market_id, "Predictor failed: {}", e);
                self.emit(EventKind::Warning {
                    message: format!("predictor failed: {}", e),
                });
                None
            }
        }
    }

    /// Submit the action; the position moves only on a confirmed fill
    async fn execute(&mut self, action: Action, tick: &Tick) -> bool {
        let (side, size) = match action.order(self.position.size()) {
            Some(order) => order,
            None => return false,
        };

        match self
            .exchange
            .place_order(&self.market_id, side, tick.mid_price, size)
            .await
        {
            Ok(fill) => {
                let pnl = self.position.apply_fill(&fill);
                self.stats.orders_filled += 1;
                if side == OrderSide::Sell {
                    self.stats.record_trade(pnl);
                }
                info!(
                    market = %self.market_id,
                    order_id = %fill.order_id,
                    "Filled {} {} @ {:.6}, position {}",
                    side,
                    fill.size,
                    fill.price,
                    self.position.size()
                );
                true
            }
            Err(e) => {
                self.stats.orders_rejected += 1;
                warn!(market = %self.market_id, "Order {} failed: {}", action, e);
                self.emit(EventKind::OrderFailed {
                    action,
                    reason: e.to_string(),
                });
                false
            }
        }
    }

    fn emit_tick(&self, tick: &Tick, prediction: Option<f64>, action: Action, executed: bool) {
        self.emit(EventKind::Tick {
            mid_price: tick.mid_price,
            spread: tick.spread,
            prediction,
            action,
            executed,
        });
    }

    fn emit(&self, kind: EventKind) {
        self.telemetry.emit(TelemetryEvent::new(&self.market_id, kind));
    }
}

fn train_and_predict(
    predictor: &mut dyn Predictor,
    history: &[FeatureVector],
    history_length: usize,
) -> Result<f64> {
    predictor.train_incremental(history)?;

    let window = &history[history.len().saturating_sub(history_length)..];
    let p = predictor.predict(window)?;
    if !(0.0..=1.0).contains(&p) {
        return Err(Error::Predictor(format!("probability {} outside [0, 1]", p)));
    }
    Ok(p)
}

/// Running -> Stopping; a no-op in any later state
fn mark_stopping(state: &watch::Sender<WorkerState>) {
    state.send_if_modified(|s| {
        if *s == WorkerState::Running {
            *s = WorkerState::Stopping;
            true
        } else {
            false
        }
    });
}

/// Control side of a spawned worker
pub struct WorkerHandle {
    market_id: String,
    cancel: CancellationToken,
    state: Arc<watch::Sender<WorkerState>>,
    join: JoinHandle<WorkerReport>,
}

impl WorkerHandle {
    pub fn market_id(&self) -> &str {
        &self.market_id
    }

    /// Request a cooperative stop; returns immediately
    pub fn stop(&self) {
        mark_stopping(&self.state);
        self.cancel.cancel();
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    /// Wait for the worker to exit. A panicked worker is reported as an error.
    pub async fn join(self) -> Result<WorkerReport> {
        match self.join.await {
            Ok(report) => Ok(report),
            Err(e) => {
                self.state.send_replace(WorkerState::Stopped);
                Err(Error::Internal(format!(
                    "worker {} terminated abnormally: {}",
                    self.market_id, e
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::scripted::ScriptedExchange;
    use crate::predictor::fixed::FixedPredictor;
    use std::sync::atomic::Ordering;
    use tokio::sync::mpsc;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.model.history_length = 3;
        config.model.future_steps = 1;
        config.model.batch_size = 2;
        config.trading.sleep_time_ms = 1;
        config.trading.order_size_base = 0.1;
        config
    }

    fn worker(
        exchange: Arc<ScriptedExchange>,
        predictor: FixedPredictor,
    ) -> (WorkerLoop, mpsc::Receiver<TelemetryEvent>) {
        let (sink, rx) = TelemetrySink::channel(256);
        let worker = WorkerLoop::new(
            "SOL_USDC",
            &test_config(),
            exchange,
            Box::new(predictor),
            sink,
        );
        (worker, rx)
    }

    fn drain(rx: &mut mpsc::Receiver<TelemetryEvent>) -> Vec<EventKind> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event.kind);
        }
        events
    }

    fn push_flat(exchange: &ScriptedExchange, n: usize, mid: f64) {
        for _ in 0..n {
            exchange.push_quote(mid, 0.1, 5000.0);
        }
    }

    #[tokio::test]
    async fn test_warmup_holds_without_prediction() {
        let exchange = Arc::new(ScriptedExchange::new());
        push_flat(&exchange, 5, 100.0);
        let predictor = FixedPredictor::new(0.95);
        let calls = Arc::clone(&predictor.calls);
        let (mut worker, mut rx) = worker(Arc::clone(&exchange), predictor);

        // H + F = 4, prediction needs more than 4 points
        for _ in 0..4 {
            assert_eq!(worker.step().await, StepOutcome::Warmup);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(exchange.orders().is_empty());

        let events = drain(&mut rx);
        assert_eq!(events.len(), 4);
        assert!(events.iter().all(|e| matches!(
            e,
            EventKind::Tick {
                prediction: None,
                action: Action::Hold,
                ..
            }
        )));

        let outcome = worker.step().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            outcome,
            StepOutcome::Decided {
                action: Action::Buy { size: 0.2 },
                executed: true
            }
        );
    }

    #[tokio::test]
    async fn test_warmup_still_alerts_on_wide_spread() {
        let exchange = Arc::new(ScriptedExchange::new());
        push_flat(&exchange, 2, 100.0);
        exchange.push_quote(100.0, 1.0, 5000.0);
        let predictor = FixedPredictor::new(0.95);
        let calls = Arc::clone(&predictor.calls);
        let (mut worker, mut rx) = worker(Arc::clone(&exchange), predictor);

        for _ in 0..3 {
            assert_eq!(worker.step().await, StepOutcome::Warmup);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(exchange.orders().is_empty());
        assert_eq!(worker.stats().anomaly_alerts, 1);

        let events = drain(&mut rx);
        let alerts: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, EventKind::Alert { .. }))
            .collect();
        assert_eq!(alerts.len(), 1);
        assert!(matches!(
            events.last(),
            Some(EventKind::Tick {
                action: Action::Hold,
                executed: false,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_no_data_leaves_state_untouched() {
        let exchange = Arc::new(ScriptedExchange::new());
        exchange.push_no_data();
        let (mut worker, mut rx) = worker(Arc::clone(&exchange), FixedPredictor::new(0.5));

        assert_eq!(worker.step().await, StepOutcome::NoData);
        assert!(worker.history().is_empty());
        assert!(!worker.position().is_open());
        assert_eq!(worker.stats().missed_ticks, 1);
        assert_eq!(worker.stats().ticks, 0);

        let events = drain(&mut rx);
        assert!(matches!(events.as_slice(), [EventKind::Warning { .. }]));
    }

    #[tokio::test]
    async fn test_confirmed_buy_updates_position() {
        let exchange = Arc::new(ScriptedExchange::new());
        push_flat(&exchange, 5, 100.0);
        let (mut worker, _rx) = worker(Arc::clone(&exchange), FixedPredictor::new(0.75));

        for _ in 0..5 {
            worker.step().await;
        }

        assert!((worker.position().size() - 0.1).abs() < 1e-12);
        let avg = worker.position().avg_entry_price().unwrap();
        assert!((avg - 100.0).abs() < 1e-9);
        assert_eq!(worker.stats().orders_filled, 1);

        let orders = exchange.orders();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].side, OrderSide::Buy);
        assert!((orders[0].price - 100.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_rejected_order_leaves_position_unchanged() {
        let exchange = Arc::new(ScriptedExchange::new());
        push_flat(&exchange, 5, 100.0);
        exchange.push_outcome(false);
        let (mut worker, mut rx) = worker(Arc::clone(&exchange), FixedPredictor::new(0.95));

        for _ in 0..5 {
            worker.step().await;
        }

        assert!(!worker.position().is_open());
        assert_eq!(worker.position().avg_entry_price(), None);
        assert_eq!(worker.stats().orders_rejected, 1);
        assert_eq!(exchange.orders().len(), 1);

        let events = drain(&mut rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, EventKind::OrderFailed { action: Action::Buy { .. }, .. })));
        assert!(events.iter().any(|e| matches!(
            e,
            EventKind::Tick {
                action: Action::Buy { .. },
                executed: false,
                ..
            }
        )));
    }

    #[tokio::test]
    async fn test_stop_loss_liquidates_position() {
        let exchange = Arc::new(ScriptedExchange::new());
        push_flat(&exchange, 5, 100.0);
        exchange.push_quote(94.0, 0.1, 5000.0);
        let (mut worker, _rx) = worker(Arc::clone(&exchange), FixedPredictor::script(&[0.95, 0.6]));

        for _ in 0..6 {
            worker.step().await;
        }

        assert!(!worker.position().is_open());
        let orders = exchange.orders();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[1].side, OrderSide::Sell);
        assert!((orders[1].size - 0.2).abs() < 1e-12);
        assert_eq!(worker.stats().losing_trades, 1);
        assert!((worker.stats().realized_pnl + 1.2).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_wide_spread_sells_everything() {
        let exchange = Arc::new(ScriptedExchange::new());
        push_flat(&exchange, 5, 100.0);
        exchange.push_quote(100.0, 1.0, 5000.0);
        let (mut worker, mut rx) = worker(Arc::clone(&exchange), FixedPredictor::new(0.95));

        for _ in 0..5 {
            worker.step().await;
        }
        assert!(worker.position().is_open());

        let outcome = worker.step().await;
        assert_eq!(
            outcome,
            StepOutcome::Decided {
                action: Action::SellAll,
                executed: true
            }
        );
        assert!(!worker.position().is_open());
        assert_eq!(worker.stats().anomaly_alerts, 1);
        assert!(drain(&mut rx)
            .iter()
            .any(|e| matches!(e, EventKind::Alert { .. })));
    }

    #[tokio::test]
    async fn test_predictor_failure_holds_and_continues() {
        let exchange = Arc::new(ScriptedExchange::new());
        push_flat(&exchange, 7, 100.0);
        let (mut worker, mut rx) = worker(Arc::clone(&exchange), FixedPredictor::failing());

        for _ in 0..7 {
            worker.step().await;
        }

        assert_eq!(worker.stats().predictor_failures, 3);
        assert_eq!(worker.stats().predictions, 0);
        assert!(exchange.orders().is_empty());

        let events = drain(&mut rx);
        let warnings = events
            .iter()
            .filter(|e| matches!(e, EventKind::Warning { .. }))
            .count();
        assert_eq!(warnings, 3);
    }

    #[tokio::test]
    async fn test_stop_transitions_to_stopped() {
        let exchange = Arc::new(ScriptedExchange::new());
        push_flat(&exchange, 1, 100.0);
        let (worker, _rx) = worker(Arc::clone(&exchange), FixedPredictor::new(0.5));
        assert_eq!(worker.state(), WorkerState::Running);

        let handle = worker.spawn(CancellationToken::new());
        let mut states = handle.subscribe();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(handle.state(), WorkerState::Running);

        handle.stop();
        assert_ne!(handle.state(), WorkerState::Running);

        let report = handle.join().await.unwrap();
        assert_eq!(*states.borrow_and_update(), WorkerState::Stopped);
        assert!(report.stats.ticks > 0);
        assert_eq!(report.ticks_recorded, report.stats.ticks);
    }

    #[tokio::test]
    async fn test_stop_interrupts_sleep() {
        let exchange = Arc::new(ScriptedExchange::new());
        push_flat(&exchange, 1, 100.0);
        let (sink, _rx) = TelemetrySink::channel(16);
        let mut config = test_config();
        config.trading.sleep_time_ms = 60_000;
        let worker = WorkerLoop::new(
            "SOL_USDC",
            &config,
            exchange,
            Box::new(FixedPredictor::new(0.5)),
            sink,
        );

        let handle = worker.spawn(CancellationToken::new());
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.stop();

        let report = tokio::time::timeout(Duration::from_secs(2), handle.join())
            .await
            .expect("worker should not wait out its sleep")
            .unwrap();
        assert_eq!(report.stats.ticks, 1);
    }
}
