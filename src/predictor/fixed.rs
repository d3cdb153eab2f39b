//! Scripted predictor for worker tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::Predictor;
use crate::error::{Error, Result};
use crate::market::FeatureVector;

enum Behavior {
    /// Replays probabilities; the last one repeats
    Script(Mutex<VecDeque<f64>>),
    Fail,
    Panic,
}

pub struct FixedPredictor {
    behavior: Behavior,
    last: Mutex<f64>,
    /// Number of `predict` calls, shared with the test
    pub calls: Arc<AtomicUsize>,
}

impl FixedPredictor {
    pub fn new(probability: f64) -> Self {
        Self::script(&[probability])
    }

    pub fn script(probabilities: &[f64]) -> Self {
        Self::with(Behavior::Script(Mutex::new(
            probabilities.iter().copied().collect(),
        )))
    }

    pub fn failing() -> Self {
        Self::with(Behavior::Fail)
    }

    pub fn panicking() -> Self {
        Self::with(Behavior::Panic)
    }

    fn with(behavior: Behavior) -> Self {
        Self {
            behavior,
            last: Mutex::new(0.5),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl Predictor for FixedPredictor {
    fn name(&self) -> &str {
        "fixed"
    }

    fn train_incremental(&mut self, _history: &[FeatureVector]) -> Result<bool> {
        Ok(false)
    }

    fn predict(&self, _window: &[FeatureVector]) -> Result<f64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Script(queue) => {
                let mut last = self.last.lock().unwrap();
                if let Some(p) = queue.lock().unwrap().pop_front() {
                    *last = p;
                }
                Ok(*last)
            }
            Behavior::Fail => Err(Error::Predictor("scripted failure".into())),
            Behavior::Panic => panic!("scripted predictor panic"),
        }
    }
}
