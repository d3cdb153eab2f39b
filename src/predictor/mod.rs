//! Forecasting collaborator
//!
//! The worker only sees the `Predictor` contract: incremental training on the
//! retained history and a rise probability for the trailing window.

pub mod dataset;
#[cfg(test)]
pub mod fixed;
pub mod logistic;

use std::sync::{Arc, Mutex, MutexGuard};
use tracing::warn;

use crate::error::Result;
use crate::market::FeatureVector;

pub use dataset::Dataset;
pub use logistic::{LogisticPredictor, ModelWeights};

pub trait Predictor: Send {
    /// Name for logging
    fn name(&self) -> &str;

    /// Fit on the newest labeled batch from `history` (oldest first).
    ///
    /// Returns `false` and leaves the model untouched when fewer than one
    /// batch of labeled samples exists.
    fn train_incremental(&mut self, history: &[FeatureVector]) -> Result<bool>;

    /// Probability in [0, 1] that the mid price rises within the horizon
    fn predict(&self, window: &[FeatureVector]) -> Result<f64>;
}

/// One model shared by several workers; calls are serialized by a mutex
pub struct SharedPredictor<P> {
    inner: Arc<Mutex<P>>,
}

impl<P> SharedPredictor<P> {
    pub fn new(predictor: P) -> Self {
        Self {
            inner: Arc::new(Mutex::new(predictor)),
        }
    }

    /// Run `f` against the model while holding the lock
    pub fn with<R>(&self, f: impl FnOnce(&P) -> R) -> R {
        f(&self.lock())
    }

    /// A worker that panicked mid-call leaves the lock poisoned. The model
    /// is still usable, so take it back and keep serving the other workers.
    fn lock(&self) -> MutexGuard<'_, P> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            warn!("Shared model lock poisoned by a panicked worker, recovering");
            self.inner.clear_poison();
            poisoned.into_inner()
        })
    }
}

impl<P> Clone for SharedPredictor<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: Predictor> Predictor for SharedPredictor<P> {
    fn name(&self) -> &str {
        "shared"
    }

    fn train_incremental(&mut self, history: &[FeatureVector]) -> Result<bool> {
        self.lock().train_incremental(history)
    }

    fn predict(&self, window: &[FeatureVector]) -> Result<f64> {
        self.lock().predict(window)
    }
}
