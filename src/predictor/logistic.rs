//! Online logistic forecaster
//!
//! Each window is reduced to a handful of summary inputs:
//! - momentum: log return from the first to the last mid price
//! - ma gap: last mid price relative to its 10-point average
//! - spread ratio: last spread relative to the mid price
//! - volatility: last rolling volatility
//! - relative volume: last volume against the window mean (log scale)
//!
//! Training is plain SGD on the newest batch of labeled windows.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

use super::dataset::{labeled_windows, sample_count, Dataset};
use super::Predictor;
use crate::config::ModelConfig;
use crate::error::{Error, Result};
use crate::market::FeatureVector;

pub const INPUTS: usize = 5;

/// Input scaling so percent-sized moves land near unit range
const PRICE_SCALE: f64 = 100.0;

/// Serialized model state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelWeights {
    pub weights: Vec<f64>,
    pub bias: f64,
    pub history_length: usize,
    pub future_steps: usize,
    #[serde(default)]
    pub trained_samples: u64,
}

impl ModelWeights {
    /// Untrained model: every window scores 0.5
    pub fn baseline(history_length: usize, future_steps: usize) -> Self {
        Self {
            weights: vec![0.0; INPUTS],
            bias: 0.0,
            history_length,
            future_steps,
            trained_samples: 0,
        }
    }

    pub async fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let data =
            serde_json::to_string_pretty(self).map_err(|e| Error::ModelPersistence(e.to_string()))?;
        tokio::fs::write(path, data)
            .await
            .map_err(|e| Error::ModelPersistence(format!("{}: {}", path.display(), e)))?;
        Ok(())
    }
}

pub struct LogisticPredictor {
    model: ModelWeights,
    batch_size: usize,
    learning_rate: f64,
}

impl LogisticPredictor {
    pub fn new(config: &ModelConfig) -> Self {
        Self::with_weights(
            ModelWeights::baseline(config.history_length, config.future_steps),
            config,
        )
    }

    pub fn with_weights(model: ModelWeights, config: &ModelConfig) -> Self {
        Self {
            model,
            batch_size: config.batch_size.max(1),
            learning_rate: config.learning_rate,
        }
    }

    pub fn weights(&self) -> &ModelWeights {
        &self.model
    }

    /// Read weights saved by [`save`](Self::save)
    pub async fn load<P: AsRef<Path>>(path: P, config: &ModelConfig) -> Result<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::ModelPersistence(format!("{}: {}", path.display(), e)))?;
        let model: ModelWeights = serde_json::from_str(&data)
            .map_err(|e| Error::ModelPersistence(format!("{}: {}", path.display(), e)))?;

        if model.weights.len() != INPUTS {
            return Err(Error::ModelPersistence(format!(
                "{}: expected {} weights, found {}",
                path.display(),
                INPUTS,
                model.weights.len()
            )));
        }
        if model.history_length != config.history_length
            || model.future_steps != config.future_steps
        {
            warn!(
                "Model {} was trained with H={} F={}, running with H={} F={}",
                path.display(),
                model.history_length,
                model.future_steps,
                config.history_length,
                config.future_steps
            );
        }

        Ok(Self::with_weights(model, config))
    }

    /// Pretrained weights when the file is usable, otherwise the baseline
    pub async fn load_or_baseline(config: &ModelConfig) -> Self {
        let path = Path::new(&config.model_path);
        if !path.exists() {
            info!("No model at {}, starting from baseline", path.display());
            return Self::new(config);
        }

        match Self::load(path, config).await {
            Ok(predictor) => {
                info!(
                    "Loaded model from {} ({} samples)",
                    path.display(),
                    predictor.model.trained_samples
                );
                predictor
            }
            Err(e) => {
                warn!("{}, starting from baseline", e);
                Self::new(config)
            }
        }
    }

    pub async fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.model.save(path).await
    }

    /// Offline training over a whole dataset; returns the samples seen
    pub fn fit(&mut self, dataset: &Dataset, epochs: usize) -> Result<u64> {
        if dataset.sample_count() == 0 {
            return Err(Error::Predictor(format!(
                "dataset has {} points, needs more than {}",
                dataset.features.len(),
                dataset.history_length + dataset.future_steps
            )));
        }

        let mut seen = 0u64;
        for epoch in 0..epochs.max(1) {
            let mut loss = 0.0;
            let mut count = 0usize;
            for (window, label) in dataset.samples() {
                loss += self.sgd_step(window, label)?;
                count += 1;
            }
            seen += count as u64;
            debug!("epoch {} loss {:.5}", epoch + 1, loss / count as f64);
        }

        Ok(seen)
    }

    fn score(&self, inputs: &[f64; INPUTS]) -> f64 {
        let z = self
            .model
            .weights
            .iter()
            .zip(inputs.iter())
            .fold(self.model.bias, |acc, (w, x)| acc + w * x);
        sigmoid(z)
    }

    /// One gradient step; returns the log loss before the update
    fn sgd_step(&mut self, window: &[FeatureVector], label: f64) -> Result<f64> {
        let inputs = encode(window)?;
        let p = self.score(&inputs);
        let gradient = p - label;

        for (w, x) in self.model.weights.iter_mut().zip(inputs.iter()) {
            *w -= self.learning_rate * gradient * x;
        }
        self.model.bias -= self.learning_rate * gradient;
        self.model.trained_samples += 1;

        let p = p.clamp(1e-9, 1.0 - 1e-9);
        Ok(-(label * p.ln() + (1.0 - label) * (1.0 - p).ln()))
    }
}

impl Predictor for LogisticPredictor {
    fn name(&self) -> &str {
        "logistic"
    }

    fn train_incremental(&mut self, history: &[FeatureVector]) -> Result<bool> {
        let h = self.model.history_length;
        let f = self.model.future_steps;
        let available = sample_count(history.len(), h, f);
        if available < self.batch_size {
            return Ok(false);
        }

        let skip = available - self.batch_size;
        let batch: Vec<_> = labeled_windows(history, h, f).skip(skip).collect();
        for (window, label) in batch {
            self.sgd_step(window, label)?;
        }
        Ok(true)
    }

    fn predict(&self, window: &[FeatureVector]) -> Result<f64> {
        let inputs = encode(window)?;
        let p = self.score(&inputs);
        if !p.is_finite() {
            return Err(Error::Predictor("non-finite probability".into()));
        }
        Ok(p.clamp(0.0, 1.0))
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

fn encode(window: &[FeatureVector]) -> Result<[f64; INPUTS]> {
    let (first, last) = match (window.first(), window.last()) {
        (Some(first), Some(last)) if window.len() >= 2 => (first, last),
        _ => {
            return Err(Error::Predictor(format!(
                "window of {} points is too short",
                window.len()
            )))
        }
    };
    if first.mid_price <= 0.0 || last.mid_price <= 0.0 || last.ma_10 <= 0.0 {
        return Err(Error::Predictor("non-positive price in window".into()));
    }

    let mean_volume = window.iter().map(|v| v.volume).sum::<f64>() / window.len() as f64;

    let inputs = [
        (last.mid_price / first.mid_price).ln() * PRICE_SCALE,
        (last.mid_price / last.ma_10 - 1.0) * PRICE_SCALE,
        last.spread / last.mid_price * PRICE_SCALE,
        last.volatility_10 * PRICE_SCALE,
        ((last.volume + 1.0) / (mean_volume + 1.0)).ln(),
    ];

    if inputs.iter().any(|x| !x.is_finite()) {
        return Err(Error::Predictor("non-finite model input".into()));
    }
    Ok(inputs)
}
