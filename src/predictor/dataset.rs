//! Labeled training samples
//!
//! Sample `i` pairs the window `history[i - history_length..i]` with label 1
//! when `mid[i + future_steps] > mid[i]`, else 0.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::market::FeatureVector;

/// Number of labeled samples a history of `len` points yields
pub fn sample_count(len: usize, history_length: usize, future_steps: usize) -> usize {
    len.saturating_sub(history_length + future_steps)
}

/// Labeled (window, label) pairs, oldest first
pub fn labeled_windows(
    history: &[FeatureVector],
    history_length: usize,
    future_steps: usize,
) -> impl Iterator<Item = (&[FeatureVector], f64)> {
    let end = history.len().saturating_sub(future_steps);
    (history_length..end).map(move |i| {
        let label = if history[i + future_steps].mid_price > history[i].mid_price {
            1.0
        } else {
            0.0
        };
        (&history[i - history_length..i], label)
    })
}

/// Feature series saved by `backfill` and consumed by `train`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub market: String,
    pub history_length: usize,
    pub future_steps: usize,
    pub features: Vec<FeatureVector>,
}

impl Dataset {
    pub fn sample_count(&self) -> usize {
        sample_count(self.features.len(), self.history_length, self.future_steps)
    }

    pub fn samples(&self) -> impl Iterator<Item = (&[FeatureVector], f64)> {
        labeled_windows(&self.features, self.history_length, self.future_steps)
    }

    /// Share of positive labels
    pub fn positive_rate(&self) -> f64 {
        let count = self.sample_count();
        if count == 0 {
            return 0.0;
        }
        self.samples().map(|(_, y)| y).sum::<f64>() / count as f64
    }

    pub async fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let data = serde_json::to_string(self)?;
        tokio::fs::write(path, data).await?;
        Ok(())
    }

    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = tokio::fs::read_to_string(path).await?;
        serde_json::from_str(&data).map_err(|e| Error::Deserialization(e.to_string()))
    }
}
