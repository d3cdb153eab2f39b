//! Feature derivation
//!
//! Turns a raw tick plus the trailing history into the vector the predictor
//! and the rug-pull heuristic consume.

use super::history::{History, ROLLING_WINDOW};
use super::types::{FeatureVector, Tick};

/// Stateless deriver of rolling statistics
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureEngine;

impl FeatureEngine {
    pub fn new() -> Self {
        Self
    }

    /// Derive the feature vector for `tick`, given the history before it.
    ///
    /// `ma_10` is the mean mid price over the last 10 points including the
    /// new one, `volatility_10` the population standard deviation of their log
    /// returns. With fewer than 10 points, `ma_10` falls back to the new mid
    /// price and `volatility_10` to 0.
    pub fn derive(&self, history: &History, tick: &Tick) -> FeatureVector {
        let mut prices: Vec<f64> = history
            .tail(ROLLING_WINDOW - 1)
            .map(|v| v.mid_price)
            .collect();
        prices.push(tick.mid_price);

        let (ma_10, volatility_10) = if prices.len() < ROLLING_WINDOW {
            (tick.mid_price, 0.0)
        } else {
            (mean(&prices), log_return_std(&prices))
        };

        FeatureVector {
            mid_price: tick.mid_price,
            spread: tick.spread,
            volume: tick.volume,
            ma_10,
            volatility_10,
        }
    }

    /// Derive features for a whole series, oldest first (used by backfill)
    pub fn derive_series(&self, ticks: &[Tick]) -> Vec<FeatureVector> {
        let mut history = History::new(ROLLING_WINDOW);
        let mut vectors = Vec::with_capacity(ticks.len());
        for tick in ticks {
            let vector = self.derive(&history, tick);
            history.push(vector);
            vectors.push(vector);
        }
        vectors
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn log_return_std(prices: &[f64]) -> f64 {
    let returns: Vec<f64> = prices
        .windows(2)
        .filter(|w| w[0] > 0.0 && w[1] > 0.0)
        .map(|w| (w[1] / w[0]).ln())
        .collect();

    if returns.is_empty() {
        return 0.0;
    }

    let avg = mean(&returns);
    let variance = returns.iter().map(|r| (r - avg).powi(2)).sum::<f64>() / returns.len() as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn tick(price: f64) -> Tick {
        Tick::from_quotes(price - 0.05, price + 0.05, 1000.0, Utc::now()).unwrap()
    }

    fn history_of(prices: &[f64]) -> History {
        let engine = FeatureEngine::new();
        let mut history = History::new(50);
        for p in prices {
            let v = engine.derive(&history, &tick(*p));
            history.push(v);
        }
        history
    }

    #[test]
    fn test_short_history_fallback() {
        let engine = FeatureEngine::new();
        for n in 0..9 {
            let prices: Vec<f64> = (0..n).map(|i| 100.0 + i as f64 * 3.0).collect();
            let history = history_of(&prices);
            let v = engine.derive(&history, &tick(250.0));
            assert_eq!(v.ma_10, 250.0);
            assert_eq!(v.volatility_10, 0.0);
        }
    }

    #[test]
    fn test_tenth_point_uses_window() {
        let engine = FeatureEngine::new();
        let prices: Vec<f64> = (1..=9).map(|i| i as f64).collect();
        let history = history_of(&prices);
        let v = engine.derive(&history, &tick(10.0));
        assert!((v.ma_10 - 5.5).abs() < 1e-9);
        assert!(v.volatility_10 > 0.0);
    }

    #[test]
    fn test_window_only_last_ten() {
        let engine = FeatureEngine::new();
        let mut prices = vec![1000.0; 20];
        prices.extend(std::iter::repeat(10.0).take(9));
        let history = history_of(&prices);
        let v = engine.derive(&history, &tick(10.0));
        assert!((v.ma_10 - 10.0).abs() < 1e-9);
        assert!(v.volatility_10.abs() < 1e-12);
    }

    #[test]
    fn test_constant_growth_has_zero_volatility() {
        // equal log returns => zero dispersion
        let prices: Vec<f64> = (0..9).map(|i| 100.0 * 1.01f64.powi(i)).collect();
        let history = history_of(&prices);
        let v = FeatureEngine::new().derive(&history, &tick(100.0 * 1.01f64.powi(9)));
        assert!(v.volatility_10 < 1e-9);
    }

    #[test]
    fn test_derive_series_matches_incremental() {
        let ticks: Vec<Tick> = (0..15).map(|i| tick(50.0 + (i % 4) as f64)).collect();
        let series = FeatureEngine::new().derive_series(&ticks);
        assert_eq!(series.len(), 15);
        assert_eq!(series[8].ma_10, series[8].mid_price);
        assert!(series[14].volatility_10 > 0.0);
    }
}
