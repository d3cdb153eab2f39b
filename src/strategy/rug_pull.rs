//! Rug-pull heuristic
//!
//! Flags a market whose recent liquidity dried up or whose price collapsed
//! over the last 10 feature points.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::AnomalyConfig;
use crate::market::history::{History, ROLLING_WINDOW};

/// Why the detector tripped
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RugSignal {
    LowVolume { mean_volume: f64 },
    PriceCollapse { drop: f64 },
}

impl fmt::Display for RugSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RugSignal::LowVolume { mean_volume } => {
                write!(f, "mean volume {:.2} below threshold", mean_volume)
            }
            RugSignal::PriceCollapse { drop } => {
                write!(f, "price fell {:.2}% over 10 ticks", drop * 100.0)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct RugPullDetector {
    volume_threshold: f64,
    price_drop_threshold: f64,
}

impl RugPullDetector {
    pub fn new(config: &AnomalyConfig) -> Self {
        Self {
            volume_threshold: config.volume_threshold,
            price_drop_threshold: config.price_drop_threshold,
        }
    }

    pub fn is_anomalous(&self, history: &History) -> bool {
        self.check(history).is_some()
    }

    /// Returns the first tripped condition, volume first.
    ///
    /// Needs at least 10 points; a shorter history is never anomalous.
    pub fn check(&self, history: &History) -> Option<RugSignal> {
        if history.len() < ROLLING_WINDOW {
            return None;
        }

        let recent: Vec<_> = history.tail(ROLLING_WINDOW).collect();

        let mean_volume = recent.iter().map(|v| v.volume).sum::<f64>() / recent.len() as f64;
        if mean_volume < self.volume_threshold {
            return Some(RugSignal::LowVolume { mean_volume });
        }

        let start_price = recent[0].mid_price;
        let end_price = recent[recent.len() - 1].mid_price;
        if start_price > 0.0 {
            let drop = (start_price - end_price) / start_price;
            if drop > self.price_drop_threshold {
                return Some(RugSignal::PriceCollapse { drop });
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::FeatureVector;

    fn detector() -> RugPullDetector {
        RugPullDetector::new(&AnomalyConfig {
            spread_threshold: 0.5,
            volume_threshold: 1000.0,
            price_drop_threshold: 0.1,
        })
    }

    fn history(points: &[(f64, f64)]) -> History {
        let mut history = History::new(50);
        for (price, volume) in points {
            history.push(FeatureVector {
                mid_price: *price,
                spread: 0.01,
                volume: *volume,
                ma_10: *price,
                volatility_10: 0.0,
            });
        }
        history
    }

    #[test]
    fn test_short_history_never_anomalous() {
        let d = detector();
        for n in 0..10 {
            // zero volume and a crash, but too few points
            let points: Vec<(f64, f64)> = (0..n).map(|i| (100.0 - i as f64 * 10.0, 0.0)).collect();
            assert!(!d.is_anomalous(&history(&points)));
        }
    }

    #[test]
    fn test_low_volume_trips() {
        let points = vec![(100.0, 500.0); 10];
        assert!(matches!(
            detector().check(&history(&points)),
            Some(RugSignal::LowVolume { .. })
        ));
    }

    #[test]
    fn test_price_collapse_trips() {
        let mut points = vec![(100.0, 5000.0); 9];
        points.push((85.0, 5000.0));
        match detector().check(&history(&points)) {
            Some(RugSignal::PriceCollapse { drop }) => assert!((drop - 0.15).abs() < 1e-9),
            other => panic!("expected collapse, got {:?}", other),
        }
    }

    #[test]
    fn test_only_last_ten_points_count() {
        // old low volume and high price fall outside the window
        let mut points = vec![(200.0, 1.0); 5];
        points.extend(vec![(100.0, 5000.0); 10]);
        assert!(!detector().is_anomalous(&history(&points)));
    }

    #[test]
    fn test_healthy_market() {
        let mut points = vec![(100.0, 2000.0); 9];
        points.push((95.0, 2000.0));
        assert!(!detector().is_anomalous(&history(&points)));
    }
}
