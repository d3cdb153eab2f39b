//! Decision policy
//!
//! Combines the forecast, the risk check and the anomaly flag into exactly
//! one action per tick. Branches are evaluated in a fixed order and the first
//! match wins:
//!
//! 1. anomaly override (wide spread or rug-pull heuristic) - liquidate
//! 2. stop-loss / take-profit
//! 3. prediction-sized entry or exit

use serde::{Deserialize, Serialize};

use super::types::{Action, RiskAction};
use crate::config::{AnomalyConfig, TradingConfig};
use crate::market::Tick;

/// Rise probability below which an open position is trimmed
const EXIT_PROBABILITY: f64 = 0.3;

/// Which branch produced the action
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    AnomalyOverride { wide_spread: bool, rug_pull: bool },
    StopLoss,
    TakeProfit,
    PredictedRise,
    PredictedFall,
    NoSignal,
    NoPrediction,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub action: Action,
    pub reason: DecisionReason,
}

#[derive(Debug, Clone)]
pub struct DecisionPolicy {
    spread_threshold: f64,
    order_size_base: f64,
}

impl DecisionPolicy {
    pub fn new(anomaly: &AnomalyConfig, trading: &TradingConfig) -> Self {
        Self {
            spread_threshold: anomaly.spread_threshold,
            order_size_base: trading.order_size_base,
        }
    }

    /// Pure: identical inputs always give the identical action
    pub fn decide(
        &self,
        prediction: Option<f64>,
        position: f64,
        tick: &Tick,
        risk: RiskAction,
        is_anomalous: bool,
    ) -> Action {
        self.evaluate(prediction, position, tick, risk, is_anomalous)
            .action
    }

    /// Same as [`decide`](Self::decide) but keeps the winning branch
    pub fn evaluate(
        &self,
        prediction: Option<f64>,
        position: f64,
        tick: &Tick,
        risk: RiskAction,
        is_anomalous: bool,
    ) -> Decision {
        let wide_spread = tick.spread > self.spread_threshold;
        if wide_spread || is_anomalous {
            let action = if position > 0.0 {
                Action::SellAll
            } else {
                Action::Hold
            };
            return Decision {
                action,
                reason: DecisionReason::AnomalyOverride {
                    wide_spread,
                    rug_pull: is_anomalous,
                },
            };
        }

        match risk {
            RiskAction::StopLoss { size } => {
                return Decision {
                    action: Action::SellPartial { size },
                    reason: DecisionReason::StopLoss,
                }
            }
            RiskAction::TakeProfitPartial { size } => {
                return Decision {
                    action: Action::SellPartial { size },
                    reason: DecisionReason::TakeProfit,
                }
            }
            RiskAction::None => {}
        }

        let Some(p) = prediction else {
            return Decision {
                action: Action::Hold,
                reason: DecisionReason::NoPrediction,
            };
        };

        let size = self.buy_size(p);
        if size > 0.0 {
            return Decision {
                action: Action::Buy { size },
                reason: DecisionReason::PredictedRise,
            };
        }

        if p < EXIT_PROBABILITY && position > 0.0 {
            return Decision {
                action: Action::SellPartial {
                    size: position.min(self.order_size_base),
                },
                reason: DecisionReason::PredictedFall,
            };
        }

        Decision {
            action: Action::Hold,
            reason: DecisionReason::NoSignal,
        }
    }

    /// Buy size tier for a rise probability
    pub fn buy_size(&self, p: f64) -> f64 {
        if p > 0.9 {
            2.0 * self.order_size_base
        } else if p > 0.7 {
            self.order_size_base
        } else if p > 0.5 {
            0.5 * self.order_size_base
        } else {
            0.0
        }
    }
}
