//! Shared strategy types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Order side submitted to the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "buy"),
            OrderSide::Sell => write!(f, "sell"),
        }
    }
}

/// The single trade action produced per tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Hold,
    Buy { size: f64 },
    SellPartial { size: f64 },
    /// Liquidate whatever the position holds at execution time
    SellAll,
}

impl Action {
    /// Side and size to submit, given the current position size.
    ///
    /// Returns `None` for Hold, and for sells when there is nothing to sell.
    pub fn order(&self, position_size: f64) -> Option<(OrderSide, f64)> {
        match *self {
            Action::Hold => None,
            Action::Buy { size } if size > 0.0 => Some((OrderSide::Buy, size)),
            Action::Buy { .. } => None,
            Action::SellPartial { size } => {
                let size = size.min(position_size);
                (size > 0.0).then_some((OrderSide::Sell, size))
            }
            Action::SellAll => (position_size > 0.0).then_some((OrderSide::Sell, position_size)),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Hold => write!(f, "HOLD"),
            Action::Buy { size } => write!(f, "BUY {}", size),
            Action::SellPartial { size } => write!(f, "SELL {}", size),
            Action::SellAll => write!(f, "SELL ALL"),
        }
    }
}

/// Outcome of the stop-loss / take-profit check
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RiskAction {
    None,
    /// Liquidate the entire position
    StopLoss { size: f64 },
    /// Liquidate half the position
    TakeProfitPartial { size: f64 },
}
