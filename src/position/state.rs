//! Position state
//!
//! Tracks size and weighted average entry for one market.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::exchange::Fill;
use crate::strategy::OrderSide;

/// Sizes below this are treated as flat
const DUST: f64 = 1e-12;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionState {
    size: f64,
    /// Meaningful only while size > 0
    avg_entry_price: Option<f64>,
}

impl PositionState {
    /// Flat position
    pub fn new() -> Self {
        Self::default()
    }

    pub fn size(&self) -> f64 {
        self.size
    }

    pub fn avg_entry_price(&self) -> Option<f64> {
        self.avg_entry_price
    }

    pub fn is_open(&self) -> bool {
        self.size > 0.0
    }

    /// Apply a confirmed fill; returns realized P&L (zero for buys).
    ///
    /// A `Fill` only exists once the exchange has confirmed the order, so
    /// nothing else can move the position.
    pub fn apply_fill(&mut self, fill: &Fill) -> f64 {
        if fill.size <= 0.0 {
            return 0.0;
        }

        match fill.side {
            OrderSide::Buy => {
                let new_size = self.size + fill.size;
                let new_avg = match self.avg_entry_price {
                    Some(avg) if self.is_open() => {
                        (avg * self.size + fill.price * fill.size) / new_size
                    }
                    _ => fill.price,
                };
                self.size = new_size;
                self.avg_entry_price = Some(new_avg);
                debug!(size = self.size, avg = new_avg, "Position increased");
                0.0
            }
            OrderSide::Sell => {
                let sold = fill.size.min(self.size);
                let pnl = match self.avg_entry_price {
                    Some(avg) => (fill.price - avg) * sold,
                    None => 0.0,
                };
                self.size -= sold;
                if self.size <= DUST {
                    self.size = 0.0;
                    self.avg_entry_price = None;
                }
                debug!(size = self.size, pnl, "Position reduced");
                pnl
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn fill(side: OrderSide, price: f64, size: f64) -> Fill {
        Fill {
            order_id: "test".to_string(),
            side,
            price,
            size,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_first_buy_sets_entry() {
        let mut position = PositionState::new();
        assert_eq!(position.apply_fill(&fill(OrderSide::Buy, 100.0, 0.2)), 0.0);
        assert_eq!(position.size(), 0.2);
        assert_eq!(position.avg_entry_price(), Some(100.0));
    }

    #[test]
    fn test_weighted_average_entry() {
        let mut position = PositionState::new();
        position.apply_fill(&fill(OrderSide::Buy, 100.0, 1.0));
        position.apply_fill(&fill(OrderSide::Buy, 110.0, 1.0));
        assert!((position.avg_entry_price().unwrap() - 105.0).abs() < 1e-9);
        assert_eq!(position.size(), 2.0);
    }

    #[test]
    fn test_average_stays_between_old_and_fill() {
        let prices = [100.0, 80.0, 130.0, 95.5, 101.0, 60.0];
        let sizes = [0.05, 0.2, 0.1, 0.05, 0.2, 0.1];
        let mut position = PositionState::new();
        position.apply_fill(&fill(OrderSide::Buy, 90.0, 0.1));
        for (price, size) in prices.iter().zip(sizes.iter()) {
            let old = position.avg_entry_price().unwrap();
            position.apply_fill(&fill(OrderSide::Buy, *price, *size));
            let new = position.avg_entry_price().unwrap();
            assert!(new >= old.min(*price) - 1e-9 && new <= old.max(*price) + 1e-9);
        }
    }

    #[test]
    fn test_stop_loss_flattens() {
        let mut position = PositionState::new();
        position.apply_fill(&fill(OrderSide::Buy, 100.0, 1.0));
        let pnl = position.apply_fill(&fill(OrderSide::Sell, 94.0, 1.0));
        assert!((pnl + 6.0).abs() < 1e-9);
        assert_eq!(position.size(), 0.0);
        assert_eq!(position.avg_entry_price(), None);
        assert!(!position.is_open());
    }

    #[test]
    fn test_partial_sell_keeps_entry() {
        let mut position = PositionState::new();
        position.apply_fill(&fill(OrderSide::Buy, 100.0, 1.0));
        let pnl = position.apply_fill(&fill(OrderSide::Sell, 111.0, 0.5));
        assert!((pnl - 5.5).abs() < 1e-9);
        assert_eq!(position.size(), 0.5);
        assert_eq!(position.avg_entry_price(), Some(100.0));
    }

    #[test]
    fn test_oversell_clamps() {
        let mut position = PositionState::new();
        position.apply_fill(&fill(OrderSide::Buy, 10.0, 0.1));
        position.apply_fill(&fill(OrderSide::Sell, 10.0, 5.0));
        assert_eq!(position.size(), 0.0);
    }
}
