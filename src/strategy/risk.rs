//! Stop-loss and take-profit checks
//!
//! Pure function of position and price. Loss is checked before gain, so the
//! two triggers never fire together.

use tracing::debug;

use super::types::RiskAction;
use crate::config::RiskConfig;

#[derive(Debug, Clone)]
pub struct RiskManager {
    stop_loss_percent: f64,
    take_profit_percent: f64,
    lot_size: f64,
}

impl RiskManager {
    pub fn new(config: &RiskConfig) -> Self {
        Self {
            stop_loss_percent: config.stop_loss_percent,
            take_profit_percent: config.take_profit_percent,
            lot_size: config.lot_size,
        }
    }

    /// Evaluate an open position against the current price
    pub fn evaluate(&self, position: f64, avg_entry_price: f64, current_price: f64) -> RiskAction {
        if position <= 0.0 || avg_entry_price <= 0.0 {
            return RiskAction::None;
        }

        let drop = (avg_entry_price - current_price) / avg_entry_price;
        let gain = (current_price - avg_entry_price) / avg_entry_price;

        if drop > self.stop_loss_percent {
            debug!("Stop loss triggered: drop={:.4}", drop);
            return RiskAction::StopLoss { size: position };
        }

        if gain > self.take_profit_percent {
            let size = self.round_to_lot(position / 2.0);
            if size <= 0.0 {
                debug!("Take profit skipped: half position rounds below one lot");
                return RiskAction::None;
            }
            debug!("Take profit triggered: gain={:.4}", gain);
            return RiskAction::TakeProfitPartial { size };
        }

        RiskAction::None
    }

    /// Round down to the exchange lot; a zero lot leaves the size untouched
    fn round_to_lot(&self, size: f64) -> f64 {
        if self.lot_size <= 0.0 {
            return size;
        }
        ((size / self.lot_size) + 1e-9).floor() * self.lot_size
    }
}
