//! Exchange collaborator
//!
//! Market data and order submission behind one async trait:
//! - `HttpExchange` - REST gateway in front of the DEX order book
//! - `PaperExchange` - simulated books for dry runs

pub mod http;
pub mod paper;
#[cfg(test)]
pub mod scripted;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{ExchangeConfig, ExchangeKind};
use crate::error::Result;
use crate::market::Tick;
use crate::strategy::OrderSide;

pub use http::{sort_history, HttpExchange};
pub use paper::PaperExchange;

/// A confirmed execution. Only produced after exchange confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: String,
    pub side: OrderSide,
    pub price: f64,
    pub size: f64,
    pub timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait Exchange: Send + Sync {
    /// Name for logging
    fn name(&self) -> &'static str;

    /// Current top of book.
    ///
    /// An empty or unusable book is `Error::DataUnavailable`, never a panic.
    async fn fetch_tick(&self, market: &str) -> Result<Tick>;

    /// Submit a limit order and wait for confirmation.
    ///
    /// Anything short of a confirmed fill is `Error::OrderRejected`.
    async fn place_order(
        &self,
        market: &str,
        side: OrderSide,
        price: f64,
        size: f64,
    ) -> Result<Fill>;
}

/// Build the configured exchange; `paper` forces the simulated one
pub fn build(config: &ExchangeConfig, paper: bool) -> Result<Arc<dyn Exchange>> {
    if paper || config.kind == ExchangeKind::Paper {
        return Ok(Arc::new(PaperExchange::new(config.paper_start_price)));
    }
    Ok(Arc::new(HttpExchange::new(config)?))
}
