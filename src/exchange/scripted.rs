//! Scripted exchange for worker tests
//!
//! Replays queued ticks and order outcomes; records every submitted order.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::Mutex;

use super::{Exchange, Fill};
use crate::error::{Error, Result};
use crate::market::Tick;
use crate::strategy::OrderSide;

#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedOrder {
    pub market: String,
    pub side: OrderSide,
    pub price: f64,
    pub size: f64,
}

#[derive(Default)]
pub struct ScriptedExchange {
    /// `None` entries replay as "no data"
    ticks: Mutex<VecDeque<Option<Tick>>>,
    /// Fallback once the queue is drained
    repeat_last: Mutex<Option<Tick>>,
    /// `false` entries reject; empty queue confirms
    outcomes: Mutex<VecDeque<bool>>,
    orders: Mutex<Vec<SubmittedOrder>>,
}

impl ScriptedExchange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_tick(&self, tick: Tick) {
        self.ticks.lock().unwrap().push_back(Some(tick));
    }

    pub fn push_quote(&self, mid: f64, spread: f64, volume: f64) {
        let tick =
            Tick::from_quotes(mid - spread / 2.0, mid + spread / 2.0, volume, Utc::now()).unwrap();
        self.push_tick(tick);
    }

    pub fn push_no_data(&self) {
        self.ticks.lock().unwrap().push_back(None);
    }

    pub fn push_outcome(&self, confirmed: bool) {
        self.outcomes.lock().unwrap().push_back(confirmed);
    }

    pub fn orders(&self) -> Vec<SubmittedOrder> {
        self.orders.lock().unwrap().clone()
    }
}

#[async_trait]
impl Exchange for ScriptedExchange {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn fetch_tick(&self, _market: &str) -> Result<Tick> {
        let next = self.ticks.lock().unwrap().pop_front();
        match next {
            Some(Some(tick)) => {
                *self.repeat_last.lock().unwrap() = Some(tick);
                Ok(tick)
            }
            Some(None) => Err(Error::DataUnavailable("scripted gap".into())),
            None => self
                .repeat_last
                .lock()
                .unwrap()
                .ok_or_else(|| Error::DataUnavailable("script exhausted".into())),
        }
    }

    async fn place_order(
        &self,
        market: &str,
        side: OrderSide,
        price: f64,
        size: f64,
    ) -> Result<Fill> {
        self.orders.lock().unwrap().push(SubmittedOrder {
            market: market.to_string(),
            side,
            price,
            size,
        });

        let confirmed = self.outcomes.lock().unwrap().pop_front().unwrap_or(true);
        if !confirmed {
            return Err(Error::OrderRejected("scripted rejection".into()));
        }

        Ok(Fill {
            order_id: format!("scripted-{}", self.orders.lock().unwrap().len()),
            side,
            price,
            size,
            timestamp: Utc::now(),
        })
    }
}
