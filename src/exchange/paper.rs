//! Paper exchange
//!
//! Random-walk order books, one per market, that fill every order at the
//! requested price. Used for dry runs and tests.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use super::{Exchange, Fill};
use crate::error::{Error, Result};
use crate::market::Tick;
use crate::strategy::OrderSide;

/// Max relative price move per tick
const STEP_PCT: f64 = 0.004;
/// Half-spread as a fraction of price
const HALF_SPREAD_PCT: f64 = 0.0005;

struct PaperBook {
    rng: StdRng,
    mid_price: f64,
}

impl PaperBook {
    fn new(seed: u64, start_price: f64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            mid_price: start_price,
        }
    }

    fn step(&mut self) -> (f64, f64, f64) {
        let change: f64 = self.rng.gen_range(-STEP_PCT..STEP_PCT);
        self.mid_price = (self.mid_price * (1.0 + change)).max(1e-9);
        let half_spread = self.mid_price * HALF_SPREAD_PCT * self.rng.gen_range(0.5..1.5);
        let volume = self.rng.gen_range(1_500.0..6_000.0);
        (self.mid_price - half_spread, self.mid_price + half_spread, volume)
    }
}

pub struct PaperExchange {
    books: DashMap<String, PaperBook>,
    start_price: f64,
    seed: Option<u64>,
}

impl PaperExchange {
    pub fn new(start_price: f64) -> Self {
        info!("Using paper exchange (start price {})", start_price);
        Self {
            books: DashMap::new(),
            start_price,
            seed: None,
        }
    }

    /// Deterministic books (tests)
    pub fn with_seed(start_price: f64, seed: u64) -> Self {
        Self {
            books: DashMap::new(),
            start_price,
            seed: Some(seed),
        }
    }

    fn market_seed(&self, market: &str) -> u64 {
        match self.seed {
            Some(seed) => market
                .bytes()
                .fold(seed, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64)),
            None => rand::random(),
        }
    }
}

#[async_trait]
impl Exchange for PaperExchange {
    fn name(&self) -> &'static str {
        "paper"
    }

    async fn fetch_tick(&self, market: &str) -> Result<Tick> {
        let (bid, ask, volume) = {
            let mut book = self
                .books
                .entry(market.to_string())
                .or_insert_with(|| PaperBook::new(self.market_seed(market), self.start_price));
            book.step()
        };
        Tick::from_quotes(bid, ask, volume, Utc::now())
    }

    async fn place_order(
        &self,
        market: &str,
        side: OrderSide,
        price: f64,
        size: f64,
    ) -> Result<Fill> {
        if !(size > 0.0) || !(price > 0.0) {
            return Err(Error::OrderRejected(format!(
                "invalid order on {}: {} {} @ {}",
                market, side, size, price
            )));
        }

        Ok(Fill {
            order_id: uuid::Uuid::new_v4().to_string(),
            side,
            price,
            size,
            timestamp: Utc::now(),
        })
    }
}
