//! REST exchange gateway client
//!
//! Talks to an HTTP gateway that fronts the DEX order book and handles
//! signing and on-chain confirmation. Endpoints:
//!
//! - `GET  {base}/markets/{id}/orderbook?depth=N`
//! - `POST {base}/orders`
//! - `GET  {base}/markets/{id}/history?start=..&end=..`

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use super::{Exchange, Fill};
use crate::config::ExchangeConfig;
use crate::error::{Error, Result};
use crate::market::Tick;
use crate::strategy::OrderSide;

/// One price level
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct BookLevel {
    pub price: f64,
    pub size: f64,
}

/// Order book snapshot response
#[derive(Debug, Clone, Deserialize)]
pub struct OrderBookResponse {
    #[serde(default)]
    pub bids: Vec<BookLevel>,
    #[serde(default)]
    pub asks: Vec<BookLevel>,
}

/// Order request body
#[derive(Debug, Clone, Serialize)]
pub struct OrderRequest<'a> {
    pub market: &'a str,
    pub side: OrderSide,
    pub price: f64,
    pub size: f64,
    /// Always "limit"
    #[serde(rename = "type")]
    pub order_type: &'static str,
    pub client_order_id: String,
}

/// Order response body
#[derive(Debug, Clone, Deserialize)]
pub struct OrderResponse {
    /// "confirmed" once the order settled; anything else is a rejection
    pub status: String,
    pub order_id: Option<String>,
    pub filled_price: Option<f64>,
    pub filled_size: Option<f64>,
    pub error: Option<String>,
}

/// Historical point served for backfill
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricalTick {
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    pub mid_price: f64,
    pub spread: f64,
    pub volume: f64,
}

impl HistoricalTick {
    /// Rebuild quotes around the mid price
    pub fn to_tick(&self) -> Result<Tick> {
        let half = self.spread.max(0.0) / 2.0;
        Tick::from_quotes(
            self.mid_price - half,
            self.mid_price + half,
            self.volume,
            self.timestamp.unwrap_or_else(Utc::now),
        )
    }
}

/// Put history in chronological order, oldest first.
///
/// Points without a timestamp keep their slot; stamped points are sorted
/// among the remaining slots.
pub fn sort_history(points: &mut [HistoricalTick]) {
    let slots: Vec<usize> = points
        .iter()
        .enumerate()
        .filter(|(_, p)| p.timestamp.is_some())
        .map(|(i, _)| i)
        .collect();

    let mut stamped: Vec<HistoricalTick> = slots.iter().map(|&i| points[i].clone()).collect();
    stamped.sort_by_key(|p| p.timestamp);

    for (slot, point) in slots.into_iter().zip(stamped) {
        points[slot] = point;
    }
}

pub struct HttpExchange {
    client: Client,
    base_url: Url,
    depth_levels: usize,
}

impl HttpExchange {
    pub fn new(config: &ExchangeConfig) -> Result<Self> {
        let mut base = config.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url =
            Url::parse(&base).map_err(|e| Error::Config(format!("Invalid base_url: {}", e)))?;

        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        info!("Using HTTP exchange gateway at {}", base_url);

        Ok(Self {
            client,
            base_url,
            depth_levels: config.depth_levels,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| Error::Internal(format!("Bad endpoint {}: {}", path, e)))
    }

    /// Fetch historical points for offline training
    pub async fn fetch_history(
        &self,
        market: &str,
        start: &str,
        end: &str,
    ) -> Result<Vec<HistoricalTick>> {
        let url = self.endpoint(&format!("markets/{}/history", market))?;
        info!("Fetching historical data from {}", url);

        let response = self
            .client
            .get(url)
            .query(&[("start", start), ("end", end)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Http(format!(
                "history request failed with status {}",
                response.status()
            )));
        }

        let points: Vec<HistoricalTick> = response
            .json()
            .await
            .map_err(|e| Error::Deserialization(e.to_string()))?;
        Ok(points)
    }
}

/// Best bid/ask and top-of-book depth from a snapshot
pub fn summarize_book(book: &OrderBookResponse, depth_levels: usize) -> Result<(f64, f64, f64)> {
    let mut bids: Vec<BookLevel> = book.bids.iter().copied().filter(|l| l.size > 0.0).collect();
    let mut asks: Vec<BookLevel> = book.asks.iter().copied().filter(|l| l.size > 0.0).collect();

    if bids.is_empty() || asks.is_empty() {
        return Err(Error::DataUnavailable("empty order book side".into()));
    }

    bids.sort_by(|a, b| b.price.total_cmp(&a.price));
    asks.sort_by(|a, b| a.price.total_cmp(&b.price));

    let volume: f64 = bids
        .iter()
        .take(depth_levels)
        .chain(asks.iter().take(depth_levels))
        .map(|l| l.size)
        .sum();

    Ok((bids[0].price, asks[0].price, volume))
}

#[async_trait]
impl Exchange for HttpExchange {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn fetch_tick(&self, market: &str) -> Result<Tick> {
        let url = self.endpoint(&format!("markets/{}/orderbook", market))?;

        let response = self
            .client
            .get(url)
            .query(&[("depth", self.depth_levels)])
            .send()
            .await
            .map_err(|e| Error::DataUnavailable(format!("order book request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::DataUnavailable(format!(
                "order book request returned {}",
                response.status()
            )));
        }

        let book: OrderBookResponse = response
            .json()
            .await
            .map_err(|e| Error::DataUnavailable(format!("bad order book payload: {}", e)))?;

        let (best_bid, best_ask, volume) = summarize_book(&book, self.depth_levels)?;
        debug!(market, best_bid, best_ask, volume, "Fetched order book");

        Tick::from_quotes(best_bid, best_ask, volume, Utc::now())
    }

    async fn place_order(
        &self,
        market: &str,
        side: OrderSide,
        price: f64,
        size: f64,
    ) -> Result<Fill> {
        let url = self.endpoint("orders")?;
        let request = OrderRequest {
            market,
            side,
            price,
            size,
            order_type: "limit",
            client_order_id: uuid::Uuid::new_v4().to_string(),
        };

        debug!(market, %side, price, size, "Submitting order");

        let response = self
            .client
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::OrderRejected(format!("order request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Order endpoint returned {}: {}", status, body);
            return Err(Error::OrderRejected(format!("HTTP {}: {}", status, body)));
        }

        let body: OrderResponse = response
            .json()
            .await
            .map_err(|e| Error::OrderRejected(format!("bad order response: {}", e)))?;

        confirmed_fill(body, &request)
    }
}

/// Only a "confirmed" status becomes a fill
fn confirmed_fill(body: OrderResponse, request: &OrderRequest<'_>) -> Result<Fill> {
    if body.status != "confirmed" {
        let reason = body
            .error
            .unwrap_or_else(|| format!("order status {}", body.status));
        return Err(Error::OrderRejected(reason));
    }

    Ok(Fill {
        order_id: body
            .order_id
            .unwrap_or_else(|| request.client_order_id.clone()),
        side: request.side,
        price: body.filled_price.unwrap_or(request.price),
        size: body.filled_size.unwrap_or(request.size),
        timestamp: Utc::now(),
    })
}
