//! Market value types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One order book snapshot, produced once per successful fetch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub timestamp: DateTime<Utc>,
    pub mid_price: f64,
    pub best_bid: f64,
    pub best_ask: f64,
    pub spread: f64,
    /// Estimated depth near the top of the book
    pub volume: f64,
}

impl Tick {
    /// Build a tick from top-of-book quotes.
    ///
    /// Mid price is the average of bid and ask, spread is ask minus bid.
    /// A crossed or non-positive book is treated as no data.
    pub fn from_quotes(
        best_bid: f64,
        best_ask: f64,
        volume: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<Self> {
        if !best_bid.is_finite() || !best_ask.is_finite() || !volume.is_finite() {
            return Err(Error::DataUnavailable("non-finite quote".into()));
        }
        if best_bid <= 0.0 || best_ask <= 0.0 {
            return Err(Error::DataUnavailable(format!(
                "non-positive quote: bid={} ask={}",
                best_bid, best_ask
            )));
        }
        if best_ask < best_bid {
            return Err(Error::DataUnavailable(format!(
                "crossed book: bid={} ask={}",
                best_bid, best_ask
            )));
        }

        Ok(Self {
            timestamp,
            mid_price: (best_bid + best_ask) / 2.0,
            best_bid,
            best_ask,
            spread: best_ask - best_bid,
            volume: volume.max(0.0),
        })
    }
}

/// Features derived from a tick plus the trailing window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub mid_price: f64,
    pub spread: f64,
    pub volume: f64,
    pub ma_10: f64,
    pub volatility_10: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_from_quotes() {
        let tick = Tick::from_quotes(99.0, 101.0, 1500.0, Utc::now()).unwrap();
        assert_eq!(tick.mid_price, 100.0);
        assert_eq!(tick.spread, 2.0);
        assert_eq!(tick.volume, 1500.0);
    }

    #[test]
    fn test_tick_rejects_crossed_book() {
        let err = Tick::from_quotes(101.0, 99.0, 10.0, Utc::now()).unwrap_err();
        assert!(matches!(err, Error::DataUnavailable(_)));
    }

    #[test]
    fn test_tick_rejects_empty_side() {
        assert!(Tick::from_quotes(0.0, 99.0, 10.0, Utc::now()).is_err());
        assert!(Tick::from_quotes(f64::NAN, 99.0, 10.0, Utc::now()).is_err());
    }
}
