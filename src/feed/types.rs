//! Price feed types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A single price observation with the OHLCV of its ingestion interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSample {
    /// Trading symbol (e.g., "BTCUSDT")
    pub symbol: String,
    /// Last traded price
    pub price: Decimal,
    /// Local timestamp when the sample was received
    pub timestamp: DateTime<Utc>,
    /// Exchange event time
    pub exchange_ts: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl PriceSample {
    /// Sample with every OHLC field at `price` and no volume
    pub fn flat(symbol: impl Into<String>, price: Decimal, timestamp: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            timestamp,
            exchange_ts: timestamp,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: Decimal::ZERO,
        }
    }
}

/// Historical candle used to pre-seed the trailing window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Candle open time
    pub time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Candle {
    /// Sample at this candle's close
    pub fn to_sample(&self, symbol: &str) -> PriceSample {
        PriceSample {
            symbol: symbol.to_string(),
            price: self.close,
            timestamp: self.time,
            exchange_ts: self.time,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
        }
    }
}

/// Where samples currently come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedMode {
    /// External market-data stream
    Live,
    /// Random-walk generator; sticky once entered
    Synthetic,
}

/// Notification broadcast to feed listeners
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// New sample, in stream order
    Sample(PriceSample),
    /// Bulk historical candles, published once at startup
    History(Arc<Vec<Candle>>),
}
