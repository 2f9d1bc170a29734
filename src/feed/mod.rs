//! Price feed module
//!
//! Latest BTC price from the Binance ticker stream, with a synthetic
//! random-walk fallback and a bounded trailing window.

mod binance;
mod history;
mod price_feed;
mod synthetic;
mod types;

pub use binance::BinanceFeed;
pub use history::SampleWindow;
pub use price_feed::PriceFeed;
pub use synthetic::{RandomWalk, SyntheticConfig, SyntheticSource, WalkStep};
pub use types::{Candle, FeedEvent, FeedMode, PriceSample};

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::mpsc;

/// Producer of raw samples
#[async_trait]
pub trait SampleSource: Send + Sync {
    /// Start producing; the channel closes when the source gives up
    async fn subscribe(&self) -> anyhow::Result<mpsc::Receiver<PriceSample>>;

    /// Short label for logs
    fn describe(&self) -> String;
}

/// Read side consumed by the round engine
pub trait PriceSource: Send + Sync {
    /// Last known price; `None` only before the first sample
    fn current_price(&self) -> Option<Decimal>;
}
