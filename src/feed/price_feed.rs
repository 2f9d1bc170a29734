//! Price feed service: ingestion, sticky synthetic fallback, broadcast

use super::{
    BinanceFeed, Candle, FeedEvent, FeedMode, PriceSample, PriceSource, SampleSource,
    SampleWindow, SyntheticConfig, SyntheticSource,
};
use crate::config::{FeedConfig, FeedSourceKind};
use crate::telemetry::{increment, set_gauge, CounterMetric, GaugeMetric};
use parking_lot::{Mutex, RwLock};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

struct FeedShared {
    symbol: String,
    latest: RwLock<Option<PriceSample>>,
    window: Mutex<SampleWindow>,
    candles: RwLock<Vec<Candle>>,
    mode: RwLock<FeedMode>,
    events: broadcast::Sender<FeedEvent>,
}

/// Latest-price holder fed by a live stream or the synthetic generator
///
/// Cheap to clone; clones share state. `current_price` never blocks on
/// the network: it returns the last ingested value.
#[derive(Clone)]
pub struct PriceFeed {
    shared: Arc<FeedShared>,
}

impl PriceFeed {
    /// Create an idle feed; nothing is ingested until [`PriceFeed::start`] or
    /// [`PriceFeed::ingest`] is called
    pub fn new(symbol: impl Into<String>, history_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(1024);
        Self {
            shared: Arc::new(FeedShared {
                symbol: symbol.into(),
                latest: RwLock::new(None),
                window: Mutex::new(SampleWindow::new(history_capacity)),
                candles: RwLock::new(Vec::new()),
                mode: RwLock::new(FeedMode::Live),
                events,
            }),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.shared.symbol
    }

    pub fn latest(&self) -> Option<PriceSample> {
        self.shared.latest.read().clone()
    }

    /// Trailing window, oldest first
    pub fn history(&self) -> Vec<PriceSample> {
        self.shared.window.lock().to_vec()
    }

    /// Candles from the startup history seed
    pub fn candles(&self) -> Vec<Candle> {
        self.shared.candles.read().clone()
    }

    pub fn mode(&self) -> FeedMode {
        *self.shared.mode.read()
    }

    /// Listen for samples and the startup history notification
    ///
    /// Slow receivers lag and skip; they never hold up ingestion.
    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.shared.events.subscribe()
    }

    /// Accept a sample in stream order
    ///
    /// Late or duplicate samples simply overwrite the current price.
    pub fn ingest(&self, sample: PriceSample) {
        *self.shared.latest.write() = Some(sample.clone());
        self.shared.window.lock().push(sample.clone());

        increment(CounterMetric::FeedSamples);
        if let Some(price) = sample.price.to_f64() {
            set_gauge(GaugeMetric::CurrentPrice, price);
        }

        // no receivers is fine
        let _ = self.shared.events.send(FeedEvent::Sample(sample));
    }

    /// Pre-seed the window from historical candles
    pub fn seed(&self, candles: Vec<Candle>) {
        if candles.is_empty() {
            return;
        }

        {
            let mut window = self.shared.window.lock();
            for candle in &candles {
                window.push(candle.to_sample(&self.shared.symbol));
            }
        }
        {
            let mut latest = self.shared.latest.write();
            if latest.is_none() {
                *latest = candles.last().map(|c| c.to_sample(&self.shared.symbol));
            }
        }

        tracing::info!(count = candles.len(), "Seeded price history");
        *self.shared.candles.write() = candles.clone();
        let _ = self.shared.events.send(FeedEvent::History(Arc::new(candles)));
    }

    /// Wait until some price exists, up to `timeout`
    pub async fn wait_for_price(&self, timeout: Duration) -> Option<Decimal> {
        let mut rx = self.subscribe();
        if let Some(price) = self.current_price() {
            return Some(price);
        }

        tokio::time::timeout(timeout, async {
            loop {
                match rx.recv().await {
                    Ok(FeedEvent::Sample(sample)) => return Some(sample.price),
                    Ok(FeedEvent::History(_)) | Err(broadcast::error::RecvError::Lagged(_)) => {
                        if let Some(price) = self.current_price() {
                            return Some(price);
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .await
        .ok()
        .flatten()
    }

    /// Start ingestion according to `config`
    ///
    /// Binance: optionally seed history, stream until the reconnect budget
    /// is spent, then switch to the synthetic generator for good.
    /// Synthetic: generate from the configured start price.
    pub fn start(&self, config: &FeedConfig) -> JoinHandle<()> {
        let synthetic = SyntheticConfig {
            step: config.synthetic_step,
            floor: config.synthetic_floor,
            interval: Duration::from_millis(config.synthetic_interval_ms),
        };
        let start_price = config.synthetic_start_price;

        match config.source {
            FeedSourceKind::Synthetic => {
                *self.shared.mode.write() = FeedMode::Synthetic;
                let feed = self.clone();
                tokio::spawn(async move {
                    feed.run_synthetic(start_price, synthetic).await;
                })
            }
            FeedSourceKind::Binance => {
                let live = BinanceFeed::from_config(config);
                let seed_limit = config.seed_history.then_some(config.history_capacity);
                let feed = self.clone();
                tokio::spawn(async move {
                    if let Some(limit) = seed_limit {
                        match live.fetch_history(limit).await {
                            Ok(candles) => feed.seed(candles),
                            Err(e) => tracing::warn!(error = %e, "History seed failed"),
                        }
                    }
                    feed.run_with_fallback(Arc::new(live), start_price, synthetic)
                        .await;
                })
            }
        }
    }

    /// Drain `live` until it ends, then fall back to synthetic prices
    pub async fn run_with_fallback(
        &self,
        live: Arc<dyn SampleSource>,
        start_price: Decimal,
        synthetic: SyntheticConfig,
    ) {
        *self.shared.mode.write() = FeedMode::Live;

        match live.subscribe().await {
            Ok(mut rx) => {
                while let Some(sample) = rx.recv().await {
                    self.ingest(sample);
                }
            }
            Err(e) => {
                tracing::error!(source = %live.describe(), error = %e, "Live feed subscription failed");
            }
        }

        *self.shared.mode.write() = FeedMode::Synthetic;
        increment(CounterMetric::FeedFallbacks);

        let last_known = self.current_price();
        tracing::error!(
            source = %live.describe(),
            last_known = ?last_known,
            "Live feed lost, falling back to synthetic prices for the rest of the process"
        );

        self.run_synthetic(last_known.unwrap_or(start_price), synthetic)
            .await;
    }

    async fn run_synthetic(&self, start: Decimal, config: SyntheticConfig) {
        let source = SyntheticSource::new(self.shared.symbol.clone(), start, config);
        match source.subscribe().await {
            Ok(mut rx) => {
                while let Some(sample) = rx.recv().await {
                    self.ingest(sample);
                }
            }
            Err(e) => tracing::error!(error = %e, "Synthetic generator failed to start"),
        }
    }
}

impl PriceSource for PriceFeed {
    fn current_price(&self) -> Option<Decimal> {
        self.shared.latest.read().as_ref().map(|s| s.price)
    }
}
