//! Synthetic random-walk price generator
//!
//! Used when the feed is configured for synthetic prices, and as the sticky
//! fallback once the live stream has exhausted its reconnect budget.

use super::{PriceSample, SampleSource};
use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::time::Duration;
use tokio::sync::mpsc;

/// Random-walk parameters
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    /// Width of one step: each move is uniform in `[-step/2, step/2)`
    pub step: Decimal,
    /// Prices never go below this
    pub floor: Decimal,
    /// Time between generated samples
    pub interval: Duration,
}

/// Bounded random walk around the last price
pub struct RandomWalk {
    price: Decimal,
    step: Decimal,
    floor: Decimal,
    rng: StdRng,
}

/// One step of the walk
#[derive(Debug, Clone, Copy)]
pub struct WalkStep {
    pub previous: Decimal,
    pub price: Decimal,
    pub change: Decimal,
}

impl RandomWalk {
    pub fn new(start: Decimal, step: Decimal, floor: Decimal) -> Self {
        Self::with_rng(start, step, floor, StdRng::from_entropy())
    }

    /// Deterministic walk for tests and replays
    pub fn seeded(start: Decimal, step: Decimal, floor: Decimal, seed: u64) -> Self {
        Self::with_rng(start, step, floor, StdRng::seed_from_u64(seed))
    }

    fn with_rng(start: Decimal, step: Decimal, floor: Decimal, rng: StdRng) -> Self {
        Self {
            price: start.max(floor),
            step: step.abs(),
            floor,
            rng,
        }
    }

    pub fn price(&self) -> Decimal {
        self.price
    }

    pub fn next_step(&mut self) -> WalkStep {
        let unit: f64 = self.rng.gen::<f64>() - 0.5;
        let change = Decimal::from_f64(unit).unwrap_or(Decimal::ZERO) * self.step;
        let change = change.round_dp(2);

        let previous = self.price;
        self.price = (previous + change).max(self.floor);

        WalkStep {
            previous,
            price: self.price,
            change: self.price - previous,
        }
    }

    /// Next step as a sample; OHLC spans half the move either side
    pub fn next_sample(&mut self, symbol: &str) -> PriceSample {
        let step = self.next_step();
        let half = step.change.abs() / Decimal::TWO;
        let volume = Decimal::from_f64(self.rng.gen_range(0.0..1000.0))
            .unwrap_or(Decimal::ZERO)
            .round_dp(3);
        let now = Utc::now();

        PriceSample {
            symbol: symbol.to_string(),
            price: step.price,
            timestamp: now,
            exchange_ts: now,
            open: step.previous,
            high: step.price + half,
            low: (step.price - half).max(self.floor),
            close: step.price,
            volume,
        }
    }
}

/// Sample source driven by a [`RandomWalk`] on a fixed cadence
pub struct SyntheticSource {
    symbol: String,
    start: Decimal,
    config: SyntheticConfig,
}

impl SyntheticSource {
    pub fn new(symbol: impl Into<String>, start: Decimal, config: SyntheticConfig) -> Self {
        Self {
            symbol: symbol.into(),
            start,
            config,
        }
    }
}

#[async_trait]
impl SampleSource for SyntheticSource {
    async fn subscribe(&self) -> anyhow::Result<mpsc::Receiver<PriceSample>> {
        let (tx, rx) = mpsc::channel(256);
        let mut walk = RandomWalk::new(self.start, self.config.step, self.config.floor);
        let symbol = self.symbol.clone();
        let interval = self.config.interval;

        tracing::info!(
            start = %self.start,
            floor = %self.config.floor,
            "Starting synthetic price generator"
        );

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if tx.send(walk.next_sample(&symbol)).await.is_err() {
                    tracing::debug!("Synthetic receiver dropped, stopping generator");
                    break;
                }
            }
        });

        Ok(rx)
    }

    fn describe(&self) -> String {
        format!("synthetic:{}", self.symbol)
    }
}
