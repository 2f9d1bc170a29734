//! Binance ticker stream and kline history

use super::{Candle, PriceSample, SampleSource};
use crate::config::FeedConfig;
use crate::telemetry::{increment, CounterMetric};
use crate::ws::{WsClient, WsConfig, WsMessage};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::mpsc;

/// Binance 24h rolling ticker message
#[derive(Debug, Deserialize)]
struct BinanceTickerMessage {
    #[serde(rename = "e")]
    event_type: String,
    #[serde(rename = "E")]
    event_time: i64,
    #[serde(rename = "s")]
    symbol: String,
    /// Last price
    #[serde(rename = "c")]
    close: String,
    #[serde(rename = "o")]
    open: String,
    #[serde(rename = "h")]
    high: String,
    #[serde(rename = "l")]
    low: String,
    /// Base asset volume
    #[serde(rename = "v")]
    volume: String,
}

/// Binance WebSocket feed for the `<symbol>@ticker` stream
pub struct BinanceFeed {
    symbol: String,
    ws_url: String,
    rest_url: String,
    max_reconnects: u32,
    initial_delay: Duration,
    max_delay: Duration,
}

impl BinanceFeed {
    /// Create a feed against the public Binance endpoints
    pub fn new(symbol: impl Into<String>) -> Self {
        Self::from_config(&FeedConfig {
            symbol: symbol.into(),
            ..FeedConfig::default()
        })
    }

    pub fn from_config(config: &FeedConfig) -> Self {
        Self {
            symbol: config.symbol.to_lowercase(),
            ws_url: config.ws_url.trim_end_matches('/').to_string(),
            rest_url: config.rest_url.trim_end_matches('/').to_string(),
            max_reconnects: config.max_reconnect_attempts,
            initial_delay: Duration::from_millis(config.initial_reconnect_delay_ms),
            max_delay: Duration::from_millis(config.max_reconnect_delay_ms),
        }
    }

    fn build_ws_url(&self) -> String {
        format!("{}/{}@ticker", self.ws_url, self.symbol)
    }

    fn build_klines_url(&self, limit: usize) -> String {
        format!(
            "{}/api/v3/klines?symbol={}&interval=1m&limit={}",
            self.rest_url,
            self.symbol.to_uppercase(),
            limit
        )
    }

    /// Parse a ticker message into a sample
    fn parse_message(msg: &str) -> Option<PriceSample> {
        let ticker: BinanceTickerMessage = serde_json::from_str(msg).ok()?;

        if ticker.event_type != "24hrTicker" {
            return None;
        }

        let close = Decimal::from_str(&ticker.close).ok()?;

        Some(PriceSample {
            symbol: ticker.symbol,
            price: close,
            timestamp: Utc::now(),
            exchange_ts: Utc.timestamp_millis_opt(ticker.event_time).single()?,
            open: Decimal::from_str(&ticker.open).ok()?,
            high: Decimal::from_str(&ticker.high).ok()?,
            low: Decimal::from_str(&ticker.low).ok()?,
            close,
            volume: Decimal::from_str(&ticker.volume).ok()?,
        })
    }

    /// Parse a `/api/v3/klines` response body
    ///
    /// Each kline is `[openTime, open, high, low, close, volume, closeTime, ...]`.
    fn parse_klines(body: &str) -> anyhow::Result<Vec<Candle>> {
        let rows: Vec<Vec<serde_json::Value>> = serde_json::from_str(body)?;
        let mut candles = Vec::with_capacity(rows.len());

        for row in rows {
            if row.len() < 6 {
                anyhow::bail!("kline row has {} fields, expected at least 6", row.len());
            }
            let time = row[0]
                .as_i64()
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
                .ok_or_else(|| anyhow::anyhow!("invalid kline open time: {}", row[0]))?;
            let field = |i: usize| -> anyhow::Result<Decimal> {
                let raw = row[i]
                    .as_str()
                    .ok_or_else(|| anyhow::anyhow!("kline field {} is not a string", i))?;
                Ok(Decimal::from_str(raw)?)
            };

            candles.push(Candle {
                time,
                open: field(1)?,
                high: field(2)?,
                low: field(3)?,
                close: field(4)?,
                volume: field(5)?,
            });
        }

        candles.sort_by_key(|c| c.time);
        Ok(candles)
    }

    /// Fetch the most recent one-minute klines
    pub async fn fetch_history(&self, limit: usize) -> anyhow::Result<Vec<Candle>> {
        let url = self.build_klines_url(limit);
        tracing::info!(symbol = %self.symbol, limit, "Fetching kline history");

        let body = reqwest::Client::new()
            .get(&url)
            .timeout(Duration::from_secs(10))
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        Self::parse_klines(&body)
    }

    async fn run_message_loop(
        mut ws_rx: mpsc::Receiver<WsMessage>,
        sample_tx: mpsc::Sender<PriceSample>,
    ) {
        while let Some(msg) = ws_rx.recv().await {
            match msg {
                WsMessage::Text(text) => match Self::parse_message(&text) {
                    Some(sample) => {
                        if sample_tx.send(sample).await.is_err() {
                            tracing::debug!("Sample receiver dropped, stopping feed");
                            break;
                        }
                    }
                    None => tracing::debug!("Ignoring unparseable ticker message"),
                },
                WsMessage::Connected => {
                    tracing::info!("Binance feed connected");
                }
                WsMessage::Reconnecting { attempt, delay } => {
                    increment(CounterMetric::FeedReconnects);
                    tracing::warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Binance feed reconnecting"
                    );
                }
                WsMessage::Exhausted { attempts } => {
                    tracing::error!(attempts, "Binance feed gave up reconnecting");
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl SampleSource for BinanceFeed {
    async fn subscribe(&self) -> anyhow::Result<mpsc::Receiver<PriceSample>> {
        let (sample_tx, sample_rx) = mpsc::channel(1024);

        tracing::info!(symbol = %self.symbol, "Subscribing to Binance ticker");

        let config = WsConfig::new(self.build_ws_url())
            .max_reconnects(self.max_reconnects)
            .initial_delay(self.initial_delay)
            .max_delay(self.max_delay)
            .ping_interval(Duration::from_secs(30));

        let ws_rx = WsClient::new(config).connect();

        tokio::spawn(async move {
            Self::run_message_loop(ws_rx, sample_tx).await;
        });

        Ok(sample_rx)
    }

    fn describe(&self) -> String {
        format!("binance:{}", self.symbol)
    }
}
