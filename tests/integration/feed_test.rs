//! Integration tests for the price feed

use predictor_engine::config::{FeedConfig, FeedSourceKind};
use predictor_engine::feed::{FeedEvent, FeedMode, PriceFeed, PriceSource};
use rust_decimal_macros::dec;
use std::time::Duration;

#[tokio::test]
async fn test_synthetic_source_produces_prices_above_floor() {
    let config = FeedConfig {
        source: FeedSourceKind::Synthetic,
        synthetic_interval_ms: 5,
        synthetic_start_price: dec!(10200),
        synthetic_floor: dec!(10000),
        ..FeedConfig::default()
    };
    let feed = PriceFeed::new("BTCUSDT", 20);
    let mut rx = feed.subscribe();
    let task = feed.start(&config);

    let mut prices = Vec::new();
    while prices.len() < 30 {
        if let Ok(FeedEvent::Sample(sample)) = rx.recv().await {
            prices.push(sample.price);
        }
    }
    task.abort();

    assert_eq!(feed.mode(), FeedMode::Synthetic);
    assert!(prices.iter().all(|p| *p >= dec!(10000)));
    assert_eq!(feed.history().len(), 20);
    assert!(feed.current_price().is_some());
}

#[tokio::test]
async fn test_unreachable_live_feed_falls_back_to_synthetic() {
    let config = FeedConfig {
        source: FeedSourceKind::Binance,
        ws_url: "ws://127.0.0.1:1".to_string(),
        max_reconnect_attempts: 1,
        initial_reconnect_delay_ms: 5,
        max_reconnect_delay_ms: 10,
        seed_history: false,
        synthetic_interval_ms: 5,
        synthetic_start_price: dec!(42000),
        ..FeedConfig::default()
    };
    let feed = PriceFeed::new("BTCUSDT", 10);
    let task = feed.start(&config);

    let price = feed.wait_for_price(Duration::from_secs(10)).await;
    task.abort();

    let price = price.expect("fallback should produce a price");
    assert_eq!(feed.mode(), FeedMode::Synthetic);
    // first synthetic step stays within one step of the start price
    assert!((price - dec!(42000)).abs() <= dec!(500));
}
