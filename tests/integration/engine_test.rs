//! End-to-end round tests: feed, engine, sessions and ledger together

use chrono::Utc;
use predictor_engine::config::RoundConfig;
use predictor_engine::feed::{PriceFeed, PriceSample, PriceSource};
use predictor_engine::ledger::{Ledger, LedgerWriter, LockPolicy};
use predictor_engine::round::{
    ChoiceRejection, Direction, EngineError, RoundEngine, RoundEvent, RoundResult,
};
use predictor_engine::session::SessionRegistry;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn fast_rounds() -> RoundConfig {
    RoundConfig {
        duration_ms: 200,
        anti_cheat_buffer_ms: 50,
        points_per_win: 10,
        inter_round_pause_ms: 20,
        startup_price_timeout_ms: 1_000,
    }
}

fn tick(feed: &PriceFeed, price: Decimal) {
    feed.ingest(PriceSample::flat("BTCUSDT", price, Utc::now()));
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<RoundEvent>) -> RoundEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("event within timeout")
        .expect("engine alive")
}

#[tokio::test]
async fn test_engine_refuses_to_open_before_first_price() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = Arc::new(Ledger::open(dir.path(), LockPolicy::default()).unwrap());
    let (outbox, _writer) = LedgerWriter::spawn(ledger);
    let feed = PriceFeed::new("BTCUSDT", 10);
    let prices: Arc<dyn PriceSource> = Arc::new(feed.clone());

    let engine = RoundEngine::new(
        fast_rounds(),
        prices,
        Arc::new(SessionRegistry::new(10)),
        outbox,
    )
    .unwrap();

    assert!(matches!(
        engine.start().await,
        Err(EngineError::NoInitialPrice)
    ));

    tick(&feed, dec!(50000));
    assert!(engine.start().await.is_ok());
    engine.stop();
}

#[tokio::test]
async fn test_full_round_cycle_with_late_choice_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = Arc::new(Ledger::open(dir.path(), LockPolicy::default()).unwrap());
    let (outbox, _writer) = LedgerWriter::spawn(ledger.clone());
    let sessions = Arc::new(SessionRegistry::new(10));
    let feed = PriceFeed::new("BTCUSDT", 10);
    tick(&feed, dec!(50000));

    let prices: Arc<dyn PriceSource> = Arc::new(feed.clone());
    let engine = RoundEngine::new(fast_rounds(), prices, sessions.clone(), outbox.clone()).unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    engine.subscribe(Arc::new(tx));

    let alice = sessions.create_guest();
    let bob = sessions.create_guest();
    sessions.link_wallet(&bob.id, "0xb0b").unwrap();
    let late = sessions.create_guest();

    let started = engine.start().await.unwrap();
    assert!(matches!(next_event(&mut rx).await, RoundEvent::Started(_)));

    engine.submit_choice(alice.id, Direction::Up, None).await.unwrap();
    engine
        .submit_choice(bob.id, Direction::Down, Some(Utc::now()))
        .await
        .unwrap();

    tick(&feed, dec!(50100));

    match next_event(&mut rx).await {
        RoundEvent::BettingClosed { round_id } => assert_eq!(round_id, started.round_id),
        other => panic!("expected betting close, got {other:?}"),
    }
    assert_eq!(
        engine.submit_choice(late.id, Direction::Up, None).await,
        Err(ChoiceRejection::BettingClosed)
    );

    let mut results = Vec::new();
    loop {
        match next_event(&mut rx).await {
            RoundEvent::Result(notice) => results.push(notice),
            RoundEvent::Finished(finished) => {
                assert_eq!(finished.round_id, started.round_id);
                assert_eq!(finished.participants, 2);
                assert_eq!(finished.close_price, dec!(50100));
                break;
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    let alice_result = results.iter().find(|n| n.identity == alice.id).unwrap();
    assert_eq!(alice_result.result, RoundResult::Win);
    assert_eq!(alice_result.points_delta, 10);
    let bob_result = results.iter().find(|n| n.identity == bob.id).unwrap();
    assert_eq!(bob_result.result, RoundResult::Lose);
    assert!(results.iter().all(|n| n.identity != late.id));

    // next round opens at the then-current price
    match next_event(&mut rx).await {
        RoundEvent::Started(next) => {
            assert_ne!(next.round_id, started.round_id);
            assert_eq!(next.open_price, dec!(50100));
        }
        other => panic!("expected next round, got {other:?}"),
    }
    engine.stop();

    assert_eq!(sessions.points(&alice.id), Some(10));
    assert_eq!(sessions.points(&bob.id), Some(0));

    outbox.flush().await.unwrap();
    let rounds = ledger.rounds().await.unwrap();
    assert_eq!(rounds.len(), 2);
    let bob_row = rounds.iter().find(|r| r.identity == "0xb0b").unwrap();
    assert_eq!(bob_row.direction, Direction::Down);
    assert_eq!(bob_row.open_price, dec!(50000));
    assert_eq!(bob_row.close_price, dec!(50100));
    assert!(bob_row.latency_ms >= 0);
    assert_eq!(ledger.player("0xb0b").await.unwrap().unwrap().points, 0);
}

#[tokio::test]
async fn test_stopped_engine_settles_in_flight_round_then_idles() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = Arc::new(Ledger::open(dir.path(), LockPolicy::default()).unwrap());
    let (outbox, _writer) = LedgerWriter::spawn(ledger);
    let feed = PriceFeed::new("BTCUSDT", 10);
    tick(&feed, dec!(100));

    let prices: Arc<dyn PriceSource> = Arc::new(feed.clone());
    let engine = RoundEngine::new(
        fast_rounds(),
        prices,
        Arc::new(SessionRegistry::new(10)),
        outbox,
    )
    .unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    engine.subscribe(Arc::new(tx));

    engine.start().await.unwrap();
    engine.stop();

    let mut finished = false;
    while !finished {
        finished = matches!(next_event(&mut rx).await, RoundEvent::Finished(_));
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(rx.try_recv().is_err());
    assert!(engine.current_round().await.is_none());
}
