//! Integration tests for the ledger

use chrono::Utc;
use predictor_engine::config::LedgerConfig;
use predictor_engine::ledger::{
    Ledger, LedgerWrite, LedgerWriter, RoundOutcomeRecord, SessionRecord, PLAYERS_FILE,
};
use predictor_engine::round::{Direction, RoundResult};
use rust_decimal_macros::dec;
use std::sync::Arc;

fn config(dir: &std::path::Path) -> LedgerConfig {
    LedgerConfig {
        data_dir: dir.to_path_buf(),
        lock_retries: 50,
        lock_min_backoff_ms: 1,
        lock_max_backoff_ms: 10,
        ..LedgerConfig::default()
    }
}

#[tokio::test]
async fn test_concurrent_upserts_never_interleave() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = Arc::new(Ledger::from_config(&config(dir.path())).unwrap());

    let mut handles = Vec::new();
    for i in 0..16u64 {
        let ledger = ledger.clone();
        handles.push(tokio::spawn(async move {
            ledger
                .upsert_player_points(&format!("0xwallet{i}"), i * 10)
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let players = ledger.top_players(100).await.unwrap();
    assert_eq!(players.len(), 16);
    assert_eq!(players[0].points, 150);

    let raw = std::fs::read_to_string(dir.path().join(PLAYERS_FILE)).unwrap();
    assert_eq!(raw.lines().count(), 17);
}

#[tokio::test]
async fn test_two_ledgers_on_same_directory_share_locks() {
    let dir = tempfile::tempdir().unwrap();
    let a = Arc::new(Ledger::from_config(&config(dir.path())).unwrap());
    let b = Arc::new(Ledger::from_config(&config(dir.path())).unwrap());

    let record = |id: &str| RoundOutcomeRecord {
        timestamp: Utc::now(),
        round_id: id.to_string(),
        identity: "identity, with \"quotes\"\nand a newline".to_string(),
        direction: Direction::Up,
        open_price: dec!(100),
        close_price: dec!(101),
        result: RoundResult::Win,
        latency_ms: 12,
    };

    let mut handles = Vec::new();
    for i in 0..10 {
        let ledger = if i % 2 == 0 { a.clone() } else { b.clone() };
        let record = record(&format!("r{i}"));
        handles.push(tokio::spawn(async move { ledger.append_round(&record).await }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let rounds = a.rounds().await.unwrap();
    assert_eq!(rounds.len(), 10);
    assert!(rounds
        .iter()
        .all(|r| r.identity == "identity, with \"quotes\"\nand a newline"));
}

#[tokio::test]
async fn test_outbox_persists_every_write_kind() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = Arc::new(Ledger::from_config(&config(dir.path())).unwrap());
    let (outbox, writer) = LedgerWriter::spawn(ledger.clone());

    let now = Utc::now();
    outbox
        .push(LedgerWrite::PlayerPoints {
            wallet: "0xabc".to_string(),
            points: 30,
        })
        .unwrap();
    outbox
        .push(LedgerWrite::SessionSnapshot(vec![SessionRecord {
            session_id: "s1".to_string(),
            points: 30,
            created_at: now,
            last_seen: now,
            is_guest: false,
        }]))
        .unwrap();
    outbox.flush().await.unwrap();
    drop(outbox);
    writer.await.unwrap();

    assert_eq!(ledger.player("0xabc").await.unwrap().unwrap().points, 30);
    let sessions = ledger.sessions().await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].created_at.timestamp_millis(), now.timestamp_millis());
}
