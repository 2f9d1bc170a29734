//! Integration tests for sessions and wallet linking

use predictor_engine::ledger::{Ledger, LockPolicy};
use predictor_engine::session::{connect_wallet, LinkOutcome, SessionRegistry};

#[tokio::test]
async fn test_returning_wallet_recovers_balance_after_sweep() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = Ledger::open(dir.path(), LockPolicy::default()).unwrap();
    let registry = SessionRegistry::new(10);

    let first = registry.create_guest();
    connect_wallet(&registry, &ledger, &first.id, "0xabc")
        .await
        .unwrap();
    let total = registry.add_points(&first.id, 50).unwrap();
    ledger.upsert_player_points("0xabc", total).await.unwrap();

    // everything idle is dropped
    assert_eq!(registry.sweep_idle(chrono::Duration::seconds(-1)), 1);
    assert!(registry.get_by_wallet("0xabc").is_none());

    let second = registry.create_guest();
    registry.add_points(&second.id, 10).unwrap();
    let outcome = connect_wallet(&registry, &ledger, &second.id, "0xabc")
        .await
        .unwrap();

    assert!(matches!(outcome, LinkOutcome::Promoted(_)));
    assert_eq!(outcome.session().points, 60);
    assert_eq!(registry.get_by_wallet("0xabc").unwrap().id, second.id);
}

#[tokio::test]
async fn test_concurrent_merges_conserve_points() {
    let registry = std::sync::Arc::new(SessionRegistry::new(10));
    let owner = registry.create_guest();
    registry.link_wallet(&owner.id, "0xabc").unwrap();

    let mut handles = Vec::new();
    for _ in 0..20 {
        let registry = registry.clone();
        handles.push(tokio::spawn(async move {
            let guest = registry.create_guest();
            registry.add_points(&guest.id, 5).unwrap();
            registry.link_wallet(&guest.id, "0xabc").unwrap()
        }));
    }
    for handle in handles {
        assert!(matches!(handle.await.unwrap(), LinkOutcome::Merged { .. }));
    }

    assert_eq!(registry.points(&owner.id), Some(100));
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn test_relinking_wallet_does_not_inflate_stored_balance() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = Ledger::open(dir.path(), LockPolicy::default()).unwrap();
    ledger.upsert_player_points("0xabc", 100).await.unwrap();

    let registry = SessionRegistry::new(10);
    let session = registry.create_guest();
    for _ in 0..3 {
        connect_wallet(&registry, &ledger, &session.id, "0xabc")
            .await
            .unwrap();
    }

    let total = registry.points(&session.id).unwrap();
    assert_eq!(total, 100);
    ledger.upsert_player_points("0xabc", total).await.unwrap();
    assert_eq!(ledger.player("0xabc").await.unwrap().unwrap().points, 100);
}
