//! In-memory session registry

use super::{LinkOutcome, Session, SessionError, SessionId};
use crate::ledger::SessionRecord;
use crate::telemetry::{increment_by, set_gauge, CounterMetric, GaugeMetric};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Default)]
struct Registry {
    sessions: HashMap<SessionId, Session>,
    wallets: HashMap<String, SessionId>,
}

impl Registry {
    /// Live session mapped to `wallet`
    fn session_for_wallet(&self, wallet: &str) -> Option<SessionId> {
        self.wallets
            .get(wallet)
            .copied()
            .filter(|id| self.sessions.contains_key(id))
    }

    fn release_wallet(&mut self, id: &SessionId, wallet: &str) {
        if self.wallets.get(wallet) == Some(id) {
            self.wallets.remove(wallet);
        }
    }
}

/// Participants by session id, with a wallet index
///
/// All mutations happen under one lock, so a guest-to-wallet merge is
/// never observed half done.
pub struct SessionRegistry {
    inner: Mutex<Registry>,
    telegram_prompt_after: u32,
}

impl SessionRegistry {
    pub fn new(telegram_prompt_after: u32) -> Self {
        Self {
            inner: Mutex::new(Registry::default()),
            telegram_prompt_after,
        }
    }

    /// Register a fresh guest with zero points
    pub fn create_guest(&self) -> Session {
        let session = Session::guest(Utc::now());
        let count = {
            let mut inner = self.inner.lock();
            inner.sessions.insert(session.id, session.clone());
            inner.sessions.len()
        };
        set_gauge(GaugeMetric::ActiveSessions, count as f64);
        tracing::debug!(session = %session.id, "Guest session created");
        session
    }

    /// Attach `wallet` to a session
    ///
    /// When another live session already owns the wallet, the guest's
    /// points are added to it and the guest is removed. A session that
    /// already holds the wallet is left as is. Otherwise the session is
    /// promoted in place.
    pub fn link_wallet(&self, id: &SessionId, wallet: &str) -> Result<LinkOutcome, SessionError> {
        let wallet = wallet.trim();
        if wallet.is_empty() {
            return Err(SessionError::EmptyWallet);
        }

        let now = Utc::now();
        let mut inner = self.inner.lock();
        if !inner.sessions.contains_key(id) {
            return Err(SessionError::UnknownSession(*id));
        }

        match inner.session_for_wallet(wallet) {
            Some(existing_id) if existing_id != *id => {
                let guest = inner
                    .sessions
                    .remove(id)
                    .ok_or(SessionError::UnknownSession(*id))?;
                if let Some(previous) = guest.wallet.as_deref() {
                    inner.release_wallet(id, previous);
                }

                let existing = inner
                    .sessions
                    .get_mut(&existing_id)
                    .ok_or(SessionError::UnknownSession(existing_id))?;
                existing.points += guest.points;
                existing.last_seen = now;
                let session = existing.clone();

                tracing::info!(
                    guest = %id,
                    session = %existing_id,
                    absorbed_points = guest.points,
                    total = session.points,
                    "Guest merged into wallet session"
                );
                Ok(LinkOutcome::Merged {
                    session,
                    absorbed: *id,
                    absorbed_points: guest.points,
                })
            }
            Some(_) => {
                let session = inner
                    .sessions
                    .get_mut(id)
                    .ok_or(SessionError::UnknownSession(*id))?;
                session.last_seen = now;
                Ok(LinkOutcome::AlreadyLinked(session.clone()))
            }
            None => {
                let previous = inner.sessions.get(id).and_then(|s| s.wallet.clone());
                if let Some(previous) = previous.filter(|p| p != wallet) {
                    inner.release_wallet(id, &previous);
                }
                inner.wallets.insert(wallet.to_string(), *id);

                let session = inner
                    .sessions
                    .get_mut(id)
                    .ok_or(SessionError::UnknownSession(*id))?;
                session.wallet = Some(wallet.to_string());
                session.last_seen = now;

                tracing::info!(session = %id, wallet, "Wallet linked");
                Ok(LinkOutcome::Promoted(session.clone()))
            }
        }
    }

    /// Add to a balance, returning the new total
    pub fn add_points(&self, id: &SessionId, delta: u64) -> Result<u64, SessionError> {
        let mut inner = self.inner.lock();
        let session = inner
            .sessions
            .get_mut(id)
            .ok_or(SessionError::UnknownSession(*id))?;
        session.points += delta;
        Ok(session.points)
    }

    /// Count a settled round for the session
    pub fn record_round(&self, id: &SessionId) -> Option<u32> {
        let mut inner = self.inner.lock();
        let session = inner.sessions.get_mut(id)?;
        session.rounds_played += 1;
        session.last_seen = Utc::now();
        Some(session.rounds_played)
    }

    /// Refresh `last_seen`; false if the session is unknown
    pub fn touch(&self, id: &SessionId) -> bool {
        let mut inner = self.inner.lock();
        match inner.sessions.get_mut(id) {
            Some(session) => {
                session.last_seen = Utc::now();
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &SessionId) -> Option<Session> {
        self.inner.lock().sessions.get(id).cloned()
    }

    pub fn get_by_wallet(&self, wallet: &str) -> Option<Session> {
        let inner = self.inner.lock();
        let id = inner.session_for_wallet(wallet)?;
        inner.sessions.get(&id).cloned()
    }

    pub fn points(&self, id: &SessionId) -> Option<u64> {
        self.inner.lock().sessions.get(id).map(|s| s.points)
    }

    pub fn wallet_of(&self, id: &SessionId) -> Option<String> {
        self.inner
            .lock()
            .sessions
            .get(id)
            .and_then(|s| s.wallet.clone())
    }

    /// Linked sessions past the round threshold are asked for a handle
    pub fn should_prompt_telegram(&self, id: &SessionId) -> bool {
        self.inner.lock().sessions.get(id).is_some_and(|s| {
            !s.is_guest() && s.rounds_played >= self.telegram_prompt_after
        })
    }

    /// Remove sessions idle longer than `max_age`
    pub fn sweep_idle(&self, max_age: Duration) -> usize {
        self.sweep_idle_at(Utc::now(), max_age)
    }

    /// [`SessionRegistry::sweep_idle`] against an explicit clock
    pub fn sweep_idle_at(&self, now: DateTime<Utc>, max_age: Duration) -> usize {
        let cutoff = now
            .checked_sub_signed(max_age)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let (removed, remaining) = {
            let mut inner = self.inner.lock();
            let stale: Vec<SessionId> = inner
                .sessions
                .values()
                .filter(|s| s.last_seen < cutoff)
                .map(|s| s.id)
                .collect();

            for id in &stale {
                if let Some(session) = inner.sessions.remove(id) {
                    if let Some(wallet) = session.wallet.as_deref() {
                        inner.release_wallet(id, wallet);
                    }
                }
            }
            (stale.len(), inner.sessions.len())
        };

        if removed > 0 {
            increment_by(CounterMetric::SessionsSwept, removed as u64);
            tracing::info!(removed, remaining, "Swept idle sessions");
        }
        set_gauge(GaugeMetric::ActiveSessions, remaining as f64);
        removed
    }

    /// Ledger snapshot of every live session
    pub fn snapshot(&self) -> Vec<SessionRecord> {
        self.inner
            .lock()
            .sessions
            .values()
            .map(Session::to_record)
            .collect()
    }

    pub fn all(&self) -> Vec<Session> {
        self.inner.lock().sessions.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    pub(crate) fn set_last_seen(&self, id: &SessionId, at: DateTime<Utc>) {
        if let Some(session) = self.inner.lock().sessions.get_mut(id) {
            session.last_seen = at;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_guest_starts_at_zero() {
        let registry = SessionRegistry::new(10);
        let guest = registry.create_guest();
        assert!(guest.is_guest());
        assert_eq!(guest.points, 0);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.points(&guest.id), Some(0));
    }

    #[test]
    fn test_add_points_unknown_session() {
        let registry = SessionRegistry::new(10);
        let missing = SessionId::new();
        assert!(matches!(
            registry.add_points(&missing, 10),
            Err(SessionError::UnknownSession(id)) if id == missing
        ));
    }

    #[test]
    fn test_link_promotes_in_place() {
        let registry = SessionRegistry::new(10);
        let guest = registry.create_guest();
        registry.add_points(&guest.id, 20).unwrap();

        let outcome = registry.link_wallet(&guest.id, "0xabc").unwrap();
        match &outcome {
            LinkOutcome::Promoted(s) => {
                assert_eq!(s.id, guest.id);
                assert_eq!(s.points, 20);
                assert!(!s.is_guest());
            }
            other => panic!("expected promotion, got {other:?}"),
        }
        assert_eq!(registry.get_by_wallet("0xabc").unwrap().id, guest.id);
    }

    #[test]
    fn test_link_merges_into_existing_wallet_session() {
        let registry = SessionRegistry::new(10);
        let owner = registry.create_guest();
        registry.link_wallet(&owner.id, "0xabc").unwrap();
        registry.add_points(&owner.id, 40).unwrap();

        let guest = registry.create_guest();
        registry.add_points(&guest.id, 20).unwrap();

        let outcome = registry.link_wallet(&guest.id, "0xabc").unwrap();
        match outcome {
            LinkOutcome::Merged {
                session,
                absorbed,
                absorbed_points,
            } => {
                assert_eq!(session.id, owner.id);
                assert_eq!(session.points, 60);
                assert_eq!(absorbed, guest.id);
                assert_eq!(absorbed_points, 20);
            }
            other => panic!("expected merge, got {other:?}"),
        }

        assert!(registry.get(&guest.id).is_none());
        assert_eq!(registry.points(&owner.id), Some(60));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_relinking_same_wallet_is_idempotent() {
        let registry = SessionRegistry::new(10);
        let guest = registry.create_guest();
        registry.link_wallet(&guest.id, "0xabc").unwrap();
        registry.add_points(&guest.id, 15).unwrap();
        let outcome = registry.link_wallet(&guest.id, "0xabc").unwrap();
        assert!(matches!(outcome, LinkOutcome::AlreadyLinked(_)));
        assert_eq!(outcome.session().points, 15);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get_by_wallet("0xabc").unwrap().id, guest.id);
    }

    #[test]
    fn test_link_rejects_unknown_and_empty() {
        let registry = SessionRegistry::new(10);
        assert!(matches!(
            registry.link_wallet(&SessionId::new(), "0xabc"),
            Err(SessionError::UnknownSession(_))
        ));
        let guest = registry.create_guest();
        assert!(matches!(
            registry.link_wallet(&guest.id, "  "),
            Err(SessionError::EmptyWallet)
        ));
    }

    #[test]
    fn test_sweep_removes_idle_and_releases_wallet() {
        let registry = SessionRegistry::new(10);
        let now = Utc::now();

        let idle = registry.create_guest();
        registry.link_wallet(&idle.id, "0xabc").unwrap();
        registry.set_last_seen(&idle.id, now - Duration::hours(25));

        let active = registry.create_guest();

        let removed = registry.sweep_idle_at(now, Duration::hours(24));
        assert_eq!(removed, 1);
        assert!(registry.get(&idle.id).is_none());
        assert!(registry.get(&active.id).is_some());
        assert!(registry.get_by_wallet("0xabc").is_none());

        // wallet can be linked afresh
        let outcome = registry.link_wallet(&active.id, "0xabc").unwrap();
        assert!(matches!(outcome, LinkOutcome::Promoted(_)));
    }

    #[test]
    fn test_telegram_prompt_needs_wallet_and_rounds() {
        let registry = SessionRegistry::new(2);
        let session = registry.create_guest();

        registry.record_round(&session.id);
        registry.record_round(&session.id);
        assert!(!registry.should_prompt_telegram(&session.id));

        registry.link_wallet(&session.id, "0xabc").unwrap();
        assert!(registry.should_prompt_telegram(&session.id));
    }

    #[test]
    fn test_snapshot_reflects_sessions() {
        let registry = SessionRegistry::new(10);
        let guest = registry.create_guest();
        registry.add_points(&guest.id, 7).unwrap();

        let records = registry.snapshot();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].session_id, guest.id.to_string());
        assert_eq!(records[0].points, 7);
        assert!(records[0].is_guest);
    }
}
