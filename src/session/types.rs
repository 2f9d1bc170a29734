//! Session types

use crate::ledger::{LedgerError, SessionRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Opaque participant identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// A participant, guest until a wallet is linked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub points: u64,
    pub wallet: Option<String>,
    pub connected_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub rounds_played: u32,
}

impl Session {
    pub(crate) fn guest(now: DateTime<Utc>) -> Self {
        Self {
            id: SessionId::new(),
            points: 0,
            wallet: None,
            connected_at: now,
            last_seen: now,
            rounds_played: 0,
        }
    }

    pub fn is_guest(&self) -> bool {
        self.wallet.is_none()
    }

    /// Ledger identity: wallet when linked, session id otherwise
    pub fn identity(&self) -> String {
        self.wallet.clone().unwrap_or_else(|| self.id.to_string())
    }

    pub fn to_record(&self) -> SessionRecord {
        SessionRecord {
            session_id: self.id.to_string(),
            points: self.points,
            created_at: self.connected_at,
            last_seen: self.last_seen,
            is_guest: self.is_guest(),
        }
    }
}

/// Result of linking a wallet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    /// The session itself now carries the wallet
    Promoted(Session),
    /// The session already carried this wallet; nothing changed
    AlreadyLinked(Session),
    /// The wallet already had a live session; the guest was folded into it
    Merged {
        session: Session,
        absorbed: SessionId,
        absorbed_points: u64,
    },
}

impl LinkOutcome {
    /// The surviving session
    pub fn session(&self) -> &Session {
        match self {
            LinkOutcome::Promoted(session)
            | LinkOutcome::AlreadyLinked(session)
            | LinkOutcome::Merged { session, .. } => session,
        }
    }

    pub fn into_session(self) -> Session {
        match self {
            LinkOutcome::Promoted(session)
            | LinkOutcome::AlreadyLinked(session)
            | LinkOutcome::Merged { session, .. } => session,
        }
    }
}

/// Session errors
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("unknown session {0}")]
    UnknownSession(SessionId),

    #[error("wallet address must not be empty")]
    EmptyWallet,

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
