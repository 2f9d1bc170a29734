//! File-backed ledger
//!
//! Three header-first delimited files under the data directory. Every
//! read and write holds the per-file lock and runs on `tokio::fs`;
//! rewrites go through a temp file and rename.

use super::codec::{decode_rows, encode_rows};
use super::lock::{FileLock, LockPolicy};
use super::records::{LedgerRow, PlayerRecord, RoundOutcomeRecord, SessionRecord};
use super::LedgerError;
use crate::config::LedgerConfig;
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

pub const PLAYERS_FILE: &str = "players.csv";
pub const ROUNDS_FILE: &str = "rounds.csv";
pub const SESSIONS_FILE: &str = "sessions.csv";

/// Durable player, round and session records
#[derive(Debug)]
pub struct Ledger {
    dir: PathBuf,
    players: PathBuf,
    rounds: PathBuf,
    sessions: PathBuf,
    policy: LockPolicy,
}

impl Ledger {
    /// Open the ledger in `dir`, creating missing files with headers
    ///
    /// Runs once at startup, before any async work, so it uses blocking I/O.
    pub fn open(dir: impl Into<PathBuf>, policy: LockPolicy) -> Result<Self, LedgerError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        let ledger = Self {
            players: dir.join(PLAYERS_FILE),
            rounds: dir.join(ROUNDS_FILE),
            sessions: dir.join(SESSIONS_FILE),
            dir,
            policy,
        };
        ensure_file::<PlayerRecord>(&ledger.players)?;
        ensure_file::<RoundOutcomeRecord>(&ledger.rounds)?;
        ensure_file::<SessionRecord>(&ledger.sessions)?;

        tracing::debug!(dir = %ledger.dir.display(), "Ledger opened");
        Ok(ledger)
    }

    pub fn from_config(config: &LedgerConfig) -> Result<Self, LedgerError> {
        Self::open(&config.data_dir, LockPolicy::from_config(config))
    }

    pub fn data_dir(&self) -> &Path {
        &self.dir
    }

    /// Persisted record for `wallet`, if any
    pub async fn player(&self, wallet: &str) -> Result<Option<PlayerRecord>, LedgerError> {
        let _lock = FileLock::acquire(&self.players, &self.policy).await?;
        let players: Vec<PlayerRecord> = read_rows(&self.players).await?;
        Ok(players.into_iter().find(|p| p.wallet == wallet))
    }

    /// Players by points, highest first
    pub async fn top_players(&self, limit: usize) -> Result<Vec<PlayerRecord>, LedgerError> {
        let _lock = FileLock::acquire(&self.players, &self.policy).await?;
        let mut players: Vec<PlayerRecord> = read_rows(&self.players).await?;
        players.sort_by(|a, b| b.points.cmp(&a.points));
        players.truncate(limit);
        Ok(players)
    }

    /// Set the absolute point balance for `wallet`, inserting if new
    pub async fn upsert_player_points(&self, wallet: &str, points: u64) -> Result<(), LedgerError> {
        self.update_player(wallet, |p| p.points = points).await
    }

    pub async fn set_telegram_handle(&self, wallet: &str, handle: &str) -> Result<(), LedgerError> {
        let handle = handle.trim_start_matches('@').to_string();
        self.update_player(wallet, move |p| p.telegram_handle = Some(handle))
            .await
    }

    async fn update_player(
        &self,
        wallet: &str,
        update: impl FnOnce(&mut PlayerRecord),
    ) -> Result<(), LedgerError> {
        let _lock = FileLock::acquire(&self.players, &self.policy).await?;
        let mut players: Vec<PlayerRecord> = read_rows(&self.players).await?;

        match players.iter_mut().find(|p| p.wallet == wallet) {
            Some(player) => update(player),
            None => {
                let mut player = PlayerRecord {
                    wallet: wallet.to_string(),
                    points: 0,
                    telegram_handle: None,
                };
                update(&mut player);
                players.push(player);
            }
        }

        rewrite_rows(&self.players, &players).await
    }

    pub async fn append_round(&self, record: &RoundOutcomeRecord) -> Result<(), LedgerError> {
        let _lock = FileLock::acquire(&self.rounds, &self.policy).await?;
        append_rows(&self.rounds, std::slice::from_ref(record)).await
    }

    pub async fn rounds(&self) -> Result<Vec<RoundOutcomeRecord>, LedgerError> {
        let _lock = FileLock::acquire(&self.rounds, &self.policy).await?;
        read_rows(&self.rounds).await
    }

    pub async fn append_session(&self, record: &SessionRecord) -> Result<(), LedgerError> {
        self.append_sessions(std::slice::from_ref(record)).await
    }

    /// Append a batch of snapshots under one lock
    pub async fn append_sessions(&self, records: &[SessionRecord]) -> Result<(), LedgerError> {
        if records.is_empty() {
            return Ok(());
        }
        let _lock = FileLock::acquire(&self.sessions, &self.policy).await?;
        append_rows(&self.sessions, records).await
    }

    pub async fn sessions(&self) -> Result<Vec<SessionRecord>, LedgerError> {
        let _lock = FileLock::acquire(&self.sessions, &self.policy).await?;
        read_rows(&self.sessions).await
    }

    /// Drop session rows last seen more than `retention` before `now`
    ///
    /// Returns the number of rows removed.
    pub async fn compact_sessions(
        &self,
        retention: chrono::Duration,
        now: DateTime<Utc>,
    ) -> Result<usize, LedgerError> {
        let _lock = FileLock::acquire(&self.sessions, &self.policy).await?;
        let sessions: Vec<SessionRecord> = read_rows(&self.sessions).await?;
        let before = sessions.len();

        let cutoff = now
            .checked_sub_signed(retention)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let kept: Vec<SessionRecord> = sessions
            .into_iter()
            .filter(|s| s.last_seen > cutoff)
            .collect();
        let removed = before - kept.len();

        if removed > 0 {
            rewrite_rows(&self.sessions, &kept).await?;
        }
        tracing::info!(removed, kept = kept.len(), "Compacted session records");
        Ok(removed)
    }
}

fn ensure_file<R: LedgerRow>(path: &Path) -> Result<(), LedgerError> {
    let empty = match std::fs::metadata(path) {
        Ok(meta) => meta.len() == 0,
        Err(e) if e.kind() == ErrorKind::NotFound => true,
        Err(e) => return Err(e.into()),
    };
    if empty {
        // header names are plain identifiers, never quoted
        std::fs::write(path, format!("{}\n", R::HEADER.join(",")))?;
    }
    Ok(())
}

async fn read_rows<R: LedgerRow>(path: &Path) -> Result<Vec<R>, LedgerError> {
    let file = match fs::File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    decode_rows(file, path).await
}

async fn append_rows<R: LedgerRow>(path: &Path, rows: &[R]) -> Result<(), LedgerError> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    let needs_header = file.metadata().await?.len() == 0;
    let buf = encode_rows(rows, needs_header).await?;

    file.write_all(&buf).await?;
    file.flush().await?;
    file.sync_data().await?;
    Ok(())
}

async fn rewrite_rows<R: LedgerRow>(path: &Path, rows: &[R]) -> Result<(), LedgerError> {
    let buf = encode_rows(rows, true).await?;

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);

    let mut file = fs::File::create(&tmp).await?;
    file.write_all(&buf).await?;
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    fs::rename(&tmp, path).await?;
    Ok(())
}
