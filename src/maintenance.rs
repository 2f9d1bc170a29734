//! Periodic upkeep: idle-session sweep, session snapshots, compaction

use crate::config::Config;
use crate::ledger::{Ledger, LedgerError, LedgerOutbox, LedgerWrite};
use crate::session::SessionRegistry;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    pub sweep_interval: Duration,
    pub idle_timeout: chrono::Duration,
    pub snapshot_interval: Duration,
    pub compaction_interval: Duration,
    pub session_retention: chrono::Duration,
}

impl MaintenanceConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            sweep_interval: Duration::from_secs(config.session.sweep_interval_secs.max(1)),
            idle_timeout: secs(config.session.idle_timeout_secs),
            snapshot_interval: Duration::from_secs(config.ledger.snapshot_interval_secs.max(1)),
            compaction_interval: Duration::from_secs(
                config.ledger.compaction_interval_secs.max(1),
            ),
            session_retention: secs(config.ledger.session_retention_secs),
        }
    }
}

/// Capped at ten years so clock arithmetic cannot overflow
fn secs(value: u64) -> chrono::Duration {
    const TEN_YEARS: u64 = 10 * 365 * 24 * 60 * 60;
    chrono::Duration::seconds(value.min(TEN_YEARS) as i64)
}

pub struct Maintenance {
    config: MaintenanceConfig,
    sessions: Arc<SessionRegistry>,
    ledger: Arc<Ledger>,
    outbox: LedgerOutbox,
}

impl Maintenance {
    pub fn new(
        config: MaintenanceConfig,
        sessions: Arc<SessionRegistry>,
        ledger: Arc<Ledger>,
        outbox: LedgerOutbox,
    ) -> Self {
        Self {
            config,
            sessions,
            ledger,
            outbox,
        }
    }

    /// Remove idle sessions
    pub fn sweep(&self) -> usize {
        self.sessions.sweep_idle(self.config.idle_timeout)
    }

    /// Queue a snapshot of every live session
    pub fn snapshot(&self) -> Result<usize, LedgerError> {
        let records = self.sessions.snapshot();
        let count = records.len();
        if count > 0 {
            self.outbox.push(LedgerWrite::SessionSnapshot(records))?;
        }
        Ok(count)
    }

    /// Drop session rows past retention
    pub async fn compact(&self) -> Result<usize, LedgerError> {
        self.ledger
            .compact_sessions(self.config.session_retention, Utc::now())
            .await
    }

    /// Run all three jobs on their intervals until aborted
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    async fn run(self) {
        let start = Instant::now();
        let mut sweep = interval_at(start + self.config.sweep_interval, self.config.sweep_interval);
        let mut snapshot = interval_at(
            start + self.config.snapshot_interval,
            self.config.snapshot_interval,
        );
        let mut compaction = interval_at(
            start + self.config.compaction_interval,
            self.config.compaction_interval,
        );
        for timer in [&mut sweep, &mut snapshot, &mut compaction] {
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        }

        loop {
            tokio::select! {
                _ = sweep.tick() => {
                    self.sweep();
                }
                _ = snapshot.tick() => {
                    match self.snapshot() {
                        Ok(count) => tracing::debug!(count, "Queued session snapshot"),
                        Err(e) => tracing::error!(error = %e, "Session snapshot failed"),
                    }
                }
                _ = compaction.tick() => {
                    if let Err(e) = self.compact().await {
                        tracing::error!(error = %e, "Session compaction failed");
                    }
                }
            }
        }
    }
}
