//! Ledger write-behind
//!
//! The round engine queues writes on an unbounded channel and never
//! awaits them. A single writer task drains the queue against the
//! [`Ledger`].

use super::{Ledger, LedgerError, RoundOutcomeRecord, SessionRecord};
use crate::telemetry::{
    increment, record_latency, set_gauge, CounterMetric, GaugeMetric, LatencyMetric,
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// A queued persistence request
#[derive(Debug, Clone)]
pub enum LedgerWrite {
    /// Absolute balance for a linked wallet
    PlayerPoints { wallet: String, points: u64 },
    RoundOutcome(RoundOutcomeRecord),
    SessionSnapshot(Vec<SessionRecord>),
}

impl LedgerWrite {
    fn kind(&self) -> &'static str {
        match self {
            LedgerWrite::PlayerPoints { .. } => "player_points",
            LedgerWrite::RoundOutcome(_) => "round_outcome",
            LedgerWrite::SessionSnapshot(_) => "session_snapshot",
        }
    }
}

enum OutboxMessage {
    Write(LedgerWrite),
    Flush(oneshot::Sender<()>),
}

/// Writer statistics
#[derive(Debug, Default, Clone)]
pub struct WriterStats {
    pub queued: u64,
    pub applied: u64,
    pub failed: u64,
    pub last_error: Option<String>,
    pub last_write: Option<DateTime<Utc>>,
}

impl WriterStats {
    pub fn pending(&self) -> u64 {
        self.queued.saturating_sub(self.applied + self.failed)
    }
}

/// Sending side of the writer queue; clones share the queue
#[derive(Clone)]
pub struct LedgerOutbox {
    tx: mpsc::UnboundedSender<OutboxMessage>,
    stats: Arc<RwLock<WriterStats>>,
}

impl LedgerOutbox {
    /// Queue a write without waiting for it
    pub fn push(&self, write: LedgerWrite) -> Result<(), LedgerError> {
        self.tx
            .send(OutboxMessage::Write(write))
            .map_err(|_| LedgerError::WriterClosed)?;

        let pending = {
            let mut stats = self.stats.write();
            stats.queued += 1;
            stats.pending()
        };
        set_gauge(GaugeMetric::OutboxDepth, pending as f64);
        Ok(())
    }

    /// Resolve once every write queued before this call has been applied
    pub async fn flush(&self) -> Result<(), LedgerError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(OutboxMessage::Flush(done_tx))
            .map_err(|_| LedgerError::WriterClosed)?;
        done_rx.await.map_err(|_| LedgerError::WriterClosed)
    }

    pub fn stats(&self) -> WriterStats {
        self.stats.read().clone()
    }
}

/// Background writer
pub struct LedgerWriter;

impl LedgerWriter {
    /// Spawn the writer task
    ///
    /// The task exits once every [`LedgerOutbox`] clone is dropped and
    /// the queue is drained.
    pub fn spawn(ledger: Arc<Ledger>) -> (LedgerOutbox, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let stats = Arc::new(RwLock::new(WriterStats::default()));

        let writer_stats = stats.clone();
        let handle = tokio::spawn(async move {
            Self::run(rx, ledger, writer_stats).await;
        });

        (LedgerOutbox { tx, stats }, handle)
    }

    async fn run(
        mut rx: mpsc::UnboundedReceiver<OutboxMessage>,
        ledger: Arc<Ledger>,
        stats: Arc<RwLock<WriterStats>>,
    ) {
        while let Some(message) = rx.recv().await {
            match message {
                OutboxMessage::Write(write) => Self::apply(&ledger, write, &stats).await,
                OutboxMessage::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }
        tracing::info!("Ledger writer shutting down");
    }

    async fn apply(ledger: &Ledger, write: LedgerWrite, stats: &RwLock<WriterStats>) {
        let kind = write.kind();
        let started = Instant::now();

        let result = match &write {
            LedgerWrite::PlayerPoints { wallet, points } => {
                ledger.upsert_player_points(wallet, *points).await
            }
            LedgerWrite::RoundOutcome(record) => ledger.append_round(record).await,
            LedgerWrite::SessionSnapshot(records) => ledger.append_sessions(records).await,
        };
        record_latency(LatencyMetric::LedgerWrite, started.elapsed());

        let pending = {
            let mut s = stats.write();
            match &result {
                Ok(()) => {
                    s.applied += 1;
                    s.last_write = Some(Utc::now());
                }
                Err(e) => {
                    s.failed += 1;
                    s.last_error = Some(e.to_string());
                }
            }
            s.pending()
        };
        set_gauge(GaugeMetric::OutboxDepth, pending as f64);

        match result {
            Ok(()) => {
                increment(CounterMetric::LedgerWrites);
                tracing::debug!(kind, "Ledger write applied");
            }
            Err(e) => {
                increment(CounterMetric::LedgerWriteFailures);
                tracing::error!(kind, error = %e, "Ledger write failed");
            }
        }
    }
}
