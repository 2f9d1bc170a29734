//! Round state machine

use super::events::{
    RoundEvent, RoundFinished, RoundListener, RoundResultNotice, RoundStarted, Subscribers,
};
use super::settlement::settle_choice;
use super::{
    ChoiceRejection, Direction, EngineError, Round, RoundId, RoundPhase, RoundResult,
    RoundSnapshot,
};
use crate::config::RoundConfig;
use crate::feed::PriceSource;
use crate::ledger::{LedgerOutbox, LedgerWrite, RoundOutcomeRecord};
use crate::session::{SessionId, SessionRegistry};
use crate::telemetry::{
    increment, record_latency, record_outcome, CounterMetric, LatencyMetric,
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::hash_map::Entry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;
use tokio::sync::Mutex;
use tokio::time::sleep_until;

/// Runs rounds back to back
///
/// Owns the single current round. Timers hold a weak handle and carry
/// the id of the round they were armed for; a timer whose round has
/// been superseded does nothing.
pub struct RoundEngine {
    config: RoundConfig,
    duration: chrono::Duration,
    anti_cheat_buffer: chrono::Duration,
    prices: Arc<dyn PriceSource>,
    sessions: Arc<SessionRegistry>,
    outbox: LedgerOutbox,
    subscribers: RwLock<Subscribers>,
    current: Mutex<Option<Round>>,
    running: AtomicBool,
}

/// Longest accepted round or pause: one day
pub const MAX_ROUND_DURATION_MS: u64 = 24 * 60 * 60 * 1000;

impl RoundEngine {
    pub fn new(
        config: RoundConfig,
        prices: Arc<dyn PriceSource>,
        sessions: Arc<SessionRegistry>,
        outbox: LedgerOutbox,
    ) -> Result<Arc<Self>, EngineError> {
        if config.duration_ms == 0 {
            return Err(EngineError::InvalidConfig(
                "round duration must be positive".to_string(),
            ));
        }
        if config.duration_ms > MAX_ROUND_DURATION_MS {
            return Err(EngineError::InvalidConfig(format!(
                "round duration ({} ms) exceeds the {} ms ceiling",
                config.duration_ms, MAX_ROUND_DURATION_MS
            )));
        }
        if config.inter_round_pause_ms > MAX_ROUND_DURATION_MS {
            return Err(EngineError::InvalidConfig(format!(
                "inter-round pause ({} ms) exceeds the {} ms ceiling",
                config.inter_round_pause_ms, MAX_ROUND_DURATION_MS
            )));
        }
        if config.anti_cheat_buffer_ms >= config.duration_ms {
            return Err(EngineError::InvalidConfig(format!(
                "anti-cheat buffer ({} ms) must be shorter than the round ({} ms)",
                config.anti_cheat_buffer_ms, config.duration_ms
            )));
        }

        let duration = chrono::Duration::from_std(config.duration())
            .map_err(|e| EngineError::InvalidConfig(e.to_string()))?;
        let anti_cheat_buffer = chrono::Duration::from_std(config.anti_cheat_buffer())
            .map_err(|e| EngineError::InvalidConfig(e.to_string()))?;

        Ok(Arc::new(Self {
            config,
            duration,
            anti_cheat_buffer,
            prices,
            sessions,
            outbox,
            subscribers: RwLock::new(Subscribers::default()),
            current: Mutex::new(None),
            running: AtomicBool::new(false),
        }))
    }

    /// Register a listener; listeners are called in registration order
    pub fn subscribe(&self, listener: Arc<dyn RoundListener>) {
        self.subscribers.write().add(listener);
    }

    pub fn config(&self) -> &RoundConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Open the first round and keep cycling
    ///
    /// Fails with [`EngineError::NoInitialPrice`] until the feed has
    /// produced a price.
    pub async fn start(self: &Arc<Self>) -> Result<RoundStarted, EngineError> {
        self.running.store(true, Ordering::SeqCst);
        let started = self.open_round().await;
        if started.is_err() {
            self.running.store(false, Ordering::SeqCst);
        }
        started
    }

    /// Stop cycling; the round in flight still settles
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        tracing::info!("Round engine stopping");
    }

    pub async fn current_round(&self) -> Option<RoundSnapshot> {
        self.current.lock().await.as_ref().map(Round::snapshot)
    }

    /// Open a new round at the current price, replacing any previous one
    pub async fn open_round(self: &Arc<Self>) -> Result<RoundStarted, EngineError> {
        let open_price = self
            .prices
            .current_price()
            .ok_or(EngineError::NoInitialPrice)?;

        let opened = Instant::now();
        let round = Round::open(open_price, Utc::now(), self.duration, self.anti_cheat_buffer);
        let started = RoundStarted {
            round_id: round.id,
            open_price,
            open_time: round.open_time,
            close_time: round.close_time,
            betting_close_time: round.betting_close_time,
        };

        *self.current.lock().await = Some(round);
        self.arm_timers(started.round_id, opened);

        increment(CounterMetric::RoundsOpened);
        tracing::info!(
            round = %started.round_id,
            open_price = %open_price,
            betting_closes = %started.betting_close_time,
            "Round opened"
        );
        self.publish(&RoundEvent::Started(started.clone()));
        Ok(started)
    }

    fn arm_timers(self: &Arc<Self>, round_id: RoundId, opened: Instant) {
        let betting_deadline = opened + (self.config.duration() - self.config.anti_cheat_buffer());
        let close_deadline = opened + self.config.duration();

        let engine = Arc::downgrade(self);
        tokio::spawn(async move {
            sleep_until(betting_deadline.into()).await;
            if let Some(engine) = engine.upgrade() {
                engine.close_betting(round_id).await;
            }
        });

        let engine = Arc::downgrade(self);
        tokio::spawn(async move {
            sleep_until(close_deadline.into()).await;
            if let Some(engine) = engine.upgrade() {
                engine.settle_round(round_id).await;
            }
        });
    }

    /// Stop accepting choices for `round_id`
    ///
    /// Returns false, without effect, if that round is no longer open.
    pub async fn close_betting(&self, round_id: RoundId) -> bool {
        let closed = {
            let mut current = self.current.lock().await;
            match current.as_mut() {
                Some(round) if round.id == round_id && round.phase == RoundPhase::Open => {
                    round.phase = RoundPhase::BettingClosed;
                    true
                }
                _ => false,
            }
        };

        if closed {
            tracing::debug!(round = %round_id, "Betting closed");
            self.publish(&RoundEvent::BettingClosed { round_id });
        }
        closed
    }

    /// Record a choice for the current round
    ///
    /// The stored timestamp is the server receipt time; `client_ts` is
    /// kept for skew telemetry only.
    pub async fn submit_choice(
        &self,
        identity: SessionId,
        direction: Direction,
        client_ts: Option<DateTime<Utc>>,
    ) -> Result<RoundId, ChoiceRejection> {
        let received_at = Utc::now();
        let result = self
            .record_choice(identity, direction, received_at, client_ts)
            .await;

        match &result {
            Ok(round_id) => {
                increment(CounterMetric::ChoicesAccepted);
                self.sessions.touch(&identity);
                tracing::debug!(
                    round = %round_id,
                    session = %identity,
                    %direction,
                    skew_ms = client_ts.map(|ts| (received_at - ts).num_milliseconds()),
                    "Choice accepted"
                );
            }
            Err(reason) => {
                increment(CounterMetric::ChoicesRejected);
                tracing::debug!(session = %identity, %reason, "Choice rejected");
            }
        }
        result
    }

    async fn record_choice(
        &self,
        identity: SessionId,
        direction: Direction,
        received_at: DateTime<Utc>,
        client_ts: Option<DateTime<Utc>>,
    ) -> Result<RoundId, ChoiceRejection> {
        let mut current = self.current.lock().await;
        let round = current.as_mut().ok_or(ChoiceRejection::NoActiveRound)?;

        if !round.is_betting_open() || received_at >= round.betting_close_time {
            return Err(ChoiceRejection::BettingClosed);
        }

        match round.choices.entry(identity) {
            Entry::Occupied(_) => Err(ChoiceRejection::AlreadySubmitted),
            Entry::Vacant(slot) => {
                slot.insert(super::Choice {
                    direction,
                    received_at,
                    client_ts,
                });
                Ok(round.id)
            }
        }
    }

    /// Settle `round_id` against the current price
    ///
    /// A no-op returning `None` when `round_id` is not the current round
    /// or is already settling. Otherwise emits one result per choice,
    /// applies points, queues ledger writes, discards the round and
    /// schedules the next one.
    pub async fn settle_round(self: &Arc<Self>, round_id: RoundId) -> Option<RoundFinished> {
        let settle_started = Instant::now();

        let (open_price, close_price, choices) = {
            let mut current = self.current.lock().await;
            match current.as_mut() {
                Some(round) if round.id == round_id && round.is_active() => {
                    // last known price; once seeded the feed always has one
                    let close_price = self.prices.current_price().unwrap_or(round.open_price);
                    round.phase = RoundPhase::Settling;
                    round.close_price = Some(close_price);
                    (round.open_price, close_price, round.choices.clone())
                }
                _ => {
                    increment(CounterMetric::StaleSettlements);
                    tracing::debug!(round = %round_id, "Ignoring stale settlement");
                    return None;
                }
            }
        };

        let settled_at = Utc::now();
        let mut entries: Vec<_> = choices.into_iter().collect();
        entries.sort_by_key(|(identity, choice)| (choice.received_at, *identity));

        let participants = entries.len();
        let mut winners = 0;

        for (identity, choice) in entries {
            let outcome = settle_choice(
                open_price,
                close_price,
                choice.direction,
                self.config.points_per_win,
            );
            if outcome.result == RoundResult::Win {
                winners += 1;
            }

            let total_points = self.sessions.add_points(&identity, outcome.points_delta).ok();
            self.sessions.record_round(&identity);
            let wallet = self.sessions.wallet_of(&identity);
            let prompt_telegram = self.sessions.should_prompt_telegram(&identity);

            let latency = settled_at - choice.received_at;
            if let Ok(latency) = latency.to_std() {
                record_latency(LatencyMetric::Decision, latency);
            }
            record_outcome(outcome.result.as_str());

            self.publish(&RoundEvent::Result(RoundResultNotice {
                round_id,
                identity,
                direction: choice.direction,
                open_price,
                close_price,
                result: outcome.result,
                points_delta: outcome.points_delta,
                total_points,
                prompt_telegram,
            }));

            self.queue_write(LedgerWrite::RoundOutcome(RoundOutcomeRecord {
                timestamp: settled_at,
                round_id: round_id.to_string(),
                identity: wallet.clone().unwrap_or_else(|| identity.to_string()),
                direction: choice.direction,
                open_price,
                close_price,
                result: outcome.result,
                latency_ms: latency.num_milliseconds(),
            }));

            if let (Some(wallet), Some(points)) = (wallet, total_points) {
                self.queue_write(LedgerWrite::PlayerPoints { wallet, points });
            }
        }

        {
            let mut current = self.current.lock().await;
            if current.as_ref().is_some_and(|r| r.id == round_id) {
                *current = None;
            }
        }

        let finished = RoundFinished {
            round_id,
            open_price,
            close_price,
            participants,
            winners,
        };
        record_latency(LatencyMetric::Settlement, settle_started.elapsed());
        tracing::info!(
            round = %round_id,
            open_price = %open_price,
            close_price = %close_price,
            participants,
            winners,
            "Round settled"
        );
        self.publish(&RoundEvent::Finished(finished.clone()));

        self.schedule_next_round();
        Some(finished)
    }

    fn schedule_next_round(self: &Arc<Self>) {
        if !self.is_running() {
            return;
        }

        let engine: Weak<Self> = Arc::downgrade(self);
        let pause = self.config.inter_round_pause();
        tokio::spawn(async move {
            tokio::time::sleep(pause).await;
            let Some(engine) = engine.upgrade() else {
                return;
            };
            if !engine.is_running() {
                return;
            }
            if let Err(e) = engine.open_round().await {
                tracing::error!(error = %e, "Failed to open next round");
            }
        });
    }

    fn queue_write(&self, write: LedgerWrite) {
        if let Err(e) = self.outbox.push(write) {
            tracing::error!(error = %e, "Dropped ledger write");
        }
    }

    fn publish(&self, event: &RoundEvent) {
        self.subscribers.read().publish(event);
    }
}
