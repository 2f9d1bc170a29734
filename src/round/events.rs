//! Round lifecycle events and their subscribers

use super::{Direction, RoundId, RoundResult};
use crate::session::SessionId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundStarted {
    pub round_id: RoundId,
    pub open_price: Decimal,
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub betting_close_time: DateTime<Utc>,
}

/// One participant's settled outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundResultNotice {
    pub round_id: RoundId,
    pub identity: SessionId,
    pub direction: Direction,
    pub open_price: Decimal,
    pub close_price: Decimal,
    pub result: RoundResult,
    pub points_delta: u64,
    /// `None` when the session no longer exists
    pub total_points: Option<u64>,
    pub prompt_telegram: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundFinished {
    pub round_id: RoundId,
    pub open_price: Decimal,
    pub close_price: Decimal,
    pub participants: usize,
    pub winners: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoundEvent {
    Started(RoundStarted),
    BettingClosed { round_id: RoundId },
    Result(RoundResultNotice),
    Finished(RoundFinished),
}

impl RoundEvent {
    pub fn round_id(&self) -> RoundId {
        match self {
            RoundEvent::Started(e) => e.round_id,
            RoundEvent::BettingClosed { round_id } => *round_id,
            RoundEvent::Result(e) => e.round_id,
            RoundEvent::Finished(e) => e.round_id,
        }
    }
}

/// Receives every event in emission order
///
/// Called inline by the engine; implementations must not block.
pub trait RoundListener: Send + Sync {
    fn on_event(&self, event: &RoundEvent);
}

impl RoundListener for mpsc::UnboundedSender<RoundEvent> {
    fn on_event(&self, event: &RoundEvent) {
        // a dropped receiver just stops listening
        let _ = self.send(event.clone());
    }
}

/// Ordered listener list
#[derive(Default)]
pub struct Subscribers {
    listeners: Vec<Arc<dyn RoundListener>>,
}

impl Subscribers {
    pub fn add(&mut self, listener: Arc<dyn RoundListener>) {
        self.listeners.push(listener);
    }

    pub fn publish(&self, event: &RoundEvent) {
        for listener in &self.listeners {
            listener.on_event(event);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}
