//! Round types

use crate::session::SessionId;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Opaque round identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoundId(Uuid);

impl RoundId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RoundId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for RoundId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Predicted price direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "UP",
            Direction::Down => "DOWN",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UP" => Ok(Direction::Up),
            "DOWN" => Ok(Direction::Down),
            other => Err(format!("unknown direction: {other}")),
        }
    }
}

/// Per-participant outcome of a round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RoundResult {
    Win,
    Lose,
    Draw,
    /// Reserved; settlement always has a last-known price and never produces it
    Void,
}

impl RoundResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoundResult::Win => "WIN",
            RoundResult::Lose => "LOSE",
            RoundResult::Draw => "DRAW",
            RoundResult::Void => "VOID",
        }
    }
}

impl fmt::Display for RoundResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoundResult {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WIN" => Ok(RoundResult::Win),
            "LOSE" => Ok(RoundResult::Lose),
            "DRAW" => Ok(RoundResult::Draw),
            "VOID" => Ok(RoundResult::Void),
            other => Err(format!("unknown result: {other}")),
        }
    }
}

/// Round lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    /// Choices accepted
    Open,
    /// Still running, no new choices
    BettingClosed,
    /// Results being computed and emitted
    Settling,
}

/// A recorded choice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Choice {
    pub direction: Direction,
    /// Server receipt time; the only timestamp settlement trusts
    pub received_at: DateTime<Utc>,
    /// Client-reported time, telemetry only
    pub client_ts: Option<DateTime<Utc>>,
}

/// One timed betting cycle
#[derive(Debug, Clone)]
pub struct Round {
    pub id: RoundId,
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub betting_close_time: DateTime<Utc>,
    pub open_price: Decimal,
    pub close_price: Option<Decimal>,
    pub phase: RoundPhase,
    pub choices: HashMap<SessionId, Choice>,
}

impl Round {
    /// Open a round at `open_price`
    ///
    /// `close_time - open_time == duration` and
    /// `betting_close_time == close_time - anti_cheat_buffer`.
    pub fn open(
        open_price: Decimal,
        open_time: DateTime<Utc>,
        duration: Duration,
        anti_cheat_buffer: Duration,
    ) -> Self {
        let close_time = open_time + duration;
        Self {
            id: RoundId::new(),
            open_time,
            close_time,
            betting_close_time: close_time - anti_cheat_buffer,
            open_price,
            close_price: None,
            phase: RoundPhase::Open,
            choices: HashMap::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.phase != RoundPhase::Settling
    }

    pub fn is_betting_open(&self) -> bool {
        self.phase == RoundPhase::Open
    }

    pub fn snapshot(&self) -> RoundSnapshot {
        RoundSnapshot {
            id: self.id,
            open_time: self.open_time,
            close_time: self.close_time,
            betting_close_time: self.betting_close_time,
            open_price: self.open_price,
            phase: self.phase,
            choice_count: self.choices.len(),
        }
    }
}

/// Read-only view of the current round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundSnapshot {
    pub id: RoundId,
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub betting_close_time: DateTime<Utc>,
    pub open_price: Decimal,
    pub phase: RoundPhase,
    pub choice_count: usize,
}

/// Why a choice was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChoiceRejection {
    #[error("no round is open")]
    NoActiveRound,
    #[error("betting is closed for this round")]
    BettingClosed,
    #[error("a choice was already recorded for this round")]
    AlreadySubmitted,
}

/// Round engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    /// The feed has never produced a price; no round may open
    #[error("no price has been observed yet")]
    NoInitialPrice,
    #[error("invalid round configuration: {0}")]
    InvalidConfig(String),
}
