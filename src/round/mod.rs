//! Round engine
//!
//! Opens a round at the current price, accepts one choice per session,
//! closes betting ahead of the round end, settles against the price at
//! close and starts the next round after a short pause.

mod engine;
mod events;
mod settlement;
mod types;

pub use engine::{RoundEngine, MAX_ROUND_DURATION_MS};
pub use events::{
    RoundEvent, RoundFinished, RoundListener, RoundResultNotice, RoundStarted, Subscribers,
};
pub use settlement::{decide, settle_choice, Settlement};
pub use types::{
    Choice, ChoiceRejection, Direction, EngineError, Round, RoundId, RoundPhase, RoundResult,
    RoundSnapshot,
};
