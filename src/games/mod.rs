//! Game outcome engines
//!
//! Each engine is a plain state machine advanced by `tick(now)`, where `now`
//! is the time elapsed since its session started. Engines own their random
//! source, queue presentation events and settlements, and never touch wallets
//! or storage. The session runtime drives them through [`GameEngine`].

pub mod color;
pub mod crash;
pub mod rng;
pub mod tictactoe;
pub mod wager;

use crate::common::types::{GameType, Settlement};
use crate::errors::GameError;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

pub use color::{Color, ColorCommand, ColorEvent, ColorGame, ColorPhase};
pub use crash::{CrashCommand, CrashEvent, CrashGame, CrashPhase, Multiplier};
pub use tictactoe::{Mark, MatchStatus, TicTacToeCommand, TicTacToeEvent, TicTacToeGame};
pub use wager::{Wager, WagerInput, WagerSelector};

/// What a command needs before the engine may apply it
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// No money moves
    Free,
    /// Debit this stake first
    Stake(Wager),
    /// Not acceptable in the current state
    Reject(String),
    /// Malformed input, whatever the state
    Invalid(GameError),
}

/// Uniform driving surface over the three games
pub trait GameEngine: Send + 'static {
    type Command: Send + fmt::Debug + 'static;
    type Event: Clone + Send + Serialize + fmt::Debug + 'static;

    fn game_type(&self) -> GameType;

    /// Advance all timers to `now`
    fn tick(&mut self, now: Duration);

    /// Decide whether `command` can be applied at `now`, advancing first
    fn admit(&mut self, now: Duration, command: &Self::Command) -> Admission;

    /// Apply an admitted command. Returns false when it turned out to be a no-op.
    fn apply(&mut self, now: Duration, command: Self::Command) -> bool;

    fn drain_events(&mut self) -> Vec<Self::Event>;

    fn drain_settlements(&mut self) -> Vec<Settlement>;
}
