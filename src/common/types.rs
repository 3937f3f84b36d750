//! Shared type definitions
//!
//! Settlement and history types produced by every game engine.

use crate::games::wager::Wager;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Supported game types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum GameType {
    Crash,
    Color,
    TicTacToe,
}

impl fmt::Display for GameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameType::Crash => write!(f, "crash"),
            GameType::Color => write!(f, "color"),
            GameType::TicTacToe => write!(f, "tictactoe"),
        }
    }
}

impl std::str::FromStr for GameType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "crash" | "aviator" => Ok(GameType::Crash),
            "color" | "colour" | "color-prediction" => Ok(GameType::Color),
            "tictactoe" | "tic-tac-toe" => Ok(GameType::TicTacToe),
            other => Err(format!("unknown game '{}'", other)),
        }
    }
}

/// Round result from the player's perspective
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Win,
    Lose,
    Draw,
    /// Stake returned because the round never started
    Cancelled,
}

/// Payout decision for one staked round
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settlement {
    pub round_id: Uuid,
    pub game_type: GameType,
    pub wager: Wager,
    pub payout: f64,
    pub outcome: Outcome,
}

impl Settlement {
    pub fn new(
        round_id: Uuid,
        game_type: GameType,
        wager: Wager,
        payout: f64,
        outcome: Outcome,
    ) -> Self {
        Self {
            round_id,
            game_type,
            wager,
            payout,
            outcome,
        }
    }

    /// Stake returned unchanged
    pub fn refund(round_id: Uuid, game_type: GameType, wager: Wager, outcome: Outcome) -> Self {
        Self::new(round_id, game_type, wager, wager.amount(), outcome)
    }

    /// Player profit (negative when the stake was lost)
    pub fn net(&self) -> f64 {
        self.payout - self.wager.amount()
    }
}

/// Settled round as persisted by the history service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoundRecord {
    pub player_id: String,
    #[serde(flatten)]
    pub settlement: Settlement,
    pub played_at: DateTime<Utc>,
}

impl RoundRecord {
    pub fn new(
        player_id: impl Into<String>,
        settlement: Settlement,
        played_at: DateTime<Utc>,
    ) -> Self {
        Self {
            player_id: player_id.into(),
            settlement,
            played_at,
        }
    }
}
