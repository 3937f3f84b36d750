//! Tic-tac-toe with matchmaking
//!
//! Joining stakes the wager and queues for a remote opponent. When no one
//! shows up within the matchmaking timeout a bot with a random name takes the
//! seat. X always opens; marks alternate strictly and the board is checked
//! for a finished line after every move, whoever made it.
//!
//! Settlement from the local player's side: a win pays `win_multiplier` times
//! the stake, a draw refunds it, a loss (or leaving mid-game) pays nothing.
//! Leaving before an opponent was found cancels the match with a refund.

pub mod board;
pub mod matchmaking;
pub mod opponent;

pub use board::{Board, BoardState, Mark, CELLS, LINES};
pub use matchmaking::{MatchTicket, Matchmaker, NoRemotePlayers, QueueMatchmaker};
pub use opponent::{BotOpponent, Opponent, OpponentKind, OpponentUpdate, RemoteSession};

use crate::common::types::{GameType, Outcome, Settlement};
use crate::config::TicTacToeConfig;
use crate::errors::GameError;
use crate::games::rng::pick_index;
use crate::games::wager::Wager;
use crate::games::{Admission, GameEngine};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Waiting,
    Playing,
    Finished,
}

/// Result from the local player's perspective
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MatchResult {
    Win,
    Lose,
    Draw,
}

impl From<MatchResult> for Outcome {
    fn from(result: MatchResult) -> Outcome {
        match result {
            MatchResult::Win => Outcome::Win,
            MatchResult::Lose => Outcome::Lose,
            MatchResult::Draw => Outcome::Draw,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpponentInfo {
    pub kind: OpponentKind,
    pub name: String,
}

/// Observable state of one match
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TicTacToeMatch {
    pub match_id: Uuid,
    pub wager: Wager,
    pub player_mark: Mark,
    pub board: Board,
    pub turn: Mark,
    pub status: MatchStatus,
    /// `None` until finished, and for cancelled matches
    pub result: Option<MatchResult>,
    pub opponent: Option<OpponentInfo>,
}

impl TicTacToeMatch {
    pub fn is_player_turn(&self) -> bool {
        self.status == MatchStatus::Playing && self.turn == self.player_mark
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TicTacToeEvent {
    Queued { match_id: Uuid, wager: Wager, timeout_secs: u64 },
    MatchStarted { match_id: Uuid, opponent: OpponentInfo, player_mark: Mark },
    MoveMade { match_id: Uuid, index: usize, mark: Mark, board: Board },
    MatchEnded { match_id: Uuid, result: MatchResult, line: Option<[usize; 3]>, payout: f64 },
    MatchCancelled { match_id: Uuid },
}

#[derive(Debug, Clone)]
pub enum TicTacToeCommand {
    Join { wager: Wager, mark: Mark },
    Move { index: usize },
    Leave,
}

enum Seat {
    Empty,
    Waiting { ticket: MatchTicket, deadline: Duration },
    Playing { opponent: Box<dyn Opponent> },
}

pub struct TicTacToeGame<R: Rng> {
    config: TicTacToeConfig,
    rng: R,
    matchmaker: Arc<dyn Matchmaker>,
    seat: Seat,
    current: Option<TicTacToeMatch>,
    events: Vec<TicTacToeEvent>,
    settlements: Vec<Settlement>,
}

impl<R: Rng> TicTacToeGame<R> {
    pub fn new(config: TicTacToeConfig, rng: R, matchmaker: Arc<dyn Matchmaker>) -> Self {
        Self {
            config,
            rng,
            matchmaker,
            seat: Seat::Empty,
            current: None,
            events: Vec::new(),
            settlements: Vec::new(),
        }
    }

    /// Every match is played against a bot after the timeout
    pub fn bots_only(config: TicTacToeConfig, rng: R) -> Self {
        Self::new(config, rng, Arc::new(NoRemotePlayers))
    }

    /// Current or most recent match
    pub fn current_match(&self) -> Option<&TicTacToeMatch> {
        self.current.as_ref()
    }

    pub fn status(&self) -> Option<MatchStatus> {
        self.current.as_ref().map(|m| m.status)
    }

    pub fn can_join(&self) -> bool {
        matches!(self.seat, Seat::Empty)
    }

    /// Queue for a match. The player's `mark` decides who opens: X always does.
    pub fn join(&mut self, now: Duration, wager: Wager, mark: Mark) -> bool {
        if !self.can_join() {
            debug!("Join ignored, a match is already running");
            return false;
        }

        let match_id = Uuid::new_v4();
        let timeout = Duration::from_millis(self.config.matchmaking_timeout_ms);
        let (ticket, deadline) = match self.matchmaker.join_queue(wager, mark) {
            Ok(ticket) => (ticket, now + timeout),
            Err(e) => {
                warn!("Matchmaking failed, seating a bot right away: {}", e);
                (MatchTicket::unanswered(), now)
            }
        };

        self.current = Some(TicTacToeMatch {
            match_id,
            wager,
            player_mark: mark,
            board: Board::new(),
            turn: Mark::X,
            status: MatchStatus::Waiting,
            result: None,
            opponent: None,
        });
        self.seat = Seat::Waiting { ticket, deadline };
        self.events.push(TicTacToeEvent::Queued {
            match_id,
            wager,
            timeout_secs: timeout.as_secs(),
        });

        info!("Match {} queued at {}", match_id, wager);
        self.advance(now);
        true
    }

    /// Local move. Ignored unless it is the player's turn and the cell is open.
    pub fn play(&mut self, now: Duration, index: usize) -> bool {
        self.advance(now);

        let Some(game) = self.current.as_mut() else {
            return false;
        };
        if !game.is_player_turn() || !game.board.place(index, game.player_mark) {
            debug!("Illegal move on cell {} ignored", index);
            return false;
        }

        let mark = game.player_mark;
        let board = game.board;
        game.turn = mark.other();
        self.events.push(TicTacToeEvent::MoveMade {
            match_id: game.match_id,
            index,
            mark,
            board,
        });

        // the opponent sees the final move too
        if let Seat::Playing { opponent } = &mut self.seat {
            opponent.submit_move(now, index, &board);
        }
        self.resolve_board();
        true
    }

    /// Abandon the queue (refund) or the running game (forfeit)
    pub fn leave(&mut self, now: Duration) -> bool {
        self.advance(now);

        match std::mem::replace(&mut self.seat, Seat::Empty) {
            Seat::Empty => false,
            Seat::Waiting { .. } => {
                if let Some(game) = self.current.as_mut() {
                    game.status = MatchStatus::Finished;
                    self.settlements.push(Settlement::refund(
                        game.match_id,
                        GameType::TicTacToe,
                        game.wager,
                        Outcome::Cancelled,
                    ));
                    self.events.push(TicTacToeEvent::MatchCancelled {
                        match_id: game.match_id,
                    });
                    info!("Match {} cancelled before an opponent was found", game.match_id);
                }
                true
            }
            Seat::Playing { mut opponent } => {
                opponent.leave();
                self.finish(MatchResult::Lose, None);
                true
            }
        }
    }

    /// Advance matchmaking and opponent replies to `now`
    pub fn advance(&mut self, now: Duration) {
        if let Seat::Waiting { ticket, deadline } = &mut self.seat {
            if let Some(session) = ticket.try_take() {
                self.seat_opponent(now, Box::new(session));
            } else if now >= *deadline {
                let at = *deadline;
                let bot = self.draw_bot();
                self.seat_opponent(at, Box::new(bot));
            }
        }

        loop {
            let update = match &mut self.seat {
                Seat::Playing { opponent } => opponent.poll_update(now, &mut self.rng),
                _ => None,
            };
            match update {
                Some(update) => self.apply_update(update),
                None => break,
            }
        }
    }

    fn draw_bot(&mut self) -> BotOpponent {
        let name = pick_index(&mut self.rng, self.config.bot_names.len())
            .map(|i| self.config.bot_names[i].clone())
            .unwrap_or_else(|| "Bot".to_string());
        let mark = self
            .current
            .as_ref()
            .map_or(Mark::O, |game| game.player_mark.other());
        BotOpponent::new(name, mark, Duration::from_millis(self.config.bot_move_delay_ms))
    }

    fn seat_opponent(&mut self, at: Duration, mut opponent: Box<dyn Opponent>) {
        let Some(game) = self.current.as_mut() else {
            return;
        };

        let info = OpponentInfo {
            kind: opponent.kind(),
            name: opponent.display_name().to_string(),
        };
        info!("Match {} against {:?} {}", game.match_id, info.kind, info.name);

        game.status = MatchStatus::Playing;
        game.opponent = Some(info.clone());
        self.events.push(TicTacToeEvent::MatchStarted {
            match_id: game.match_id,
            opponent: info,
            player_mark: game.player_mark,
        });

        if game.turn != game.player_mark {
            opponent.opening(at, &game.board);
        }
        self.seat = Seat::Playing { opponent };
    }

    fn apply_update(&mut self, update: OpponentUpdate) {
        let Some(game) = self.current.as_mut() else {
            return;
        };

        match update {
            OpponentUpdate::Board { board } => {
                let opponent_mark = game.player_mark.other();
                let index = match game.board.single_move_to(&board, opponent_mark) {
                    Some(index) if game.turn == opponent_mark => index,
                    _ => {
                        debug!("Discarding out-of-turn or malformed board from opponent");
                        return;
                    }
                };

                game.board = board;
                game.turn = game.player_mark;
                self.events.push(TicTacToeEvent::MoveMade {
                    match_id: game.match_id,
                    index,
                    mark: opponent_mark,
                    board,
                });
                self.resolve_board();
            }
            OpponentUpdate::Left => {
                info!("Opponent left match {}", game.match_id);
                self.seat = Seat::Empty;
                self.finish(MatchResult::Win, None);
            }
        }
    }

    /// Finish the match if the board is decided. Returns true when it did.
    fn resolve_board(&mut self) -> bool {
        let Some(game) = self.current.as_ref() else {
            return false;
        };

        let (result, line) = match game.board.state() {
            BoardState::Ongoing => return false,
            BoardState::Draw => (MatchResult::Draw, None),
            BoardState::Won { mark, line } if mark == game.player_mark => {
                (MatchResult::Win, Some(line))
            }
            BoardState::Won { line, .. } => (MatchResult::Lose, Some(line)),
        };

        self.seat = Seat::Empty;
        self.finish(result, line);
        true
    }

    fn finish(&mut self, result: MatchResult, line: Option<[usize; 3]>) {
        let Some(game) = self.current.as_mut() else {
            return;
        };

        game.status = MatchStatus::Finished;
        game.result = Some(result);

        let payout = match result {
            MatchResult::Win => game.wager.scaled(self.config.win_multiplier),
            MatchResult::Draw => game.wager.amount(),
            MatchResult::Lose => 0.0,
        };

        info!("Match {} finished: {:?}, payout {:.2}", game.match_id, result, payout);

        self.settlements.push(Settlement::new(
            game.match_id,
            GameType::TicTacToe,
            game.wager,
            payout,
            result.into(),
        ));
        self.events.push(TicTacToeEvent::MatchEnded {
            match_id: game.match_id,
            result,
            line,
            payout,
        });
    }
}

impl<R: Rng + Send + 'static> GameEngine for TicTacToeGame<R> {
    type Command = TicTacToeCommand;
    type Event = TicTacToeEvent;

    fn game_type(&self) -> GameType {
        GameType::TicTacToe
    }

    fn tick(&mut self, now: Duration) {
        self.advance(now);
    }

    fn admit(&mut self, now: Duration, command: &TicTacToeCommand) -> Admission {
        self.advance(now);
        match command {
            TicTacToeCommand::Join { wager, .. } => {
                if self.can_join() {
                    Admission::Stake(*wager)
                } else {
                    Admission::Reject("already in a match".to_string())
                }
            }
            TicTacToeCommand::Move { index } if *index >= CELLS => {
                Admission::Invalid(GameError::CellOutOfRange(*index))
            }
            TicTacToeCommand::Move { .. } | TicTacToeCommand::Leave => Admission::Free,
        }
    }

    fn apply(&mut self, now: Duration, command: TicTacToeCommand) -> bool {
        match command {
            TicTacToeCommand::Join { wager, mark } => self.join(now, wager, mark),
            TicTacToeCommand::Move { index } => self.play(now, index),
            TicTacToeCommand::Leave => self.leave(now),
        }
    }

    fn drain_events(&mut self) -> Vec<TicTacToeEvent> {
        std::mem::take(&mut self.events)
    }

    fn drain_settlements(&mut self) -> Vec<Settlement> {
        std::mem::take(&mut self.settlements)
    }
}
