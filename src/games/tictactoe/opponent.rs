//! Who sits across the board
//!
//! The engine only talks to an [`Opponent`]: it reports the local player's
//! moves and polls for replies every tick. A bot answers after a fixed
//! reaction delay; a remote player answers over a channel.

use super::board::{Board, Mark};
use crate::games::rng::pick_index;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::debug;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OpponentKind {
    Bot,
    Remote,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OpponentUpdate {
    /// Board after the opponent's move
    Board { board: Board },
    /// Opponent left the match
    Left,
}

pub trait Opponent: Send {
    fn kind(&self) -> OpponentKind;

    fn display_name(&self) -> &str;

    /// The opponent holds the first move
    fn opening(&mut self, _now: Duration, _board: &Board) {}

    /// Report a local move; `board` already contains it
    fn submit_move(&mut self, now: Duration, index: usize, board: &Board);

    fn poll_update(&mut self, now: Duration, rng: &mut dyn RngCore) -> Option<OpponentUpdate>;

    /// Local player abandoned the match
    fn leave(&mut self) {}
}

/// Plays a uniformly random open cell after `delay`
#[derive(Debug, Clone)]
pub struct BotOpponent {
    name: String,
    mark: Mark,
    delay: Duration,
    pending: Option<(Duration, Board)>,
}

impl BotOpponent {
    pub fn new(name: impl Into<String>, mark: Mark, delay: Duration) -> Self {
        Self {
            name: name.into(),
            mark,
            delay,
            pending: None,
        }
    }

    pub fn mark(&self) -> Mark {
        self.mark
    }

    fn schedule(&mut self, now: Duration, board: &Board) {
        self.pending = Some((now + self.delay, *board));
    }
}

impl Opponent for BotOpponent {
    fn kind(&self) -> OpponentKind {
        OpponentKind::Bot
    }

    fn display_name(&self) -> &str {
        &self.name
    }

    fn opening(&mut self, now: Duration, board: &Board) {
        self.schedule(now, board);
    }

    fn submit_move(&mut self, now: Duration, _index: usize, board: &Board) {
        self.schedule(now, board);
    }

    fn poll_update(&mut self, now: Duration, rng: &mut dyn RngCore) -> Option<OpponentUpdate> {
        match self.pending {
            Some((due, _)) if now < due => None,
            Some((_, board)) => {
                self.pending = None;
                let open: Vec<usize> = board.open_cells().collect();
                let index = open[pick_index(rng, open.len())?];
                debug!("Bot {} plays cell {}", self.name, index);
                board
                    .with_mark(index, self.mark)
                    .map(|board| OpponentUpdate::Board { board })
            }
            None => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PeerMessage {
    Moved { index: usize, board: Board },
    Left,
}

/// Channel-backed link to another player's engine
#[derive(Debug)]
pub struct RemoteSession {
    name: String,
    outgoing: mpsc::UnboundedSender<PeerMessage>,
    incoming: mpsc::UnboundedReceiver<PeerMessage>,
    closed: bool,
}

impl RemoteSession {
    pub fn new(
        name: impl Into<String>,
        outgoing: mpsc::UnboundedSender<PeerMessage>,
        incoming: mpsc::UnboundedReceiver<PeerMessage>,
    ) -> Self {
        Self {
            name: name.into(),
            outgoing,
            incoming,
            closed: false,
        }
    }

    /// Two sessions wired to each other. `first` is handed to the player
    /// facing `second_name`, and the other way round.
    pub fn pair(first_name: &str, second_name: &str) -> (RemoteSession, RemoteSession) {
        let (to_second, from_first) = mpsc::unbounded_channel();
        let (to_first, from_second) = mpsc::unbounded_channel();
        (
            RemoteSession::new(second_name, to_second, from_second),
            RemoteSession::new(first_name, to_first, from_first),
        )
    }

    fn send(&mut self, message: PeerMessage) {
        if self.outgoing.send(message).is_err() {
            debug!("Remote opponent {} is gone", self.name);
        }
    }
}

impl Opponent for RemoteSession {
    fn kind(&self) -> OpponentKind {
        OpponentKind::Remote
    }

    fn display_name(&self) -> &str {
        &self.name
    }

    fn submit_move(&mut self, _now: Duration, index: usize, board: &Board) {
        self.send(PeerMessage::Moved { index, board: *board });
    }

    fn poll_update(&mut self, _now: Duration, _rng: &mut dyn RngCore) -> Option<OpponentUpdate> {
        if self.closed {
            return None;
        }
        match self.incoming.try_recv() {
            Ok(PeerMessage::Moved { board, .. }) => Some(OpponentUpdate::Board { board }),
            Ok(PeerMessage::Left) | Err(TryRecvError::Disconnected) => {
                self.closed = true;
                Some(OpponentUpdate::Left)
            }
            Err(TryRecvError::Empty) => None,
        }
    }

    fn leave(&mut self) {
        self.send(PeerMessage::Left);
        self.closed = true;
    }
}
