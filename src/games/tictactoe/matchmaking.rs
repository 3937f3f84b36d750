use super::board::Mark;
use super::opponent::RemoteSession;
use crate::errors::MatchmakingError;
use crate::games::wager::Wager;
use std::sync::Mutex;
use tokio::sync::oneshot::{self, error::TryRecvError};
use tracing::{debug, info};
use uuid::Uuid;

/// Finds remote opponents for tic-tac-toe.
///
/// A ticket may only resolve against a player holding the other mark, so the
/// two engines agree on who opens.
pub trait Matchmaker: Send + Sync {
    fn join_queue(&self, wager: Wager, mark: Mark) -> Result<MatchTicket, MatchmakingError>;
}

/// Pending matchmaking request, polled by the engine every tick
#[derive(Debug)]
pub struct MatchTicket {
    receiver: oneshot::Receiver<RemoteSession>,
    settled: bool,
}

impl MatchTicket {
    pub fn channel() -> (oneshot::Sender<RemoteSession>, MatchTicket) {
        let (sender, receiver) = oneshot::channel();
        (
            sender,
            MatchTicket {
                receiver,
                settled: false,
            },
        )
    }

    /// A ticket nobody will ever answer
    pub fn unanswered() -> MatchTicket {
        Self::channel().1
    }

    /// `Some` once a remote opponent was found. Never yields twice.
    pub fn try_take(&mut self) -> Option<RemoteSession> {
        if self.settled {
            return None;
        }
        match self.receiver.try_recv() {
            Ok(session) => {
                self.settled = true;
                Some(session)
            }
            Err(TryRecvError::Closed) => {
                self.settled = true;
                None
            }
            Err(TryRecvError::Empty) => None,
        }
    }
}

/// No remote pool at all: every match falls back to a bot
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRemotePlayers;

impl Matchmaker for NoRemotePlayers {
    fn join_queue(&self, _wager: Wager, _mark: Mark) -> Result<MatchTicket, MatchmakingError> {
        Ok(MatchTicket::unanswered())
    }
}

/// In-process queue pairing an X and an O player who stake the same amount
#[derive(Debug, Default)]
pub struct QueueMatchmaker {
    waiting: Mutex<Vec<QueuedPlayer>>,
}

#[derive(Debug)]
struct QueuedPlayer {
    tag: String,
    wager: Wager,
    mark: Mark,
    sender: oneshot::Sender<RemoteSession>,
}

impl QueueMatchmaker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queued(&self) -> usize {
        self.waiting
            .lock()
            .map(|mut waiting| {
                waiting.retain(|p| !p.sender.is_closed());
                waiting.len()
            })
            .unwrap_or(0)
    }
}

impl Matchmaker for QueueMatchmaker {
    fn join_queue(&self, wager: Wager, mark: Mark) -> Result<MatchTicket, MatchmakingError> {
        let mut waiting = self
            .waiting
            .lock()
            .map_err(|_| MatchmakingError::Unavailable("queue lock poisoned".to_string()))?;

        // players who already fell back to a bot dropped their tickets
        waiting.retain(|p| !p.sender.is_closed());

        let tag = format!("guest-{}", &Uuid::new_v4().simple().to_string()[..6]);
        let (sender, ticket) = MatchTicket::channel();

        match waiting
            .iter()
            .position(|p| p.wager == wager && p.mark == mark.other())
        {
            Some(position) => {
                let other = waiting.remove(position);
                let (theirs, ours) = RemoteSession::pair(&other.tag, &tag);
                info!("Matched {} with {} at {}", other.tag, tag, wager);
                if other.sender.send(theirs).is_err() || sender.send(ours).is_err() {
                    return Err(MatchmakingError::QueueClosed);
                }
            }
            None => {
                debug!("{} queued at {} as {}", tag, wager, mark);
                waiting.push(QueuedPlayer {
                    tag,
                    wager,
                    mark,
                    sender,
                });
            }
        }
        Ok(ticket)
    }
}
