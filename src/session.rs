//! Session runtime
//!
//! One tokio task per game session owns the engine. Player commands arrive
//! over an mpsc queue and are handled between ticks, so the engine only ever
//! sees one caller. Stakes are debited before the engine accepts them;
//! settlements are paid out and written to history as they drain.
//!
//! Shutting the session down (or dropping its handle) aborts the task, which
//! drops every pending deadline with it.

use crate::common::traits::{HistoryService, WalletService};
use crate::common::types::{Outcome, RoundRecord, Settlement};
use crate::config::SessionConfig;
use crate::errors::{ArcadeResult, SessionError};
use crate::games::{Admission, GameEngine};
use crate::metrics::SessionMetrics;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Everything a session publishes to its subscribers
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum SessionEvent<E> {
    /// Engine presentation event
    Game(E),
    /// A settlement was paid and recorded
    Settled(Settlement),
    /// Paying or recording a settled round failed
    RoundFailed { round_id: Uuid, reason: String },
}

/// Collaborators and settings for one session
#[derive(Clone)]
pub struct SessionContext {
    pub player_id: String,
    pub wallet: Arc<dyn WalletService>,
    pub history: Arc<dyn HistoryService>,
    pub metrics: Arc<SessionMetrics>,
    pub config: SessionConfig,
}

impl SessionContext {
    pub fn new(
        player_id: impl Into<String>,
        wallet: Arc<dyn WalletService>,
        history: Arc<dyn HistoryService>,
    ) -> Self {
        Self {
            player_id: player_id.into(),
            wallet,
            history,
            metrics: Arc::new(SessionMetrics::new()),
            config: SessionConfig::default(),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<SessionMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }
}

struct Request<C> {
    command: C,
    reply: oneshot::Sender<ArcadeResult<bool>>,
}

/// Handle to a running session
pub struct SessionHandle<C, E> {
    player_id: String,
    commands: mpsc::Sender<Request<C>>,
    events: broadcast::Sender<SessionEvent<E>>,
    task: JoinHandle<()>,
}

/// Handle type for a given engine
pub type GameSession<G> = SessionHandle<<G as GameEngine>::Command, <G as GameEngine>::Event>;

/// Start driving `engine`. The engine must have been created at `now = 0`;
/// the session clock starts here.
pub fn spawn<G: GameEngine>(engine: G, context: SessionContext) -> GameSession<G> {
    let (commands, receiver) = mpsc::channel(context.config.command_buffer.max(1));
    let (events, _) = broadcast::channel(context.config.event_buffer.max(1));
    let player_id = context.player_id.clone();

    info!("Starting {} session for {}", engine.game_type(), player_id);

    let runner = Runner {
        engine,
        epoch: Instant::now(),
        events: events.clone(),
        context,
    };
    let task = tokio::spawn(runner.run(receiver));

    SessionHandle {
        player_id,
        commands,
        events,
        task,
    }
}

impl<C: Send + 'static, E: Clone + Send + 'static> SessionHandle<C, E> {
    pub fn player_id(&self) -> &str {
        &self.player_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent<E>> {
        self.events.subscribe()
    }

    /// Submit a command and wait for the engine's verdict.
    ///
    /// `Ok(false)` is a legal no-op (e.g. a cashout after the crash). Invalid
    /// input and failed debits come back as errors with the engine untouched.
    pub async fn send(&self, command: C) -> ArcadeResult<bool> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Request { command, reply })
            .await
            .map_err(|_| SessionError::Closed)?;
        response.await.map_err(|_| SessionError::Closed)?
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop the session. No event is published afterwards.
    pub async fn shutdown(&mut self) {
        self.task.abort();
        let _ = (&mut self.task).await;
        debug!("Session for {} shut down", self.player_id);
    }
}

impl<C, E> Drop for SessionHandle<C, E> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct Runner<G: GameEngine> {
    engine: G,
    epoch: Instant,
    events: broadcast::Sender<SessionEvent<G::Event>>,
    context: SessionContext,
}

impl<G: GameEngine> Runner<G> {
    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Request<G::Command>>) {
        let period = Duration::from_millis(self.context.config.tick_interval_ms.max(1));
        let mut ticker = tokio::time::interval_at(self.epoch, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                request = commands.recv() => match request {
                    Some(request) => self.handle(request).await,
                    None => break,
                },
                _ = ticker.tick() => {
                    let now = self.now();
                    self.engine.tick(now);
                    self.flush().await;
                }
            }
        }

        debug!("Session for {} has no more handles", self.context.player_id);
    }

    async fn handle(&mut self, request: Request<G::Command>) {
        let result = self.execute(request.command).await;
        let _ = request.reply.send(result);
        self.flush().await;
    }

    async fn execute(&mut self, command: G::Command) -> ArcadeResult<bool> {
        let now = self.now();
        match self.engine.admit(now, &command) {
            Admission::Reject(reason) => {
                debug!("Rejected {:?}: {}", command, reason);
                Err(SessionError::Rejected(reason).into())
            }
            Admission::Invalid(e) => {
                debug!("Invalid {:?}: {}", command, e);
                Err(e.into())
            }
            Admission::Free => Ok(self.engine.apply(now, command)),
            Admission::Stake(wager) => {
                let player_id = &self.context.player_id;
                self.context.wallet.debit(player_id, wager).await?;

                let now = self.now();
                let applied = self.engine.apply(now, command);
                if !applied {
                    warn!("Engine refused a debited stake of {}, refunding", wager);
                    if let Err(e) = self.context.wallet.refund(player_id, wager.amount()).await {
                        warn!("Refund of {} to {} failed: {}", wager, player_id, e);
                        self.context.metrics.record_failure();
                    }
                }
                Ok(applied)
            }
        }
    }

    async fn flush(&mut self) {
        for event in self.engine.drain_events() {
            let _ = self.events.send(SessionEvent::Game(event));
        }
        for settlement in self.engine.drain_settlements() {
            self.settle(settlement).await;
        }
    }

    async fn settle(&mut self, settlement: Settlement) {
        let context = &self.context;
        let player_id = context.player_id.as_str();
        context.metrics.record_settlement(&settlement);

        let paid = match settlement.outcome {
            _ if settlement.payout <= 0.0 => Ok(()),
            Outcome::Win => context.wallet.credit(player_id, settlement.payout).await,
            Outcome::Draw | Outcome::Cancelled => {
                context.wallet.refund(player_id, settlement.payout).await
            }
            Outcome::Lose => Ok(()),
        };
        if let Err(e) = paid {
            self.fail(settlement.round_id, format!("payout failed: {}", e));
        }

        let record = RoundRecord::new(player_id, settlement.clone(), Utc::now());
        if let Err(e) = self.context.history.record_round(record).await {
            self.fail(settlement.round_id, e.to_string());
        }

        debug!(
            "Settled {} round {} for {}: {:?}",
            settlement.game_type, settlement.round_id, self.context.player_id, settlement.outcome
        );
        let _ = self.events.send(SessionEvent::Settled(settlement));
    }

    fn fail(&self, round_id: Uuid, reason: String) {
        warn!("Round {} for {}: {}", round_id, self.context.player_id, reason);
        self.context.metrics.record_failure();
        let _ = self.events.send(SessionEvent::RoundFailed { round_id, reason });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ColorConfig, CrashConfig};
    use crate::errors::{ArcadeError, GameError, HistoryError, WalletError};
    use crate::games::color::{Color, ColorCommand, ColorEvent, ColorGame};
    use crate::games::crash::{CrashCommand, CrashGame};
    use crate::games::rng::ScriptedRng;
    use crate::games::wager::Wager;
    use crate::history::InMemoryHistory;
    use crate::wallet::InMemoryWallet;
    use async_trait::async_trait;
    use tokio::sync::broadcast::error::TryRecvError;

    struct BrokenHistory;

    #[async_trait]
    impl HistoryService for BrokenHistory {
        async fn record_round(&self, record: RoundRecord) -> Result<(), HistoryError> {
            Err(HistoryError::WriteFailed {
                round_id: record.settlement.round_id.to_string(),
                reason: "disk full".to_string(),
            })
        }
    }

    fn funded_wallet(amount: f64) -> Arc<InMemoryWallet> {
        let wallet = Arc::new(InMemoryWallet::new());
        wallet.deposit("p1", amount).unwrap();
        wallet
    }

    fn red_table() -> ColorGame<ScriptedRng> {
        ColorGame::new(ColorConfig::default(), ScriptedRng::new([0.1]), Duration::ZERO)
    }

    fn ten() -> Wager {
        Wager::new(10.0).unwrap()
    }

    fn drain<E: Clone>(rx: &mut broadcast::Receiver<SessionEvent<E>>) -> Vec<SessionEvent<E>> {
        let mut out = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(event) => out.push(event),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn test_winning_color_bet_is_paid_and_recorded() {
        let wallet = funded_wallet(100.0);
        let history = Arc::new(InMemoryHistory::new());
        let context = SessionContext::new("p1", wallet.clone(), history.clone());
        let session = spawn(red_table(), context);
        let mut events = session.subscribe();

        let bet = ColorCommand::PlaceBet {
            prediction: Color::Red,
            wager: ten(),
        };
        assert!(session.send(bet).await.unwrap());
        assert_eq!(wallet.balance("p1").await.unwrap(), 90.0);

        tokio::time::sleep(Duration::from_secs(8)).await;
        assert_eq!(wallet.balance("p1").await.unwrap(), 110.0);

        let rounds = history.player_history("p1", 10);
        assert_eq!(rounds.len(), 1);
        assert_eq!(rounds[0].settlement.outcome, Outcome::Win);

        let settled = drain(&mut events)
            .into_iter()
            .filter(|e| matches!(e, SessionEvent::Settled(_)))
            .count();
        assert_eq!(settled, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_debit_leaves_engine_untouched() {
        let wallet = funded_wallet(5.0);
        let history = Arc::new(InMemoryHistory::new());
        let session = spawn(red_table(), SessionContext::new("p1", wallet.clone(), history));
        let mut events = session.subscribe();

        let result = session
            .send(ColorCommand::PlaceBet {
                prediction: Color::Green,
                wager: ten(),
            })
            .await;
        assert!(matches!(
            result,
            Err(ArcadeError::Wallet(WalletError::InsufficientFunds { .. }))
        ));

        tokio::time::sleep(Duration::from_secs(1)).await;
        let accepted = drain(&mut events)
            .into_iter()
            .any(|e| matches!(e, SessionEvent::Game(ColorEvent::BetAccepted { .. })));
        assert!(!accepted);
        assert_eq!(wallet.balance("p1").await.unwrap(), 5.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_command_does_not_debit() {
        let wallet = funded_wallet(100.0);
        let history = Arc::new(InMemoryHistory::new());
        let script = ScriptedRng::new([0.5, 0.9]);
        let engine = CrashGame::new(CrashConfig::default(), script, Duration::ZERO);
        let session = spawn(engine, SessionContext::new("p1", wallet.clone(), history));

        // countdown is 3s; the round is flying by now
        tokio::time::sleep(Duration::from_secs(4)).await;
        let result = session.send(CrashCommand::PlaceBet { wager: ten() }).await;
        assert!(matches!(result, Err(ArcadeError::Session(SessionError::Rejected(_)))));

        let result = session.send(CrashCommand::SetAutoCashout(Some(1.0))).await;
        assert!(matches!(
            result,
            Err(ArcadeError::Game(GameError::InvalidAutoCashout { .. }))
        ));
        assert_eq!(wallet.balance("p1").await.unwrap(), 100.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_failure_is_reported_but_payout_stands() {
        let wallet = funded_wallet(100.0);
        let metrics = Arc::new(SessionMetrics::new());
        let context = SessionContext::new("p1", wallet.clone(), Arc::new(BrokenHistory))
            .with_metrics(metrics.clone());
        let session = spawn(red_table(), context);
        let mut events = session.subscribe();

        session
            .send(ColorCommand::PlaceBet {
                prediction: Color::Red,
                wager: ten(),
            })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(8)).await;

        let failed = drain(&mut events)
            .into_iter()
            .any(|e| matches!(e, SessionEvent::RoundFailed { .. }));
        assert!(failed);
        assert_eq!(wallet.balance("p1").await.unwrap(), 110.0);
        assert_eq!(metrics.snapshot().failed_settlements, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_everything() {
        let wallet = funded_wallet(100.0);
        let history = Arc::new(InMemoryHistory::new());
        let mut session = spawn(red_table(), SessionContext::new("p1", wallet, history));
        let mut events = session.subscribe();

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(session.is_running());
        session.shutdown().await;
        assert!(!session.is_running());

        drain(&mut events);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(drain(&mut events).is_empty());

        let result = session
            .send(ColorCommand::PlaceBet {
                prediction: Color::Red,
                wager: ten(),
            })
            .await;
        assert!(matches!(result, Err(ArcadeError::Session(SessionError::Closed))));
    }

    #[test]
    fn test_session_event_serialization() {
        let event: SessionEvent<ColorEvent> = SessionEvent::Game(ColorEvent::TableIdle);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "game");
        assert_eq!(json["data"]["type"], "table_idle");
    }
}
