//! Red/green colour prediction
//!
//! The house runs rounds continuously: a short idle gap, a countdown during
//! which bets are taken, the reveal, then a pause showing the result. A player
//! who bets while the table is idle starts the countdown right away.
//!
//! Outcomes are skewed: red comes up with `red_probability` (0.48 by default)
//! and green takes the rest. A correct prediction pays `payout_multiplier`
//! times the stake.

use crate::common::types::{GameType, Outcome, Settlement};
use crate::config::ColorConfig;
use crate::games::wager::Wager;
use crate::games::{Admission, GameEngine};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Red,
    Green,
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::Red => write!(f, "red"),
            Color::Green => write!(f, "green"),
        }
    }
}

/// Draw one outcome: red iff a uniform draw falls below `red_probability`
pub fn draw_outcome<R: Rng + ?Sized>(rng: &mut R, red_probability: f64) -> Color {
    if rng.gen::<f64>() < red_probability {
        Color::Red
    } else {
        Color::Green
    }
}

/// Settle a prediction against the drawn colour
pub fn settle(
    prediction: Color,
    outcome: Color,
    wager: Wager,
    payout_multiplier: f64,
) -> (Outcome, f64) {
    if prediction == outcome {
        (Outcome::Win, wager.scaled(payout_multiplier))
    } else {
        (Outcome::Lose, 0.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ColorPhase {
    Idle,
    Counting,
    Revealed,
}

/// One finished colour round
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColorRound {
    pub round_id: Uuid,
    pub prediction: Option<Color>,
    pub outcome: Color,
    /// `None` when nobody bet on the round
    pub result: Option<Outcome>,
    pub payout: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorBet {
    pub prediction: Color,
    pub wager: Wager,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ColorEvent {
    CountdownStarted { round_id: Uuid, seconds: u64 },
    Countdown { round_id: Uuid, seconds_left: u64 },
    BetAccepted { round_id: Uuid, prediction: Color, wager: Wager },
    Revealed(ColorRound),
    TableIdle,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
    Idle { next_round_at: Option<Duration> },
    Counting { reveal_at: Duration },
    Revealed { resume_at: Duration },
}

#[derive(Debug, Clone)]
pub enum ColorCommand {
    PlaceBet { prediction: Color, wager: Wager },
}

/// Colour prediction table for one player session
pub struct ColorGame<R: Rng> {
    config: ColorConfig,
    rng: R,
    state: State,
    round_id: Uuid,
    bet: Option<ColorBet>,
    seconds_left: u64,
    recent: VecDeque<Color>,
    last_round: Option<ColorRound>,
    events: Vec<ColorEvent>,
    settlements: Vec<Settlement>,
}

impl<R: Rng> ColorGame<R> {
    /// Open the table at `now`
    pub fn new(config: ColorConfig, rng: R, now: Duration) -> Self {
        let next_round_at = config
            .auto_restart
            .then(|| now + Duration::from_millis(config.idle_delay_ms));
        Self {
            recent: VecDeque::with_capacity(config.recent_results_len),
            config,
            rng,
            state: State::Idle { next_round_at },
            round_id: Uuid::new_v4(),
            bet: None,
            seconds_left: 0,
            last_round: None,
            events: Vec::new(),
            settlements: Vec::new(),
        }
    }

    pub fn phase(&self) -> ColorPhase {
        match self.state {
            State::Idle { .. } => ColorPhase::Idle,
            State::Counting { .. } => ColorPhase::Counting,
            State::Revealed { .. } => ColorPhase::Revealed,
        }
    }

    pub fn round_id(&self) -> Uuid {
        self.round_id
    }

    pub fn current_bet(&self) -> Option<ColorBet> {
        self.bet
    }

    /// Whole seconds left on the countdown, 0 outside `Counting`
    pub fn seconds_left(&self) -> u64 {
        self.seconds_left
    }

    /// Newest first
    pub fn recent_results(&self) -> impl Iterator<Item = Color> + '_ {
        self.recent.iter().copied()
    }

    pub fn last_round(&self) -> Option<&ColorRound> {
        self.last_round.as_ref()
    }

    /// Whether a bet would be taken at `now`
    pub fn accepts_bets(&mut self, now: Duration) -> bool {
        self.advance(now);
        self.bet.is_none() && self.phase() != ColorPhase::Revealed
    }

    /// Register a prediction for the current (or next) round.
    ///
    /// Returns false when the result is already showing or the round already
    /// holds a bet.
    pub fn place_bet(&mut self, now: Duration, prediction: Color, wager: Wager) -> bool {
        if !self.accepts_bets(now) {
            debug!("Colour bet rejected in phase {:?}", self.phase());
            return false;
        }

        if let State::Idle { .. } = self.state {
            self.start_countdown(now);
        }

        self.bet = Some(ColorBet { prediction, wager });
        self.events.push(ColorEvent::BetAccepted {
            round_id: self.round_id,
            prediction,
            wager,
        });
        true
    }

    /// Advance timers up to `now`
    pub fn advance(&mut self, now: Duration) {
        loop {
            match self.state {
                State::Idle {
                    next_round_at: Some(at),
                } if now >= at => self.start_countdown(at),
                State::Counting { reveal_at } if now >= reveal_at => self.reveal(reveal_at),
                State::Counting { reveal_at } => {
                    let remaining = reveal_at - now;
                    let seconds = remaining.as_millis().div_ceil(1_000) as u64;
                    if seconds != self.seconds_left {
                        self.seconds_left = seconds;
                        self.events.push(ColorEvent::Countdown {
                            round_id: self.round_id,
                            seconds_left: seconds,
                        });
                    }
                    break;
                }
                State::Revealed { resume_at } if now >= resume_at => {
                    let next_round_at = self
                        .config
                        .auto_restart
                        .then(|| resume_at + Duration::from_millis(self.config.idle_delay_ms));
                    self.state = State::Idle { next_round_at };
                    self.round_id = Uuid::new_v4();
                    self.events.push(ColorEvent::TableIdle);
                }
                _ => break,
            }
        }
    }

    fn start_countdown(&mut self, at: Duration) {
        let seconds = self.config.countdown_secs;
        self.state = State::Counting {
            reveal_at: at + Duration::from_secs(seconds),
        };
        self.seconds_left = seconds;
        self.events.push(ColorEvent::CountdownStarted {
            round_id: self.round_id,
            seconds,
        });
    }

    fn reveal(&mut self, at: Duration) {
        let outcome = draw_outcome(&mut self.rng, self.config.red_probability);

        self.recent.push_front(outcome);
        self.recent.truncate(self.config.recent_results_len);

        let bet = self.bet.take();
        let (result, payout) = match bet {
            Some(bet) => {
                let (result, payout) =
                    settle(bet.prediction, outcome, bet.wager, self.config.payout_multiplier);
                self.settlements.push(Settlement::new(
                    self.round_id,
                    GameType::Color,
                    bet.wager,
                    payout,
                    result,
                ));
                (Some(result), payout)
            }
            None => (None, 0.0),
        };

        info!(
            "Colour round {} revealed {} (prediction {:?}, payout {:.2})",
            self.round_id,
            outcome,
            bet.map(|b| b.prediction),
            payout
        );

        let round = ColorRound {
            round_id: self.round_id,
            prediction: bet.map(|b| b.prediction),
            outcome,
            result,
            payout,
        };
        self.last_round = Some(round.clone());
        self.events.push(ColorEvent::Revealed(round));

        self.seconds_left = 0;
        self.state = State::Revealed {
            resume_at: at + Duration::from_millis(self.config.reveal_pause_ms),
        };
    }
}

impl<R: Rng + Send + 'static> GameEngine for ColorGame<R> {
    type Command = ColorCommand;
    type Event = ColorEvent;

    fn game_type(&self) -> GameType {
        GameType::Color
    }

    fn tick(&mut self, now: Duration) {
        self.advance(now);
    }

    fn admit(&mut self, now: Duration, command: &ColorCommand) -> Admission {
        match command {
            ColorCommand::PlaceBet { wager, .. } => {
                if self.accepts_bets(now) {
                    Admission::Stake(*wager)
                } else {
                    Admission::Reject("betting is closed for this round".to_string())
                }
            }
        }
    }

    fn apply(&mut self, now: Duration, command: ColorCommand) -> bool {
        match command {
            ColorCommand::PlaceBet { prediction, wager } => self.place_bet(now, prediction, wager),
        }
    }

    fn drain_events(&mut self) -> Vec<ColorEvent> {
        std::mem::take(&mut self.events)
    }

    fn drain_settlements(&mut self) -> Vec<Settlement> {
        std::mem::take(&mut self.settlements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::rng::{seeded, ScriptedRng};

    const RED: f64 = 0.1;
    const GREEN: f64 = 0.9;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn table(draw: f64) -> ColorGame<ScriptedRng> {
        ColorGame::new(ColorConfig::default(), ScriptedRng::new([draw]), Duration::ZERO)
    }

    fn ten() -> Wager {
        Wager::new(10.0).unwrap()
    }

    #[test]
    fn test_settle() {
        assert_eq!(settle(Color::Red, Color::Green, ten(), 2.0), (Outcome::Lose, 0.0));
        assert_eq!(settle(Color::Green, Color::Green, ten(), 2.0), (Outcome::Win, 20.0));
    }

    #[test]
    fn test_red_frequency_converges() {
        let mut rng = seeded(2024);
        let draws = 200_000;
        let reds = (0..draws)
            .filter(|_| draw_outcome(&mut rng, 0.48) == Color::Red)
            .count();
        let freq = reds as f64 / draws as f64;
        assert!((freq - 0.48).abs() < 0.01, "red frequency {}", freq);
    }

    #[test]
    fn test_house_runs_rounds_without_players() {
        let mut game = table(RED);
        assert_eq!(game.phase(), ColorPhase::Idle);

        game.advance(secs(2));
        assert_eq!(game.phase(), ColorPhase::Counting);
        assert_eq!(game.seconds_left(), 5);

        game.advance(secs(7));
        assert_eq!(game.phase(), ColorPhase::Revealed);
        let round = game.last_round().unwrap();
        assert_eq!(round.outcome, Color::Red);
        assert_eq!(round.result, None);
        assert!(game.drain_settlements().is_empty());

        game.advance(secs(10));
        assert_eq!(game.phase(), ColorPhase::Idle);
        game.advance(secs(12));
        assert_eq!(game.phase(), ColorPhase::Counting);
        assert_eq!(game.recent_results().collect::<Vec<_>>(), vec![Color::Red]);
    }

    #[test]
    fn test_losing_bet_pays_nothing() {
        let mut game = table(GREEN);
        assert!(game.place_bet(Duration::ZERO, Color::Red, ten()));
        assert_eq!(game.phase(), ColorPhase::Counting);

        game.advance(secs(5));
        let settlements = game.drain_settlements();
        assert_eq!(settlements.len(), 1);
        assert_eq!(settlements[0].outcome, Outcome::Lose);
        assert_eq!(settlements[0].payout, 0.0);
        assert_eq!(game.last_round().unwrap().result, Some(Outcome::Lose));
    }

    #[test]
    fn test_winning_bet_pays_double() {
        let mut game = table(GREEN);
        game.advance(secs(3));
        assert!(game.place_bet(secs(3), Color::Green, ten()));

        game.advance(secs(7));
        let settlements = game.drain_settlements();
        assert_eq!(settlements[0].payout, 20.0);
        assert_eq!(settlements[0].outcome, Outcome::Win);
    }

    #[test]
    fn test_bets_locked_after_reveal() {
        let mut game = table(RED);
        game.advance(secs(7));
        assert_eq!(game.phase(), ColorPhase::Revealed);
        assert!(!game.place_bet(secs(8), Color::Red, ten()));
        assert!(game.current_bet().is_none());
    }

    #[test]
    fn test_one_bet_per_round() {
        let mut game = table(RED);
        assert!(game.place_bet(Duration::ZERO, Color::Red, ten()));
        assert!(!game.place_bet(secs(1), Color::Green, ten()));
        assert_eq!(game.current_bet().unwrap().prediction, Color::Red);
    }

    #[test]
    fn test_auto_restart_disabled_waits_for_a_bet() {
        let config = ColorConfig {
            auto_restart: false,
            ..Default::default()
        };
        let mut game = ColorGame::new(config, ScriptedRng::new([RED]), Duration::ZERO);
        game.advance(secs(60));
        assert_eq!(game.phase(), ColorPhase::Idle);

        assert!(game.place_bet(secs(60), Color::Red, ten()));
        game.advance(secs(65));
        assert_eq!(game.phase(), ColorPhase::Revealed);
        game.advance(secs(120));
        assert_eq!(game.phase(), ColorPhase::Idle);
    }

    #[test]
    fn test_countdown_events() {
        let mut game = table(RED);
        game.place_bet(Duration::ZERO, Color::Red, ten());
        for ms in (0..5_000).step_by(100) {
            game.advance(Duration::from_millis(ms));
        }
        let countdown: Vec<u64> = game
            .drain_events()
            .into_iter()
            .filter_map(|e| match e {
                ColorEvent::Countdown { seconds_left, .. } => Some(seconds_left),
                _ => None,
            })
            .collect();
        assert_eq!(countdown, vec![4, 3, 2, 1]);
    }

    #[test]
    fn test_recent_results_are_bounded() {
        let mut game = ColorGame::new(ColorConfig::default(), seeded(1), Duration::ZERO);
        // each cycle is 2s idle + 5s countdown + 3s pause
        game.advance(secs(10 * 25));
        assert_eq!(game.recent_results().count(), 10);
    }
}
