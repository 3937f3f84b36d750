//! Crash (multiplier) game
//!
//! A round counts down, then the multiplier climbs along
//! `1 + (t / 2)^1.5` until it reaches the round's hidden crash point. Players
//! who cash out before that point win `wager × multiplier`; everyone else
//! loses the stake. After the crash the result stays up for a pause, then the
//! next countdown starts. The cycle never ends on its own.
//!
//! Multipliers are kept in integer hundredths. The displayed value is the
//! curve truncated to two decimals, and every comparison against the crash
//! point or the auto-cashout threshold happens on those integers.

use crate::common::types::{GameType, Outcome, Settlement};
use crate::config::{CrashConfig, MIN_AUTO_CASHOUT_FLOOR};
use crate::errors::GameError;
use crate::games::wager::Wager;
use crate::games::{Admission, GameEngine};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Multiplier in hundredths (250 = 2.50x)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "f64", from = "f64")]
pub struct Multiplier(u32);

impl Multiplier {
    pub const ONE: Multiplier = Multiplier(100);

    pub const fn from_hundredths(hundredths: u32) -> Self {
        Self(hundredths)
    }

    pub fn hundredths(self) -> u32 {
        self.0
    }

    pub fn as_f64(self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl From<f64> for Multiplier {
    /// Rounds to the nearest hundredth
    fn from(value: f64) -> Self {
        Self((value * 100.0).round().clamp(0.0, u32::MAX as f64) as u32)
    }
}

impl From<Multiplier> for f64 {
    fn from(m: Multiplier) -> f64 {
        m.as_f64()
    }
}

impl fmt::Display for Multiplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}x", self.0 / 100, self.0 % 100)
    }
}

/// Curve value `elapsed` into a flight, floored to hundredths
pub fn multiplier_at(elapsed: Duration, config: &CrashConfig) -> Multiplier {
    let t = elapsed.as_secs_f64();
    let growth = (t / config.growth_time_scale_secs).powf(config.growth_exponent);
    let extra = (growth * 100.0).floor().min((u32::MAX - 100) as f64);
    Multiplier(100 + extra as u32)
}

/// Draw a crash point: an early crash with `early_crash_probability`,
/// otherwise a regular one. Rounded to hundredths and never below 1.01.
pub fn draw_crash_point<R: Rng + ?Sized>(rng: &mut R, config: &CrashConfig) -> Multiplier {
    let raw = if rng.gen::<f64>() < config.early_crash_probability {
        1.0 + rng.gen::<f64>() * config.early_crash_span
    } else {
        config.regular_crash_base + rng.gen::<f64>() * config.regular_crash_span
    };
    Multiplier::from(raw).max(Multiplier(101))
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CrashPhase {
    Waiting,
    Flying,
    Crashed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CrashBet {
    pub wager: Wager,
    pub cashed_out_at: Option<Multiplier>,
}

/// Current or upcoming round
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrashRound {
    pub round_id: Uuid,
    pub crash_point: Multiplier,
    pub multiplier: Multiplier,
    pub bet: Option<CrashBet>,
}

impl CrashRound {
    fn has_open_bet(&self) -> bool {
        matches!(self.bet, Some(CrashBet { cashed_out_at: None, .. }))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CrashEvent {
    RoundScheduled { round_id: Uuid, launch_in_secs: u64 },
    Countdown { round_id: Uuid, seconds_left: u64 },
    Launched { round_id: Uuid },
    MultiplierUpdated { round_id: Uuid, multiplier: Multiplier },
    BetPlaced { round_id: Uuid, wager: Wager },
    CashedOut { round_id: Uuid, multiplier: Multiplier, payout: f64, auto: bool },
    Crashed { round_id: Uuid, crash_point: Multiplier, player_lost: bool },
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
    Waiting { launch_at: Duration },
    Flying { started_at: Duration },
    Crashed { resume_at: Duration },
}

#[derive(Debug, Clone)]
pub enum CrashCommand {
    PlaceBet { wager: Wager },
    CashOut,
    SetAutoCashout(Option<f64>),
}

pub struct CrashGame<R: Rng> {
    config: CrashConfig,
    rng: R,
    state: State,
    round: CrashRound,
    auto_cashout: Option<Multiplier>,
    seconds_left: u64,
    recent_crashes: VecDeque<Multiplier>,
    events: Vec<CrashEvent>,
    settlements: Vec<Settlement>,
}

impl<R: Rng> CrashGame<R> {
    /// Start the cycle at `now` with the first countdown
    pub fn new(config: CrashConfig, mut rng: R, now: Duration) -> Self {
        let round = Self::draw_round(&mut rng, &config);
        let mut game = Self {
            recent_crashes: VecDeque::with_capacity(config.recent_crashes_len),
            config,
            rng,
            state: State::Crashed { resume_at: now },
            round,
            auto_cashout: None,
            seconds_left: 0,
            events: Vec::new(),
            settlements: Vec::new(),
        };
        game.schedule(now);
        game
    }

    pub fn phase(&self) -> CrashPhase {
        match self.state {
            State::Waiting { .. } => CrashPhase::Waiting,
            State::Flying { .. } => CrashPhase::Flying,
            State::Crashed { .. } => CrashPhase::Crashed,
        }
    }

    pub fn round(&self) -> &CrashRound {
        &self.round
    }

    pub fn multiplier(&self) -> Multiplier {
        self.round.multiplier
    }

    pub fn auto_cashout(&self) -> Option<Multiplier> {
        self.auto_cashout
    }

    /// Seconds until launch, 0 outside `Waiting`
    pub fn seconds_left(&self) -> u64 {
        self.seconds_left
    }

    /// Newest first
    pub fn recent_crashes(&self) -> impl Iterator<Item = Multiplier> + '_ {
        self.recent_crashes.iter().copied()
    }

    /// Configure (or clear) the auto-cashout threshold.
    ///
    /// Thresholds below the configured minimum are rejected and leave the
    /// previous setting in place.
    pub fn set_auto_cashout(&mut self, threshold: Option<f64>) -> Result<(), GameError> {
        self.auto_cashout = match threshold {
            None => None,
            Some(value) => Some(self.validate_auto_cashout(value)?),
        };
        Ok(())
    }

    fn validate_auto_cashout(&self, value: f64) -> Result<Multiplier, GameError> {
        let minimum = self.config.min_auto_cashout.max(MIN_AUTO_CASHOUT_FLOOR);
        if !value.is_finite() || value < minimum {
            return Err(GameError::InvalidAutoCashout { value, minimum });
        }
        Ok(Multiplier::from(value))
    }

    pub fn accepts_bets(&mut self, now: Duration) -> bool {
        self.advance(now);
        self.phase() == CrashPhase::Waiting && self.round.bet.is_none()
    }

    /// Stake on the upcoming round. Only possible during the countdown.
    pub fn place_bet(&mut self, now: Duration, wager: Wager) -> bool {
        if !self.accepts_bets(now) {
            debug!("Crash bet rejected in phase {:?}", self.phase());
            return false;
        }
        self.round.bet = Some(CrashBet {
            wager,
            cashed_out_at: None,
        });
        self.events.push(CrashEvent::BetPlaced {
            round_id: self.round.round_id,
            wager,
        });
        true
    }

    /// Manual cashout at the multiplier current as of `now`.
    ///
    /// The engine advances to `now` first, so a request that lands after the
    /// crash tick finds the round already crashed. Returns `None` for every
    /// no-op: not flying, no stake, or already cashed out.
    pub fn cash_out(&mut self, now: Duration) -> Option<Settlement> {
        self.advance(now);
        if self.phase() != CrashPhase::Flying {
            return None;
        }
        self.settle_cashout(false)
    }

    /// Advance the cycle to `now`
    pub fn advance(&mut self, now: Duration) {
        loop {
            match self.state {
                State::Waiting { launch_at } if now >= launch_at => self.launch(launch_at),
                State::Waiting { launch_at } => {
                    let seconds = (launch_at - now).as_millis().div_ceil(1_000) as u64;
                    if seconds != self.seconds_left {
                        self.seconds_left = seconds;
                        self.events.push(CrashEvent::Countdown {
                            round_id: self.round.round_id,
                            seconds_left: seconds,
                        });
                    }
                    break;
                }
                State::Flying { started_at } => {
                    self.fly(now, started_at);
                    if self.phase() == CrashPhase::Flying {
                        break;
                    }
                }
                State::Crashed { resume_at } if now >= resume_at => {
                    self.round = Self::draw_round(&mut self.rng, &self.config);
                    self.schedule(resume_at);
                }
                State::Crashed { .. } => break,
            }
        }
    }

    fn draw_round(rng: &mut R, config: &CrashConfig) -> CrashRound {
        CrashRound {
            round_id: Uuid::new_v4(),
            crash_point: draw_crash_point(rng, config),
            multiplier: Multiplier::ONE,
            bet: None,
        }
    }

    fn schedule(&mut self, at: Duration) {
        let seconds = self.config.countdown_secs;
        self.state = State::Waiting {
            launch_at: at + Duration::from_secs(seconds),
        };
        self.seconds_left = seconds;
        self.events.push(CrashEvent::RoundScheduled {
            round_id: self.round.round_id,
            launch_in_secs: seconds,
        });
    }

    fn launch(&mut self, at: Duration) {
        debug!("Crash round {} launched", self.round.round_id);
        self.state = State::Flying { started_at: at };
        self.seconds_left = 0;
        self.round.multiplier = Multiplier::ONE;
        self.events.push(CrashEvent::Launched {
            round_id: self.round.round_id,
        });
    }

    fn fly(&mut self, now: Duration, started_at: Duration) {
        let sampled = multiplier_at(now.saturating_sub(started_at), &self.config);
        let moved = sampled > self.round.multiplier;
        if moved {
            self.round.multiplier = sampled;
        }

        let current = self.round.multiplier;
        let crash_point = self.round.crash_point;

        if let Some(threshold) = self.auto_cashout {
            if current >= threshold && current < crash_point && self.round.has_open_bet() {
                self.settle_cashout(true);
            }
        }

        if current >= crash_point {
            // never record a value past the crash point
            self.round.multiplier = crash_point;
            self.crash(now);
        } else if moved {
            self.events.push(CrashEvent::MultiplierUpdated {
                round_id: self.round.round_id,
                multiplier: current,
            });
        }
    }

    fn settle_cashout(&mut self, auto: bool) -> Option<Settlement> {
        let round = &mut self.round;
        let bet = round.bet.as_mut()?;
        if bet.cashed_out_at.is_some() {
            return None;
        }

        let at = round.multiplier;
        bet.cashed_out_at = Some(at);
        let payout = bet.wager.scaled(at.as_f64());
        let settlement =
            Settlement::new(round.round_id, GameType::Crash, bet.wager, payout, Outcome::Win);

        info!(
            "Crash round {} cashed out at {} for {:.2}{}",
            round.round_id,
            at,
            payout,
            if auto { " (auto)" } else { "" }
        );

        self.events.push(CrashEvent::CashedOut {
            round_id: round.round_id,
            multiplier: at,
            payout,
            auto,
        });
        self.settlements.push(settlement.clone());
        Some(settlement)
    }

    fn crash(&mut self, now: Duration) {
        let round = &self.round;
        let player_lost = round.has_open_bet();

        if let Some(bet) = round.bet.filter(|_| player_lost) {
            self.settlements.push(Settlement::new(
                round.round_id,
                GameType::Crash,
                bet.wager,
                0.0,
                Outcome::Lose,
            ));
        }

        info!("Crash round {} crashed at {}", round.round_id, round.crash_point);

        self.events.push(CrashEvent::Crashed {
            round_id: round.round_id,
            crash_point: round.crash_point,
            player_lost,
        });

        self.recent_crashes.push_front(round.crash_point);
        self.recent_crashes.truncate(self.config.recent_crashes_len);

        self.state = State::Crashed {
            resume_at: now + Duration::from_millis(self.config.crash_pause_ms),
        };
    }
}

impl<R: Rng + Send + 'static> GameEngine for CrashGame<R> {
    type Command = CrashCommand;
    type Event = CrashEvent;

    fn game_type(&self) -> GameType {
        GameType::Crash
    }

    fn tick(&mut self, now: Duration) {
        self.advance(now);
    }

    fn admit(&mut self, now: Duration, command: &CrashCommand) -> Admission {
        match command {
            CrashCommand::PlaceBet { wager } => {
                if self.accepts_bets(now) {
                    Admission::Stake(*wager)
                } else {
                    Admission::Reject("bets are only taken before launch".to_string())
                }
            }
            CrashCommand::CashOut => Admission::Free,
            CrashCommand::SetAutoCashout(Some(value)) => match self.validate_auto_cashout(*value) {
                Ok(_) => Admission::Free,
                Err(e) => Admission::Invalid(e),
            },
            CrashCommand::SetAutoCashout(None) => Admission::Free,
        }
    }

    fn apply(&mut self, now: Duration, command: CrashCommand) -> bool {
        match command {
            CrashCommand::PlaceBet { wager } => self.place_bet(now, wager),
            CrashCommand::CashOut => self.cash_out(now).is_some(),
            CrashCommand::SetAutoCashout(threshold) => self.set_auto_cashout(threshold).is_ok(),
        }
    }

    fn drain_events(&mut self) -> Vec<CrashEvent> {
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

    const FRAME: Duration = Duration::from_millis(16);

    /// Scripted draws producing a regular round crashing at `point`
    fn crashing_at(point: f64) -> ScriptedRng {
        let config = CrashConfig::default();
        ScriptedRng::new([0.5, (point - config.regular_crash_base) / config.regular_crash_span])
    }

    fn run_frames<R: Rng>(game: &mut CrashGame<R>, from: Duration, to: Duration) {
        let mut now = from;
        while now <= to {
            game.advance(now);
            now += FRAME;
        }
    }

    fn ten() -> Wager {
        Wager::new(10.0).unwrap()
    }

    #[test]
    fn test_multiplier_curve() {
        let config = CrashConfig::default();
        assert_eq!(multiplier_at(Duration::ZERO, &config), Multiplier::ONE);
        assert_eq!(multiplier_at(Duration::from_secs(1), &config).hundredths(), 135);
        assert_eq!(multiplier_at(Duration::from_secs(2), &config).hundredths(), 200);
        assert_eq!(multiplier_at(Duration::from_secs(4), &config).hundredths(), 382);
    }

    #[test]
    fn test_multiplier_is_non_decreasing() {
        let config = CrashConfig::default();
        let mut previous = Multiplier::ONE;
        for ms in 0..30_000 {
            let m = multiplier_at(Duration::from_millis(ms), &config);
            assert!(m >= previous, "dropped at {}ms", ms);
            previous = m;
        }
    }

    #[test]
    fn test_crash_point_draws() {
        let config = CrashConfig::default();
        assert_eq!(draw_crash_point(&mut ScriptedRng::new([0.1, 0.5]), &config).hundredths(), 125);
        assert_eq!(draw_crash_point(&mut ScriptedRng::new([0.5, 0.5]), &config).hundredths(), 555);
        // an early draw of 1.00 is lifted to 1.01
        assert_eq!(draw_crash_point(&mut ScriptedRng::new([0.1, 0.0]), &config).hundredths(), 101);

        let mut rng = seeded(99);
        for _ in 0..50_000 {
            let point = draw_crash_point(&mut rng, &config).hundredths();
            assert!((101..=1000).contains(&point), "out of range: {}", point);
        }
    }

    #[test]
    fn test_multiplier_display() {
        assert_eq!(Multiplier::from_hundredths(250).to_string(), "2.50x");
        assert_eq!(Multiplier::from(1.1).hundredths(), 110);
    }

    #[test]
    fn test_auto_cashout_locks_in_payout() {
        let mut game = CrashGame::new(CrashConfig::default(), crashing_at(2.5), Duration::ZERO);
        assert_eq!(game.round().crash_point.hundredths(), 250);

        assert!(game.place_bet(Duration::ZERO, ten()));
        game.set_auto_cashout(Some(2.0)).unwrap();

        // launch at 3s, crash ~2.62s later
        run_frames(&mut game, Duration::ZERO, Duration::from_secs(6));
        assert_eq!(game.phase(), CrashPhase::Crashed);
        assert_eq!(game.multiplier().hundredths(), 250);

        let settlements = game.drain_settlements();
        assert_eq!(settlements.len(), 1);
        assert_eq!(settlements[0].payout, 20.0);
        assert_eq!(settlements[0].outcome, Outcome::Win);
        assert_eq!(
            game.round().bet.unwrap().cashed_out_at,
            Some(Multiplier::from_hundredths(200))
        );

        let crashed = game.drain_events().into_iter().any(|e| {
            matches!(e, CrashEvent::Crashed { player_lost: false, .. })
        });
        assert!(crashed);
    }

    #[test]
    fn test_uncashed_bet_loses_on_crash() {
        let mut game = CrashGame::new(CrashConfig::default(), crashing_at(1.5), Duration::ZERO);
        game.place_bet(Duration::ZERO, ten());
        run_frames(&mut game, Duration::ZERO, Duration::from_secs(5));

        let settlements = game.drain_settlements();
        assert_eq!(settlements.len(), 1);
        assert_eq!(settlements[0].payout, 0.0);
        assert_eq!(settlements[0].outcome, Outcome::Lose);
    }

    #[test]
    fn test_recorded_multiplier_never_passes_crash_point() {
        // 1.01 crash with a coarse one-second tick: the curve is already at 1.35
        let script = ScriptedRng::new([0.1, 0.0]);
        let mut game = CrashGame::new(CrashConfig::default(), script, Duration::ZERO);
        game.advance(Duration::from_secs(3));
        assert_eq!(game.phase(), CrashPhase::Flying);
        game.advance(Duration::from_secs(4));

        assert_eq!(game.phase(), CrashPhase::Crashed);
        assert_eq!(game.multiplier().hundredths(), 101);
    }

    #[test]
    fn test_cashout_is_idempotent() {
        let mut game = CrashGame::new(CrashConfig::default(), crashing_at(9.0), Duration::ZERO);
        game.place_bet(Duration::ZERO, ten());

        let first = game.cash_out(Duration::from_secs(5)).expect("cashout while flying");
        assert_eq!(first.payout, 20.0);
        assert!(game.cash_out(Duration::from_millis(5_500)).is_none());
        assert_eq!(game.drain_settlements().len(), 1);
    }

    #[test]
    fn test_late_cashout_loses_to_crash() {
        let mut game = CrashGame::new(CrashConfig::default(), crashing_at(1.5), Duration::ZERO);
        game.place_bet(Duration::ZERO, ten());
        game.advance(Duration::from_millis(4_200));
        assert_eq!(game.phase(), CrashPhase::Flying);

        // 1.50 is reached ~1.26s after launch
        assert!(game.cash_out(Duration::from_millis(4_300)).is_none());
        assert_eq!(game.phase(), CrashPhase::Crashed);
        assert_eq!(game.drain_settlements()[0].outcome, Outcome::Lose);
    }

    #[test]
    fn test_cashout_without_bet_or_before_launch_is_noop() {
        let mut game = CrashGame::new(CrashConfig::default(), crashing_at(9.0), Duration::ZERO);
        assert!(game.cash_out(Duration::from_secs(1)).is_none());
        assert!(game.cash_out(Duration::from_secs(4)).is_none());
        assert!(game.drain_settlements().is_empty());
    }

    #[test]
    fn test_auto_cashout_threshold_validation() {
        let mut game = CrashGame::new(CrashConfig::default(), seeded(3), Duration::ZERO);
        assert!(matches!(
            game.set_auto_cashout(Some(1.05)),
            Err(GameError::InvalidAutoCashout { .. })
        ));
        assert!(game.set_auto_cashout(Some(f64::NAN)).is_err());
        assert_eq!(game.auto_cashout(), None);

        game.set_auto_cashout(Some(1.1)).unwrap();
        assert_eq!(game.auto_cashout(), Some(Multiplier::from_hundredths(110)));
        assert!(game.set_auto_cashout(Some(0.5)).is_err());
        assert_eq!(game.auto_cashout(), Some(Multiplier::from_hundredths(110)));

        game.set_auto_cashout(None).unwrap();
        assert_eq!(game.auto_cashout(), None);
    }

    #[test]
    fn test_lenient_config_cannot_lower_the_auto_cashout_floor() {
        let config = CrashConfig {
            min_auto_cashout: 1.0,
            ..CrashConfig::default()
        };
        let mut game = CrashGame::new(config, seeded(3), Duration::ZERO);
        assert_eq!(
            game.set_auto_cashout(Some(1.05)),
            Err(GameError::InvalidAutoCashout {
                value: 1.05,
                minimum: 1.1
            })
        );
    }

    #[test]
    fn test_bets_close_at_launch() {
        let mut game = CrashGame::new(CrashConfig::default(), crashing_at(9.0), Duration::ZERO);
        game.advance(Duration::from_secs(3));
        assert_eq!(game.phase(), CrashPhase::Flying);
        assert!(!game.place_bet(Duration::from_secs(3), ten()));
    }

    #[test]
    fn test_cycle_restarts_forever() {
        let mut game = CrashGame::new(CrashConfig::default(), seeded(11), Duration::ZERO);
        run_frames(&mut game, Duration::ZERO, Duration::from_secs(300));

        let events = game.drain_events();
        let launches = events
            .iter()
            .filter(|e| matches!(e, CrashEvent::Launched { .. }))
            .count();
        let crashes = events
            .iter()
            .filter(|e| matches!(e, CrashEvent::Crashed { .. }))
            .count();
        // every cycle is at least 6s of pause and countdown
        assert!(launches >= 10, "only {} launches", launches);
        assert!(crashes + 1 >= launches);
        assert_eq!(game.recent_crashes().count(), 10);
    }

    #[test]
    fn test_multiplier_events_increase_within_a_round() {
        let mut game = CrashGame::new(CrashConfig::default(), crashing_at(6.0), Duration::ZERO);
        run_frames(&mut game, Duration::ZERO, Duration::from_secs(12));

        let values: Vec<u32> = game
            .drain_events()
            .into_iter()
            .filter_map(|e| match e {
                CrashEvent::MultiplierUpdated { multiplier, .. } => Some(multiplier.hundredths()),
                _ => None,
            })
            .collect();
        assert!(!values.is_empty());
        assert!(values.windows(2).all(|w| w[0] < w[1]));
        assert!(values.iter().all(|v| *v < 600));
    }
}
