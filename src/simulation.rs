//! Headless simulation harness
//!
//! Plays a number of rounds of one game on a virtual clock, with a seeded
//! engine and a seeded player, and reports win rate and realised house edge.
//! The same seed always produces the same report.

use crate::common::types::{GameType, Outcome, Settlement};
use crate::config::ArcadeConfig;
use crate::errors::{ArcadeResult, SessionError};
use crate::games::color::{Color, ColorGame};
use crate::games::crash::CrashGame;
use crate::games::rng::{pick_index, seeded, GameRng};
use crate::games::tictactoe::{Mark, TicTacToeGame};
use crate::games::wager::Wager;
use crate::games::GameEngine;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Longest a single round may take on the virtual clock
const ROUND_LIMIT: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationOptions {
    pub game: GameType,
    pub rounds: usize,
    pub seed: u64,
    pub wager: f64,
    /// Auto-cashout target used by the crash player
    pub crash_target: f64,
}

impl SimulationOptions {
    pub fn new(game: GameType, rounds: usize, seed: u64) -> Self {
        Self {
            game,
            rounds,
            seed,
            wager: 10.0,
            crash_target: 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationReport {
    pub game_type: GameType,
    pub seed: u64,
    pub rounds: usize,
    pub wins: usize,
    pub losses: usize,
    pub draws: usize,
    pub total_wagered: f64,
    pub total_paid_out: f64,
    pub win_rate: f64,
    pub house_edge: f64,
    pub simulated_time: Duration,
}

impl SimulationReport {
    fn new(game_type: GameType, seed: u64) -> Self {
        Self {
            game_type,
            seed,
            rounds: 0,
            wins: 0,
            losses: 0,
            draws: 0,
            total_wagered: 0.0,
            total_paid_out: 0.0,
            win_rate: 0.0,
            house_edge: 0.0,
            simulated_time: Duration::ZERO,
        }
    }

    fn record(&mut self, settlement: &Settlement) {
        match settlement.outcome {
            Outcome::Win => self.wins += 1,
            Outcome::Lose => self.losses += 1,
            Outcome::Draw => self.draws += 1,
            Outcome::Cancelled => return,
        }
        self.rounds += 1;
        self.total_wagered += settlement.wager.amount();
        self.total_paid_out += settlement.payout;
    }

    fn finish(mut self, simulated_time: Duration) -> Self {
        self.simulated_time = simulated_time;
        if self.rounds > 0 {
            self.win_rate = self.wins as f64 / self.rounds as f64;
        }
        if self.total_wagered > 0.0 {
            self.house_edge = (self.total_wagered - self.total_paid_out) / self.total_wagered;
        }
        self
    }
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Game:          {}", self.game_type)?;
        writeln!(f, "Seed:          {}", self.seed)?;
        writeln!(
            f,
            "Rounds:        {} ({} won, {} lost, {} drawn)",
            self.rounds, self.wins, self.losses, self.draws
        )?;
        writeln!(f, "Wagered:       {:.2}", self.total_wagered)?;
        writeln!(f, "Paid out:      {:.2}", self.total_paid_out)?;
        writeln!(f, "Win rate:      {:.2}%", self.win_rate * 100.0)?;
        writeln!(f, "House edge:    {:.2}%", self.house_edge * 100.0)?;
        write!(f, "Virtual time:  {:.1}s", self.simulated_time.as_secs_f64())
    }
}

pub struct Simulator {
    config: ArcadeConfig,
}

impl Simulator {
    pub fn new(config: ArcadeConfig) -> Self {
        Self { config }
    }

    pub fn run(&self, options: &SimulationOptions) -> ArcadeResult<SimulationReport> {
        let wager = Wager::new(options.wager)?;
        let started = Instant::now();

        info!(
            "Simulating {} rounds of {} with seed {}",
            options.rounds, options.game, options.seed
        );

        let report = match options.game {
            GameType::Color => self.run_color(options, wager),
            GameType::Crash => self.run_crash(options, wager),
            GameType::TicTacToe => self.run_tictactoe(options, wager),
        }?;

        info!(
            "Simulation finished in {:?}: win rate {:.4}, house edge {:.4}",
            started.elapsed(),
            report.win_rate,
            report.house_edge
        );
        Ok(report)
    }

    fn step(&self) -> Duration {
        self.config.tick_interval().max(Duration::from_millis(1))
    }

    fn player_rng(seed: u64) -> GameRng {
        seeded(seed.wrapping_add(0x9E37_79B9))
    }

    fn run_color(
        &self,
        options: &SimulationOptions,
        wager: Wager,
    ) -> ArcadeResult<SimulationReport> {
        let mut game = ColorGame::new(
            self.config.color.clone(),
            seeded(options.seed),
            Duration::ZERO,
        );
        let mut player = Self::player_rng(options.seed);
        let mut report = SimulationReport::new(GameType::Color, options.seed);
        let mut clock = Clock::new(self.step());

        while report.rounds < options.rounds {
            clock.run_until(&mut game, |game, now| game.accepts_bets(now))?;
            let prediction = if player.gen_bool(0.5) { Color::Red } else { Color::Green };
            game.place_bet(clock.now, prediction, wager);

            let settlement = clock.next_settlement(&mut game, |_, _| {})?;
            report.record(&settlement);
        }
        Ok(report.finish(clock.now))
    }

    fn run_crash(
        &self,
        options: &SimulationOptions,
        wager: Wager,
    ) -> ArcadeResult<SimulationReport> {
        let mut game = CrashGame::new(
            self.config.crash.clone(),
            seeded(options.seed),
            Duration::ZERO,
        );
        game.set_auto_cashout(Some(options.crash_target))?;
        let mut report = SimulationReport::new(GameType::Crash, options.seed);
        let mut clock = Clock::new(self.step());

        while report.rounds < options.rounds {
            clock.run_until(&mut game, |game, now| game.accepts_bets(now))?;
            game.place_bet(clock.now, wager);

            let settlement = clock.next_settlement(&mut game, |_, _| {})?;
            report.record(&settlement);
        }
        Ok(report.finish(clock.now))
    }

    fn run_tictactoe(
        &self,
        options: &SimulationOptions,
        wager: Wager,
    ) -> ArcadeResult<SimulationReport> {
        let mut game =
            TicTacToeGame::bots_only(self.config.tictactoe.clone(), seeded(options.seed));
        let mut player = Self::player_rng(options.seed);
        let mut report = SimulationReport::new(GameType::TicTacToe, options.seed);
        let mut clock = Clock::new(self.step());

        while report.rounds < options.rounds {
            game.join(clock.now, wager, Mark::X);

            let settlement = clock.next_settlement(&mut game, |game, now| {
                let open = match game.current_match() {
                    Some(current) if current.is_player_turn() => {
                        current.board.open_cells().collect::<Vec<_>>()
                    }
                    _ => return,
                };
                if let Some(i) = pick_index(&mut player, open.len()) {
                    game.play(now, open[i]);
                }
            })?;
            report.record(&settlement);
        }
        Ok(report.finish(clock.now))
    }
}

/// Virtual clock stepping an engine forward
struct Clock {
    now: Duration,
    step: Duration,
}

impl Clock {
    fn new(step: Duration) -> Self {
        Self {
            now: Duration::ZERO,
            step,
        }
    }

    fn run_until<G, F>(&mut self, engine: &mut G, mut ready: F) -> ArcadeResult<()>
    where
        G: GameEngine,
        F: FnMut(&mut G, Duration) -> bool,
    {
        let deadline = self.now + ROUND_LIMIT;
        while !ready(engine, self.now) {
            if self.now >= deadline {
                return Err(
                    SessionError::Rejected("engine never opened for bets".to_string()).into(),
                );
            }
            self.now += self.step;
            engine.tick(self.now);
            engine.drain_events();
        }
        Ok(())
    }

    /// Step until the engine settles a round, calling `on_tick` each step
    fn next_settlement<G, F>(&mut self, engine: &mut G, mut on_tick: F) -> ArcadeResult<Settlement>
    where
        G: GameEngine,
        F: FnMut(&mut G, Duration),
    {
        let deadline = self.now + ROUND_LIMIT;
        loop {
            on_tick(engine, self.now);
            engine.drain_events();
            if let Some(settlement) = engine.drain_settlements().into_iter().next() {
                debug!("Simulated round settled: {:?}", settlement.outcome);
                return Ok(settlement);
            }
            if self.now >= deadline {
                return Err(SessionError::Rejected("round never settled".to_string()).into());
            }
            self.now += self.step;
            engine.tick(self.now);
        }
    }
}
