//! End-to-end engine scenarios on a virtual clock

use arcade::config::{ColorConfig, CrashConfig, TicTacToeConfig};
use arcade::games::color::{Color, ColorGame, ColorPhase};
use arcade::games::crash::{CrashEvent, CrashGame, CrashPhase, Multiplier};
use arcade::games::rng::{seeded, ScriptedRng};
use arcade::games::tictactoe::{Board, BoardState, Mark, MatchStatus, OpponentKind, TicTacToeGame};
use arcade::games::{GameEngine, Wager};
use arcade::Outcome;
use std::time::Duration;

const FRAME: Duration = Duration::from_millis(16);

fn ten() -> Wager {
    Wager::new(10.0).unwrap()
}

#[test]
fn crash_auto_cashout_at_two_against_crash_at_two_fifty() {
    let config = CrashConfig::default();
    let draw = (2.5 - config.regular_crash_base) / config.regular_crash_span;
    let script = ScriptedRng::new([0.5, draw]);
    let mut game = CrashGame::new(config, script, Duration::ZERO);

    assert!(game.place_bet(Duration::ZERO, ten()));
    game.set_auto_cashout(Some(2.0)).unwrap();

    let mut now = Duration::ZERO;
    while game.phase() != CrashPhase::Crashed {
        now += FRAME;
        game.advance(now);
        assert!(now < Duration::from_secs(20), "round never crashed");
    }

    assert_eq!(game.multiplier(), Multiplier::from_hundredths(250));
    let settlements = game.drain_settlements();
    assert_eq!(settlements.len(), 1);
    assert_eq!(settlements[0].payout, 20.0);
    assert_eq!(settlements[0].outcome, Outcome::Win);

    let events = game.drain_events();
    let cashed = events.iter().position(|e| matches!(e, CrashEvent::CashedOut { auto: true, .. }));
    let crashed = events.iter().position(|e| matches!(e, CrashEvent::Crashed { .. }));
    assert!(cashed.unwrap() < crashed.unwrap());
}

#[test]
fn tictactoe_top_row_is_found_first() {
    let x = Some(Mark::X);
    let o = Some(Mark::O);
    let board = Board::from_cells([x, x, x, o, o, None, None, None, None]);

    match board.state() {
        BoardState::Won { mark, line } => {
            assert_eq!(mark, Mark::X);
            assert_eq!(line, [0, 1, 2]);
        }
        other => panic!("expected a win, got {:?}", other),
    }
}

#[test]
fn color_red_prediction_loses_to_green() {
    // 0.9 is above the red probability, so the reveal is green
    let mut game = ColorGame::new(ColorConfig::default(), ScriptedRng::new([0.9]), Duration::ZERO);
    assert!(game.place_bet(Duration::ZERO, Color::Red, ten()));

    game.advance(Duration::from_secs(5));
    assert_eq!(game.phase(), ColorPhase::Revealed);

    let round = game.last_round().unwrap();
    assert_eq!(round.outcome, Color::Green);
    assert_eq!(round.result, Some(Outcome::Lose));
    assert_eq!(round.payout, 0.0);

    let settlement = &game.drain_settlements()[0];
    assert_eq!(settlement.payout, 0.0);
    assert_eq!(settlement.outcome, Outcome::Lose);
}

#[test]
fn tictactoe_falls_back_to_a_named_bot() {
    let config = TicTacToeConfig::default();
    let mut game = TicTacToeGame::bots_only(config.clone(), seeded(2024));

    assert!(game.join(Duration::ZERO, ten(), Mark::X));
    assert_eq!(game.status(), Some(MatchStatus::Waiting));

    let mut now = Duration::ZERO;
    while now < Duration::from_secs(10) {
        now += FRAME;
        game.tick(now);
        if now < Duration::from_secs(10) {
            assert_eq!(game.status(), Some(MatchStatus::Waiting));
        }
    }

    let current = game.current_match().unwrap();
    assert_eq!(current.status, MatchStatus::Playing);
    let opponent = current.opponent.as_ref().unwrap();
    assert_eq!(opponent.kind, OpponentKind::Bot);
    assert!(config.bot_names.contains(&opponent.name));
}
