//! Configuration management with validation and defaults
//!
//! Every tunable of the three games lives here: house-edge parameters, timer
//! lengths, preset wagers and runtime cadence. `ConfigLoader` reads an
//! optional TOML file, applies `ARCADE_*` environment overrides and validates
//! the result.

use crate::errors::{ArcadeResult, ConfigurationError};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Highest crash point either crash range may produce
pub const MAX_CRASH_POINT: f64 = 10.0;

/// Lowest auto-cashout threshold a configuration may allow
pub const MIN_AUTO_CASHOUT_FLOOR: f64 = 1.1;

/// Top-level arcade configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ArcadeConfig {
    pub wager: WagerConfig,
    pub color: ColorConfig,
    pub crash: CrashConfig,
    pub tictactoe: TicTacToeConfig,
    pub session: SessionConfig,
    pub monitoring: MonitoringConfig,
}

/// Bet amount selector configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WagerConfig {
    pub presets: Vec<f64>,
    pub default_amount: f64,
}

impl Default for WagerConfig {
    fn default() -> Self {
        Self {
            presets: vec![2.0, 5.0, 10.0, 20.0, 50.0, 100.0],
            default_amount: 10.0,
        }
    }
}

/// Red/green prediction game configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ColorConfig {
    /// Probability that a round comes up red. Green takes the rest.
    pub red_probability: f64,
    pub payout_multiplier: f64,
    /// Delay before the house starts the next round on its own
    pub idle_delay_ms: u64,
    pub countdown_secs: u64,
    /// How long a revealed colour stays on screen
    pub reveal_pause_ms: u64,
    pub auto_restart: bool,
    pub recent_results_len: usize,
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            red_probability: 0.48,
            payout_multiplier: 2.0,
            idle_delay_ms: 2_000,
            countdown_secs: 5,
            reveal_pause_ms: 3_000,
            auto_restart: true,
            recent_results_len: 10,
        }
    }
}

/// Crash (multiplier) game configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CrashConfig {
    pub early_crash_probability: f64,
    /// Early crash points are drawn from `1 + U(0, early_crash_span)`
    pub early_crash_span: f64,
    /// Regular crash points are drawn from `regular_crash_base + U(0, regular_crash_span)`
    pub regular_crash_base: f64,
    pub regular_crash_span: f64,
    /// `multiplier(t) = 1 + (t / growth_time_scale_secs) ^ growth_exponent`
    pub growth_time_scale_secs: f64,
    pub growth_exponent: f64,
    pub min_auto_cashout: f64,
    pub crash_pause_ms: u64,
    pub countdown_secs: u64,
    pub recent_crashes_len: usize,
}

impl Default for CrashConfig {
    fn default() -> Self {
        Self {
            early_crash_probability: 0.2,
            early_crash_span: 0.5,
            regular_crash_base: 1.1,
            regular_crash_span: 8.9,
            growth_time_scale_secs: 2.0,
            growth_exponent: 1.5,
            min_auto_cashout: 1.1,
            crash_pause_ms: 3_000,
            countdown_secs: 3,
            recent_crashes_len: 10,
        }
    }
}

/// Tic-tac-toe matchmaking configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TicTacToeConfig {
    pub matchmaking_timeout_ms: u64,
    pub bot_move_delay_ms: u64,
    pub win_multiplier: f64,
    pub bot_names: Vec<String>,
}

impl Default for TicTacToeConfig {
    fn default() -> Self {
        Self {
            matchmaking_timeout_ms: 10_000,
            bot_move_delay_ms: 1_000,
            win_multiplier: 2.0,
            bot_names: [
                "Alex", "Jamie", "Jordan", "Taylor", "Casey", "Riley", "Avery", "Quinn", "Morgan",
                "Skyler",
            ]
            .iter()
            .map(|name| name.to_string())
            .collect(),
        }
    }
}

/// Session runtime cadence
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Scheduler tick. 16ms approximates an animation frame.
    pub tick_interval_ms: u64,
    pub command_buffer: usize,
    pub event_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 16,
            command_buffer: 64,
            event_buffer: 1_024,
        }
    }
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonitoringConfig {
    pub log_level: LogLevel,
    pub history_page_size: usize,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            history_page_size: 10,
        }
    }
}

impl ArcadeConfig {
    /// Short timers for tests and headless simulation
    pub fn fast_testing() -> Self {
        Self {
            color: ColorConfig {
                idle_delay_ms: 100,
                countdown_secs: 1,
                reveal_pause_ms: 100,
                ..Default::default()
            },
            crash: CrashConfig {
                crash_pause_ms: 100,
                countdown_secs: 1,
                ..Default::default()
            },
            tictactoe: TicTacToeConfig {
                matchmaking_timeout_ms: 500,
                bot_move_delay_ms: 50,
                ..Default::default()
            },
            session: SessionConfig {
                tick_interval_ms: 10,
                ..Default::default()
            },
            monitoring: MonitoringConfig {
                log_level: LogLevel::Debug,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Validate configuration for logical consistency
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        // Wagers
        if self.wager.presets.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "wager.presets must list at least one amount".to_string(),
            ));
        }
        if let Some(bad) = self
            .wager
            .presets
            .iter()
            .find(|amount| !amount.is_finite() || **amount <= 0.0)
        {
            return Err(ConfigValidationError::InvalidValue(format!(
                "wager.presets contains non-positive amount {}",
                bad
            )));
        }
        if !self.wager.default_amount.is_finite() || self.wager.default_amount <= 0.0 {
            return Err(ConfigValidationError::InvalidValue(
                "wager.default_amount must be > 0".to_string(),
            ));
        }

        // Colour game
        check_probability("color.red_probability", self.color.red_probability)?;
        if self.color.payout_multiplier < 1.0 {
            return Err(ConfigValidationError::InvalidValue(
                "color.payout_multiplier must be >= 1".to_string(),
            ));
        }
        if self.color.countdown_secs == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "color.countdown_secs must be > 0".to_string(),
            ));
        }
        if self.color.recent_results_len == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "color.recent_results_len must be > 0".to_string(),
            ));
        }

        // Crash game
        let crash = &self.crash;
        check_probability("crash.early_crash_probability", crash.early_crash_probability)?;
        if crash.early_crash_span <= 0.0 || crash.regular_crash_span <= 0.0 {
            return Err(ConfigValidationError::InvalidValue(
                "crash point spans must be > 0".to_string(),
            ));
        }
        if crash.regular_crash_base < 1.0 {
            return Err(ConfigValidationError::InvalidValue(
                "crash.regular_crash_base must be >= 1".to_string(),
            ));
        }
        if 1.0 + crash.early_crash_span > MAX_CRASH_POINT + 1e-9
            || crash.regular_crash_base + crash.regular_crash_span > MAX_CRASH_POINT + 1e-9
        {
            return Err(ConfigValidationError::LogicalInconsistency(format!(
                "crash ranges must stay within {:.2}x",
                MAX_CRASH_POINT
            )));
        }
        if crash.growth_time_scale_secs <= 0.0 || crash.growth_exponent <= 0.0 {
            return Err(ConfigValidationError::InvalidValue(
                "crash growth parameters must be > 0".to_string(),
            ));
        }
        if !crash.min_auto_cashout.is_finite() || crash.min_auto_cashout < MIN_AUTO_CASHOUT_FLOOR {
            return Err(ConfigValidationError::InvalidValue(format!(
                "crash.min_auto_cashout must be >= {}",
                MIN_AUTO_CASHOUT_FLOOR
            )));
        }
        if crash.countdown_secs == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "crash.countdown_secs must be > 0".to_string(),
            ));
        }

        // Tic-tac-toe
        if self.tictactoe.bot_names.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "tictactoe.bot_names must not be empty".to_string(),
            ));
        }
        if self.tictactoe.matchmaking_timeout_ms == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "tictactoe.matchmaking_timeout_ms must be > 0".to_string(),
            ));
        }

        // Session
        if self.session.tick_interval_ms == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "session.tick_interval_ms must be > 0".to_string(),
            ));
        }
        if self.session.command_buffer == 0 || self.session.event_buffer == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "session buffers must be > 0".to_string(),
            ));
        }

        // A tick coarser than the colour countdown second would skip whole countdown steps
        if self.session.tick_interval_ms > 1_000 {
            return Err(ConfigValidationError::LogicalInconsistency(
                "session.tick_interval_ms must not exceed one countdown second".to_string(),
            ));
        }

        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.session.tick_interval_ms)
    }

    pub fn matchmaking_timeout(&self) -> Duration {
        Duration::from_millis(self.tictactoe.matchmaking_timeout_ms)
    }

    pub fn bot_move_delay(&self) -> Duration {
        Duration::from_millis(self.tictactoe.bot_move_delay_ms)
    }
}

fn check_probability(field: &str, value: f64) -> Result<(), ConfigValidationError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigValidationError::InvalidValue(format!(
            "{} must be within [0, 1], got {}",
            field, value
        )));
    }
    Ok(())
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigValidationError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
    #[error("Configuration logical inconsistency: {0}")]
    LogicalInconsistency(String),
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

impl From<ConfigValidationError> for ConfigurationError {
    fn from(e: ConfigValidationError) -> Self {
        ConfigurationError::ValidationFailed(e.to_string())
    }
}

/// Configuration loader with environment variable support
#[derive(Debug, Default)]
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Set the configuration file path
    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Load configuration from file and environment variables
    pub fn load(&self) -> ArcadeResult<ArcadeConfig> {
        let mut config = match self.config_path {
            Some(ref path) => Self::load_from_file(path)?,
            None => ArcadeConfig::default(),
        };

        apply_overrides(&mut config, |key| env::var(key).ok())?;

        config.validate().map_err(ConfigurationError::from)?;

        Ok(config)
    }

    fn load_from_file(path: &Path) -> ArcadeResult<ArcadeConfig> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigurationError::LoadFailed(format!("Failed to read {}: {}", path.display(), e))
        })?;

        Ok(toml::from_str(&content)?)
    }
}

/// Apply `ARCADE_*` overrides using `lookup` to resolve variables
pub fn apply_overrides<F>(config: &mut ArcadeConfig, lookup: F) -> ArcadeResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(level) = lookup("ARCADE_LOG_LEVEL") {
        config.monitoring.log_level =
            level
                .parse()
                .map_err(|reason: String| ConfigurationError::InvalidValue {
                    field: "ARCADE_LOG_LEVEL".to_string(),
                    value: level.clone(),
                    reason,
                })?;
    }

    if let Some(tick) = lookup("ARCADE_TICK_INTERVAL_MS") {
        config.session.tick_interval_ms = parse_field("ARCADE_TICK_INTERVAL_MS", &tick)?;
    }

    if let Some(timeout) = lookup("ARCADE_MATCHMAKING_TIMEOUT_MS") {
        config.tictactoe.matchmaking_timeout_ms =
            parse_field("ARCADE_MATCHMAKING_TIMEOUT_MS", &timeout)?;
    }

    if let Some(auto) = lookup("ARCADE_COLOR_AUTO_RESTART") {
        config.color.auto_restart = parse_field("ARCADE_COLOR_AUTO_RESTART", &auto)?;
    }

    Ok(())
}

fn parse_field<T: std::str::FromStr>(field: &str, value: &str) -> ArcadeResult<T> {
    value.trim().parse().map_err(|_| {
        ConfigurationError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            reason: format!("expected {}", std::any::type_name::<T>()),
        }
        .into()
    })
}
