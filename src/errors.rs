//! Error types for the arcade engine
//!
//! One root error wraps a category enum per concern so callers can match on
//! the category and still get a readable chain.

use thiserror::Error;

/// Root error type for all arcade operations
#[derive(Debug, Error)]
pub enum ArcadeError {
    /// Rejected wager input
    #[error("Wager error: {0}")]
    Wager(#[from] WagerError),

    /// Rejected game input
    #[error("Game error: {0}")]
    Game(#[from] GameError),

    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// Wallet collaborator errors
    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),

    /// History / leaderboard collaborator errors
    #[error("History error: {0}")]
    History(#[from] HistoryError),

    /// Matchmaking collaborator errors
    #[error("Matchmaking error: {0}")]
    Matchmaking(#[from] MatchmakingError),

    /// Session runtime errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

/// Wager validation errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WagerError {
    #[error("Amount must be greater than zero, got {0}")]
    NotPositive(f64),

    #[error("Amount must be a finite number")]
    NotFinite,

    #[error("Could not parse '{0}' as an amount")]
    Unparseable(String),

    #[error("Amount {0} is not one of the preset options")]
    NotAPreset(f64),
}

/// Invalid game input, rejected before any state change
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GameError {
    #[error("Auto cashout must be at least {minimum:.2}x, got {value}")]
    InvalidAutoCashout { value: f64, minimum: f64 },

    #[error("Cell index {0} is outside the board")]
    CellOutOfRange(usize),
}

/// Configuration and validation errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

/// Wallet collaborator errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WalletError {
    #[error("Insufficient funds: requested {requested:.2}, available {available:.2}")]
    InsufficientFunds { requested: f64, available: f64 },

    #[error("Unknown player: {0}")]
    UnknownPlayer(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(f64),

    #[error("Wallet service unavailable: {0}")]
    Unavailable(String),
}

/// History collaborator errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HistoryError {
    #[error("Failed to record round {round_id}: {reason}")]
    WriteFailed { round_id: String, reason: String },

    #[error("History service unavailable: {0}")]
    Unavailable(String),
}

/// Matchmaking collaborator errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MatchmakingError {
    #[error("Matchmaking queue closed")]
    QueueClosed,

    #[error("Matchmaking unavailable: {0}")]
    Unavailable(String),
}

/// Session runtime errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error("Session has shut down")]
    Closed,

    #[error("Command rejected: {0}")]
    Rejected(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<std::io::Error> for ArcadeError {
    fn from(e: std::io::Error) -> Self {
        ArcadeError::Configuration(ConfigurationError::LoadFailed(e.to_string()))
    }
}

impl From<toml::de::Error> for ArcadeError {
    fn from(e: toml::de::Error) -> Self {
        ArcadeError::Configuration(ConfigurationError::LoadFailed(format!(
            "Failed to parse TOML: {}",
            e
        )))
    }
}

impl From<serde_json::Error> for ArcadeError {
    fn from(e: serde_json::Error) -> Self {
        ArcadeError::Session(SessionError::InvalidInput(e.to_string()))
    }
}

// Convenience type alias for Results
pub type ArcadeResult<T> = Result<T, ArcadeError>;
