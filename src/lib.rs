//! Arcade - game outcome simulation engine
//!
//! Randomized outcome engines for three casual betting games (crash
//! multiplier, red/green colour prediction, tic-tac-toe with bot fallback),
//! the wager and settlement rules around them, and a tokio session runtime
//! that drives an engine on a clock against wallet and history services.

pub mod common;
pub mod config;
pub mod errors;
pub mod games;
pub mod history;
pub mod metrics;
pub mod session;
pub mod simulation;
pub mod wallet;

pub use common::traits::{HistoryService, WalletService};
pub use common::types::{GameType, Outcome, RoundRecord, Settlement};
pub use config::{ArcadeConfig, ConfigLoader};
pub use errors::{ArcadeError, ArcadeResult};
pub use games::{Admission, GameEngine};
pub use session::{spawn, GameSession, SessionContext, SessionEvent, SessionHandle};
