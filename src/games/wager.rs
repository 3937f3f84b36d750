//! Bet amount selection
//!
//! A wager is either one of the configured preset buttons or a free-form
//! amount typed by the player. Bad free-form input never surfaces as a hard
//! failure to the UI: the selector keeps the last valid wager.

use crate::config::WagerConfig;
use crate::errors::WagerError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A validated, strictly positive stake
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, PartialOrd)]
#[serde(try_from = "f64", into = "f64")]
pub struct Wager(f64);

impl Wager {
    pub fn new(amount: f64) -> Result<Self, WagerError> {
        if !amount.is_finite() {
            return Err(WagerError::NotFinite);
        }
        if amount <= 0.0 {
            return Err(WagerError::NotPositive(amount));
        }
        Ok(Self(amount))
    }

    pub fn amount(&self) -> f64 {
        self.0
    }

    /// Payout for this stake at the given multiplier
    pub fn scaled(&self, multiplier: f64) -> f64 {
        self.0 * multiplier
    }
}

impl TryFrom<f64> for Wager {
    type Error = WagerError;

    fn try_from(amount: f64) -> Result<Self, Self::Error> {
        Wager::new(amount)
    }
}

impl From<Wager> for f64 {
    fn from(wager: Wager) -> f64 {
        wager.0
    }
}

impl fmt::Display for Wager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

/// Input coming from the bet selector widget
#[derive(Debug, Clone, PartialEq)]
pub enum WagerInput<'a> {
    Preset(f64),
    Custom(&'a str),
}

/// Tracks the currently selected wager for one player
#[derive(Debug, Clone)]
pub struct WagerSelector {
    presets: Vec<f64>,
    current: Wager,
}

impl WagerSelector {
    pub fn new(config: &WagerConfig) -> Result<Self, WagerError> {
        Ok(Self {
            presets: config.presets.clone(),
            current: Wager::new(config.default_amount)?,
        })
    }

    pub fn presets(&self) -> &[f64] {
        &self.presets
    }

    pub fn current(&self) -> Wager {
        self.current
    }

    /// Select a wager. On error the previous selection is kept.
    pub fn select(&mut self, input: WagerInput<'_>) -> Result<Wager, WagerError> {
        let wager = match input {
            WagerInput::Preset(amount) => {
                if !self.presets.iter().any(|preset| *preset == amount) {
                    return Err(WagerError::NotAPreset(amount));
                }
                Wager::new(amount)?
            }
            WagerInput::Custom(text) => parse_custom(text)?,
        };

        self.current = wager;
        Ok(wager)
    }

    /// Free-form entry that silently reverts on bad input
    pub fn select_custom(&mut self, text: &str) -> Option<Wager> {
        match self.select(WagerInput::Custom(text)) {
            Ok(wager) => Some(wager),
            Err(e) => {
                tracing::debug!("Ignoring custom wager '{}': {}", text, e);
                None
            }
        }
    }
}

fn parse_custom(text: &str) -> Result<Wager, WagerError> {
    let trimmed = text.trim();
    let amount: f64 = trimmed
        .parse()
        .map_err(|_| WagerError::Unparseable(trimmed.to_string()))?;
    Wager::new(amount)
}
