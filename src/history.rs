//! Round history and leaderboard
//!
//! Every settled round is kept per player. The leaderboard ranks players by
//! total winnings (payouts of won rounds) inside a rolling time window.

use crate::common::traits::HistoryService;
use crate::common::types::{Outcome, RoundRecord};
use crate::errors::HistoryError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Timeframe {
    Daily,
    Weekly,
    Monthly,
    AllTime,
}

impl Timeframe {
    /// Length of the rolling window, `None` for all time
    pub fn window(&self) -> Option<Duration> {
        match self {
            Timeframe::Daily => Some(Duration::days(1)),
            Timeframe::Weekly => Some(Duration::days(7)),
            Timeframe::Monthly => Some(Duration::days(30)),
            Timeframe::AllTime => None,
        }
    }

    pub fn includes(&self, played_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self.window() {
            Some(window) => played_at > now - window && played_at <= now,
            None => played_at <= now,
        }
    }
}

impl std::str::FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "daily" | "day" => Ok(Timeframe::Daily),
            "weekly" | "week" => Ok(Timeframe::Weekly),
            "monthly" | "month" => Ok(Timeframe::Monthly),
            "alltime" | "all-time" | "all" => Ok(Timeframe::AllTime),
            other => Err(format!("unknown timeframe '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub player_id: String,
    pub winnings: f64,
    pub games_played: u64,
    pub win_rate: f64,
}

#[derive(Default)]
struct Tally {
    winnings: f64,
    games_played: u64,
    wins: u64,
}

#[derive(Debug, Default)]
pub struct InMemoryHistory {
    rounds: DashMap<String, Vec<RoundRecord>>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent rounds first
    pub fn player_history(&self, player_id: &str, limit: usize) -> Vec<RoundRecord> {
        self.rounds
            .get(player_id)
            .map(|rounds| {
                let mut recent = rounds.clone();
                recent.sort_by(|a, b| b.played_at.cmp(&a.played_at));
                recent.truncate(limit);
                recent
            })
            .unwrap_or_default()
    }

    /// Top `limit` players in `timeframe` as of `now`. Cancelled rounds do not count.
    pub fn leaderboard(
        &self,
        timeframe: Timeframe,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Vec<LeaderboardEntry> {
        let mut tallies: HashMap<String, Tally> = HashMap::new();

        for player in self.rounds.iter() {
            for record in player.value() {
                let outcome = record.settlement.outcome;
                if outcome == Outcome::Cancelled || !timeframe.includes(record.played_at, now) {
                    continue;
                }
                let tally = tallies.entry(player.key().clone()).or_default();
                tally.games_played += 1;
                if outcome == Outcome::Win {
                    tally.wins += 1;
                    tally.winnings += record.settlement.payout;
                }
            }
        }

        let mut entries: Vec<LeaderboardEntry> = tallies
            .into_iter()
            .map(|(player_id, tally)| LeaderboardEntry {
                rank: 0,
                player_id,
                winnings: tally.winnings,
                games_played: tally.games_played,
                win_rate: tally.wins as f64 / tally.games_played as f64,
            })
            .collect();

        entries.sort_by(|a, b| {
            b.winnings
                .partial_cmp(&a.winnings)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.win_rate.partial_cmp(&a.win_rate).unwrap_or(Ordering::Equal))
                .then_with(|| a.player_id.cmp(&b.player_id))
        });
        entries.truncate(limit);
        for (i, entry) in entries.iter_mut().enumerate() {
            entry.rank = i + 1;
        }
        entries
    }
}

#[async_trait]
impl HistoryService for InMemoryHistory {
    async fn record_round(&self, record: RoundRecord) -> Result<(), HistoryError> {
        debug!(
            "Recording {} round {} for {}",
            record.settlement.game_type, record.settlement.round_id, record.player_id
        );
        self.rounds.entry(record.player_id.clone()).or_default().push(record);
        Ok(())
    }
}
