//! Collaborator interfaces
//!
//! The engines never touch balances or storage. The session runtime talks to
//! these services instead, so tests can swap in failing or recording doubles.

use crate::common::types::RoundRecord;
use crate::errors::{HistoryError, WalletError};
use crate::games::wager::Wager;
use async_trait::async_trait;

/// Balance keeping for players
#[async_trait]
pub trait WalletService: Send + Sync {
    /// Take the stake before a round accepts it
    async fn debit(&self, player_id: &str, wager: Wager) -> Result<(), WalletError>;

    /// Pay out a settled round
    async fn credit(&self, player_id: &str, amount: f64) -> Result<(), WalletError>;

    /// Return a stake (draw, cancelled round, or a bet the engine refused)
    async fn refund(&self, player_id: &str, amount: f64) -> Result<(), WalletError> {
        self.credit(player_id, amount).await
    }

    async fn balance(&self, player_id: &str) -> Result<f64, WalletError>;
}

/// Round history sink feeding the leaderboard
#[async_trait]
pub trait HistoryService: Send + Sync {
    async fn record_round(&self, record: RoundRecord) -> Result<(), HistoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::{GameType, Outcome, Settlement};
    use chrono::Utc;
    use std::sync::Mutex;
    use uuid::Uuid;

    struct ClosedWallet;

    #[async_trait]
    impl WalletService for ClosedWallet {
        async fn debit(&self, _player_id: &str, _wager: Wager) -> Result<(), WalletError> {
            Err(WalletError::Unavailable("maintenance".to_string()))
        }

        async fn credit(&self, _player_id: &str, _amount: f64) -> Result<(), WalletError> {
            Err(WalletError::Unavailable("maintenance".to_string()))
        }

        async fn balance(&self, player_id: &str) -> Result<f64, WalletError> {
            Err(WalletError::UnknownPlayer(player_id.to_string()))
        }
    }

    #[derive(Default)]
    struct RecordingHistory {
        rounds: Mutex<Vec<RoundRecord>>,
    }

    #[async_trait]
    impl HistoryService for RecordingHistory {
        async fn record_round(&self, record: RoundRecord) -> Result<(), HistoryError> {
            self.rounds.lock().unwrap().push(record);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_trait_objects() {
        let wallet: Box<dyn WalletService> = Box::new(ClosedWallet);
        let wager = Wager::new(2.0).unwrap();
        assert!(wallet.debit("p1", wager).await.is_err());

        let history = RecordingHistory::default();
        let settlement = Settlement::new(Uuid::new_v4(), GameType::Color, wager, 4.0, Outcome::Win);
        history
            .record_round(RoundRecord::new("p1", settlement, Utc::now()))
            .await
            .unwrap();
        assert_eq!(history.rounds.lock().unwrap().len(), 1);
    }
}
