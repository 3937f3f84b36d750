//! In-memory wallet with a per-player ledger

use crate::common::traits::WalletService;
use crate::errors::WalletError;
use crate::games::wager::Wager;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Deposit,
    Withdraw,
    Bet,
    Win,
    Refund,
    Bonus,
}

impl EntryKind {
    /// Money flowing into the balance
    pub fn is_credit(&self) -> bool {
        !matches!(self, EntryKind::Withdraw | EntryKind::Bet)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerEntry {
    pub kind: EntryKind,
    pub amount: f64,
    pub balance_after: f64,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Account {
    balance: f64,
    ledger: Vec<LedgerEntry>,
}

impl Account {
    fn post(&mut self, kind: EntryKind, amount: f64) {
        if kind.is_credit() {
            self.balance += amount;
        } else {
            self.balance -= amount;
        }
        self.ledger.push(LedgerEntry {
            kind,
            amount,
            balance_after: self.balance,
            at: Utc::now(),
        });
    }
}

/// Thread-safe wallet backed by a `DashMap`; each account is updated under
/// its shard lock so a debit check and its withdrawal cannot interleave.
#[derive(Debug, Default)]
pub struct InMemoryWallet {
    accounts: DashMap<String, Account>,
}

impl InMemoryWallet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open an account (or top one up) with a deposit
    pub fn deposit(&self, player_id: &str, amount: f64) -> Result<f64, WalletError> {
        self.post_credit(player_id, EntryKind::Deposit, amount)
    }

    pub fn grant_bonus(&self, player_id: &str, amount: f64) -> Result<f64, WalletError> {
        self.post_credit(player_id, EntryKind::Bonus, amount)
    }

    pub fn withdraw(&self, player_id: &str, amount: f64) -> Result<f64, WalletError> {
        self.post_debit(player_id, EntryKind::Withdraw, amount)
    }

    /// Oldest first
    pub fn ledger(&self, player_id: &str) -> Vec<LedgerEntry> {
        self.accounts
            .get(player_id)
            .map(|account| account.ledger.clone())
            .unwrap_or_default()
    }

    fn post_credit(
        &self,
        player_id: &str,
        kind: EntryKind,
        amount: f64,
    ) -> Result<f64, WalletError> {
        validate_amount(amount)?;
        let mut account = self.accounts.entry(player_id.to_string()).or_default();
        account.post(kind, amount);
        debug!("{:?} of {:.2} for {}, balance {:.2}", kind, amount, player_id, account.balance);
        Ok(account.balance)
    }

    fn post_debit(
        &self,
        player_id: &str,
        kind: EntryKind,
        amount: f64,
    ) -> Result<f64, WalletError> {
        validate_amount(amount)?;
        let mut account = self
            .accounts
            .get_mut(player_id)
            .ok_or_else(|| WalletError::UnknownPlayer(player_id.to_string()))?;

        if account.balance < amount {
            return Err(WalletError::InsufficientFunds {
                requested: amount,
                available: account.balance,
            });
        }
        account.post(kind, amount);
        debug!("{:?} of {:.2} for {}, balance {:.2}", kind, amount, player_id, account.balance);
        Ok(account.balance)
    }
}

fn validate_amount(amount: f64) -> Result<(), WalletError> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(WalletError::InvalidAmount(amount));
    }
    Ok(())
}

#[async_trait]
impl WalletService for InMemoryWallet {
    async fn debit(&self, player_id: &str, wager: Wager) -> Result<(), WalletError> {
        self.post_debit(player_id, EntryKind::Bet, wager.amount()).map(|_| ())
    }

    async fn credit(&self, player_id: &str, amount: f64) -> Result<(), WalletError> {
        self.post_credit(player_id, EntryKind::Win, amount).map(|_| ())
    }

    async fn refund(&self, player_id: &str, amount: f64) -> Result<(), WalletError> {
        self.post_credit(player_id, EntryKind::Refund, amount).map(|_| ())
    }

    async fn balance(&self, player_id: &str) -> Result<f64, WalletError> {
        self.accounts
            .get(player_id)
            .map(|account| account.balance)
            .ok_or_else(|| WalletError::UnknownPlayer(player_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn wager(amount: f64) -> Wager {
        Wager::new(amount).unwrap()
    }

    #[tokio::test]
    async fn test_debit_and_credit() {
        let wallet = InMemoryWallet::new();
        wallet.deposit("p1", 100.0).unwrap();

        wallet.debit("p1", wager(10.0)).await.unwrap();
        wallet.credit("p1", 20.0).await.unwrap();
        assert_eq!(wallet.balance("p1").await.unwrap(), 110.0);

        let kinds: Vec<EntryKind> = wallet.ledger("p1").iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EntryKind::Deposit, EntryKind::Bet, EntryKind::Win]);
        assert_eq!(wallet.ledger("p1")[1].balance_after, 90.0);
    }

    #[tokio::test]
    async fn test_insufficient_funds_leaves_balance_alone() {
        let wallet = InMemoryWallet::new();
        wallet.deposit("p1", 5.0).unwrap();

        let err = wallet.debit("p1", wager(10.0)).await.unwrap_err();
        assert_eq!(
            err,
            WalletError::InsufficientFunds {
                requested: 10.0,
                available: 5.0
            }
        );
        assert_eq!(wallet.balance("p1").await.unwrap(), 5.0);
        assert_eq!(wallet.ledger("p1").len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_player() {
        let wallet = InMemoryWallet::new();
        assert!(matches!(
            wallet.debit("ghost", wager(1.0)).await,
            Err(WalletError::UnknownPlayer(_))
        ));
        assert!(wallet.balance("ghost").await.is_err());
        assert!(wallet.ledger("ghost").is_empty());
    }

    #[test]
    fn test_invalid_amounts() {
        let wallet = InMemoryWallet::new();
        assert_eq!(wallet.deposit("p1", -1.0), Err(WalletError::InvalidAmount(-1.0)));
        assert!(wallet.deposit("p1", f64::INFINITY).is_err());
    }

    #[tokio::test]
    async fn test_bonus_refund_and_withdraw() {
        let wallet = InMemoryWallet::new();
        wallet.grant_bonus("p1", 50.0).unwrap();
        WalletService::refund(&wallet, "p1", 10.0).await.unwrap();
        assert_eq!(wallet.withdraw("p1", 25.0), Ok(35.0));
        assert!(wallet.withdraw("p1", 100.0).is_err());

        let kinds: Vec<EntryKind> = wallet.ledger("p1").iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EntryKind::Bonus, EntryKind::Refund, EntryKind::Withdraw]);
    }

    #[tokio::test]
    async fn test_concurrent_debits_never_overdraw() {
        let wallet = Arc::new(InMemoryWallet::new());
        wallet.deposit("p1", 100.0).unwrap();

        let mut handles = Vec::new();
        for _ in 0..50 {
            let wallet = wallet.clone();
            handles.push(tokio::spawn(async move { wallet.debit("p1", wager(7.0)).await.is_ok() }));
        }

        let mut accepted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                accepted += 1;
            }
        }

        assert_eq!(accepted, 14);
        assert_eq!(wallet.balance("p1").await.unwrap(), 2.0);
    }
}
