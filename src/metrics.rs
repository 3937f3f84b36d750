//! Settlement counters shared across sessions

use crate::common::types::{Outcome, Settlement};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Amounts are tracked in cents so they fit atomics
#[derive(Debug)]
pub struct SessionMetrics {
    start_time: Instant,
    rounds_settled: AtomicU64,
    rounds_won: AtomicU64,
    wagered_cents: AtomicU64,
    paid_out_cents: AtomicU64,
    failed_settlements: AtomicU64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MetricsSnapshot {
    pub rounds_settled: u64,
    pub rounds_won: u64,
    pub total_wagered: f64,
    pub total_paid_out: f64,
    pub failed_settlements: u64,
    pub house_edge: f64,
    pub uptime_secs: f64,
}

impl Default for SessionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            rounds_settled: AtomicU64::new(0),
            rounds_won: AtomicU64::new(0),
            wagered_cents: AtomicU64::new(0),
            paid_out_cents: AtomicU64::new(0),
            failed_settlements: AtomicU64::new(0),
        }
    }

    /// Cancelled rounds count as neither wagered nor paid
    pub fn record_settlement(&self, settlement: &Settlement) {
        if settlement.outcome == Outcome::Cancelled {
            return;
        }
        self.rounds_settled.fetch_add(1, Ordering::Relaxed);
        if settlement.outcome == Outcome::Win {
            self.rounds_won.fetch_add(1, Ordering::Relaxed);
        }
        self.wagered_cents
            .fetch_add(to_cents(settlement.wager.amount()), Ordering::Relaxed);
        self.paid_out_cents
            .fetch_add(to_cents(settlement.payout), Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed_settlements.fetch_add(1, Ordering::Relaxed);
    }

    /// Share of the total stake kept by the house, 0 before any round
    pub fn house_edge(&self) -> f64 {
        let wagered = self.wagered_cents.load(Ordering::Relaxed);
        if wagered == 0 {
            return 0.0;
        }
        let paid = self.paid_out_cents.load(Ordering::Relaxed);
        (wagered as f64 - paid as f64) / wagered as f64
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            rounds_settled: self.rounds_settled.load(Ordering::Relaxed),
            rounds_won: self.rounds_won.load(Ordering::Relaxed),
            total_wagered: self.wagered_cents.load(Ordering::Relaxed) as f64 / 100.0,
            total_paid_out: self.paid_out_cents.load(Ordering::Relaxed) as f64 / 100.0,
            failed_settlements: self.failed_settlements.load(Ordering::Relaxed),
            house_edge: self.house_edge(),
            uptime_secs: self.start_time.elapsed().as_secs_f64(),
        }
    }
}

fn to_cents(amount: f64) -> u64 {
    (amount * 100.0).round().max(0.0) as u64
}
