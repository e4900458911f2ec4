//! Account Ledger and Virtual Arming state.
//!
//! Both are plain owned structs mutated only by the engine actor, which
//! applies run completions and balance pushes one at a time.

use rust_decimal::Decimal;

use super::messages::{PlSnapshot, VirtualSnapshot};
use super::types::{round_money, Account, RunStatus};

// ─────────────────────────────────────────────────────────
// Real-account ledger
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountLedger {
    pub balance: Option<Decimal>,
    /// First balance seen since the last reset.
    pub start_balance: Option<Decimal>,
    pub wins: u32,
    pub losses: u32,
    pub profit: Decimal,
}

impl AccountLedger {
    /// Apply a balance push. Returns the start snapshot.
    pub fn observe_balance(&mut self, balance: Decimal) -> Option<Decimal> {
        self.balance = Some(balance);
        if self.start_balance.is_none() {
            self.start_balance = Some(balance);
        }
        self.start_balance
    }

    /// Book a finished real-account run. ERROR and STOP runs only move profit.
    pub fn record_run(&mut self, status: RunStatus, profit: Decimal) {
        match status {
            RunStatus::Won => self.wins += 1,
            RunStatus::Lost => self.losses += 1,
            _ => {}
        }
        self.profit = round_money(self.profit + profit);
    }

    /// Balance growth since the start snapshot, when both are known.
    pub fn growth(&self) -> Option<Decimal> {
        match (self.balance, self.start_balance) {
            (Some(now), Some(start)) => Some(now - start),
            _ => None,
        }
    }

    /// Value compared against the stop-win target.
    pub fn stop_win_metric(&self) -> Decimal {
        self.growth().unwrap_or(self.profit)
    }

    /// True when a positive target is configured and has been met.
    pub fn stop_win_reached(&self, target: Decimal) -> bool {
        target > Decimal::ZERO && self.stop_win_metric() >= target
    }

    /// Counters and start snapshot back to zero; the live balance stays.
    pub fn reset(&mut self) {
        self.wins = 0;
        self.losses = 0;
        self.profit = Decimal::ZERO;
        self.start_balance = None;
    }

    /// Forget the live balance (new connection, new push stream).
    pub fn clear_live_balance(&mut self) {
        self.balance = None;
    }

    pub fn snapshot(&self) -> PlSnapshot {
        PlSnapshot {
            wins: self.wins,
            losses: self.losses,
            profit: self.profit,
            balance: self.balance,
            start: self.start_balance,
        }
    }
}

// ─────────────────────────────────────────────────────────
// Virtual arming
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArmingTargets {
    pub vwin: u32,
    pub vloss: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VirtualArming {
    pub vwin_streak: u32,
    pub vloss_streak: u32,
    pub armed: bool,
}

impl VirtualArming {
    /// Account for the next plan.
    pub fn route(&self, virtual_mode: bool) -> Account {
        if !virtual_mode || self.armed {
            Account::Real
        } else {
            Account::Demo
        }
    }

    /// Apply a finished demo run. Returns true if this completion armed
    /// the next plan.
    pub fn record_demo(&mut self, status: RunStatus, targets: ArmingTargets) -> bool {
        match status {
            RunStatus::Won => {
                self.vwin_streak += 1;
                self.vloss_streak = 0;
            }
            RunStatus::Lost => {
                self.vloss_streak += 1;
                self.vwin_streak = 0;
            }
            _ => return false,
        }
        let hit = (targets.vwin > 0 && self.vwin_streak >= targets.vwin)
            || (targets.vloss > 0 && self.vloss_streak >= targets.vloss);
        let newly_armed = hit && !self.armed;
        self.armed |= hit;
        newly_armed
    }

    /// A real-routed run finished, whatever its outcome.
    pub fn complete_real(&mut self) {
        *self = Self::default();
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn snapshot(&self) -> VirtualSnapshot {
        VirtualSnapshot {
            vwin: self.vwin_streak,
            vloss: self.vloss_streak,
            armed: self.armed,
        }
    }
}
