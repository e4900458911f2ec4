//! Channel message types.
//!
//! Two streams leave the core:
//!   sessions ──SessionEvent──→ engine (inbound frames, disconnects)
//!   engine/runs ──UiEvent──→ presentation collaborator
//!
//! The presentation side is out of scope; it only ever sees `UiEvent`s.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::error::DerivError;
use super::types::{Account, Parity, RunStatus, SessionKind};

// ─────────────────────────────────────────────────────────
// Session → Engine
// ─────────────────────────────────────────────────────────

/// Observer stream of a transport session. Every session is built with
/// the sender its events go to; `generation` identifies the pool that
/// owned the session so stale events after a reboot can be dropped.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Message {
        session: SessionKind,
        generation: u64,
        msg: Value,
    },
    Disconnected {
        session: SessionKind,
        generation: u64,
        cause: DerivError,
    },
}

impl SessionEvent {
    pub fn generation(&self) -> u64 {
        match self {
            SessionEvent::Message { generation, .. } => *generation,
            SessionEvent::Disconnected { generation, .. } => *generation,
        }
    }
}

// ─────────────────────────────────────────────────────────
// Engine → Presentation
// ─────────────────────────────────────────────────────────

/// Row added to the operations table when a run opens.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationRecord {
    pub id: String,
    pub time: String,
    pub symbol: String,
    pub account: Account,
    pub direction: Parity,
    pub stake: Decimal,
    pub gale: u32,
    pub status: RunStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationUpdate {
    pub id: String,
    pub gale: u32,
    pub status: RunStatus,
    /// Cumulative realized profit of the run so far.
    pub profit: Option<Decimal>,
}

/// Real-account profit/loss summary.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PlSnapshot {
    pub wins: u32,
    pub losses: u32,
    pub profit: Decimal,
    pub balance: Option<Decimal>,
    pub start: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct VirtualSnapshot {
    pub vwin: u32,
    pub vloss: u32,
    pub armed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum UiEvent {
    /// General log line, already timestamped and tagged with its channel.
    Log(String),
    /// Decoded tick line for one symbol.
    MarketTick { symbol: String, line: String },
    /// Execution open/close line for one symbol.
    MarketExec { symbol: String, line: String },
    OperationAdded(OperationRecord),
    OperationUpdated(OperationUpdate),
    Balance {
        balance: Decimal,
        start: Option<Decimal>,
    },
    ProfitLoss(PlSnapshot),
    VirtualState(VirtualSnapshot),
    ViewsReset,
}

pub fn utc_ts() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Fan-out point for everything user-visible: each line goes to the
/// presentation channel and to `tracing`.
#[derive(Debug, Clone)]
pub struct Reporter {
    tx: mpsc::UnboundedSender<UiEvent>,
}

impl Reporter {
    pub fn new(tx: mpsc::UnboundedSender<UiEvent>) -> Self {
        Self { tx }
    }

    pub fn log(&self, channel: &str, text: impl AsRef<str>) {
        let text = text.as_ref();
        info!(channel, "{text}");
        self.emit(UiEvent::Log(format!("{} | [{channel}] {text}", utc_ts())));
    }

    pub fn warn(&self, channel: &str, text: impl AsRef<str>) {
        let text = text.as_ref();
        warn!(channel, "{text}");
        self.emit(UiEvent::Log(format!("{} | [{channel}] {text}", utc_ts())));
    }

    pub fn market(&self, symbol: &str, line: String) {
        tracing::debug!(symbol, "{line}");
        self.emit(UiEvent::MarketTick {
            symbol: symbol.to_string(),
            line,
        });
    }

    pub fn exec(&self, symbol: &str, line: String) {
        info!(symbol, "{line}");
        self.emit(UiEvent::MarketExec {
            symbol: symbol.to_string(),
            line,
        });
    }

    /// Presentation side may have gone away; that never affects trading.
    pub fn emit(&self, event: UiEvent) {
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_reporter_prefixes_channel() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        Reporter::new(tx).log("REAL", "Authorized.");
        let Some(UiEvent::Log(line)) = rx.try_recv().ok() else {
            panic!("expected log line");
        };
        assert!(line.ends_with(" | [REAL] Authorized."));
    }

    #[test]
    fn test_ui_event_json_shape() {
        let ev = UiEvent::OperationUpdated(OperationUpdate {
            id: "run-1".to_string(),
            gale: 2,
            status: RunStatus::Won,
            profit: Some(dec!(0.95)),
        });
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["event"], "operation_updated");
        assert_eq!(v["data"]["status"], "WIN");
        assert_eq!(v["data"]["gale"], 2);

        let v = serde_json::to_value(UiEvent::ViewsReset).unwrap();
        assert_eq!(v["event"], "views_reset");
    }
}
