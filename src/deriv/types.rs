use std::fmt;
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use super::error::DerivError;

/// Decimal places of the account currency's minor unit.
pub const MONEY_DP: u32 = 2;

/// Which of the three venue connections a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKind {
    Feed,
    Demo,
    Real,
}

impl SessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKind::Feed => "market-feed",
            SessionKind::Demo => "demo",
            SessionKind::Real => "real",
        }
    }

    /// Channel tag used on presentation log lines.
    pub fn label(&self) -> &'static str {
        match self {
            SessionKind::Feed => "PUBLIC",
            SessionKind::Demo => "DEMO",
            SessionKind::Real => "REAL",
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Account {
    Demo,
    Real,
}

impl Account {
    pub fn as_str(&self) -> &'static str {
        match self {
            Account::Demo => "DEMO",
            Account::Real => "REAL",
        }
    }

    pub fn session(&self) -> SessionKind {
        match self {
            Account::Demo => SessionKind::Demo,
            Account::Real => SessionKind::Real,
        }
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Parity {
    Even,
    Odd,
}

impl Parity {
    pub fn of_digit(digit: u8) -> Self {
        if digit % 2 == 0 {
            Parity::Even
        } else {
            Parity::Odd
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Parity::Even => Parity::Odd,
            Parity::Odd => Parity::Even,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Parity::Even => "EVEN",
            Parity::Odd => "ODD",
        }
    }

    /// One-letter trace symbol for the market line.
    pub fn short(&self) -> &'static str {
        match self {
            Parity::Even => "E",
            Parity::Odd => "O",
        }
    }

    /// Venue contract type that pays when the last digit has this parity.
    pub fn contract_type(&self) -> &'static str {
        match self {
            Parity::Even => "DIGITEVEN",
            Parity::Odd => "DIGITODD",
        }
    }
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a uniform-parity quote is turned into a trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriggerMode {
    /// Trade the parity the quote just showed.
    #[default]
    TrendFollowing,
    /// Trade against it.
    Contrarian,
}

impl TriggerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerMode::TrendFollowing => "trend-following",
            TriggerMode::Contrarian => "contrarian",
        }
    }
}

impl FromStr for TriggerMode {
    type Err = DerivError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trend" | "trend-following" | "trend_following" | "sequence" | "sequencia" => {
                Ok(TriggerMode::TrendFollowing)
            }
            "contrarian" | "inverse" | "inverso" => Ok(TriggerMode::Contrarian),
            other => Err(DerivError::Configuration(format!(
                "unknown trigger mode '{other}' (expected trend-following or contrarian)"
            ))),
        }
    }
}

/// A single market-data tick from the feed session.
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub symbol: String,
    pub quote: f64,
    /// Display precision in decimal places.
    pub pip_size: Option<u32>,
    pub epoch: Option<i64>,
}

/// Everything an execution run needs to know, fixed when the signal fires.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalPlan {
    pub symbol: String,
    pub direction: Parity,
    pub account: Account,
    pub base_stake: Decimal,
    pub max_gale: u32,
    pub mult: Decimal,
}

/// Status shown on an operation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Open,
    #[serde(rename = "WIN")]
    Won,
    #[serde(rename = "LOSS")]
    Lost,
    Error,
    #[serde(rename = "STOP")]
    Stopped,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Open => "OPEN",
            RunStatus::Won => "WIN",
            RunStatus::Lost => "LOSS",
            RunStatus::Error => "ERROR",
            RunStatus::Stopped => "STOP",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Venue-reported outcome of one settled contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settlement {
    pub won: bool,
    pub profit: Decimal,
}

/// Round to the currency minor unit, half-up.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// Stake for the next gale step.
pub fn next_stake(stake: Decimal, mult: Decimal) -> Decimal {
    round_money(stake * mult)
}
