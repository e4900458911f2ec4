//! Signal Decoder: price string → parity trace → trade direction.
//!
//! Pure and stateless. A quote only produces a signal when every digit in
//! its formatted representation has the same parity.

use super::types::{Parity, TriggerMode};

/// Decimal places used when the venue omits `pip_size`.
pub const DEFAULT_PRECISION: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    /// Parity of every digit, in order of appearance.
    pub parities: Vec<Parity>,
    pub last_digit: Option<u8>,
    /// Set when all digits share one parity.
    pub uniform: Option<Parity>,
    /// Direction to trade, already adjusted for the trigger mode.
    pub signal: Option<Parity>,
}

impl Decoded {
    /// `E/O/E/...` trace, or `-` when the string had no digits.
    pub fn trace(&self) -> String {
        if self.parities.is_empty() {
            return "-".to_string();
        }
        self.parities
            .iter()
            .map(Parity::short)
            .collect::<Vec<_>>()
            .join("/")
    }

    pub fn last_parity(&self) -> Option<Parity> {
        self.last_digit.map(Parity::of_digit)
    }
}

/// Format a quote with exactly `pip_size` decimals.
pub fn format_quote(quote: f64, pip_size: Option<u32>) -> String {
    let precision = pip_size.unwrap_or(DEFAULT_PRECISION) as usize;
    format!("{quote:.precision$}")
}

pub fn decode(price: &str, mode: TriggerMode) -> Decoded {
    let digits: Vec<u8> = price
        .chars()
        .filter_map(|c| c.to_digit(10))
        .map(|d| d as u8)
        .collect();

    let parities: Vec<Parity> = digits.iter().copied().map(Parity::of_digit).collect();
    let uniform = uniform_parity(&parities);
    let signal = uniform.map(|p| match mode {
        TriggerMode::TrendFollowing => p,
        TriggerMode::Contrarian => p.opposite(),
    });

    Decoded {
        last_digit: digits.last().copied(),
        parities,
        uniform,
        signal,
    }
}

fn uniform_parity(parities: &[Parity]) -> Option<Parity> {
    let first = *parities.first()?;
    parities.iter().all(|p| *p == first).then_some(first)
}
