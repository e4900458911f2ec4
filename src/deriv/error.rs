use std::result;

use thiserror::Error;

use super::types::SessionKind;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DerivError {
    /// Transport dropped while the call was in flight.
    #[error("[{session}] connection lost: {reason}")]
    ConnectionLost { session: SessionKind, reason: String },

    #[error("[{session}] timeout waiting for {what}")]
    Timeout {
        session: SessionKind,
        what: &'static str,
    },

    /// Well-formed response carrying an `error` object.
    #[error("venue error during {stage}: {message}")]
    Venue {
        stage: &'static str,
        code: Option<String>,
        message: String,
    },

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("engine task is not running")]
    EngineUnavailable,
}

impl DerivError {
    pub fn connection_lost(session: SessionKind, reason: impl Into<String>) -> Self {
        DerivError::ConnectionLost {
            session,
            reason: reason.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, DerivError::Timeout { .. })
    }
}

pub type Result<T> = result::Result<T, DerivError>;
