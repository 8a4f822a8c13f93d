//! Session error types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::game::{Rejection, SessionId};

/// Transient conditions. The request may succeed if retried later; the
/// core itself never retries.
#[derive(Clone, Debug, Deserialize, Eq, Error, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Unavailable {
    #[error("session did not accept the request in time")]
    Timeout,
    #[error("session is suspended waiting for players to reconnect")]
    Suspended,
    #[error("subscriber fell behind and must resync")]
    Lagged,
    #[error("session is closed")]
    SessionClosed,
    #[error("server is shutting down")]
    ShuttingDown,
    #[error("server is at session capacity")]
    AtCapacity,
}

/// Session errors
#[derive(Clone, Debug, Error, PartialEq)]
pub enum SessionError {
    /// Expected refusal, caused by the caller or a stale view
    #[error("rejected: {0}")]
    Rejected(#[from] Rejection),

    /// Transient system condition
    #[error("unavailable: {0}")]
    Unavailable(#[from] Unavailable),

    /// Invariant violation; the session has been quarantined
    #[error("session {session_id} corrupted: {diagnostic}")]
    Fatal {
        session_id: SessionId,
        diagnostic: String,
    },

    /// No live session with that id
    #[error("session {0} not found")]
    NotFound(SessionId),

    /// Session configuration failed validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SessionError {
    /// The rejection reason, if this is an expected refusal.
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            SessionError::Rejected(rejection) => Some(rejection),
            _ => None,
        }
    }

    /// Get a client-safe error message that doesn't leak internal diagnostics
    pub fn client_message(&self) -> String {
        match self {
            SessionError::Fatal { .. } => "Session aborted due to an internal error".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;
