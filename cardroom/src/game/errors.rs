//! Game-level error types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the deck engine.
#[derive(Clone, Debug, Deserialize, Eq, Error, PartialEq, Serialize)]
pub enum DeckError {
    #[error("can't deal {requested} cards, only {remaining} left")]
    InsufficientCards { requested: usize, remaining: usize },
}

/// Expected, recoverable refusals of a request. These are the caller's
/// fault or the result of a stale view and are always surfaced as-is.
#[derive(Clone, Debug, Deserialize, Eq, Error, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Rejection {
    #[error("not your turn")]
    NotYourTurn,
    #[error("illegal move")]
    IllegalMove,
    #[error("stale version: expected {expected}, session is at {current}")]
    StaleVersion { expected: u64, current: u64 },
    #[error("invalid payload")]
    InvalidPayload,
    #[error("session is full")]
    SessionFull,
    #[error("session is not accepting that request in its current phase")]
    SessionNotJoinable,
    #[error("game already ended")]
    GameAlreadyEnded,
    #[error("game hasn't started")]
    GameNotStarted,
    #[error("player is not seated in this session")]
    UnknownPlayer,
}
