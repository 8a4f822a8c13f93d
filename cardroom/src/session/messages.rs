//! Session actor message types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use super::{
    broadcast::{Event, EventStream},
    errors::SessionResult,
    state::{AbandonReason, BindingState, SessionPhase},
};
use crate::game::{Card, ConnectionId, Move, Outcome, PlayerId, SessionId, VariantKind};

/// A proposed mutation submitted by a player.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SubmitAction {
    pub session_id: SessionId,
    pub player_id: PlayerId,
    /// Version the client last saw. A mismatch is rejected as stale.
    pub expected_version: u64,
    pub action: Move,
}

/// Successful join.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JoinResult {
    Joined { seat: usize },
    /// The player already holds this seat; joining again is a no-op.
    AlreadyJoined { seat: usize },
}

impl JoinResult {
    #[must_use]
    pub fn seat(&self) -> usize {
        match self {
            JoinResult::Joined { seat } | JoinResult::AlreadyJoined { seat } => *seat,
        }
    }
}

/// Public information about one seat.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SeatView {
    pub player: PlayerId,
    pub ready: bool,
    pub connection: BindingState,
    pub cards_held: usize,
}

/// Everything one player is allowed to see of a session.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct PlayerView {
    pub session_id: SessionId,
    pub version: u64,
    pub phase: SessionPhase,
    pub player: PlayerId,
    pub hand: Vec<Card>,
    pub seats: Vec<SeatView>,
    pub turn: Option<PlayerId>,
    pub table_cards: Vec<(PlayerId, Card)>,
    pub deck_remaining: usize,
    pub scores: Vec<u32>,
    pub legal_actions: Vec<Move>,
    pub outcome: Option<Outcome>,
    pub abandon_reason: Option<AbandonReason>,
}

/// Session summary for discovery
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub variant: VariantKind,
    pub phase: SessionPhase,
    pub version: u64,
    pub players: Vec<PlayerId>,
    pub min_players: usize,
    pub max_players: usize,
    pub created_at: DateTime<Utc>,
}

/// Messages that can be sent to a SessionActor
#[derive(Debug)]
pub enum SessionMessage {
    /// Take a seat while the session is forming
    Join {
        player: PlayerId,
        response: oneshot::Sender<SessionResult<JoinResult>>,
    },

    /// Give up a seat while the session is forming
    Leave {
        player: PlayerId,
        response: oneshot::Sender<SessionResult<()>>,
    },

    /// Signal readiness to start
    Ready {
        player: PlayerId,
        response: oneshot::Sender<SessionResult<()>>,
    },

    /// Gameplay action
    Submit {
        action: SubmitAction,
        response: oneshot::Sender<SessionResult<Event>>,
    },

    /// Bind a live connection to a seat
    Bind {
        player: PlayerId,
        connection: ConnectionId,
        response: oneshot::Sender<SessionResult<()>>,
    },

    /// Connection dropped
    Unbind {
        player: PlayerId,
        connection: ConnectionId,
    },

    /// Get the view of a specific player
    Snapshot {
        player: PlayerId,
        response: oneshot::Sender<SessionResult<PlayerView>>,
    },

    /// Get moves available to a player
    LegalActions {
        player: PlayerId,
        response: oneshot::Sender<SessionResult<Vec<Move>>>,
    },

    /// Get the session summary
    Summary {
        response: oneshot::Sender<SessionResult<SessionSummary>>,
    },

    /// Subscribe to events after `since_version`
    Subscribe {
        player: PlayerId,
        since_version: u64,
        response: oneshot::Sender<SessionResult<EventStream>>,
    },

    /// Snapshot plus a fresh subscription starting at the snapshot's version
    Resync {
        player: PlayerId,
        response: oneshot::Sender<SessionResult<(PlayerView, EventStream)>>,
    },

    /// Stop subscription of a player
    Unsubscribe { player: PlayerId },

    /// Abandon the session if it hasn't ended (shutdown drain)
    Abandon {
        reason: AbandonReason,
        response: oneshot::Sender<SessionResult<()>>,
    },

    /// Stop the actor. Sent by the registry after eviction.
    Close,
}
