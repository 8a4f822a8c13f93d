//! Ingress protocol spoken between the gateway adapter and the core.
//!
//! Requests arrive already authenticated: the adapter pairs every
//! [`ClientRequest`] with the [`PlayerId`] it established, and the core
//! never looks at credentials. Everything is serde JSON tagged by `type`.

use serde::{Deserialize, Serialize};

use crate::{
    game::{Move, PlayerId, Rejection, SessionId},
    session::{
        Event, EventStream, JoinResult, PlayerView, SessionConfig, SessionError, SessionRegistry,
        SessionSummary, SubmitAction, Unavailable,
    },
};

/// A request from an authenticated player.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientRequest {
    CreateSession {
        #[serde(default)]
        config: SessionConfig,
    },
    JoinSession {
        session_id: SessionId,
    },
    LeaveSession {
        session_id: SessionId,
    },
    Ready {
        session_id: SessionId,
    },
    SubmitAction {
        session_id: SessionId,
        expected_version: u64,
        action: Move,
    },
    Snapshot {
        session_id: SessionId,
    },
    /// Replay everything after `since_version`, then follow live.
    SessionEvents {
        session_id: SessionId,
        since_version: u64,
    },
    /// Full snapshot followed by live events from its version.
    Resync {
        session_id: SessionId,
    },
    ListSessions,
}

/// A message from the core to one player.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerResponse {
    Created {
        session_id: SessionId,
    },
    Joined {
        session_id: SessionId,
        result: JoinResult,
    },
    /// Lobby request accepted
    Ack,
    Event {
        event: Event,
    },
    View {
        view: PlayerView,
    },
    Sessions {
        sessions: Vec<SessionSummary>,
    },
    Rejected {
        #[serde(flatten)]
        reason: Rejection,
    },
    Unavailable {
        #[serde(flatten)]
        reason: Unavailable,
    },
    Error {
        message: String,
    },
}

impl From<SessionError> for ServerResponse {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Rejected(reason) => ServerResponse::Rejected { reason },
            SessionError::Unavailable(reason) => ServerResponse::Unavailable { reason },
            other => ServerResponse::Error {
                message: other.client_message(),
            },
        }
    }
}

/// Result of dispatching one request.
pub enum Reply {
    Response(ServerResponse),
    /// The caller should forward `stream` to the client, after `view` if
    /// there is one.
    Subscribed {
        session_id: SessionId,
        view: Option<PlayerView>,
        stream: EventStream,
    },
}

impl From<ServerResponse> for Reply {
    fn from(response: ServerResponse) -> Self {
        Reply::Response(response)
    }
}

fn respond<T>(result: Result<T, SessionError>, ok: impl FnOnce(T) -> ServerResponse) -> Reply {
    match result {
        Ok(value) => ok(value).into(),
        Err(e) => ServerResponse::from(e).into(),
    }
}

/// Executes `request` on behalf of `player`.
pub async fn dispatch(registry: &SessionRegistry, player: &PlayerId, request: ClientRequest) -> Reply {
    match request {
        ClientRequest::CreateSession { config } => respond(
            registry.create_session(player.clone(), config).await,
            |session_id| ServerResponse::Created { session_id },
        ),

        ClientRequest::JoinSession { session_id } => respond(
            registry.join_session(session_id, player.clone()).await,
            |result| ServerResponse::Joined { session_id, result },
        ),

        ClientRequest::LeaveSession { session_id } => respond(
            registry.leave_session(session_id, player.clone()).await,
            |()| ServerResponse::Ack,
        ),

        ClientRequest::Ready { session_id } => respond(
            registry.ready(session_id, player.clone()).await,
            |()| ServerResponse::Ack,
        ),

        ClientRequest::SubmitAction {
            session_id,
            expected_version,
            action,
        } => {
            let action = SubmitAction {
                session_id,
                player_id: player.clone(),
                expected_version,
                action,
            };
            respond(registry.submit(action).await, |event| {
                ServerResponse::Event { event }
            })
        }

        ClientRequest::Snapshot { session_id } => respond(
            registry.snapshot(session_id, player.clone()).await,
            |view| ServerResponse::View { view },
        ),

        ClientRequest::SessionEvents {
            session_id,
            since_version,
        } => match registry
            .subscribe(session_id, player.clone(), since_version)
            .await
        {
            Ok(stream) => Reply::Subscribed {
                session_id,
                view: None,
                stream,
            },
            Err(e) => ServerResponse::from(e).into(),
        },

        ClientRequest::Resync { session_id } => {
            match registry.resync(session_id, player.clone()).await {
                Ok((view, stream)) => Reply::Subscribed {
                    session_id,
                    view: Some(view),
                    stream,
                },
                Err(e) => ServerResponse::from(e).into(),
            }
        }

        ClientRequest::ListSessions => ServerResponse::Sessions {
            sessions: registry.list_sessions().await,
        }
        .into(),
    }
}
