//! WebSocket adapter between the gateway and the session registry.
//!
//! One socket carries all of a player's traffic, across any number of
//! sessions. Requests and responses are the JSON messages of
//! [`cardroom::protocol`].
//!
//! # Connection Flow
//!
//! 1. The gateway authenticates the player and upgrades `GET /ws` with the
//!    `x-player-id` header set
//! 2. Server spawns a send task draining one bounded outbound queue
//! 3. Each request is dispatched to the registry and its response queued
//! 4. Creating, joining or subscribing to a session binds this connection
//!    to the player's seat; subscriptions get a forwarding task that pushes
//!    the session's events into the outbound queue
//! 5. On disconnect the forwarders stop and every bound seat is released,
//!    which starts that session's reconnect grace
//!
//! # Example
//!
//! ```javascript
//! const ws = new WebSocket('ws://localhost:6969/ws');  // via the gateway
//!
//! ws.send(JSON.stringify({ type: "join_session", session_id: id }));
//! ws.send(JSON.stringify({ type: "session_events", session_id: id, since_version: 0 }));
//! ws.send(JSON.stringify({
//!   type: "submit_action",
//!   session_id: id,
//!   expected_version: 3,
//!   action: { type: "play", card: [11, "Heart"] }
//! }));
//! ```

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use cardroom::{
    game::{ConnectionId, PlayerId, SessionId},
    protocol::{self, ClientRequest, Reply, ServerResponse},
    session::EventStream,
};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use std::collections::{HashMap, HashSet};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::Instrument;

use super::AppState;
use crate::logging::connection_span;

/// Header the gateway puts the authenticated player id in
pub const PLAYER_HEADER: &str = "x-player-id";

fn player_from_headers(headers: &HeaderMap) -> Option<PlayerId> {
    headers
        .get(PLAYER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(PlayerId::from)
}

/// Upgrade an authenticated HTTP connection to the session protocol.
///
/// # Response
///
/// On success, upgrades connection to WebSocket protocol (101 Switching Protocols).
/// Without a player identity, returns `401 Unauthorized`; while draining,
/// `503 Service Unavailable`.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Response {
    let Some(player) = player_from_headers(&headers) else {
        return (StatusCode::UNAUTHORIZED, "Missing player identity").into_response();
    };

    if !state.registry.is_accepting() {
        return (StatusCode::SERVICE_UNAVAILABLE, "Server is shutting down").into_response();
    }

    let connection = ConnectionId::new();
    let span = connection_span(&player, connection);
    ws.on_upgrade(move |socket| handle_socket(socket, player, connection, state).instrument(span))
}

/// Handle an established WebSocket connection.
async fn handle_socket(
    socket: WebSocket,
    player: PlayerId,
    connection: ConnectionId,
    state: AppState,
) {
    let (mut sender, mut receiver) = socket.split();
    info!("WebSocket connected: player={}", player);

    let (outbound, mut outbound_rx) = mpsc::channel::<ServerResponse>(state.outbound_capacity);

    let send_task = tokio::spawn(
        async move {
            while let Some(response) = outbound_rx.recv().await {
                let json = match serde_json::to_string(&response) {
                    Ok(json) => json,
                    Err(e) => {
                        error!("Failed to serialize response: {}", e);
                        continue;
                    }
                };
                if sender.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            let _ = sender.send(Message::Close(None)).await;
        }
        .in_current_span(),
    );

    let mut closing = state.closing.clone();
    let mut conn = Connection {
        player,
        id: connection,
        state,
        outbound,
        bound: HashSet::new(),
        forwarders: HashMap::new(),
    };

    loop {
        tokio::select! {
            msg = receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if !conn.handle_text(text.as_str()).await {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    info!("WebSocket closed by client: player={}", conn.player);
                    break;
                }
                Some(Err(e)) => {
                    warn!("WebSocket error: {}", e);
                    break;
                }
                Some(Ok(_)) => {}
            },

            Ok(()) = closing.changed() => {
                if *closing.borrow() {
                    info!("Closing WebSocket for shutdown: player={}", conn.player);
                    break;
                }
            }
        }
    }

    conn.release().await;
    drop(conn);
    let _ = send_task.await;
}

/// Per-connection bookkeeping: the seats this socket is bound to and the
/// tasks forwarding each subscribed session's events.
struct Connection {
    player: PlayerId,
    id: ConnectionId,
    state: AppState,
    outbound: mpsc::Sender<ServerResponse>,
    bound: HashSet<SessionId>,
    forwarders: HashMap<SessionId, JoinHandle<()>>,
}

impl Connection {
    /// Queue a response. Returns `false` once the socket is gone.
    async fn send(&self, response: ServerResponse) -> bool {
        self.outbound.send(response).await.is_ok()
    }

    /// Process one client message. Returns `false` once the socket is gone.
    async fn handle_text(&mut self, text: &str) -> bool {
        let request = match serde_json::from_str::<ClientRequest>(text) {
            Ok(request) => request,
            Err(e) => {
                warn!("Failed to parse client message: {}", e);
                return self
                    .send(ServerResponse::Error {
                        message: "Invalid message format".to_string(),
                    })
                    .await;
            }
        };

        debug!("Request from {}: {:?}", self.player, request);
        let leaving = match &request {
            ClientRequest::LeaveSession { session_id } => Some(*session_id),
            _ => None,
        };

        match protocol::dispatch(&self.state.registry, &self.player, request).await {
            Reply::Response(response) => {
                match (&response, leaving) {
                    (ServerResponse::Created { session_id }, _)
                    | (ServerResponse::Joined { session_id, .. }, _) => {
                        self.bind(*session_id).await;
                    }
                    (ServerResponse::Ack, Some(session_id)) => self.forget(session_id),
                    _ => {}
                }
                self.send(response).await
            }

            Reply::Subscribed {
                session_id,
                view,
                stream,
            } => {
                self.bind(session_id).await;
                if let Some(view) = view
                    && !self.send(ServerResponse::View { view }).await
                {
                    return false;
                }
                self.follow(session_id, stream);
                true
            }
        }
    }

    async fn bind(&mut self, session_id: SessionId) {
        match self
            .state
            .registry
            .bind(session_id, self.player.clone(), self.id)
            .await
        {
            Ok(()) => {
                self.bound.insert(session_id);
            }
            Err(e) => debug!("Could not bind to session {}: {}", session_id, e),
        }
    }

    /// Forward `stream` into the outbound queue, replacing any earlier
    /// subscription to the same session.
    fn follow(&mut self, session_id: SessionId, mut stream: EventStream) {
        let outbound = self.outbound.clone();
        let forwarder = tokio::spawn(
            async move {
                while let Some(item) = stream.next().await {
                    let response = match item {
                        Ok(event) => ServerResponse::Event { event },
                        Err(reason) => ServerResponse::Unavailable { reason },
                    };
                    if outbound.send(response).await.is_err() {
                        break;
                    }
                }
                debug!("Event stream for session {} ended", session_id);
            }
            .in_current_span(),
        );

        if let Some(previous) = self.forwarders.insert(session_id, forwarder) {
            previous.abort();
        }
    }

    /// Drop everything tied to a session the player left.
    fn forget(&mut self, session_id: SessionId) {
        self.bound.remove(&session_id);
        if let Some(forwarder) = self.forwarders.remove(&session_id) {
            forwarder.abort();
        }
    }

    /// Stop forwarding and release every seat this connection held.
    async fn release(&mut self) {
        for (_, forwarder) in self.forwarders.drain() {
            forwarder.abort();
        }
        for session_id in self.bound.drain() {
            self.state
                .registry
                .unbind(session_id, self.player.clone(), self.id)
                .await;
        }
        info!("WebSocket disconnected: player={}", self.player);
    }
}
