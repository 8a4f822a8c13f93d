//! Session actor implementation with async message handling.

use std::future::Future;
use tokio::{
    sync::{mpsc, oneshot},
    time::{Duration, Instant, MissedTickBehavior, interval, timeout},
};

use super::{
    broadcast::{Broadcaster, Event, EventStream},
    errors::{SessionError, SessionResult, Unavailable},
    messages::{JoinResult, PlayerView, SessionMessage, SessionSummary, SubmitAction},
    state::{AbandonReason, Session},
};
use crate::{
    archive::GameRecord,
    game::{ConnectionId, Move, PlayerId, SessionId},
};

/// Handle for sending messages to a session actor
#[derive(Clone)]
pub struct SessionHandle {
    sender: mpsc::Sender<SessionMessage>,
    session_id: SessionId,
    request_timeout: Duration,
}

impl SessionHandle {
    pub fn new(
        sender: mpsc::Sender<SessionMessage>,
        session_id: SessionId,
        request_timeout: Duration,
    ) -> Self {
        Self {
            sender,
            session_id,
            request_timeout,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Sends a request and waits for its reply, bounded by the request
    /// timeout. A request that times out while still queued is dropped by
    /// the actor without being applied.
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<SessionResult<T>>) -> SessionMessage,
    ) -> SessionResult<T> {
        let (response, reply) = oneshot::channel();
        let message = build(response);
        bounded(self.request_timeout, async move {
            if self.sender.send(message).await.is_err() {
                return Err(SessionError::Unavailable(Unavailable::SessionClosed));
            }
            match reply.await {
                Ok(result) => result,
                Err(_) => Err(SessionError::Unavailable(Unavailable::SessionClosed)),
            }
        })
        .await
    }

    /// Sends a message that has no reply
    async fn notify(&self, message: SessionMessage) {
        let sent = timeout(self.request_timeout, self.sender.send(message)).await;
        if !matches!(sent, Ok(Ok(()))) {
            log::debug!(
                "Session {}: dropped notification, actor busy or closed",
                self.session_id
            );
        }
    }

    pub async fn join(&self, player: PlayerId) -> SessionResult<JoinResult> {
        self.request(|response| SessionMessage::Join { player, response })
            .await
    }

    pub async fn leave(&self, player: PlayerId) -> SessionResult<()> {
        self.request(|response| SessionMessage::Leave { player, response })
            .await
    }

    pub async fn ready(&self, player: PlayerId) -> SessionResult<()> {
        self.request(|response| SessionMessage::Ready { player, response })
            .await
    }

    pub async fn submit(&self, action: SubmitAction) -> SessionResult<Event> {
        self.request(|response| SessionMessage::Submit { action, response })
            .await
    }

    pub async fn bind(&self, player: PlayerId, connection: ConnectionId) -> SessionResult<()> {
        self.request(|response| SessionMessage::Bind {
            player,
            connection,
            response,
        })
        .await
    }

    pub async fn unbind(&self, player: PlayerId, connection: ConnectionId) {
        self.notify(SessionMessage::Unbind { player, connection })
            .await;
    }

    pub async fn snapshot(&self, player: PlayerId) -> SessionResult<PlayerView> {
        self.request(|response| SessionMessage::Snapshot { player, response })
            .await
    }

    pub async fn legal_actions(&self, player: PlayerId) -> SessionResult<Vec<Move>> {
        self.request(|response| SessionMessage::LegalActions { player, response })
            .await
    }

    pub async fn summary(&self) -> SessionResult<SessionSummary> {
        self.request(|response| SessionMessage::Summary { response })
            .await
    }

    pub async fn subscribe(
        &self,
        player: PlayerId,
        since_version: u64,
    ) -> SessionResult<EventStream> {
        self.request(|response| SessionMessage::Subscribe {
            player,
            since_version,
            response,
        })
        .await
    }

    pub async fn resync(&self, player: PlayerId) -> SessionResult<(PlayerView, EventStream)> {
        self.request(|response| SessionMessage::Resync { player, response })
            .await
    }

    pub async fn unsubscribe(&self, player: PlayerId) {
        self.notify(SessionMessage::Unsubscribe { player }).await;
    }

    pub async fn abandon(&self, reason: AbandonReason) -> SessionResult<()> {
        self.request(|response| SessionMessage::Abandon { reason, response })
            .await
    }

    /// Stop the actor
    pub async fn close(&self) {
        self.notify(SessionMessage::Close).await;
    }
}

async fn bounded<T>(
    limit: Duration,
    exchange: impl Future<Output = SessionResult<T>>,
) -> SessionResult<T> {
    match timeout(limit, exchange).await {
        Ok(result) => result,
        Err(_) => Err(SessionError::Unavailable(Unavailable::Timeout)),
    }
}

/// Session actor owning a single game instance
pub struct SessionActor {
    /// Game state
    session: Session,

    /// Event fan-out to subscribed players
    broadcaster: Broadcaster,

    /// Message inbox
    inbox: mpsc::Receiver<SessionMessage>,

    /// Timer resolution
    tick_interval: Duration,

    /// Receives the archive record once the session ends
    retirement: mpsc::UnboundedSender<GameRecord>,

    /// Record already handed to the reaper
    retired: bool,

    /// Stop after the current message
    closed: bool,
}

impl SessionActor {
    /// Create a new session actor
    ///
    /// # Returns
    ///
    /// * `(SessionActor, SessionHandle)` - Actor and handle for sending messages
    pub fn new(
        session: Session,
        inbox_capacity: usize,
        tick_interval: Duration,
        request_timeout: Duration,
        retirement: mpsc::UnboundedSender<GameRecord>,
    ) -> (Self, SessionHandle) {
        let (sender, inbox) = mpsc::channel(inbox_capacity.max(1));
        let session_id = session.id();
        let broadcaster = Broadcaster::new(session_id, session.config().event_buffer_capacity);

        let actor = Self {
            session,
            broadcaster,
            inbox,
            tick_interval,
            retirement,
            retired: false,
            closed: false,
        };

        (actor, SessionHandle::new(sender, session_id, request_timeout))
    }

    /// Run the session actor event loop
    pub async fn run(mut self) {
        let id = self.session.id();
        log::info!("Session {} starting", id);

        let mut ticker = interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Events emitted while the session was built (creator's join).
        self.flush();

        loop {
            tokio::select! {
                message = self.inbox.recv() => match message {
                    Some(message) => self.handle_message(message),
                    None => break,
                },

                _ = ticker.tick() => {
                    self.session.tick(Instant::now());
                    self.flush();
                }
            }

            if self.closed {
                break;
            }
        }

        self.broadcaster.close_all();
        log::info!("Session {} closed", id);
    }

    /// Handle a session message
    fn handle_message(&mut self, message: SessionMessage) {
        match message {
            SessionMessage::Join { player, response } => {
                let result = self.session.join(player).map_err(SessionError::from);
                self.reply(response, result);
            }

            SessionMessage::Leave { player, response } => {
                let result = self.session.leave(&player);
                self.reply(response, result);
            }

            SessionMessage::Ready { player, response } => {
                let result = self.session.ready(&player);
                self.reply(response, result);
            }

            SessionMessage::Submit { action, response } => {
                if response.is_closed() {
                    log::debug!(
                        "Session {}: skipping cancelled action of {}",
                        self.session.id(),
                        action.player_id
                    );
                    return;
                }
                let result = self.session.submit(&action);
                self.reply(response, result);
            }

            SessionMessage::Bind {
                player,
                connection,
                response,
            } => {
                let result = self
                    .session
                    .bind(&player, connection)
                    .map_err(SessionError::from);
                self.reply(response, result);
            }

            SessionMessage::Unbind { player, connection } => {
                self.session.unbind(&player, connection, Instant::now());
            }

            SessionMessage::Snapshot { player, response } => {
                let _ = response.send(self.session.view(&player).map_err(SessionError::from));
            }

            SessionMessage::LegalActions { player, response } => {
                let _ = response.send(
                    self.session
                        .legal_actions(&player)
                        .map_err(SessionError::from),
                );
            }

            SessionMessage::Summary { response } => {
                let _ = response.send(Ok(self.session.summary()));
            }

            SessionMessage::Subscribe {
                player,
                since_version,
                response,
            } => {
                let result = self.subscribe(player, since_version);
                let _ = response.send(result);
            }

            SessionMessage::Resync { player, response } => {
                let result = self.session.view(&player).map_err(SessionError::from).and_then(
                    |view| {
                        let stream = self.subscribe(player, view.version)?;
                        Ok((view, stream))
                    },
                );
                let _ = response.send(result);
            }

            SessionMessage::Unsubscribe { player } => {
                self.broadcaster.unsubscribe(&player);
            }

            SessionMessage::Abandon { reason, response } => {
                self.session.abandon(reason);
                self.reply(response, Ok(()));
            }

            SessionMessage::Close => {
                self.closed = true;
            }
        }
    }

    fn subscribe(&mut self, player: PlayerId, since_version: u64) -> SessionResult<EventStream> {
        if !self.session.is_member(&player) {
            return Err(crate::game::Rejection::UnknownPlayer.into());
        }

        let backlog = self.session.replay_since(since_version);
        if self.session.phase().is_terminal() {
            return Ok(Broadcaster::finished_stream(backlog, since_version));
        }
        Ok(self.broadcaster.subscribe(player, backlog, since_version))
    }

    /// Publishes pending events, then answers the caller.
    fn reply<T>(&mut self, response: oneshot::Sender<SessionResult<T>>, result: SessionResult<T>) {
        self.flush();
        let _ = response.send(result);
    }

    /// Publishes every committed event in order, and retires the session
    /// once it has ended.
    fn flush(&mut self) {
        for event in self.session.drain_events() {
            self.broadcaster.publish(&event);
        }

        if self.retired || !self.session.phase().is_terminal() {
            return;
        }
        self.retired = true;
        self.broadcaster.close_all();

        if let Some(record) = self.session.record()
            && self.retirement.send(record).is_err()
        {
            log::warn!(
                "Session {}: reaper is gone, record will not be archived",
                self.session.id()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        game::Rejection,
        session::{SessionConfig, SessionPhase},
    };

    fn spawn_session() -> (SessionHandle, mpsc::UnboundedReceiver<GameRecord>) {
        let session = Session::new(
            SessionId::new(),
            SessionConfig::default(),
            PlayerId::new("alice"),
            Instant::now(),
        )
        .unwrap();
        let (retirement, retired) = mpsc::unbounded_channel();
        let (actor, handle) = SessionActor::new(
            session,
            16,
            Duration::from_millis(50),
            Duration::from_secs(1),
            retirement,
        );
        tokio::spawn(actor.run());
        (handle, retired)
    }

    #[tokio::test]
    async fn test_join_and_start_through_handle() {
        let (handle, _retired) = spawn_session();
        let bob = PlayerId::new("bob");

        assert_eq!(
            handle.join(bob.clone()).await,
            Ok(JoinResult::Joined { seat: 1 })
        );
        handle.ready(PlayerId::new("alice")).await.unwrap();
        handle.ready(bob.clone()).await.unwrap();

        let view = handle.snapshot(bob).await.unwrap();
        assert_eq!(view.phase, SessionPhase::InProgress);
        assert_eq!(view.hand.len(), 1);
    }

    #[tokio::test]
    async fn test_subscribe_requires_membership() {
        let (handle, _retired) = spawn_session();
        let err = handle.subscribe(PlayerId::new("mallory"), 0).await.err();
        assert_eq!(err, Some(SessionError::Rejected(Rejection::UnknownPlayer)));
    }

    #[tokio::test]
    async fn test_abandon_retires_session() {
        let (handle, mut retired) = spawn_session();
        let mut stream = handle.subscribe(PlayerId::new("alice"), 0).await.unwrap();

        handle.abandon(AbandonReason::Shutdown).await.unwrap();

        let record = retired.recv().await.unwrap();
        assert_eq!(record.final_phase, SessionPhase::Abandoned);
        assert_eq!(record.abandon_reason, Some(AbandonReason::Shutdown));

        let event = stream.next().await.unwrap().unwrap();
        assert!(event.is_terminal());
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn test_closed_actor_reports_session_closed() {
        let (handle, _retired) = spawn_session();
        handle.close().await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(
            handle.summary().await.err(),
            Some(SessionError::Unavailable(Unavailable::SessionClosed))
        );
    }
}
