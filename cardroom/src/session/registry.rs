//! Session registry for spawning, routing to and retiring session actors.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::{
    sync::{RwLock, mpsc, oneshot},
    task::JoinSet,
    time::{Instant, sleep, sleep_until},
};

use super::{
    actor::{SessionActor, SessionHandle},
    broadcast::{Event, EventStream},
    config::{RegistryConfig, SessionConfig},
    errors::{SessionError, SessionResult, Unavailable},
    messages::{JoinResult, PlayerView, SessionSummary, SubmitAction},
    state::{AbandonReason, Session, SessionPhase},
};
use crate::{
    archive::{GameArchive, GameRecord},
    game::{ConnectionId, Move, PlayerId, SessionId},
};

type Sessions = Arc<RwLock<HashMap<SessionId, SessionHandle>>>;

/// What a shutdown drain achieved.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ShutdownReport {
    /// Live sessions when the drain began
    pub sessions: usize,
    /// Records written to the archive during the drain
    pub archived: usize,
}

/// Registry managing every live session of the process
pub struct SessionRegistry {
    config: RegistryConfig,

    /// Active session handles
    sessions: Sessions,

    /// Handed to each actor for its final record
    retirement: mpsc::UnboundedSender<GameRecord>,

    /// Asks the reaper to archive and evict everything pending now
    flush: mpsc::Sender<oneshot::Sender<usize>>,

    /// Cleared once shutdown begins
    accepting: AtomicBool,
}

impl SessionRegistry {
    /// Create a new registry and spawn its reaper
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Arguments
    ///
    /// * `config` - Registry configuration
    /// * `archive` - Destination of finished sessions
    pub fn new(config: RegistryConfig, archive: Arc<dyn GameArchive>) -> SessionResult<Self> {
        config.validate().map_err(SessionError::InvalidConfig)?;

        let sessions: Sessions = Arc::new(RwLock::new(HashMap::new()));
        let (retirement, retired) = mpsc::unbounded_channel();
        let (flush, flush_requests) = mpsc::channel(4);

        let reaper = Reaper {
            archive,
            sessions: sessions.clone(),
            retention: config.retention(),
            pending: VecDeque::new(),
            retired,
            flush_requests,
        };
        tokio::spawn(reaper.run());

        Ok(Self {
            config,
            sessions,
            retirement,
            flush,
            accepting: AtomicBool::new(true),
        })
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Whether new sessions and joins are still accepted
    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    fn ensure_accepting(&self) -> SessionResult<()> {
        if self.is_accepting() {
            Ok(())
        } else {
            Err(Unavailable::ShuttingDown.into())
        }
    }

    /// Create and spawn a new session with `creator` in the first seat
    ///
    /// # Arguments
    ///
    /// * `creator` - Player taking seat 0
    /// * `config` - Session configuration
    ///
    /// # Returns
    ///
    /// * `SessionResult<SessionId>` - Id of the new session
    pub async fn create_session(
        &self,
        creator: PlayerId,
        config: SessionConfig,
    ) -> SessionResult<SessionId> {
        self.ensure_accepting()?;

        let mut sessions = self.sessions.write().await;
        if sessions.len() >= self.config.max_sessions {
            return Err(Unavailable::AtCapacity.into());
        }

        let id = SessionId::new();
        let variant = config.variant;
        let session = Session::new(id, config, creator.clone(), Instant::now())?;
        let (actor, handle) = SessionActor::new(
            session,
            self.config.inbox_capacity,
            self.config.tick_interval(),
            self.config.submit_timeout(),
            self.retirement.clone(),
        );
        sessions.insert(id, handle);
        drop(sessions);

        let task = tokio::spawn(actor.run());
        let sessions = self.sessions.clone();
        tokio::spawn(async move {
            if let Err(e) = task.await
                && e.is_panic()
            {
                log::error!("Session {} actor panicked, evicting: {}", id, e);
                sessions.write().await.remove(&id);
            }
        });

        log::info!("Created {} session {} for {}", variant, id, creator);
        Ok(id)
    }

    /// Get a session handle
    pub async fn get_session(&self, id: SessionId) -> SessionResult<SessionHandle> {
        let sessions = self.sessions.read().await;
        sessions
            .get(&id)
            .cloned()
            .ok_or(SessionError::NotFound(id))
    }

    pub async fn join_session(
        &self,
        id: SessionId,
        player: PlayerId,
    ) -> SessionResult<JoinResult> {
        self.ensure_accepting()?;
        self.get_session(id).await?.join(player).await
    }

    pub async fn leave_session(&self, id: SessionId, player: PlayerId) -> SessionResult<()> {
        self.get_session(id).await?.leave(player).await
    }

    pub async fn ready(&self, id: SessionId, player: PlayerId) -> SessionResult<()> {
        self.get_session(id).await?.ready(player).await
    }

    /// Route an action to its session
    ///
    /// # Returns
    ///
    /// * `SessionResult<Event>` - The committed event, already published
    pub async fn submit(&self, action: SubmitAction) -> SessionResult<Event> {
        self.get_session(action.session_id)
            .await?
            .submit(action)
            .await
    }

    pub async fn snapshot(&self, id: SessionId, player: PlayerId) -> SessionResult<PlayerView> {
        self.get_session(id).await?.snapshot(player).await
    }

    pub async fn legal_actions(
        &self,
        id: SessionId,
        player: PlayerId,
    ) -> SessionResult<Vec<Move>> {
        self.get_session(id).await?.legal_actions(player).await
    }

    /// Events after `since_version`, then live delivery
    pub async fn subscribe(
        &self,
        id: SessionId,
        player: PlayerId,
        since_version: u64,
    ) -> SessionResult<EventStream> {
        self.get_session(id)
            .await?
            .subscribe(player, since_version)
            .await
    }

    /// Fresh snapshot plus a stream continuing from it
    pub async fn resync(
        &self,
        id: SessionId,
        player: PlayerId,
    ) -> SessionResult<(PlayerView, EventStream)> {
        self.get_session(id).await?.resync(player).await
    }

    pub async fn unsubscribe(&self, id: SessionId, player: PlayerId) {
        if let Ok(handle) = self.get_session(id).await {
            handle.unsubscribe(player).await;
        }
    }

    pub async fn bind(
        &self,
        id: SessionId,
        player: PlayerId,
        connection: ConnectionId,
    ) -> SessionResult<()> {
        self.get_session(id)
            .await?
            .bind(player, connection)
            .await
    }

    pub async fn unbind(&self, id: SessionId, player: PlayerId, connection: ConnectionId) {
        if let Ok(handle) = self.get_session(id).await {
            handle.unbind(player, connection).await;
        }
    }

    /// List every live session. Sessions that do not answer in time are
    /// left out.
    pub async fn list_sessions(&self) -> Vec<SessionSummary> {
        let handles: Vec<SessionHandle> = self.sessions.read().await.values().cloned().collect();

        let mut summaries = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.summary().await {
                Ok(summary) => summaries.push(summary),
                Err(e) => log::debug!("Session {} skipped in listing: {}", handle.session_id(), e),
            }
        }
        summaries.sort_by_key(|s| s.created_at);
        summaries
    }

    /// Get live session count
    pub async fn active_session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Stop accepting work, let running games finish until `drain_timeout`
    /// passes, abandon whatever is left, then archive and evict everything.
    pub async fn shutdown(&self, drain_timeout: Duration) -> ShutdownReport {
        self.accepting.store(false, Ordering::Release);

        let deadline = Instant::now() + drain_timeout;
        let sessions = self.active_session_count().await;
        log::info!("Draining {} sessions", sessions);

        while Instant::now() < deadline && !self.unfinished(true).await.is_empty() {
            let wait = deadline.saturating_duration_since(Instant::now());
            sleep(self.config.tick_interval().min(wait)).await;
        }

        let mut drains = JoinSet::new();
        for handle in self.unfinished(false).await {
            drains.spawn(async move {
                let id = handle.session_id();
                (id, handle.abandon(AbandonReason::Shutdown).await)
            });
        }
        while let Some(joined) = drains.join_next().await {
            if let Ok((id, Err(e))) = joined {
                log::warn!("Session {} did not abandon cleanly: {}", id, e);
            }
        }

        let (done, archived) = oneshot::channel();
        let archived = if self.flush.send(done).await.is_ok() {
            archived.await.unwrap_or(0)
        } else {
            0
        };

        let leftovers: Vec<(SessionId, SessionHandle)> =
            self.sessions.write().await.drain().collect();
        for (id, handle) in leftovers {
            log::warn!("Session {} evicted without archive record", id);
            handle.close().await;
        }

        log::info!("Shutdown complete, {} records archived", archived);
        ShutdownReport { sessions, archived }
    }

    /// Sessions that have not ended. With `playing`, only those with a
    /// game underway. Sessions that do not answer count as unfinished.
    async fn unfinished(&self, playing: bool) -> Vec<SessionHandle> {
        let handles: Vec<SessionHandle> = self.sessions.read().await.values().cloned().collect();

        let mut unfinished = Vec::new();
        for handle in handles {
            let keep = match handle.summary().await {
                Ok(summary) if playing => matches!(
                    summary.phase,
                    SessionPhase::InProgress | SessionPhase::Suspended
                ),
                Ok(summary) => !summary.phase.is_terminal(),
                Err(_) => true,
            };
            if keep {
                unfinished.push(handle);
            }
        }
        unfinished
    }
}

/// Archives finished sessions once their retention window passes, then
/// evicts them from the registry.
struct Reaper {
    archive: Arc<dyn GameArchive>,
    sessions: Sessions,
    retention: Duration,
    /// Retired sessions ordered by eviction deadline
    pending: VecDeque<(Instant, GameRecord)>,
    retired: mpsc::UnboundedReceiver<GameRecord>,
    flush_requests: mpsc::Receiver<oneshot::Sender<usize>>,
}

impl Reaper {
    async fn run(mut self) {
        loop {
            let next_due = self.pending.front().map(|(due, _)| *due);

            tokio::select! {
                record = self.retired.recv() => match record {
                    Some(record) => self.schedule(record),
                    None => {
                        self.flush_all().await;
                        break;
                    }
                },

                Some(done) = self.flush_requests.recv() => {
                    let archived = self.flush_all().await;
                    let _ = done.send(archived);
                }

                _ = sleep_until(next_due.unwrap_or_else(Instant::now)), if next_due.is_some() => {
                    self.evict_due(Instant::now()).await;
                }
            }
        }
    }

    fn schedule(&mut self, record: GameRecord) {
        log::debug!(
            "Session {} retired as {}, evicting in {:?}",
            record.session_id,
            record.final_phase,
            self.retention
        );
        self.pending
            .push_back((Instant::now() + self.retention, record));
    }

    async fn evict_due(&mut self, now: Instant) {
        while self.pending.front().is_some_and(|(due, _)| *due <= now) {
            if let Some((_, record)) = self.pending.pop_front() {
                self.retire(record).await;
            }
        }
    }

    async fn flush_all(&mut self) -> usize {
        while let Ok(record) = self.retired.try_recv() {
            self.schedule(record);
        }

        let mut archived = 0;
        while let Some((_, record)) = self.pending.pop_front() {
            if self.retire(record).await {
                archived += 1;
            }
        }
        archived
    }

    /// Archives `record` and then evicts its session. Returns whether the
    /// archive accepted the record.
    async fn retire(&self, record: GameRecord) -> bool {
        let id = record.session_id;
        let stored = match self.archive.store(record.clone()).await {
            Ok(()) => true,
            Err(e) => {
                log::error!(
                    "Failed to archive session {}: {}. Record: {}",
                    id,
                    e,
                    serde_json::to_string(&record).unwrap_or_else(|e| e.to_string())
                );
                false
            }
        };

        let handle = self.sessions.write().await.remove(&id);
        if let Some(handle) = handle {
            handle.close().await;
        }
        log::info!("Session {} evicted", id);
        stored
    }
}
