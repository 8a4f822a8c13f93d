//! Ordered event fan-out to the players of one session.
//!
//! The broadcaster is owned by a session actor, so publishing happens in
//! commit order. Every subscriber gets a bounded buffer; a subscriber that
//! lets its buffer fill up is dropped and its stream reports
//! [`Unavailable::Lagged`] so the client goes through a full resync instead
//! of incremental replay.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use tokio::sync::mpsc;

use super::{
    errors::Unavailable,
    state::{AbandonReason, SessionPhase},
};
use crate::game::{Move, Outcome, PlayerId, SessionId};

/// Immutable record of a committed state change.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Event {
    pub session_id: SessionId,
    /// Session version after the change.
    pub version: u64,
    pub at: DateTime<Utc>,
    pub kind: EventKind,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    PlayerJoined {
        player: PlayerId,
        seat: usize,
    },
    /// Later seats shift down when a player leaves; `seats` is the new
    /// seating order, indexed by seat.
    PlayerLeft {
        player: PlayerId,
        seats: Vec<PlayerId>,
    },
    PlayerReady {
        player: PlayerId,
    },
    /// Cards are dealt. Only counts are public; each player reads their own
    /// hand through a snapshot.
    GameStarted {
        seats: Vec<PlayerId>,
        hand_sizes: Vec<usize>,
        first: PlayerId,
    },
    /// A submitted action was applied. This is the only kind that bumps the
    /// session version.
    ActionApplied {
        player: PlayerId,
        action: Move,
        next: Option<PlayerId>,
        /// A new hand was shuffled and dealt as part of this action.
        redealt: bool,
        phase: SessionPhase,
        outcome: Option<Outcome>,
    },
    Suspended {
        stale: Vec<PlayerId>,
    },
    Resumed,
    Abandoned {
        reason: AbandonReason,
    },
}

impl Event {
    #[must_use]
    pub fn new(session_id: SessionId, version: u64, kind: EventKind) -> Self {
        Self {
            session_id,
            version,
            at: Utc::now(),
            kind,
        }
    }

    /// Whether this event records an applied action.
    #[must_use]
    pub fn is_action(&self) -> bool {
        matches!(self.kind, EventKind::ActionApplied { .. })
    }

    /// Whether this is the last event a session will ever publish.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        match &self.kind {
            EventKind::ActionApplied { outcome, .. } => outcome.is_some(),
            EventKind::Abandoned { .. } => true,
            _ => false,
        }
    }
}

struct Subscriber {
    sender: mpsc::Sender<Event>,
    lagged: Arc<AtomicBool>,
}

/// Per-session fan-out with bounded subscriber buffers.
pub struct Broadcaster {
    session_id: SessionId,
    capacity: usize,
    subscribers: HashMap<PlayerId, Subscriber>,
}

impl Broadcaster {
    pub fn new(session_id: SessionId, capacity: usize) -> Self {
        Self {
            session_id,
            capacity: capacity.max(1),
            subscribers: HashMap::new(),
        }
    }

    /// Attaches `player` for live delivery after `backlog`. A previous
    /// subscription of the same player is replaced and its stream ends.
    pub fn subscribe(
        &mut self,
        player: PlayerId,
        backlog: Vec<Event>,
        since_version: u64,
    ) -> EventStream {
        let (sender, live) = mpsc::channel(self.capacity);
        let lagged = Arc::new(AtomicBool::new(false));

        if self
            .subscribers
            .insert(
                player.clone(),
                Subscriber {
                    sender,
                    lagged: lagged.clone(),
                },
            )
            .is_some()
        {
            log::debug!(
                "Session {}: replaced subscription of {}",
                self.session_id,
                player
            );
        }

        EventStream::new(backlog, live, lagged, since_version)
    }

    /// Stream that only replays `backlog`, for sessions that already ended.
    pub fn finished_stream(backlog: Vec<Event>, since_version: u64) -> EventStream {
        let (_, live) = mpsc::channel(1);
        EventStream::new(backlog, live, Arc::new(AtomicBool::new(false)), since_version)
    }

    /// Deliver `event` to every subscriber without waiting.
    pub fn publish(&mut self, event: &Event) {
        let session_id = self.session_id;
        self.subscribers.retain(|player, subscriber| {
            match subscriber.sender.try_send(event.clone()) {
                Ok(_) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    log::warn!(
                        "Session {}: subscriber {} buffer full, forcing resync",
                        session_id,
                        player
                    );
                    subscriber.lagged.store(true, Ordering::Release);
                    false
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    log::debug!("Session {}: subscriber {} disconnected", session_id, player);
                    false
                }
            }
        });
    }

    pub fn unsubscribe(&mut self, player: &PlayerId) {
        self.subscribers.remove(player);
    }

    /// Ends every live stream once buffered events are consumed.
    pub fn close_all(&mut self) {
        self.subscribers.clear();
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

/// Lazy, ordered and resumable sequence of a session's events.
///
/// Yields the replayed backlog first, then live events. Action events at
/// or below the last delivered version are skipped, so a replay that
/// overlaps live delivery never produces duplicates.
pub struct EventStream {
    backlog: VecDeque<Event>,
    live: mpsc::Receiver<Event>,
    lagged: Arc<AtomicBool>,
    last_version: u64,
    lag_reported: bool,
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("last_version", &self.last_version)
            .field("buffered", &self.backlog.len())
            .finish_non_exhaustive()
    }
}

impl EventStream {
    fn new(
        backlog: Vec<Event>,
        live: mpsc::Receiver<Event>,
        lagged: Arc<AtomicBool>,
        since_version: u64,
    ) -> Self {
        Self {
            backlog: backlog.into(),
            live,
            lagged,
            last_version: since_version,
            lag_reported: false,
        }
    }

    /// Next event, `Err(Unavailable::Lagged)` once if the buffer overflowed,
    /// or `None` when the stream has ended.
    pub async fn next(&mut self) -> Option<Result<Event, Unavailable>> {
        loop {
            let event = match self.backlog.pop_front() {
                Some(event) => event,
                None => match self.live.recv().await {
                    Some(event) => event,
                    None => {
                        if self.lagged.load(Ordering::Acquire) && !self.lag_reported {
                            self.lag_reported = true;
                            return Some(Err(Unavailable::Lagged));
                        }
                        return None;
                    }
                },
            };

            if event.is_action() {
                if event.version <= self.last_version {
                    continue;
                }
                self.last_version = event.version;
            }
            return Some(Ok(event));
        }
    }
}
