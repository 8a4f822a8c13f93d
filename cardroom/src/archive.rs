//! Archival of finished sessions.
//!
//! The registry hands every terminal session to a [`GameArchive`] before it
//! evicts it. The trait is the seam for durable storage; the core ships an
//! in-memory implementation and the server writes JSON lines to disk.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};
use thiserror::Error;

use crate::{
    game::{Outcome, PlayerId, SessionId, Table},
    session::{AbandonReason, Genesis, LoggedAction, SessionConfig, SessionPhase},
};

/// Everything needed to audit or replay a finished session.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct GameRecord {
    pub session_id: SessionId,
    pub config: SessionConfig,
    pub players: Vec<PlayerId>,
    /// Absent when the session never started.
    pub genesis: Option<Genesis>,
    pub actions: Vec<LoggedAction>,
    /// Table as it stood when the session ended.
    pub final_table: Option<Table>,
    pub final_phase: SessionPhase,
    pub final_version: u64,
    pub outcome: Option<Outcome>,
    pub abandon_reason: Option<AbandonReason>,
    pub created_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("record encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("archive unavailable: {0}")]
    Unavailable(String),
}

pub type ArchiveResult<T> = Result<T, ArchiveError>;

/// Sink for finished sessions
#[async_trait]
pub trait GameArchive: Send + Sync {
    /// Persist a record. Storing the same session twice overwrites it.
    async fn store(&self, record: GameRecord) -> ArchiveResult<()>;

    /// Look up a record by session id
    async fn load(&self, session_id: SessionId) -> ArchiveResult<Option<GameRecord>>;
}

/// Archive that keeps records in process memory
#[derive(Clone, Default)]
pub struct MemoryArchive {
    records: Arc<Mutex<HashMap<SessionId, GameRecord>>>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl GameArchive for MemoryArchive {
    async fn store(&self, record: GameRecord) -> ArchiveResult<()> {
        let mut records = self
            .records
            .lock()
            .map_err(|e| ArchiveError::Unavailable(e.to_string()))?;
        records.insert(record.session_id, record);
        Ok(())
    }

    async fn load(&self, session_id: SessionId) -> ArchiveResult<Option<GameRecord>> {
        let records = self
            .records
            .lock()
            .map_err(|e| ArchiveError::Unavailable(e.to_string()))?;
        Ok(records.get(&session_id).cloned())
    }
}
