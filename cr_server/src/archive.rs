//! Append-only JSON lines archive for finished sessions.
//!
//! Each record is one line. Storing a session again appends a newer line;
//! lookups return the last line written for that session.

use async_trait::async_trait;
use cardroom::{
    archive::{ArchiveResult, GameArchive, GameRecord},
    game::SessionId,
};
use std::path::{Path, PathBuf};
use tokio::{
    fs::{File, OpenOptions},
    io::AsyncWriteExt,
    sync::Mutex,
};

pub struct JsonLinesArchive {
    path: PathBuf,
    /// Serializes appends so lines never interleave.
    file: Mutex<File>,
}

impl JsonLinesArchive {
    /// Opens `path` for appending, creating it and its parent directory
    /// when missing.
    pub async fn open(path: impl AsRef<Path>) -> ArchiveResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        log::info!("Archiving finished sessions to {}", path.display());
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }
}

#[async_trait]
impl GameArchive for JsonLinesArchive {
    async fn store(&self, record: GameRecord) -> ArchiveResult<()> {
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    async fn load(&self, session_id: SessionId) -> ArchiveResult<Option<GameRecord>> {
        // Held so a concurrent append is never read half written
        let _file = self.file.lock().await;
        let contents = tokio::fs::read_to_string(&self.path).await?;

        for (number, line) in contents.lines().collect::<Vec<_>>().into_iter().enumerate().rev() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<GameRecord>(line) {
                Ok(record) if record.session_id == session_id => return Ok(Some(record)),
                Ok(_) => {}
                Err(e) => log::warn!(
                    "Skipping unreadable line {} of {}: {}",
                    number + 1,
                    self.path.display(),
                    e
                ),
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardroom::{
        game::PlayerId,
        session::{AbandonReason, Session, SessionConfig},
    };
    use tokio::time::Instant;

    fn temp_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("cr_server_archive_{}", SessionId::new()))
            .join("games.jsonl")
    }

    fn abandoned_record() -> GameRecord {
        let mut session = Session::new(
            SessionId::new(),
            SessionConfig::default(),
            PlayerId::new("alice"),
            Instant::now(),
        )
        .unwrap();
        session.abandon(AbandonReason::FormingTimeout);
        session.record().unwrap()
    }

    #[tokio::test]
    async fn test_store_then_load() {
        let path = temp_path();
        let archive = JsonLinesArchive::open(&path).await.unwrap();
        let first = abandoned_record();
        let second = abandoned_record();

        archive.store(first.clone()).await.unwrap();
        archive.store(second.clone()).await.unwrap();

        assert_eq!(archive.load(first.session_id).await.unwrap(), Some(first));
        assert_eq!(archive.load(second.session_id).await.unwrap(), Some(second));
        assert_eq!(archive.load(SessionId::new()).await.unwrap(), None);

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_latest_line_wins() {
        let archive = JsonLinesArchive::open(temp_path()).await.unwrap();
        let record = abandoned_record();

        archive.store(record.clone()).await.unwrap();
        let mut updated = record.clone();
        updated.final_version = 9;
        archive.store(updated).await.unwrap();

        let loaded = archive.load(record.session_id).await.unwrap().unwrap();
        assert_eq!(loaded.final_version, 9);
    }

    #[tokio::test]
    async fn test_reopen_appends() {
        let path = temp_path();
        let record = abandoned_record();
        JsonLinesArchive::open(&path)
            .await
            .unwrap()
            .store(record.clone())
            .await
            .unwrap();

        let reopened = JsonLinesArchive::open(&path).await.unwrap();
        reopened.store(abandoned_record()).await.unwrap();

        assert_eq!(reopened.load(record.session_id).await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_corrupt_line_is_skipped() {
        let path = temp_path();
        let archive = JsonLinesArchive::open(&path).await.unwrap();
        let record = abandoned_record();
        archive.store(record.clone()).await.unwrap();

        {
            let mut file = archive.file.lock().await;
            file.write_all(b"{not json\n").await.unwrap();
            file.flush().await.unwrap();
        }

        assert_eq!(archive.load(record.session_id).await.unwrap(), Some(record));
    }
}
