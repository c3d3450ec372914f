//! libSQL storage for the collaborator caches and the run index.
//!
//! The [`Storage`] struct wraps a local libSQL database holding:
//! - `transcript_cache`: transcript text (or a NotAvailable marker) per video
//! - `completion_cache`: generated text keyed by prompt hash and model
//! - `runs`: one row per run directory, for `funnelport runs`
//!
//! **Access rules:** the CLI opens read-write for a run via [`Storage::open`];
//! listing commands use [`Storage::open_readonly`].

mod migrations;

use std::path::Path;

use chrono::{DateTime, Utc};
use funnelport_shared::{FunnelError, Result};
use libsql::{Connection, Database, params};

/// Cached answer from the transcript collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedTranscript {
    Available(String),
    NotAvailable,
}

/// One row of the run index.
#[derive(Debug, Clone, PartialEq)]
pub struct RunIndexEntry {
    pub id: String,
    pub workflow: String,
    pub topic: Option<String>,
    /// Locale tag of the target market, e.g. `portuguese-brazilian`.
    pub target: Option<String>,
    /// State label, e.g. `DONE` or `FAILED(GENERATE)`.
    pub state: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub path: String,
}

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

fn storage_err(e: impl std::fmt::Display) -> FunnelError {
    FunnelError::Storage(e.to_string())
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| FunnelError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` for reading.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(FunnelError::Storage(format!(
                "no database at {}",
                path.display()
            )));
        }
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        FunnelError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 before the first migration.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => match rows.next().await {
                Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
                _ => 0,
            },
            Err(_) => 0,
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(FunnelError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Transcript cache
    // -----------------------------------------------------------------------

    /// Cached transcript for `video_id`, or `None` on a miss.
    pub async fn get_transcript(&self, video_id: &str) -> Result<Option<CachedTranscript>> {
        let mut rows = self
            .conn
            .query(
                "SELECT transcript FROM transcript_cache WHERE video_id = ?1",
                params![video_id],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => {
                let text: Option<String> = row.get(0).map_err(storage_err)?;
                Ok(Some(match text {
                    Some(t) => CachedTranscript::Available(t),
                    None => CachedTranscript::NotAvailable,
                }))
            }
            None => Ok(None),
        }
    }

    /// Record a transcript answer (upserts).
    pub async fn set_transcript(&self, video_id: &str, transcript: Option<&str>) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO transcript_cache (video_id, transcript, fetched_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(video_id) DO UPDATE SET
                   transcript = excluded.transcript,
                   fetched_at = excluded.fetched_at",
                params![video_id, transcript, now.as_str()],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Completion cache
    // -----------------------------------------------------------------------

    pub async fn get_completion(&self, prompt_hash: &str, model: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT response FROM completion_cache WHERE prompt_hash = ?1 AND model = ?2",
                params![prompt_hash, model],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row.get::<String>(0).map_err(storage_err)?)),
            None => Ok(None),
        }
    }

    /// Store a completion (upserts).
    pub async fn set_completion(&self, prompt_hash: &str, model: &str, response: &str) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO completion_cache (prompt_hash, model, response, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(prompt_hash, model) DO UPDATE SET
                   response = excluded.response,
                   created_at = excluded.created_at",
                params![prompt_hash, model, response, now.as_str()],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Run index
    // -----------------------------------------------------------------------

    /// Insert or refresh a run row.
    pub async fn upsert_run(&self, entry: &RunIndexEntry) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "INSERT INTO runs (id, workflow, topic, target, state, started_at, finished_at, path)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(id) DO UPDATE SET
                   state = excluded.state,
                   finished_at = excluded.finished_at",
                params![
                    entry.id.as_str(),
                    entry.workflow.as_str(),
                    entry.topic.as_deref(),
                    entry.target.as_deref(),
                    entry.state.as_str(),
                    entry.started_at.to_rfc3339(),
                    entry.finished_at.map(|t| t.to_rfc3339()),
                    entry.path.as_str(),
                ],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Most recent runs first.
    pub async fn list_runs(&self, limit: u32) -> Result<Vec<RunIndexEntry>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, workflow, topic, target, state, started_at, finished_at, path
                 FROM runs ORDER BY started_at DESC, id DESC LIMIT ?1",
                params![limit],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(row_to_run(&row)?);
        }
        Ok(results)
    }
}

fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| FunnelError::Storage(format!("invalid date: {e}")))
}

fn row_to_run(row: &libsql::Row) -> Result<RunIndexEntry> {
    let started: String = row.get(5).map_err(storage_err)?;
    let finished: Option<String> = row.get(6).map_err(storage_err)?;
    Ok(RunIndexEntry {
        id: row.get(0).map_err(storage_err)?,
        workflow: row.get(1).map_err(storage_err)?,
        topic: row.get(2).map_err(storage_err)?,
        target: row.get(3).map_err(storage_err)?,
        state: row.get(4).map_err(storage_err)?,
        started_at: parse_time(&started)?,
        finished_at: finished.as_deref().map(parse_time).transpose()?,
        path: row.get(7).map_err(storage_err)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn temp_db() -> std::path::PathBuf {
        std::env::temp_dir().join(format!("fp_test_{}.db", Uuid::now_v7()))
    }

    async fn test_storage() -> Storage {
        Storage::open(&temp_db()).await.expect("open test db")
    }

    fn entry(id: &str, day: u32, state: &str) -> RunIndexEntry {
        RunIndexEntry {
            id: id.into(),
            workflow: "full".into(),
            topic: Some("sleep".into()),
            target: Some("portuguese-brazilian".into()),
            state: state.into(),
            started_at: Utc.with_ymd_and_hms(2026, 3, day, 12, 0, 0).unwrap(),
            finished_at: None,
            path: format!("/tmp/runs/{id}"),
        }
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.get_schema_version().await, 2);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = temp_db();
        let first = Storage::open(&tmp).await.expect("first open");
        drop(first);
        let second = Storage::open(&tmp).await.expect("second open");
        assert_eq!(second.get_schema_version().await, 2);
    }

    #[tokio::test]
    async fn transcript_cache_distinguishes_miss_and_not_available() {
        let storage = test_storage().await;
        assert_eq!(storage.get_transcript("abc").await.unwrap(), None);

        storage.set_transcript("abc", None).await.unwrap();
        assert_eq!(
            storage.get_transcript("abc").await.unwrap(),
            Some(CachedTranscript::NotAvailable)
        );

        storage.set_transcript("abc", Some("hello")).await.unwrap();
        assert_eq!(
            storage.get_transcript("abc").await.unwrap(),
            Some(CachedTranscript::Available("hello".into()))
        );
    }

    #[tokio::test]
    async fn completion_cache_keyed_by_model() {
        let storage = test_storage().await;
        storage.set_completion("h1", "m1", "first").await.unwrap();
        storage.set_completion("h1", "m1", "second").await.unwrap();

        assert_eq!(
            storage.get_completion("h1", "m1").await.unwrap().as_deref(),
            Some("second")
        );
        assert_eq!(storage.get_completion("h1", "m2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn run_index_lists_newest_first() {
        let storage = test_storage().await;
        storage.upsert_run(&entry("a", 1, "DONE")).await.unwrap();
        storage.upsert_run(&entry("b", 2, "GENERATE")).await.unwrap();

        let mut finished = entry("b", 2, "FAILED(GENERATE)");
        finished.finished_at = Some(Utc.with_ymd_and_hms(2026, 3, 2, 12, 5, 0).unwrap());
        storage.upsert_run(&finished).await.unwrap();

        let runs = storage.list_runs(10).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0], finished);
        assert_eq!(runs[1].id, "a");
        assert_eq!(runs[1].finished_at, None);
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = temp_db();
        let rw = Storage::open(&tmp).await.unwrap();
        rw.set_completion("h", "m", "x").await.unwrap();
        drop(rw);

        let ro = Storage::open_readonly(&tmp).await.unwrap();
        assert_eq!(ro.get_completion("h", "m").await.unwrap().as_deref(), Some("x"));
        let err = ro.set_completion("h", "m", "y").await.unwrap_err();
        assert!(err.to_string().contains("read-only"));
    }

    #[tokio::test]
    async fn readonly_requires_existing_file() {
        assert!(Storage::open_readonly(&temp_db()).await.is_err());
    }
}
