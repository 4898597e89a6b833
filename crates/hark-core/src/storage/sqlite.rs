use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::TimerStore;
use crate::error::{HarkError, Result};
use crate::model::{ActiveTimer, TimerRecord};

/// SQLite-backed timer store.
///
/// Uses a single `Connection` behind `Arc<Mutex<>>` so it can be shared
/// across async tasks. All blocking SQLite calls go through
/// [`with_conn`](Self::with_conn) which runs them on the Tokio blocking
/// thread-pool; holding the lock for the whole closure makes each store
/// operation atomic.
pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl SqliteStorage {
    /// Open (or create) a file-backed SQLite database at `path`, creating
    /// parent directories as needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                HarkError::Storage(format!(
                    "failed to create database directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
        let conn = Connection::open(&path)
            .map_err(|e| HarkError::Storage(format!("failed to open SQLite database: {e}")))?;

        Self::configure_and_init(conn, path)
    }

    /// Open an in-memory SQLite database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            HarkError::Storage(format!("failed to open in-memory SQLite database: {e}"))
        })?;

        Self::configure_and_init(conn, PathBuf::from(":memory:"))
    }

    /// Return the path this database was opened with (`:memory:` for in-memory).
    pub fn path(&self) -> &Path {
        &self.path
    }

    // ── helpers ────────────────────────────────────────────────────────

    fn configure_and_init(conn: Connection, path: PathBuf) -> Result<Self> {
        // WAL mode for better concurrent-read performance.
        conn.execute_batch("PRAGMA journal_mode = WAL;")
            .map_err(|e| HarkError::Storage(format!("failed to set WAL mode: {e}")))?;

        let storage = Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        };

        storage.create_tables()?;
        Ok(storage)
    }

    /// Create the timers table (idempotent).
    fn create_tables(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| HarkError::Storage(format!("failed to acquire database lock: {e}")))?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS timers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                duration_seconds INTEGER NOT NULL CHECK (duration_seconds > 0),
                label TEXT,
                created_at TEXT NOT NULL
            );
            ",
        )
        .map_err(|e| HarkError::Storage(format!("failed to create tables: {e}")))?;

        Ok(())
    }

    /// Run a blocking closure against the SQLite connection on the Tokio
    /// blocking thread-pool.
    pub(crate) async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|e| {
                HarkError::Storage(format!("failed to acquire database lock: {e}"))
            })?;
            f(&conn)
        })
        .await
        .map_err(|e| HarkError::Storage(format!("task join error: {e}")))?
    }
}

type RawTimerRow = (i64, i64, Option<String>, String);

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawTimerRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn into_record((id, duration_seconds, label, created_at): RawTimerRow) -> Result<TimerRecord> {
    let duration_seconds = u32::try_from(duration_seconds).map_err(|_| {
        HarkError::Storage(format!(
            "timer {id} has out-of-range duration {duration_seconds}"
        ))
    })?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| HarkError::Storage(format!("timer {id} has bad created_at: {e}")))?
        .with_timezone(&Utc);
    Ok(TimerRecord {
        id,
        duration_seconds,
        label,
        created_at,
    })
}

impl TimerStore for SqliteStorage {
    async fn create(&self, duration_seconds: u32, label: Option<String>) -> Result<TimerRecord> {
        if duration_seconds == 0 {
            return Err(HarkError::InvalidInput(
                "timer duration must be positive".into(),
            ));
        }
        // Stored with microsecond precision; truncate up front so the
        // returned record matches what a later read produces.
        let created_at = Utc::now().trunc_subsecs(6);
        let stamp = created_at.to_rfc3339_opts(SecondsFormat::Micros, true);

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO timers (duration_seconds, label, created_at) VALUES (?1, ?2, ?3)",
                params![duration_seconds, label, stamp],
            )
            .map_err(|e| HarkError::Storage(format!("failed to insert timer: {e}")))?;

            Ok(TimerRecord {
                id: conn.last_insert_rowid(),
                duration_seconds,
                label,
                created_at,
            })
        })
        .await
    }

    async fn list_active_at(&self, now: DateTime<Utc>) -> Result<Vec<ActiveTimer>> {
        let records = self
            .with_conn(|conn| {
                let mut stmt = conn
                    .prepare(
                        "SELECT id, duration_seconds, label, created_at FROM timers ORDER BY id",
                    )
                    .map_err(|e| HarkError::Storage(format!("failed to prepare query: {e}")))?;
                let rows = stmt
                    .query_map([], read_row)
                    .map_err(|e| HarkError::Storage(format!("failed to list timers: {e}")))?;

                let mut records = Vec::new();
                for row in rows {
                    let row =
                        row.map_err(|e| HarkError::Storage(format!("failed to read timer: {e}")))?;
                    records.push(into_record(row)?);
                }
                Ok(records)
            })
            .await?;

        Ok(records.iter().filter_map(|r| r.active_at(now)).collect())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<TimerRecord>> {
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT id, duration_seconds, label, created_at FROM timers WHERE id = ?1",
                    params![id],
                    read_row,
                )
                .optional()
                .map_err(|e| HarkError::Storage(format!("failed to fetch timer {id}: {e}")))?;
            row.map(into_record).transpose()
        })
        .await
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        self.with_conn(move |conn| {
            let deleted = conn
                .execute("DELETE FROM timers WHERE id = ?1", params![id])
                .map_err(|e| HarkError::Storage(format!("failed to delete timer {id}: {e}")))?;
            Ok(deleted > 0)
        })
        .await
    }

    async fn count(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let n: i64 = conn
                .query_row("SELECT COUNT(*) FROM timers", [], |row| row.get(0))
                .map_err(|e| HarkError::Storage(format!("failed to count timers: {e}")))?;
            Ok(usize::try_from(n).unwrap_or_default())
        })
        .await
    }
}
