mod sqlite;

pub use sqlite::SqliteStorage;

use std::future::Future;
use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::config::HarkConfig;
use crate::error::{HarkError, Result};
use crate::model::{ActiveTimer, TimerRecord};

/// Persistent collection of timers. Every method is a single atomic
/// operation with respect to other callers sharing the same store.
pub trait TimerStore: Send + Sync {
    /// Persist a new timer, assigning its id and creation time.
    fn create(
        &self,
        duration_seconds: u32,
        label: Option<String>,
    ) -> impl Future<Output = Result<TimerRecord>> + Send;

    /// Timers still running at `now`, in insertion order. Expired records
    /// are skipped but left in place.
    fn list_active_at(
        &self,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<ActiveTimer>>> + Send;

    fn list_active(&self) -> impl Future<Output = Result<Vec<ActiveTimer>>> + Send {
        self.list_active_at(Utc::now())
    }

    fn find_by_id(&self, id: i64) -> impl Future<Output = Result<Option<TimerRecord>>> + Send;

    /// Remove a timer. Returns `false` when no record had this id.
    fn delete(&self, id: i64) -> impl Future<Output = Result<bool>> + Send;

    /// Total records, expired ones included.
    fn count(&self) -> impl Future<Output = Result<usize>> + Send;
}

/// Open the SQLite store named by the configuration.
pub fn create_backend(config: &HarkConfig) -> Result<SqliteStorage> {
    let path = match &config.storage.path {
        Some(p) => PathBuf::from(p),
        None => default_sqlite_path()?,
    };
    SqliteStorage::open(&path)
}

/// Default SQLite path: `~/.config/hark/timers.db`
pub fn default_sqlite_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|p| p.join("hark").join("timers.db"))
        .ok_or_else(|| HarkError::Config("cannot determine config directory".to_string()))
}
