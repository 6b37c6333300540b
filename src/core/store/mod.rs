mod content;
mod execution;
mod migrations;
mod requests;
mod schedule;
mod stats;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, OpenFlags};
use tokio::sync::Mutex;
use tracing::info;

use crate::core::domain::{Category, ContentStatus, Difficulty, ExecutionStatus, ScheduleStatus};
use crate::core::errors::PersistenceError;
use crate::core::time::ScheduleTime;
use crate::platform::{NativePlatform, Platform, ensure_private_dir};

pub use stats::{ExecutionBucket, PeriodStats};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed store for content, schedules, execution logs and topic
/// requests.
///
/// All mutations go through the single writer connection. Queries use a
/// separate read-only connection so they never wait on the writer lock.
#[derive(Clone)]
pub struct Repository {
    writer: Arc<Mutex<Connection>>,
    reader: Arc<Mutex<Connection>>,
    path: PathBuf,
    /// Scratch directory owned by test repositories, removed with the last clone.
    #[cfg(test)]
    _scratch: Option<Arc<tempfile::TempDir>>,
}

impl Repository {
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, PersistenceError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            ensure_private_dir(parent)?;
        }

        let mut writer = Connection::open(&path)?;
        NativePlatform::restrict_file_permissions(&path);
        writer.busy_timeout(BUSY_TIMEOUT)?;
        writer.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")?;
        let applied = migrations::run(&mut writer)?;
        if applied > 0 {
            info!("Applied {} schema migration(s) to {}", applied, path.display());
        }

        let reader = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        reader.busy_timeout(BUSY_TIMEOUT)?;

        Ok(Self {
            writer: Arc::new(Mutex::new(writer)),
            reader: Arc::new(Mutex::new(reader)),
            path,
            #[cfg(test)]
            _scratch: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cheap round trip used by the health check.
    pub async fn ping(&self) -> Result<(), PersistenceError> {
        let db = self.reader.lock().await;
        db.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

/// Store enums and times as their text form.
macro_rules! text_column {
    ($($ty:ty),+ $(,)?) => {$(
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.to_string()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse::<$ty>()
                    .map_err(|e| FromSqlError::Other(e.to_string().into()))
            }
        }
    )+};
}

text_column!(
    Category,
    Difficulty,
    ContentStatus,
    ScheduleStatus,
    ExecutionStatus,
    ScheduleTime,
);

#[cfg(test)]
pub async fn test_repository() -> Repository {
    let scratch = tempfile::Builder::new()
        .prefix("daily-bot-test-")
        .tempdir()
        .expect("create scratch directory");
    let mut repo = Repository::open(scratch.path().join("daily_bot.db"))
        .await
        .expect("open test repository");
    repo._scratch = Some(Arc::new(scratch));
    repo
}
