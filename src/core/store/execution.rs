use chrono::Utc;
use rusqlite::{OptionalExtension, Row, params};

use super::Repository;
use crate::core::domain::{ExecutionLog, ExecutionStatus};
use crate::core::errors::PersistenceError;

const EXECUTION_COLUMNS: &str = "id, schedule_id, content_id, status, attempt_count, \
     error_message, started_at, completed_at, duration_ms";

fn execution_from_row(row: &Row<'_>) -> rusqlite::Result<ExecutionLog> {
    Ok(ExecutionLog {
        id: row.get(0)?,
        schedule_id: row.get(1)?,
        content_id: row.get(2)?,
        status: row.get(3)?,
        attempt_count: row.get(4)?,
        error_message: row.get(5)?,
        started_at: row.get(6)?,
        completed_at: row.get(7)?,
        duration_ms: row.get(8)?,
    })
}

impl Repository {
    /// Opens a log row in `pending` at attempt 1.
    pub async fn start_execution(
        &self,
        schedule_id: Option<i64>,
    ) -> Result<ExecutionLog, PersistenceError> {
        let now = Utc::now();
        let db = self.writer.lock().await;
        db.execute(
            "INSERT INTO execution_logs (schedule_id, status, attempt_count, started_at)
             VALUES (?1, ?2, 1, ?3)",
            params![schedule_id, ExecutionStatus::Pending, now],
        )?;
        Ok(ExecutionLog {
            id: db.last_insert_rowid(),
            schedule_id,
            content_id: None,
            status: ExecutionStatus::Pending,
            attempt_count: 1,
            error_message: None,
            started_at: now,
            completed_at: None,
            duration_ms: None,
        })
    }

    /// Sets the current attempt number. A `None` error keeps the last recorded one.
    pub async fn record_attempt(
        &self,
        id: i64,
        attempt: u32,
        error: Option<&str>,
    ) -> Result<(), PersistenceError> {
        let db = self.writer.lock().await;
        let updated = db.execute(
            "UPDATE execution_logs SET attempt_count = ?2, error_message = COALESCE(?3, error_message)
             WHERE id = ?1",
            params![id, attempt, error],
        )?;
        if updated == 0 {
            return Err(PersistenceError::NotFound(format!("execution {}", id)));
        }
        Ok(())
    }

    pub async fn finish_execution(
        &self,
        id: i64,
        status: ExecutionStatus,
        content_id: Option<i64>,
        error: Option<&str>,
        duration_ms: i64,
    ) -> Result<(), PersistenceError> {
        let db = self.writer.lock().await;
        let updated = db.execute(
            "UPDATE execution_logs
             SET status = ?2, content_id = COALESCE(?3, content_id),
                 error_message = COALESCE(?4, error_message),
                 completed_at = ?5, duration_ms = ?6
             WHERE id = ?1",
            params![id, status, content_id, error, Utc::now(), duration_ms],
        )?;
        if updated == 0 {
            return Err(PersistenceError::NotFound(format!("execution {}", id)));
        }
        Ok(())
    }

    pub async fn get_execution(&self, id: i64) -> Result<Option<ExecutionLog>, PersistenceError> {
        let db = self.reader.lock().await;
        let log = db
            .query_row(
                &format!("SELECT {} FROM execution_logs WHERE id = ?1", EXECUTION_COLUMNS),
                params![id],
                execution_from_row,
            )
            .optional()?;
        Ok(log)
    }

    /// Newest first.
    pub async fn recent_executions(&self, limit: usize) -> Result<Vec<ExecutionLog>, PersistenceError> {
        let db = self.reader.lock().await;
        let mut stmt = db.prepare(&format!(
            "SELECT {} FROM execution_logs ORDER BY started_at DESC, id DESC LIMIT ?1",
            EXECUTION_COLUMNS
        ))?;
        let rows = stmt.query_map(params![limit as i64], execution_from_row)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }
}
