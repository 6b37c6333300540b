use chrono::Utc;
use rusqlite::{OptionalExtension, Row, params};

use super::{Repository, is_unique_violation};
use crate::core::domain::{Schedule, ScheduleStatus};
use crate::core::errors::PersistenceError;
use crate::core::time::ScheduleTime;

fn schedule_from_row(row: &Row<'_>) -> rusqlite::Result<Schedule> {
    Ok(Schedule {
        id: row.get(0)?,
        time: row.get(1)?,
        status: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

impl Repository {
    pub async fn insert_schedule(&self, time: ScheduleTime) -> Result<Schedule, PersistenceError> {
        let now = Utc::now();
        let db = self.writer.lock().await;
        match db.execute(
            "INSERT INTO schedules (time, status, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
            params![time, ScheduleStatus::Active, now],
        ) {
            Err(e) if is_unique_violation(&e) => {
                return Err(PersistenceError::DuplicateSchedule(time.to_string()));
            }
            Err(e) => return Err(e.into()),
            Ok(_) => {}
        }
        Ok(Schedule {
            id: db.last_insert_rowid(),
            time,
            status: ScheduleStatus::Active,
            created_at: now,
            updated_at: now,
        })
    }

    /// Ordered by time of day.
    pub async fn list_schedules(&self) -> Result<Vec<Schedule>, PersistenceError> {
        let db = self.reader.lock().await;
        let mut stmt = db.prepare(
            "SELECT id, time, status, created_at, updated_at FROM schedules ORDER BY time",
        )?;
        let rows = stmt.query_map([], schedule_from_row)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    pub async fn active_schedules(&self) -> Result<Vec<Schedule>, PersistenceError> {
        Ok(self
            .list_schedules()
            .await?
            .into_iter()
            .filter(|s| s.status == ScheduleStatus::Active)
            .collect())
    }

    pub async fn find_schedule(&self, time: ScheduleTime) -> Result<Option<Schedule>, PersistenceError> {
        let db = self.reader.lock().await;
        let schedule = db
            .query_row(
                "SELECT id, time, status, created_at, updated_at FROM schedules WHERE time = ?1",
                params![time],
                schedule_from_row,
            )
            .optional()?;
        Ok(schedule)
    }

    pub async fn update_schedule_time(
        &self,
        id: i64,
        time: ScheduleTime,
    ) -> Result<(), PersistenceError> {
        let db = self.writer.lock().await;
        let updated = match db.execute(
            "UPDATE schedules SET time = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, time, Utc::now()],
        ) {
            Err(e) if is_unique_violation(&e) => {
                return Err(PersistenceError::DuplicateSchedule(time.to_string()));
            }
            other => other?,
        };
        if updated == 0 {
            return Err(PersistenceError::NotFound(format!("schedule {}", id)));
        }
        Ok(())
    }

    /// Hard delete. Returns `false` when no schedule exists at `time`.
    pub async fn delete_schedule(&self, time: ScheduleTime) -> Result<bool, PersistenceError> {
        let db = self.writer.lock().await;
        let deleted = db.execute("DELETE FROM schedules WHERE time = ?1", params![time])?;
        Ok(deleted > 0)
    }

    /// Flips every schedule not already in `status`. Returns how many changed.
    pub async fn set_all_schedule_status(
        &self,
        status: ScheduleStatus,
    ) -> Result<usize, PersistenceError> {
        let db = self.writer.lock().await;
        let changed = db.execute(
            "UPDATE schedules SET status = ?1, updated_at = ?2 WHERE status != ?1",
            params![status, Utc::now()],
        )?;
        Ok(changed)
    }
}
