use chrono::Utc;
use rusqlite::{OptionalExtension, Row, params};

use super::Repository;
use crate::core::domain::TopicRequest;
use crate::core::errors::PersistenceError;

const REQUEST_COLUMNS: &str =
    "id, topic, requested_by, processed, content_id, created_at, processed_at";

fn request_from_row(row: &Row<'_>) -> rusqlite::Result<TopicRequest> {
    Ok(TopicRequest {
        id: row.get(0)?,
        topic: row.get(1)?,
        requested_by: row.get(2)?,
        processed: row.get(3)?,
        content_id: row.get(4)?,
        created_at: row.get(5)?,
        processed_at: row.get(6)?,
    })
}

impl Repository {
    pub async fn insert_request(
        &self,
        topic: &str,
        requested_by: &str,
    ) -> Result<TopicRequest, PersistenceError> {
        let now = Utc::now();
        let db = self.writer.lock().await;
        db.execute(
            "INSERT INTO topic_requests (topic, requested_by, processed, created_at)
             VALUES (?1, ?2, 0, ?3)",
            params![topic, requested_by, now],
        )?;
        Ok(TopicRequest {
            id: db.last_insert_rowid(),
            topic: topic.to_string(),
            requested_by: requested_by.to_string(),
            processed: false,
            content_id: None,
            created_at: now,
            processed_at: None,
        })
    }

    /// Oldest unprocessed request.
    pub async fn next_pending_request(&self) -> Result<Option<TopicRequest>, PersistenceError> {
        let db = self.reader.lock().await;
        let request = db
            .query_row(
                &format!(
                    "SELECT {} FROM topic_requests WHERE processed = 0
                     ORDER BY created_at, id LIMIT 1",
                    REQUEST_COLUMNS
                ),
                [],
                request_from_row,
            )
            .optional()?;
        Ok(request)
    }

    pub async fn pending_request_count(&self) -> Result<u64, PersistenceError> {
        let db = self.reader.lock().await;
        let count: i64 = db.query_row(
            "SELECT COUNT(*) FROM topic_requests WHERE processed = 0",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Marks a request processed. Only the first caller wins.
    pub async fn claim_request(&self, id: i64) -> Result<bool, PersistenceError> {
        let db = self.writer.lock().await;
        let claimed = db.execute(
            "UPDATE topic_requests SET processed = 1, processed_at = ?2
             WHERE id = ?1 AND processed = 0",
            params![id, Utc::now()],
        )?;
        Ok(claimed > 0)
    }

    pub async fn link_request_content(
        &self,
        id: i64,
        content_id: i64,
    ) -> Result<(), PersistenceError> {
        let db = self.writer.lock().await;
        db.execute(
            "UPDATE topic_requests SET content_id = ?2 WHERE id = ?1",
            params![id, content_id],
        )?;
        Ok(())
    }

    pub async fn get_request(&self, id: i64) -> Result<Option<TopicRequest>, PersistenceError> {
        let db = self.reader.lock().await;
        let request = db
            .query_row(
                &format!("SELECT {} FROM topic_requests WHERE id = ?1", REQUEST_COLUMNS),
                params![id],
                request_from_row,
            )
            .optional()?;
        Ok(request)
    }
}
