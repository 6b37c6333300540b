use chrono::{DateTime, Duration, Utc};
use rusqlite::types::Type;
use rusqlite::{OptionalExtension, Row, params};

use super::{Repository, is_unique_violation};
use crate::core::domain::{ContentRecord, ContentStatus, NewContent};
use crate::core::errors::PersistenceError;
use crate::core::time::Period;

const CONTENT_COLUMNS: &str = "id, topic, title, category, difficulty, summary, tags, \
     notion_page_id, notion_url, slack_ts, author, status, created_at, updated_at";

fn content_from_row(row: &Row<'_>) -> rusqlite::Result<ContentRecord> {
    let tags: String = row.get(6)?;
    let tags = serde_json::from_str(&tags)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?;
    Ok(ContentRecord {
        id: row.get(0)?,
        topic: row.get(1)?,
        title: row.get(2)?,
        category: row.get(3)?,
        difficulty: row.get(4)?,
        summary: row.get(5)?,
        tags,
        notion_page_id: row.get(7)?,
        notion_url: row.get(8)?,
        slack_ts: row.get(9)?,
        author: row.get(10)?,
        status: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

impl Repository {
    /// Inserts a draft record. Titles are unique (case-insensitive); a clash
    /// is rejected with `DuplicateTitle` and nothing is written.
    pub async fn insert_content(&self, new: &NewContent) -> Result<ContentRecord, PersistenceError> {
        let now = Utc::now();
        let tags =
            serde_json::to_string(&new.tags).map_err(|e| PersistenceError::Corrupt(e.to_string()))?;

        let db = self.writer.lock().await;
        let inserted = db.execute(
            "INSERT INTO content_records
                (topic, title, category, difficulty, summary, tags, author, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
            params![
                new.topic,
                new.title,
                new.category,
                new.difficulty,
                new.summary,
                tags,
                new.author,
                ContentStatus::Draft,
                now,
            ],
        );
        match inserted {
            Err(e) if is_unique_violation(&e) => {
                return Err(PersistenceError::DuplicateTitle(new.title.clone()));
            }
            Err(e) => return Err(e.into()),
            Ok(_) => {}
        }

        Ok(ContentRecord {
            id: db.last_insert_rowid(),
            topic: new.topic.clone(),
            title: new.title.clone(),
            category: new.category,
            difficulty: new.difficulty,
            summary: new.summary.clone(),
            tags: new.tags.clone(),
            notion_page_id: None,
            notion_url: None,
            slack_ts: None,
            author: new.author.clone(),
            status: ContentStatus::Draft,
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn get_content(&self, id: i64) -> Result<Option<ContentRecord>, PersistenceError> {
        let db = self.reader.lock().await;
        let record = db
            .query_row(
                &format!("SELECT {} FROM content_records WHERE id = ?1", CONTENT_COLUMNS),
                params![id],
                content_from_row,
            )
            .optional()?;
        Ok(record)
    }

    pub async fn get_content_by_title(
        &self,
        title: &str,
    ) -> Result<Option<ContentRecord>, PersistenceError> {
        let db = self.reader.lock().await;
        let record = db
            .query_row(
                &format!("SELECT {} FROM content_records WHERE title = ?1", CONTENT_COLUMNS),
                params![title],
                content_from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// Attaches the chat message timestamp unless one is already present.
    /// Returns `false` when the record already had a reference.
    pub async fn attach_slack_ts(&self, id: i64, ts: &str) -> Result<bool, PersistenceError> {
        let db = self.writer.lock().await;
        let updated = db.execute(
            "UPDATE content_records SET slack_ts = ?2, updated_at = ?3
             WHERE id = ?1 AND slack_ts IS NULL",
            params![id, ts, Utc::now()],
        )?;
        if updated == 0 {
            ensure_content_exists(&db, id)?;
        }
        Ok(updated > 0)
    }

    /// Attaches the workspace page unless one is already present.
    pub async fn attach_notion_page(
        &self,
        id: i64,
        page_id: &str,
        url: Option<&str>,
    ) -> Result<bool, PersistenceError> {
        let db = self.writer.lock().await;
        let updated = db.execute(
            "UPDATE content_records SET notion_page_id = ?2, notion_url = ?3, updated_at = ?4
             WHERE id = ?1 AND notion_page_id IS NULL",
            params![id, page_id, url, Utc::now()],
        )?;
        if updated == 0 {
            ensure_content_exists(&db, id)?;
        }
        Ok(updated > 0)
    }

    pub async fn set_content_status(
        &self,
        id: i64,
        status: ContentStatus,
    ) -> Result<(), PersistenceError> {
        let db = self.writer.lock().await;
        let updated = db.execute(
            "UPDATE content_records SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, status, Utc::now()],
        )?;
        if updated == 0 {
            return Err(PersistenceError::NotFound(format!("content {}", id)));
        }
        Ok(())
    }

    /// Catalog topics used in the last `days` days.
    pub async fn recent_topics(&self, days: i64) -> Result<Vec<String>, PersistenceError> {
        let since: DateTime<Utc> = Utc::now() - Duration::days(days);
        let db = self.reader.lock().await;
        let mut stmt = db.prepare(
            "SELECT DISTINCT topic FROM content_records WHERE created_at >= ?1 ORDER BY topic",
        )?;
        let rows = stmt.query_map(params![since], |row| row.get::<_, String>(0))?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    pub async fn count_content(&self, period: Option<Period>) -> Result<u64, PersistenceError> {
        let db = self.reader.lock().await;
        let count: i64 = match period {
            Some(p) => db.query_row(
                "SELECT COUNT(*) FROM content_records WHERE created_at >= ?1 AND created_at < ?2",
                params![p.start, p.end],
                |row| row.get(0),
            )?,
            None => db.query_row("SELECT COUNT(*) FROM content_records", [], |row| row.get(0))?,
        };
        Ok(count as u64)
    }

    #[cfg(test)]
    pub(crate) async fn backdate_content(&self, id: i64, created_at: DateTime<Utc>) {
        let db = self.writer.lock().await;
        db.execute(
            "UPDATE content_records SET created_at = ?2 WHERE id = ?1",
            params![id, created_at],
        )
        .expect("backdate content");
    }
}

fn ensure_content_exists(db: &rusqlite::Connection, id: i64) -> Result<(), PersistenceError> {
    let exists: bool = db.query_row(
        "SELECT EXISTS(SELECT 1 FROM content_records WHERE id = ?1)",
        params![id],
        |row| row.get(0),
    )?;
    if exists {
        Ok(())
    } else {
        Err(PersistenceError::NotFound(format!("content {}", id)))
    }
}
