use chrono::Utc;
use rusqlite::{Connection, params};
use tracing::info;

use crate::core::errors::PersistenceError;

/// Ordered schema steps. Never edit an applied entry; append a new one.
pub(super) const MIGRATIONS: &[(u32, &str, &str)] = &[
    (
        1,
        "initial_schema",
        "CREATE TABLE content_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            topic TEXT NOT NULL,
            title TEXT NOT NULL UNIQUE COLLATE NOCASE,
            category TEXT NOT NULL,
            difficulty TEXT NOT NULL,
            summary TEXT NOT NULL,
            tags TEXT NOT NULL DEFAULT '[]',
            notion_page_id TEXT,
            notion_url TEXT,
            slack_ts TEXT,
            author TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'draft',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE schedules (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            time TEXT NOT NULL UNIQUE,
            status TEXT NOT NULL DEFAULT 'active',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE execution_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            schedule_id INTEGER REFERENCES schedules(id) ON DELETE SET NULL,
            content_id INTEGER REFERENCES content_records(id),
            status TEXT NOT NULL DEFAULT 'pending',
            attempt_count INTEGER NOT NULL DEFAULT 1 CHECK (attempt_count BETWEEN 1 AND 5),
            error_message TEXT,
            started_at TEXT NOT NULL,
            completed_at TEXT,
            duration_ms INTEGER
        );

        CREATE TABLE topic_requests (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            topic TEXT NOT NULL,
            requested_by TEXT NOT NULL,
            processed INTEGER NOT NULL DEFAULT 0,
            content_id INTEGER REFERENCES content_records(id),
            created_at TEXT NOT NULL,
            processed_at TEXT
        );",
    ),
    (
        2,
        "query_indexes",
        "CREATE INDEX idx_content_created_at ON content_records(created_at);
        CREATE INDEX idx_content_category ON content_records(category);
        CREATE INDEX idx_content_status ON content_records(status);
        CREATE INDEX idx_execution_started_at ON execution_logs(started_at);
        CREATE INDEX idx_execution_status ON execution_logs(status);
        CREATE INDEX idx_requests_pending ON topic_requests(processed, created_at);",
    ),
];

/// Applies pending migrations, each in its own transaction. Returns how many ran.
pub(super) fn run(conn: &mut Connection) -> Result<usize, PersistenceError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _schema_versions (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _schema_versions",
        [],
        |row| row.get(0),
    )?;

    let mut applied = 0;
    for (version, name, sql) in MIGRATIONS.iter().filter(|(v, _, _)| *v > current) {
        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.execute(
            "INSERT INTO _schema_versions (version, name, applied_at) VALUES (?1, ?2, ?3)",
            params![version, name, Utc::now()],
        )?;
        tx.commit()?;
        info!("Schema migration {} ({}) applied", version, name);
        applied += 1;
    }
    Ok(applied)
}
