use std::collections::BTreeMap;

use rusqlite::params;

use super::Repository;
use crate::core::domain::{Category, ContentStatus, ExecutionStatus};
use crate::core::errors::PersistenceError;
use crate::core::time::Period;

/// Aggregate over the execution logs sharing one status.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionBucket {
    pub count: u64,
    pub total_attempts: u64,
    pub avg_duration_ms: Option<f64>,
    pub min_duration_ms: Option<i64>,
    pub max_duration_ms: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PeriodStats {
    pub content_total: u64,
    pub content_by_status: BTreeMap<ContentStatus, u64>,
    pub content_by_category: BTreeMap<Category, u64>,
    pub executions: BTreeMap<ExecutionStatus, ExecutionBucket>,
}

impl PeriodStats {
    pub fn executions_total(&self) -> u64 {
        self.executions.values().map(|b| b.count).sum()
    }

    pub fn execution_count(&self, status: ExecutionStatus) -> u64 {
        self.executions.get(&status).map_or(0, |b| b.count)
    }

    /// Attempts beyond the first, summed over every run.
    pub fn retry_count(&self) -> u64 {
        self.executions
            .values()
            .map(|b| b.total_attempts.saturating_sub(b.count))
            .sum()
    }

    /// Duration bounds across successful runs.
    pub fn success_durations(&self) -> Option<&ExecutionBucket> {
        self.executions
            .get(&ExecutionStatus::Success)
            .filter(|b| b.count > 0)
    }
}

impl Repository {
    /// Content counted by `created_at`, executions by `started_at`; both half-open.
    pub async fn period_stats(&self, period: Period) -> Result<PeriodStats, PersistenceError> {
        let db = self.reader.lock().await;
        let mut stats = PeriodStats::default();

        let mut stmt = db.prepare(
            "SELECT status, COUNT(*) FROM content_records
             WHERE created_at >= ?1 AND created_at < ?2 GROUP BY status",
        )?;
        let rows = stmt.query_map(params![period.start, period.end], |row| {
            Ok((row.get::<_, ContentStatus>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (status, count) = row?;
            stats.content_by_status.insert(status, count as u64);
            stats.content_total += count as u64;
        }

        let mut stmt = db.prepare(
            "SELECT category, COUNT(*) FROM content_records
             WHERE created_at >= ?1 AND created_at < ?2 GROUP BY category",
        )?;
        let rows = stmt.query_map(params![period.start, period.end], |row| {
            Ok((row.get::<_, Category>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (category, count) = row?;
            stats.content_by_category.insert(category, count as u64);
        }

        let mut stmt = db.prepare(
            "SELECT status, COUNT(*), SUM(attempt_count),
                    AVG(duration_ms), MIN(duration_ms), MAX(duration_ms)
             FROM execution_logs
             WHERE started_at >= ?1 AND started_at < ?2
             GROUP BY status",
        )?;
        let rows = stmt.query_map(params![period.start, period.end], |row| {
            Ok((
                row.get::<_, ExecutionStatus>(0)?,
                ExecutionBucket {
                    count: row.get::<_, i64>(1)? as u64,
                    total_attempts: row.get::<_, Option<i64>>(2)?.unwrap_or(0) as u64,
                    avg_duration_ms: row.get(3)?,
                    min_duration_ms: row.get(4)?,
                    max_duration_ms: row.get(5)?,
                },
            ))
        })?;
        for row in rows {
            let (status, bucket) = row?;
            stats.executions.insert(status, bucket);
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_repository;
    use super::*;
    use crate::core::domain::{Difficulty, NewContent};
    use chrono::{Duration, Utc};

    fn content(title: &str, category: Category) -> NewContent {
        NewContent {
            topic: title.into(),
            title: title.into(),
            category,
            difficulty: Difficulty::Beginner,
            summary: "s".into(),
            tags: vec![],
            author: "User".into(),
        }
    }

    #[tokio::test]
    async fn aggregates_content_and_executions_in_range() {
        let repo = test_repository().await;
        let a = repo.insert_content(&content("A", Category::Network)).await.unwrap();
        repo.insert_content(&content("B", Category::Network)).await.unwrap();
        repo.insert_content(&content("C", Category::Security)).await.unwrap();
        repo.set_content_status(a.id, ContentStatus::Published).await.unwrap();

        let ok = repo.start_execution(None).await.unwrap();
        repo.finish_execution(ok.id, ExecutionStatus::Success, Some(a.id), None, 100)
            .await
            .unwrap();
        let retried = repo.start_execution(None).await.unwrap();
        repo.record_attempt(retried.id, 3, Some("timeout")).await.unwrap();
        repo.finish_execution(retried.id, ExecutionStatus::Success, None, None, 300)
            .await
            .unwrap();
        let failed = repo.start_execution(None).await.unwrap();
        repo.record_attempt(failed.id, 5, Some("boom")).await.unwrap();
        repo.finish_execution(failed.id, ExecutionStatus::Failed, None, None, 50)
            .await
            .unwrap();

        let period = Period {
            start: Utc::now() - Duration::hours(1),
            end: Utc::now() + Duration::hours(1),
        };
        let stats = repo.period_stats(period).await.unwrap();

        assert_eq!(stats.content_total, 3);
        assert_eq!(stats.content_by_status[&ContentStatus::Published], 1);
        assert_eq!(stats.content_by_status[&ContentStatus::Draft], 2);
        assert_eq!(stats.content_by_category[&Category::Network], 2);
        assert_eq!(stats.execution_count(ExecutionStatus::Success), 2);
        assert_eq!(stats.execution_count(ExecutionStatus::Failed), 1);
        assert_eq!(stats.executions_total(), 3);
        // (1 + 3 - 2) + (5 - 1)
        assert_eq!(stats.retry_count(), 6);

        let success = stats.success_durations().unwrap();
        assert_eq!(success.min_duration_ms, Some(100));
        assert_eq!(success.max_duration_ms, Some(300));
        assert_eq!(success.avg_duration_ms, Some(200.0));

        let empty = repo
            .period_stats(Period {
                start: Utc::now() - Duration::days(60),
                end: Utc::now() - Duration::days(30),
            })
            .await
            .unwrap();
        assert_eq!(empty, PeriodStats::default());
    }
}
