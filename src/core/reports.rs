use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Days, Utc};
use chrono_tz::Tz;
use tracing::{error, info, warn};

use crate::core::domain::{Category, ExecutionStatus, Language, ReportKind};
use crate::core::errors::{PersistenceError, PublishError};
use crate::core::publish::{ChatChannel, PublishRef, WorkspaceChannel};
use crate::core::store::{PeriodStats, Repository};
use crate::core::time::{Period, previous_month, previous_week};

/// Snapshot of one reporting period.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportData {
    pub kind: ReportKind,
    pub period: Period,
    pub timezone: Tz,
    pub total_count: u64,
    pub success_count: u64,
    pub failed_count: u64,
    pub retry_count: u64,
    pub avg_duration_ms: Option<f64>,
    pub min_duration_ms: Option<i64>,
    pub max_duration_ms: Option<i64>,
    pub category_distribution: BTreeMap<Category, u64>,
    pub uncovered_categories: Vec<Category>,
    pub generated_at: DateTime<Utc>,
}

impl ReportData {
    pub fn from_stats(kind: ReportKind, period: Period, timezone: Tz, stats: &PeriodStats) -> Self {
        let success = stats.success_durations();
        let uncovered_categories = Category::ALL
            .into_iter()
            .filter(|c| !stats.content_by_category.contains_key(c))
            .collect();
        Self {
            kind,
            period,
            timezone,
            total_count: stats.content_total,
            success_count: stats.execution_count(ExecutionStatus::Success),
            failed_count: stats.execution_count(ExecutionStatus::Failed),
            retry_count: stats.retry_count(),
            avg_duration_ms: success.and_then(|b| b.avg_duration_ms),
            min_duration_ms: success.and_then(|b| b.min_duration_ms),
            max_duration_ms: success.and_then(|b| b.max_duration_ms),
            category_distribution: stats.content_by_category.clone(),
            uncovered_categories,
            generated_at: Utc::now(),
        }
    }

    /// Categories by descending count, ties in catalog order.
    pub fn top_categories(&self, n: usize) -> Vec<(Category, u64)> {
        let mut ranked: Vec<(Category, u64)> = self
            .category_distribution
            .iter()
            .map(|(c, n)| (*c, *n))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(n);
        ranked
    }

    /// Percentage of finished runs that succeeded.
    pub fn success_rate(&self) -> Option<f64> {
        let finished = self.success_count + self.failed_count;
        (finished > 0).then(|| self.success_count as f64 * 100.0 / finished as f64)
    }

    /// Inclusive local dates, e.g. `2026-03-02 ~ 2026-03-08`.
    pub fn period_label(&self) -> String {
        let start = self.period.start.with_timezone(&self.timezone).date_naive();
        let end = self.period.end.with_timezone(&self.timezone).date_naive();
        let last = end.checked_sub_days(Days::new(1)).unwrap_or(end);
        format!("{} ~ {}", start.format("%Y-%m-%d"), last.format("%Y-%m-%d"))
    }

    pub fn title(&self, language: Language) -> String {
        let kind = match (language, self.kind) {
            (Language::En, ReportKind::Weekly) => "Weekly report",
            (Language::En, ReportKind::Monthly) => "Monthly report",
            (Language::Ko, ReportKind::Weekly) => "주간 리포트",
            (Language::Ko, ReportKind::Monthly) => "월간 리포트",
        };
        format!("Daily-Bot {} ({})", kind, self.period_label())
    }
}

struct Labels {
    period: &'static str,
    total: &'static str,
    success: &'static str,
    failed: &'static str,
    retries: &'static str,
    duration: &'static str,
    top: &'static str,
    uncovered: &'static str,
    none: &'static str,
}

const EN: Labels = Labels {
    period: "Period",
    total: "Content generated",
    success: "Successful runs",
    failed: "Failed runs",
    retries: "Retries",
    duration: "Run time (avg / min / max)",
    top: "Top categories",
    uncovered: "Not covered yet",
    none: "none",
};

const KO: Labels = Labels {
    period: "기간",
    total: "생성된 콘텐츠",
    success: "성공",
    failed: "실패",
    retries: "재시도",
    duration: "실행 시간 (평균 / 최소 / 최대)",
    top: "카테고리 분포 (Top 5)",
    uncovered: "미다룬 카테고리",
    none: "없음",
};

fn seconds(ms: f64) -> String {
    format!("{:.1}s", ms / 1000.0)
}

/// Plain-text rendering used as the chat fallback text and in the CLI.
pub fn render_text(report: &ReportData, language: Language) -> String {
    let l = match language {
        Language::En => &EN,
        Language::Ko => &KO,
    };
    let mut out = Vec::new();
    out.push(format!("📈 {}", report.title(language)));
    out.push(format!("{}: {}", l.period, report.period_label()));
    out.push(format!("{}: {}", l.total, report.total_count));
    match report.success_rate() {
        Some(rate) => out.push(format!(
            "{}: {} ({:.0}%)",
            l.success, report.success_count, rate
        )),
        None => out.push(format!("{}: {}", l.success, report.success_count)),
    }
    out.push(format!("{}: {}", l.failed, report.failed_count));
    out.push(format!("{}: {}", l.retries, report.retry_count));
    if let (Some(avg), Some(min), Some(max)) = (
        report.avg_duration_ms,
        report.min_duration_ms,
        report.max_duration_ms,
    ) {
        out.push(format!(
            "{}: {} / {} / {}",
            l.duration,
            seconds(avg),
            seconds(min as f64),
            seconds(max as f64)
        ));
    }

    let top = report.top_categories(5);
    if top.is_empty() {
        out.push(format!("{}: {}", l.top, l.none));
    } else {
        out.push(format!("{}:", l.top));
        for (category, count) in top {
            out.push(format!("  • {}: {}", category.display_name(language), count));
        }
    }

    let uncovered: Vec<&str> = report
        .uncovered_categories
        .iter()
        .map(|c| c.display_name(language))
        .collect();
    out.push(format!(
        "{}: {}",
        l.uncovered,
        if uncovered.is_empty() {
            l.none.to_string()
        } else {
            uncovered.join(", ")
        }
    ));
    out.join("\n")
}

/// Published artifacts of one report run.
#[derive(Debug, Clone)]
pub struct ReportOutcome {
    pub data: ReportData,
    pub page: Option<PublishRef>,
    pub message: Option<PublishRef>,
}

pub struct ReportGenerator {
    repo: Repository,
    chat: Arc<dyn ChatChannel>,
    workspace: Arc<dyn WorkspaceChannel>,
    timezone: Tz,
}

impl ReportGenerator {
    pub fn new(
        repo: Repository,
        chat: Arc<dyn ChatChannel>,
        workspace: Arc<dyn WorkspaceChannel>,
        timezone: Tz,
    ) -> Self {
        Self {
            repo,
            chat,
            workspace,
            timezone,
        }
    }

    /// Statistics for the period before `now`: last week or last month.
    pub async fn build(
        &self,
        kind: ReportKind,
        now: DateTime<Tz>,
    ) -> Result<ReportData, PersistenceError> {
        let period = match kind {
            ReportKind::Weekly => previous_week(now),
            ReportKind::Monthly => previous_month(now),
        };
        let stats = self.repo.period_stats(period).await?;
        Ok(ReportData::from_stats(kind, period, self.timezone, &stats))
    }

    /// Workspace page first so the chat message can link to it. A failed page
    /// is logged and the chat message goes out without the link.
    pub async fn publish(&self, data: ReportData) -> Result<ReportOutcome, PublishError> {
        let page = if self.workspace.is_configured() {
            match self.workspace.publish_report(&data).await {
                Ok(page) => Some(page),
                Err(e) => {
                    warn!("Failed to create {} report page: {}", data.kind, e);
                    None
                }
            }
        } else {
            None
        };

        let link = page.as_ref().and_then(|p| p.url.as_deref());
        let message = self.chat.post_report(&data, link).await?;
        Ok(ReportOutcome {
            data,
            page,
            message: Some(message),
        })
    }

    /// One scheduled report cycle. Failures are logged and the cycle is skipped.
    pub async fn run(&self, kind: ReportKind) -> Option<ReportOutcome> {
        let now = Utc::now().with_timezone(&self.timezone);
        let data = match self.build(kind, now).await {
            Ok(data) => data,
            Err(e) => {
                error!("Skipping {} report: {}", kind, e);
                return None;
            }
        };
        info!(
            "Generating {} report for {} ({} items)",
            kind,
            data.period_label(),
            data.total_count
        );
        match self.publish(data).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                error!("Failed to publish {} report: {}", kind, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::{ExecutionBucket, test_repository};
    use crate::core::test_support::{FakeChat, FakeWorkspace};
    use chrono::TimeZone;
    use chrono_tz::Asia::Seoul;

    fn sample_stats() -> PeriodStats {
        let mut stats = PeriodStats {
            content_total: 6,
            ..PeriodStats::default()
        };
        stats.content_by_category.insert(Category::Network, 3);
        stats.content_by_category.insert(Category::Database, 2);
        stats.content_by_category.insert(Category::Security, 1);
        stats.executions.insert(
            ExecutionStatus::Success,
            ExecutionBucket {
                count: 6,
                total_attempts: 8,
                avg_duration_ms: Some(42_000.0),
                min_duration_ms: Some(30_000),
                max_duration_ms: Some(61_000),
            },
        );
        stats.executions.insert(
            ExecutionStatus::Failed,
            ExecutionBucket {
                count: 1,
                total_attempts: 5,
                ..ExecutionBucket::default()
            },
        );
        stats
    }

    fn weekly() -> ReportData {
        let now = Seoul.with_ymd_and_hms(2026, 3, 11, 10, 0, 0).unwrap();
        ReportData::from_stats(ReportKind::Weekly, previous_week(now), Seoul, &sample_stats())
    }

    #[test]
    fn derives_counts_and_uncovered_categories() {
        let report = weekly();
        assert_eq!(report.total_count, 6);
        assert_eq!(report.success_count, 6);
        assert_eq!(report.failed_count, 1);
        assert_eq!(report.retry_count, 6);
        assert_eq!(report.uncovered_categories.len(), 9);
        assert!(!report.uncovered_categories.contains(&Category::Network));
        assert_eq!(
            report.top_categories(2),
            vec![(Category::Network, 3), (Category::Database, 2)]
        );
        assert_eq!(report.period_label(), "2026-03-02 ~ 2026-03-08");
    }

    #[test]
    fn renders_fixed_template() {
        let text = render_text(&weekly(), Language::En);
        assert!(text.starts_with("📈 Daily-Bot Weekly report (2026-03-02 ~ 2026-03-08)"));
        assert!(text.contains("Content generated: 6"));
        assert!(text.contains("Successful runs: 6 (86%)"));
        assert!(text.contains("Retries: 6"));
        assert!(text.contains("Run time (avg / min / max): 42.0s / 30.0s / 61.0s"));
        assert!(text.contains("  • Network: 3"));
        assert!(text.contains("Not covered yet: Operating Systems"));

        let ko = render_text(&weekly(), Language::Ko);
        assert!(ko.contains("주간 리포트"));
        assert!(ko.contains("  • 네트워크: 3"));
    }

    #[test]
    fn empty_period_renders_without_durations() {
        let now = Seoul.with_ymd_and_hms(2026, 3, 11, 10, 0, 0).unwrap();
        let report = ReportData::from_stats(
            ReportKind::Monthly,
            previous_month(now),
            Seoul,
            &PeriodStats::default(),
        );
        assert_eq!(report.success_rate(), None);
        assert_eq!(report.uncovered_categories.len(), 12);
        let text = render_text(&report, Language::En);
        assert!(text.contains("Top categories: none"));
        assert!(!text.contains("Run time"));
        assert_eq!(report.period_label(), "2026-02-01 ~ 2026-02-28");
    }

    async fn publish_with(workspace: FakeWorkspace) -> (Arc<FakeChat>, ReportOutcome) {
        let chat = Arc::new(FakeChat::default());
        let generator = ReportGenerator::new(
            test_repository().await,
            chat.clone(),
            Arc::new(workspace),
            Seoul,
        );
        let outcome = generator.publish(weekly()).await.unwrap();
        (chat, outcome)
    }

    #[tokio::test]
    async fn chat_message_links_the_workspace_page() {
        let (chat, outcome) = publish_with(FakeWorkspace::enabled()).await;
        let link = "https://www.notion.so/report-weekly";
        assert_eq!(outcome.page.unwrap().url.as_deref(), Some(link));
        assert_eq!(
            *chat.reports.lock().unwrap(),
            vec![(ReportKind::Weekly, Some(link.to_string()))]
        );
    }

    #[tokio::test]
    async fn workspace_failure_still_posts_to_chat() {
        let workspace = FakeWorkspace {
            fail_reports: true,
            ..FakeWorkspace::enabled()
        };
        let (chat, outcome) = publish_with(workspace).await;
        assert!(outcome.page.is_none());
        assert!(outcome.message.is_some());
        assert_eq!(*chat.reports.lock().unwrap(), vec![(ReportKind::Weekly, None)]);
    }

    #[tokio::test]
    async fn disabled_workspace_is_not_called() {
        let (chat, outcome) = publish_with(FakeWorkspace::disabled()).await;
        assert!(outcome.page.is_none());
        assert_eq!(chat.reports.lock().unwrap().len(), 1);
    }
}
