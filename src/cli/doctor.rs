use std::path::Path;

use anyhow::Result;

use crate::core::health::{HealthReport, HealthStatus};
use crate::core::terminal::{self, print_step, print_success};

use super::daemon::{App, load_config};

/// Probes every collaborator once. Unconfigured optional ones are SKIPPED.
pub async fn collect(app: &App) -> HealthReport {
    let mut report = HealthReport::default();
    report.push("config", HealthStatus::Ok);
    report.push(
        "database",
        match app.repo.ping().await {
            Ok(()) => HealthStatus::Ok,
            Err(e) => HealthStatus::Degraded(e.to_string()),
        },
    );
    report.push("generator", app.generator.health_check().await);
    report.push("slack", app.chat.health_check().await);
    report.push("notion", app.workspace.health_check().await);
    report
}

pub async fn run_doctor(config_path: Option<&Path>, data_dir: &Path) -> Result<()> {
    print_step("Checking daily-bot configuration and services...");
    let config = load_config(config_path, data_dir).await?;
    let app = App::build(config, data_dir).await?;

    let report = collect(&app).await;
    terminal::print_health(&report);
    if report.any_failed() {
        let failed: Vec<&str> = report
            .entries
            .iter()
            .filter(|(_, status)| status.is_failed())
            .map(|(name, _)| name.as_str())
            .collect();
        anyhow::bail!("health check failed: {}", failed.join(", "));
    }
    print_success("All checks passed.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use crate::core::reports::ReportGenerator;
    use crate::core::store::test_repository;
    use crate::core::test_support::{FakeChat, FakeGenerator, FakeWorkspace};
    use crate::core::topics::{TopicCatalog, TopicSelector};
    use crate::core::workflow::{RetryPolicy, Workflow, WorkflowDeps};
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn unconfigured_notion_is_skipped_not_failed() {
        let repo = test_repository().await;
        let chat = Arc::new(FakeChat::default());
        let workspace = Arc::new(FakeWorkspace::disabled());
        let generator = Arc::new(FakeGenerator::ok());
        let shutdown = CancellationToken::new();
        let workflow = Workflow::new(WorkflowDeps {
            repo: repo.clone(),
            selector: TopicSelector::with_seed(TopicCatalog::builtin(), 1),
            generator: generator.clone(),
            chat: chat.clone(),
            workspace: workspace.clone(),
            policy: RetryPolicy::default(),
            author: "User".into(),
            shutdown: shutdown.clone(),
        });
        let app = App {
            config: Arc::new(Config::default()),
            repo: repo.clone(),
            generator,
            chat: chat.clone(),
            workspace: workspace.clone(),
            workflow,
            reports: Arc::new(ReportGenerator::new(
                repo,
                chat,
                workspace,
                chrono_tz::Asia::Seoul,
            )),
            shutdown,
        };

        let report = collect(&app).await;
        let names: Vec<&str> = report.entries.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["config", "database", "generator", "slack", "notion"]);
        assert!(matches!(report.entries[4].1, HealthStatus::Skipped(_)));
        assert!(!report.any_failed());
    }
}
