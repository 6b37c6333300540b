use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;
use tokio::sync::Mutex;
use tokio_cron_scheduler::JobScheduler;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::core::commands::CommandHandler;
use crate::core::config::Config;
use crate::core::domain::ReportKind;
use crate::core::generator::{ClaudeCliGenerator, ContentGenerator};
use crate::core::lifecycle::LifecycleManager;
use crate::core::publish::{ChatChannel, WorkspaceChannel};
use crate::core::reports::ReportGenerator;
use crate::core::scheduler::{ReportTimes, Scheduler};
use crate::core::store::Repository;
use crate::core::terminal::{self, print_error, print_info, print_success, print_warn};
use crate::core::topics::{TopicCatalog, TopicSelector};
use crate::core::workflow::{RetryPolicy, Trigger, Workflow, WorkflowDeps, WorkflowState};
use crate::interfaces::notion::NotionPublisher;
use crate::interfaces::slack::SlackPublisher;
use crate::interfaces::slack::server::SlackCommandServer;
use crate::logging;

/// Everything a daemon or one-shot run needs, wired from one `Config`.
pub struct App {
    pub config: Arc<Config>,
    pub repo: Repository,
    pub generator: Arc<dyn ContentGenerator>,
    pub chat: Arc<dyn ChatChannel>,
    pub workspace: Arc<dyn WorkspaceChannel>,
    pub workflow: Workflow,
    pub reports: Arc<ReportGenerator>,
    pub shutdown: CancellationToken,
}

/// Loads and validates settings, then starts logging.
pub async fn load_config(config_path: Option<&Path>, data_dir: &Path) -> Result<Arc<Config>> {
    let config = Config::load(config_path, data_dir).await?;
    config.validate()?;

    let log_dir = logging::init(&config.log_level, data_dir)?;
    let removed =
        logging::cleanup_old_logs(&log_dir, config.log_retention_days, Local::now().date_naive());
    if removed > 0 {
        info!("Removed {} log file(s) older than {} days", removed, config.log_retention_days);
    }
    Ok(Arc::new(config))
}

impl App {
    pub async fn build(config: Arc<Config>, data_dir: &Path) -> Result<Self> {
        let db_path: PathBuf = config.db_path_in(data_dir);
        let repo = Repository::open(&db_path)
            .await
            .with_context(|| format!("failed to open database {}", db_path.display()))?;
        info!("Database ready at {}", repo.path().display());

        let generator: Arc<dyn ContentGenerator> = Arc::new(ClaudeCliGenerator::from_config(&config));
        let chat: Arc<dyn ChatChannel> = Arc::new(SlackPublisher::from_config(&config));
        let workspace: Arc<dyn WorkspaceChannel> = Arc::new(NotionPublisher::from_config(&config));
        if !config.notion_enabled() {
            info!("Notion credentials not set; publishing to Slack only");
        }

        let shutdown = CancellationToken::new();
        let workflow = Workflow::new(WorkflowDeps {
            repo: repo.clone(),
            selector: TopicSelector::new(TopicCatalog::builtin()),
            generator: generator.clone(),
            chat: chat.clone(),
            workspace: workspace.clone(),
            policy: RetryPolicy::from_config(&config),
            author: config.bot_owner_name.clone(),
            shutdown: shutdown.clone(),
        });
        let reports = Arc::new(ReportGenerator::new(
            repo.clone(),
            chat.clone(),
            workspace.clone(),
            config.timezone,
        ));

        Ok(Self {
            config,
            repo,
            generator,
            chat,
            workspace,
            workflow,
            reports,
            shutdown,
        })
    }
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!("SIGTERM handler unavailable: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Long-running mode: health check, cron jobs, slash command listener.
pub async fn run_daemon(config_path: Option<&Path>, data_dir: &Path) -> Result<()> {
    terminal::print_banner();
    let app = App::build(load_config(config_path, data_dir).await?, data_dir).await?;
    let config = app.config.clone();

    let report = super::doctor::collect(&app).await;
    terminal::print_health(&report);
    if report.any_failed() {
        print_warn("Some checks failed; runs may fail until they recover.");
    }

    let jobs = JobScheduler::new().await?;
    let scheduler = Scheduler::new(
        jobs.clone(),
        app.repo.clone(),
        app.workflow.clone(),
        app.reports.clone(),
        config.timezone,
    );
    scheduler.ensure_default(config.default_schedule_time).await?;
    let plan = scheduler.reconcile().await?;
    info!("Registered {} schedule job(s)", plan.add.len());
    scheduler
        .schedule_reports(ReportTimes::from_config(&config))
        .await?;

    let mut lifecycle = LifecycleManager::new(jobs);
    let server = SlackCommandServer::new(
        &config.command_listen_addr,
        CommandHandler::new(scheduler.clone()),
        &config.slack_signing_secret,
        app.shutdown.child_token(),
    );
    lifecycle.attach(Arc::new(Mutex::new(server)));
    lifecycle.start().await?;

    match scheduler.next_run().await {
        Ok(Some(next)) => print_info(&format!("Next run: {}", next.format("%Y-%m-%d %H:%M %Z"))),
        Ok(None) => print_warn("All schedules are paused."),
        Err(e) => warn!("Could not compute next run: {}", e),
    }
    print_success("daily-bot is running. Press Ctrl+C to stop.");

    wait_for_signal().await;
    info!("Shutdown requested");
    app.shutdown.cancel();
    lifecycle.shutdown().await?;

    // Let an in-flight run record its cancellation before the process exits.
    let mut state = app.workflow.subscribe();
    let settle = async {
        while app.workflow.is_running() {
            if state.changed().await.is_err() {
                break;
            }
        }
    };
    if tokio::time::timeout(std::time::Duration::from_secs(10), settle)
        .await
        .is_err()
    {
        warn!("Workflow did not stop within 10s");
    }
    terminal::print_goodbye();
    Ok(())
}

/// One foreground run with the normal retry policy. `topic` is queued as a
/// request first so it takes priority over the rotation.
pub async fn run_once(
    config_path: Option<&Path>,
    data_dir: &Path,
    topic: Option<&str>,
) -> Result<()> {
    let config = load_config(config_path, data_dir).await?;
    let app = App::build(config, data_dir).await?;

    if let Some(topic) = topic {
        app.repo.insert_request(topic, "cli").await?;
        print_info(&format!("Queued topic: {}", topic));
    }

    let shutdown = app.shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        shutdown.cancel();
    });

    let Some(report) = app.workflow.run(Trigger::Manual).await else {
        anyhow::bail!("a run is already in progress");
    };
    match (report.state, &report.content) {
        (WorkflowState::Done, Some(content)) => {
            print_success(&format!(
                "Published '{}' after {} attempt(s)",
                content.title, report.attempts
            ));
            if let Some(url) = &content.notion_url {
                print_info(&format!("Notion: {}", url));
            }
            Ok(())
        }
        _ => {
            let reason = report.error.unwrap_or_else(|| "unknown error".into());
            print_error(&format!("Run failed after {} attempt(s)", report.attempts));
            anyhow::bail!(reason)
        }
    }
}

pub async fn run_report(
    config_path: Option<&Path>,
    data_dir: &Path,
    kind: ReportKind,
) -> Result<()> {
    let config = load_config(config_path, data_dir).await?;
    let app = App::build(config, data_dir).await?;

    match app.reports.run(kind).await {
        Some(outcome) => {
            print_success(&format!(
                "Posted {} report for {}",
                kind,
                outcome.data.period_label()
            ));
            if let Some(url) = outcome.page.and_then(|p| p.url) {
                print_info(&format!("Notion: {}", url));
            }
            Ok(())
        }
        None => {
            error!("{} report was not published", kind);
            anyhow::bail!("{} report was not published; see the log for details", kind)
        }
    }
}
