use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::core::config::{Config, MAX_ATTEMPTS};
use crate::core::domain::{
    Category, ContentRecord, ContentStatus, Difficulty, ExecutionStatus, NewContent, Topic,
};
use crate::core::errors::{GenerationError, PersistenceError, WorkflowError};
use crate::core::generator::ContentGenerator;
use crate::core::publish::{ChatChannel, WorkspaceChannel};
use crate::core::store::Repository;
use crate::core::topics::{RECENT_TOPIC_WINDOW_DAYS, TopicSelector};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Idle,
    SelectingTopic,
    Generating,
    Persisting,
    Publishing,
    Retrying,
    Done,
    Failed,
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkflowState::Idle => "idle",
            WorkflowState::SelectingTopic => "selecting_topic",
            WorkflowState::Generating => "generating",
            WorkflowState::Persisting => "persisting",
            WorkflowState::Publishing => "publishing",
            WorkflowState::Retrying => "retrying",
            WorkflowState::Done => "done",
            WorkflowState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What started a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Scheduled { schedule_id: Option<i64> },
    Manual,
}

impl Trigger {
    fn schedule_id(&self) -> Option<i64> {
        match self {
            Trigger::Scheduled { schedule_id } => *schedule_id,
            Trigger::Manual => None,
        }
    }
}

/// Attempt ceiling and the delay slept after each failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delays: Vec<Duration>,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.max_retries.clamp(1, MAX_ATTEMPTS),
            delays: config.retry_delays(),
        }
    }

    /// Delay before the attempt that follows `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let index = attempt.saturating_sub(1) as usize;
        self.delays
            .get(index)
            .or(self.delays.last())
            .copied()
            .unwrap_or_default()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::from_config(&Config::default())
    }
}

/// Result of one run as seen by callers and tests.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub execution_id: i64,
    pub state: WorkflowState,
    pub attempts: u32,
    pub retry_delays: Vec<Duration>,
    pub content: Option<ContentRecord>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnOutcome {
    Started,
    AlreadyRunning,
}

pub struct WorkflowDeps {
    pub repo: Repository,
    pub selector: TopicSelector,
    pub generator: Arc<dyn ContentGenerator>,
    pub chat: Arc<dyn ChatChannel>,
    pub workspace: Arc<dyn WorkspaceChannel>,
    pub policy: RetryPolicy,
    pub author: String,
    pub shutdown: CancellationToken,
}

struct Inner {
    repo: Repository,
    selector: TopicSelector,
    generator: Arc<dyn ContentGenerator>,
    chat: Arc<dyn ChatChannel>,
    workspace: Arc<dyn WorkspaceChannel>,
    policy: RetryPolicy,
    author: String,
    shutdown: CancellationToken,
    in_flight: Arc<AtomicBool>,
    state: watch::Sender<WorkflowState>,
}

/// Releases the in-flight flag when the run ends, including on panic.
struct RunGuard(Arc<AtomicBool>);

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Progress that survives between attempts of the same run.
#[derive(Default)]
struct Progress {
    topic: Option<Topic>,
    request_id: Option<i64>,
    content_id: Option<i64>,
}

/// One content run: topic, generation, persistence, publishing, with retries.
/// At most one run is in flight at a time.
#[derive(Clone)]
pub struct Workflow {
    inner: Arc<Inner>,
}

impl Workflow {
    pub fn new(deps: WorkflowDeps) -> Self {
        let (state, _) = watch::channel(WorkflowState::Idle);
        Self {
            inner: Arc::new(Inner {
                repo: deps.repo,
                selector: deps.selector,
                generator: deps.generator,
                chat: deps.chat,
                workspace: deps.workspace,
                policy: deps.policy,
                author: deps.author,
                shutdown: deps.shutdown,
                in_flight: Arc::new(AtomicBool::new(false)),
                state,
            }),
        }
    }

    pub fn state(&self) -> WorkflowState {
        *self.inner.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<WorkflowState> {
        self.inner.state.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    fn try_begin(&self) -> Option<RunGuard> {
        self.inner
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| RunGuard(self.inner.in_flight.clone()))
    }

    /// Starts a run in the background unless one is already in flight.
    pub fn spawn(&self, trigger: Trigger) -> SpawnOutcome {
        let Some(guard) = self.try_begin() else {
            info!("Workflow already in flight, ignoring {:?} trigger", trigger);
            return SpawnOutcome::AlreadyRunning;
        };
        let workflow = self.clone();
        tokio::spawn(async move {
            let _guard = guard;
            workflow.execute(trigger).await;
        });
        SpawnOutcome::Started
    }

    /// Runs in the foreground. `None` when another run is already in flight.
    pub async fn run(&self, trigger: Trigger) -> Option<RunReport> {
        let _guard = self.try_begin()?;
        Some(self.execute(trigger).await)
    }

    fn set_state(&self, state: WorkflowState) {
        self.inner.state.send_replace(state);
    }

    async fn execute(&self, trigger: Trigger) -> RunReport {
        let started = Instant::now();
        let inner = &self.inner;
        self.set_state(WorkflowState::SelectingTopic);

        let log = match inner.repo.start_execution(trigger.schedule_id()).await {
            Ok(log) => log,
            Err(e) => {
                // Without a log row there is nothing to retry against.
                error!("Workflow could not open an execution log: {}", e);
                self.set_state(WorkflowState::Failed);
                self.notify_failure(&e.to_string(), 1, None).await;
                return RunReport {
                    execution_id: 0,
                    state: WorkflowState::Failed,
                    attempts: 1,
                    retry_delays: Vec::new(),
                    content: None,
                    error: Some(e.to_string()),
                };
            }
        };
        info!("Workflow run {} started ({:?})", log.id, trigger);

        let mut progress = Progress::default();
        let mut retry_delays = Vec::new();
        let mut attempt = 1;
        let mut last_error: Option<String> = None;

        let outcome = loop {
            if inner.shutdown.is_cancelled() {
                break Err(WorkflowError::Cancelled);
            }
            match self.attempt(&mut progress).await {
                Ok(record) => break Ok(record),
                Err(e) if !e.is_retryable() || attempt >= inner.policy.max_attempts => {
                    break Err(e);
                }
                Err(e) => {
                    let delay = inner.policy.delay_after(attempt);
                    warn!(
                        "Workflow attempt {}/{} failed ({}): {}. Retrying in {}s",
                        attempt,
                        inner.policy.max_attempts,
                        e.kind(),
                        e,
                        delay.as_secs()
                    );
                    let failure = e.to_string();
                    if let Err(db_err) = inner
                        .repo
                        .record_attempt(log.id, attempt, Some(&failure))
                        .await
                    {
                        warn!("Failed to record attempt {}: {}", attempt, db_err);
                    }
                    last_error = Some(failure);
                    self.set_state(WorkflowState::Retrying);
                    retry_delays.push(delay);

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = inner.shutdown.cancelled() => break Err(WorkflowError::Cancelled),
                    }

                    attempt += 1;
                    if let Err(db_err) = inner.repo.record_attempt(log.id, attempt, None).await {
                        warn!("Failed to record attempt {}: {}", attempt, db_err);
                    }
                }
            }
        };

        let elapsed = started.elapsed();
        let duration_ms = (elapsed.as_micros().div_ceil(1000)).max(1) as i64;

        match outcome {
            Ok(record) => {
                if let Err(e) = inner
                    .repo
                    .finish_execution(
                        log.id,
                        ExecutionStatus::Success,
                        Some(record.id),
                        None,
                        duration_ms,
                    )
                    .await
                {
                    error!("Failed to close execution log {}: {}", log.id, e);
                }
                self.set_state(WorkflowState::Done);
                info!(
                    "Workflow run {} published '{}' after {} attempt(s) in {}ms",
                    log.id, record.title, attempt, duration_ms
                );
                RunReport {
                    execution_id: log.id,
                    state: WorkflowState::Done,
                    attempts: attempt,
                    retry_delays,
                    content: Some(record),
                    error: None,
                }
            }
            Err(e) => {
                let message = match (&e, &last_error) {
                    (WorkflowError::Cancelled, Some(last)) => {
                        format!("{} (last error: {})", e, last)
                    }
                    _ => e.to_string(),
                };
                if let Err(db_err) = inner
                    .repo
                    .finish_execution(
                        log.id,
                        ExecutionStatus::Failed,
                        progress.content_id,
                        Some(&message),
                        duration_ms,
                    )
                    .await
                {
                    error!("Failed to close execution log {}: {}", log.id, db_err);
                }
                if let Some(id) = progress.content_id
                    && let Err(db_err) = inner.repo.set_content_status(id, ContentStatus::Failed).await
                {
                    warn!("Failed to mark content {} failed: {}", id, db_err);
                }
                self.set_state(WorkflowState::Failed);

                if matches!(e, WorkflowError::Cancelled) {
                    warn!("Workflow run {} cancelled by shutdown", log.id);
                } else {
                    error!(
                        "Workflow run {} failed after {} attempt(s): {}",
                        log.id, attempt, message
                    );
                    self.notify_failure(&message, attempt, progress.topic.as_ref())
                        .await;
                }

                let content = match progress.content_id {
                    Some(id) => inner.repo.get_content(id).await.ok().flatten(),
                    None => None,
                };
                RunReport {
                    execution_id: log.id,
                    state: WorkflowState::Failed,
                    attempts: attempt,
                    retry_delays,
                    content,
                    error: Some(message),
                }
            }
        }
    }

    async fn attempt(&self, progress: &mut Progress) -> Result<ContentRecord, WorkflowError> {
        let inner = &self.inner;

        if progress.topic.is_none() {
            self.set_state(WorkflowState::SelectingTopic);
            let (topic, request_id) = self.resolve_topic().await?;
            info!(
                "Selected topic '{}' ({}, {})",
                topic.title, topic.category, topic.difficulty
            );
            progress.topic = Some(topic);
            progress.request_id = request_id;
        }

        let content_id = match progress.content_id {
            Some(id) => id,
            None => {
                let Some(topic) = progress.topic.as_ref() else {
                    return Err(GenerationError::NoTopics.into());
                };
                self.set_state(WorkflowState::Generating);
                let generated = inner.generator.generate(topic).await?;

                self.set_state(WorkflowState::Persisting);
                let record = inner
                    .repo
                    .insert_content(&NewContent {
                        topic: topic.title.clone(),
                        title: generated.title,
                        category: topic.category,
                        difficulty: topic.difficulty,
                        summary: generated.summary,
                        tags: generated.tags,
                        author: inner.author.clone(),
                    })
                    .await?;
                progress.content_id = Some(record.id);
                if let Some(request_id) = progress.request_id {
                    inner.repo.link_request_content(request_id, record.id).await?;
                }
                record.id
            }
        };

        self.set_state(WorkflowState::Publishing);
        self.publish(content_id).await
    }

    /// A pending request wins over the weighted catalog pick.
    async fn resolve_topic(&self) -> Result<(Topic, Option<i64>), WorkflowError> {
        let inner = &self.inner;
        while let Some(request) = inner.repo.next_pending_request().await? {
            if !inner.repo.claim_request(request.id).await? {
                continue;
            }
            let category = inner
                .selector
                .catalog()
                .infer_category(&request.topic)
                .unwrap_or(Category::Architecture);
            info!(
                "Using topic requested by {}: '{}'",
                request.requested_by, request.topic
            );
            return Ok((
                Topic {
                    title: request.topic,
                    category,
                    difficulty: Difficulty::Intermediate,
                },
                Some(request.id),
            ));
        }

        let recent = inner.repo.recent_topics(RECENT_TOPIC_WINDOW_DAYS).await?;
        let topic = inner
            .selector
            .select(&recent)
            .ok_or(GenerationError::NoTopics)?;
        Ok((topic, None))
    }

    /// Publishes a persisted record to every configured surface that does not
    /// hold a reference yet. Calling it again after success sends nothing.
    ///
    /// Only the chat post decides the outcome. A workspace failure is logged
    /// and leaves `notion_page_id` empty so the next call retries just that.
    pub async fn publish(&self, content_id: i64) -> Result<ContentRecord, WorkflowError> {
        let inner = &self.inner;
        let mut record = self.load(content_id).await?;

        if inner.workspace.is_configured() && record.notion_page_id.is_none() {
            match inner.workspace.publish(&record).await {
                Ok(page) => {
                    inner
                        .repo
                        .attach_notion_page(record.id, &page.id, page.url.as_deref())
                        .await?;
                    info!("Content {} published to {}", record.id, inner.workspace.name());
                    record = self.load(content_id).await?;
                }
                Err(e) => warn!(
                    "Content {} not published to {}, posting without link: {}",
                    record.id,
                    inner.workspace.name(),
                    e
                ),
            }
        }

        if record.slack_ts.is_none() {
            let message = inner.chat.publish(&record).await?;
            inner.repo.attach_slack_ts(record.id, &message.id).await?;
            info!("Content {} published to {}", record.id, inner.chat.name());
        }

        if record.status != ContentStatus::Published {
            inner
                .repo
                .set_content_status(record.id, ContentStatus::Published)
                .await?;
        }
        self.load(content_id).await
    }

    async fn load(&self, content_id: i64) -> Result<ContentRecord, WorkflowError> {
        self.inner
            .repo
            .get_content(content_id)
            .await?
            .ok_or_else(|| PersistenceError::NotFound(format!("content {}", content_id)).into())
    }

    async fn notify_failure(&self, message: &str, attempts: u32, topic: Option<&Topic>) {
        let mut context = vec![
            ("attempts", attempts.to_string()),
            ("max_retries", self.inner.policy.max_attempts.to_string()),
        ];
        if let Some(topic) = topic {
            context.push(("topic", topic.title.clone()));
        }
        if let Err(e) = self.inner.chat.notify_owner(message, &context).await {
            error!("Failed to notify owner about failed run: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::GeneratedContent;
    use crate::core::store::test_repository;
    use crate::core::test_support::{FakeChat, FakeGenerator, FakeWorkspace};
    use crate::core::topics::TopicCatalog;

    struct Harness {
        workflow: Workflow,
        repo: Repository,
        generator: Arc<FakeGenerator>,
        chat: Arc<FakeChat>,
        workspace: Arc<FakeWorkspace>,
    }

    async fn harness(
        generator: FakeGenerator,
        chat: FakeChat,
        workspace: FakeWorkspace,
    ) -> Harness {
        let repo = test_repository().await;
        let generator = Arc::new(generator);
        let chat = Arc::new(chat);
        let workspace = Arc::new(workspace);
        let catalog = TopicCatalog::from_entries([(
            Category::Network,
            "TCP 3-way handshake".to_string(),
        )]);
        let workflow = Workflow::new(WorkflowDeps {
            repo: repo.clone(),
            selector: TopicSelector::with_seed(catalog, 7),
            generator: generator.clone(),
            chat: chat.clone(),
            workspace: workspace.clone(),
            policy: RetryPolicy::default(),
            author: "User".into(),
            shutdown: CancellationToken::new(),
        });
        Harness {
            workflow,
            repo,
            generator,
            chat,
            workspace,
        }
    }

    fn minutes(values: &[u64]) -> Vec<Duration> {
        values.iter().map(|m| Duration::from_secs(m * 60)).collect()
    }

    #[test]
    fn retry_table_escalates_by_base_interval() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.delays, minutes(&[5, 10, 15, 20, 25]));
        assert_eq!(policy.delay_after(1), Duration::from_secs(300));
        assert_eq!(policy.delay_after(5), Duration::from_secs(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn five_generation_failures_end_in_one_notification() {
        let h = harness(
            FakeGenerator::failing(usize::MAX),
            FakeChat::default(),
            FakeWorkspace::disabled(),
        )
        .await;

        let report = h.workflow.run(Trigger::Manual).await.unwrap();

        assert_eq!(report.state, WorkflowState::Failed);
        assert_eq!(report.attempts, 5);
        assert_eq!(report.retry_delays, minutes(&[5, 10, 15, 20]));
        assert_eq!(h.generator.calls(), 5);
        assert_eq!(h.chat.notification_count(), 1);
        assert_eq!(h.chat.published_count(), 0);

        let (_, context) = h.chat.notifications.lock().unwrap()[0].clone();
        assert!(context.contains(&("attempts".to_string(), "5".to_string())));
        assert!(context.contains(&("max_retries".to_string(), "5".to_string())));

        let log = h.repo.get_execution(report.execution_id).await.unwrap().unwrap();
        assert_eq!(log.status, ExecutionStatus::Failed);
        assert_eq!(log.attempt_count, 5);
        assert!(log.error_message.unwrap().contains("timed out"));
        assert_eq!(h.workflow.state(), WorkflowState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failures() {
        let h = harness(
            FakeGenerator::failing(2),
            FakeChat::default(),
            FakeWorkspace::disabled(),
        )
        .await;

        let report = h.workflow.run(Trigger::Manual).await.unwrap();
        assert_eq!(report.state, WorkflowState::Done);
        assert_eq!(report.attempts, 3);
        assert_eq!(report.retry_delays, minutes(&[5, 10]));
        assert_eq!(h.chat.notification_count(), 0);

        let log = h.repo.get_execution(report.execution_id).await.unwrap().unwrap();
        assert_eq!(log.attempt_count, 3);
        assert_eq!(log.status, ExecutionStatus::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn publish_failure_retries_without_regenerating() {
        let h = harness(
            FakeGenerator::ok(),
            FakeChat::failing(1),
            FakeWorkspace::enabled(),
        )
        .await;

        let report = h.workflow.run(Trigger::Manual).await.unwrap();
        assert_eq!(report.state, WorkflowState::Done);
        assert_eq!(report.attempts, 2);
        assert_eq!(h.generator.calls(), 1);
        assert_eq!(h.workspace.page_count(), 1);
        assert_eq!(h.chat.published_count(), 1);
        assert_eq!(h.repo.count_content(None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn publishes_through_chat_only_when_workspace_is_off() {
        let h = harness(
            FakeGenerator::ok(),
            FakeChat::default(),
            FakeWorkspace::disabled(),
        )
        .await;

        let report = h.workflow.run(Trigger::Manual).await.unwrap();
        let record = report.content.unwrap();
        assert_eq!(record.status, ContentStatus::Published);
        assert!(record.slack_ts.is_some());
        assert!(record.notion_page_id.is_none());
        assert!(record.notion_url.is_none());
        assert_eq!(h.workspace.page_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn workspace_outage_does_not_block_chat() {
        let h = harness(
            FakeGenerator::ok(),
            FakeChat::default(),
            FakeWorkspace::down(),
        )
        .await;

        let report = h.workflow.run(Trigger::Manual).await.unwrap();
        assert_eq!(report.state, WorkflowState::Done);
        assert_eq!(report.attempts, 1);
        assert_eq!(h.chat.published_count(), 1);
        assert_eq!(h.chat.notification_count(), 0);
        assert_eq!(h.workspace.page_count(), 0);

        let record = report.content.unwrap();
        assert_eq!(record.status, ContentStatus::Published);
        assert!(record.slack_ts.is_some());
        assert!(record.notion_page_id.is_none());

        // Once the workspace is back, only the missing page is sent.
        h.workspace.fail_publish.store(false, Ordering::SeqCst);
        let again = h.workflow.publish(record.id).await.unwrap();
        assert_eq!(again.notion_page_id.as_deref(), Some("page-1"));
        assert_eq!(again.slack_ts, record.slack_ts);
        assert_eq!(h.chat.published_count(), 1);
    }

    #[tokio::test]
    async fn publishing_twice_sends_nothing_new() {
        let h = harness(
            FakeGenerator::ok(),
            FakeChat::default(),
            FakeWorkspace::enabled(),
        )
        .await;

        let record = h.workflow.run(Trigger::Manual).await.unwrap().content.unwrap();
        let again = h.workflow.publish(record.id).await.unwrap();

        assert_eq!(again.slack_ts, record.slack_ts);
        assert_eq!(again.notion_page_id, record.notion_page_id);
        assert_eq!(h.chat.published_count(), 1);
        assert_eq!(h.workspace.page_count(), 1);
    }

    #[tokio::test]
    async fn scheduled_run_end_to_end() {
        let h = harness(
            FakeGenerator::returning(GeneratedContent {
                title: "TCP 3-way handshake".into(),
                summary: "SYN, SYN-ACK, ACK establishes a connection.".into(),
                tags: vec!["network".into(), "tcp".into()],
            }),
            FakeChat::default(),
            FakeWorkspace::enabled(),
        )
        .await;
        let schedule = h
            .repo
            .insert_schedule(crate::core::time::DEFAULT_RUN_TIME)
            .await
            .unwrap();

        let report = h
            .workflow
            .run(Trigger::Scheduled {
                schedule_id: Some(schedule.id),
            })
            .await
            .unwrap();

        let record = report.content.unwrap();
        assert_eq!(record.title, "TCP 3-way handshake");
        assert_eq!(record.category, Category::Network);
        assert_eq!(record.status, ContentStatus::Published);
        assert_eq!(h.repo.count_content(None).await.unwrap(), 1);

        let log = h.repo.get_execution(report.execution_id).await.unwrap().unwrap();
        assert_eq!(log.status, ExecutionStatus::Success);
        assert_eq!(log.schedule_id, Some(schedule.id));
        assert!(log.duration_ms.unwrap() > 0);

        assert_eq!(h.chat.published_count(), 1);
        let pages = h.workspace.pages.lock().unwrap().clone();
        assert_eq!(pages, vec!["SYN, SYN-ACK, ACK establishes a connection."]);
        // The chat message carries the page link.
        let posted = h.chat.published.lock().unwrap()[0].clone();
        assert!(posted.notion_url.is_some());
    }

    #[tokio::test]
    async fn duplicate_title_is_terminal_and_notified() {
        let h = harness(
            FakeGenerator::ok(),
            FakeChat::default(),
            FakeWorkspace::disabled(),
        )
        .await;
        h.workflow.run(Trigger::Manual).await.unwrap();

        let report = h.workflow.run(Trigger::Manual).await.unwrap();
        assert_eq!(report.state, WorkflowState::Failed);
        assert_eq!(report.attempts, 1);
        assert!(report.error.unwrap().contains("already exists"));
        assert_eq!(h.chat.notification_count(), 1);
        assert_eq!(h.repo.count_content(None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn pending_request_is_consumed_first() {
        let h = harness(
            FakeGenerator::ok(),
            FakeChat::default(),
            FakeWorkspace::disabled(),
        )
        .await;
        let request = h.repo.insert_request("Raft consensus", "U42").await.unwrap();

        let report = h.workflow.run(Trigger::Manual).await.unwrap();
        let record = report.content.unwrap();
        assert_eq!(record.topic, "Raft consensus");
        assert_eq!(record.category, Category::Architecture);
        assert_eq!(record.difficulty, Difficulty::Intermediate);

        let stored = h.repo.get_request(request.id).await.unwrap().unwrap();
        assert!(stored.processed);
        assert_eq!(stored.content_id, Some(record.id));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_pending_retry_without_notifying() {
        let h = harness(
            FakeGenerator::failing(usize::MAX),
            FakeChat::default(),
            FakeWorkspace::disabled(),
        )
        .await;
        let token = h.workflow.inner.shutdown.clone();
        let workflow = h.workflow.clone();
        let run = tokio::spawn(async move { workflow.run(Trigger::Manual).await });

        tokio::time::sleep(Duration::from_secs(60)).await;
        token.cancel();
        let report = run.await.unwrap().unwrap();

        assert_eq!(report.state, WorkflowState::Failed);
        assert_eq!(report.attempts, 1);
        let error = report.error.unwrap();
        assert!(error.starts_with("run cancelled by shutdown (last error: "));
        assert!(error.contains("timed out"));
        assert_eq!(h.chat.notification_count(), 0);

        let log = h.repo.get_execution(report.execution_id).await.unwrap().unwrap();
        assert_eq!(log.status, ExecutionStatus::Failed);
        assert_eq!(log.error_message.as_deref(), Some(error.as_str()));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_attempt_is_logged_before_the_retry_wait() {
        let h = harness(
            FakeGenerator::failing(usize::MAX),
            FakeChat::default(),
            FakeWorkspace::disabled(),
        )
        .await;
        let token = h.workflow.inner.shutdown.clone();
        let workflow = h.workflow.clone();
        let run = tokio::spawn(async move { workflow.run(Trigger::Manual).await });

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(h.workflow.state(), WorkflowState::Retrying);
        let log = h.repo.recent_executions(1).await.unwrap().remove(0);
        assert_eq!(log.status, ExecutionStatus::Pending);
        assert_eq!(log.attempt_count, 1);
        assert!(log.error_message.unwrap().contains("timed out"));

        // Second attempt starts after the 5 minute delay and keeps the error visible.
        tokio::time::sleep(Duration::from_secs(300)).await;
        let log = h.repo.recent_executions(1).await.unwrap().remove(0);
        assert_eq!(log.attempt_count, 2);
        assert!(log.error_message.is_some());

        token.cancel();
        run.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_triggers_are_ignored() {
        let h = harness(
            FakeGenerator::failing(1),
            FakeChat::default(),
            FakeWorkspace::disabled(),
        )
        .await;

        assert_eq!(h.workflow.spawn(Trigger::Manual), SpawnOutcome::Started);
        assert!(h.workflow.is_running());
        assert_eq!(h.workflow.spawn(Trigger::Manual), SpawnOutcome::AlreadyRunning);
        assert!(h.workflow.run(Trigger::Manual).await.is_none());

        let mut state = h.workflow.subscribe();
        while *state.borrow_and_update() != WorkflowState::Done {
            state.changed().await.unwrap();
        }
        tokio::task::yield_now().await;
        assert_eq!(h.chat.published_count(), 1);
    }
}
