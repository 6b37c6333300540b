//! In-process fakes for the generator and publish surfaces.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::core::domain::{ContentRecord, GeneratedContent, ReportKind, Topic};
use crate::core::errors::{GenerationError, PublishError};
use crate::core::generator::ContentGenerator;
use crate::core::health::HealthStatus;
use crate::core::publish::{ChatChannel, PublishRef, Publisher, WorkspaceChannel};
use crate::core::reports::ReportData;

/// Fails the first `fail_first` calls with a timeout, then echoes the topic.
#[derive(Default)]
pub struct FakeGenerator {
    pub fail_first: usize,
    pub fixed: Option<GeneratedContent>,
    calls: AtomicUsize,
}

impl FakeGenerator {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn failing(fail_first: usize) -> Self {
        Self {
            fail_first,
            ..Self::default()
        }
    }

    pub fn returning(content: GeneratedContent) -> Self {
        Self {
            fixed: Some(content),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentGenerator for FakeGenerator {
    async fn generate(&self, topic: &Topic) -> Result<GeneratedContent, GenerationError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first {
            return Err(GenerationError::Timeout(180));
        }
        Ok(self.fixed.clone().unwrap_or_else(|| GeneratedContent {
            title: topic.title.clone(),
            summary: format!("About {}.", topic.title),
            tags: vec![topic.category.to_string()],
        }))
    }

    async fn health_check(&self) -> HealthStatus {
        HealthStatus::Ok
    }
}

#[derive(Default)]
pub struct FakeChat {
    pub fail_publish: AtomicUsize,
    pub published: Mutex<Vec<ContentRecord>>,
    pub notifications: Mutex<Vec<(String, Vec<(String, String)>)>>,
    pub reports: Mutex<Vec<(ReportKind, Option<String>)>>,
}

impl FakeChat {
    /// Rejects the next `n` publishes with a rate limit.
    pub fn failing(n: usize) -> Self {
        let chat = Self::default();
        chat.fail_publish.store(n, Ordering::SeqCst);
        chat
    }

    pub fn published_count(&self) -> usize {
        self.published.lock().unwrap().len()
    }

    pub fn notification_count(&self) -> usize {
        self.notifications.lock().unwrap().len()
    }
}

#[async_trait]
impl Publisher for FakeChat {
    fn name(&self) -> &'static str {
        "slack"
    }

    async fn publish(&self, record: &ContentRecord) -> Result<PublishRef, PublishError> {
        let pending = self.fail_publish.load(Ordering::SeqCst);
        if pending > 0 {
            self.fail_publish.store(pending - 1, Ordering::SeqCst);
            return Err(PublishError::RateLimited {
                adapter: "slack",
                retry_after_secs: None,
            });
        }
        let mut published = self.published.lock().unwrap();
        published.push(record.clone());
        Ok(PublishRef {
            id: format!("1700000000.{:06}", published.len()),
            url: None,
        })
    }

    async fn health_check(&self) -> HealthStatus {
        HealthStatus::Ok
    }
}

#[async_trait]
impl ChatChannel for FakeChat {
    async fn notify_owner(
        &self,
        message: &str,
        context: &[(&str, String)],
    ) -> Result<(), PublishError> {
        self.notifications.lock().unwrap().push((
            message.to_string(),
            context
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        ));
        Ok(())
    }

    async fn post_report(
        &self,
        report: &ReportData,
        page_url: Option<&str>,
    ) -> Result<PublishRef, PublishError> {
        self.reports
            .lock()
            .unwrap()
            .push((report.kind, page_url.map(str::to_string)));
        Ok(PublishRef {
            id: "1700000000.999999".into(),
            url: None,
        })
    }
}

pub struct FakeWorkspace {
    pub configured: bool,
    pub fail_reports: bool,
    /// Rejects content pages with an API error while set.
    pub fail_publish: AtomicBool,
    pub pages: Mutex<Vec<String>>,
}

impl FakeWorkspace {
    pub fn enabled() -> Self {
        Self {
            configured: true,
            fail_reports: false,
            fail_publish: AtomicBool::new(false),
            pages: Mutex::new(Vec::new()),
        }
    }

    pub fn down() -> Self {
        let workspace = Self::enabled();
        workspace.fail_publish.store(true, Ordering::SeqCst);
        workspace
    }

    pub fn disabled() -> Self {
        Self {
            configured: false,
            ..Self::enabled()
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.lock().unwrap().len()
    }
}

#[async_trait]
impl Publisher for FakeWorkspace {
    fn name(&self) -> &'static str {
        "notion"
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn publish(&self, record: &ContentRecord) -> Result<PublishRef, PublishError> {
        if !self.configured {
            return Err(PublishError::NotConfigured("notion"));
        }
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(PublishError::Api {
                adapter: "notion",
                detail: "service unavailable".into(),
            });
        }
        let mut pages = self.pages.lock().unwrap();
        pages.push(record.summary.clone());
        let id = format!("page-{}", pages.len());
        Ok(PublishRef {
            url: Some(format!("https://www.notion.so/{}", id)),
            id,
        })
    }

    async fn health_check(&self) -> HealthStatus {
        if self.configured {
            HealthStatus::Ok
        } else {
            HealthStatus::Skipped("not configured".into())
        }
    }
}

#[async_trait]
impl WorkspaceChannel for FakeWorkspace {
    async fn publish_report(&self, report: &ReportData) -> Result<PublishRef, PublishError> {
        if self.fail_reports {
            return Err(PublishError::Api {
                adapter: "notion",
                detail: "validation_error".into(),
            });
        }
        let id = format!("report-{}", report.kind);
        Ok(PublishRef {
            url: Some(format!("https://www.notion.so/{}", id)),
            id,
        })
    }
}
