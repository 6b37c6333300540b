use async_trait::async_trait;

use crate::core::domain::ContentRecord;
use crate::core::errors::PublishError;
use crate::core::health::HealthStatus;
use crate::core::reports::ReportData;

/// Durable handle returned by an external surface after publishing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRef {
    /// Slack message `ts` or Notion page id.
    pub id: String,
    pub url: Option<String>,
}

#[async_trait]
pub trait Publisher: Send + Sync {
    fn name(&self) -> &'static str;

    /// Optional surfaces report `false` and are skipped by the workflow.
    fn is_configured(&self) -> bool {
        true
    }

    async fn publish(&self, record: &ContentRecord) -> Result<PublishRef, PublishError>;

    async fn health_check(&self) -> HealthStatus;
}

/// The chat surface: required, and also the channel for owner notices and reports.
#[async_trait]
pub trait ChatChannel: Publisher {
    /// Direct message to the bot owner. `context` is rendered as key/value lines.
    async fn notify_owner(
        &self,
        message: &str,
        context: &[(&str, String)],
    ) -> Result<(), PublishError>;

    async fn post_report(
        &self,
        report: &ReportData,
        page_url: Option<&str>,
    ) -> Result<PublishRef, PublishError>;
}

/// The document workspace: optional.
#[async_trait]
pub trait WorkspaceChannel: Publisher {
    async fn publish_report(&self, report: &ReportData) -> Result<PublishRef, PublishError>;
}
