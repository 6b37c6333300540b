//! Slack Web API adapter: content posts, owner notices, reports and the
//! slash-command endpoint.

pub mod blocks;
pub mod server;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::StatusCode;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::core::config::Config;
use crate::core::domain::{ContentRecord, Language};
use crate::core::errors::PublishError;
use crate::core::health::HealthStatus;
use crate::core::publish::{ChatChannel, PublishRef, Publisher};
use crate::core::rate_limit::ApiRateLimiter;
use crate::core::reports::ReportData;

use blocks::SlackMessage;

pub const SLACK_API_BASE: &str = "https://slack.com/api";
const ADAPTER: &str = "slack";

fn transport(source: reqwest::Error) -> PublishError {
    PublishError::Transport {
        adapter: ADAPTER,
        source,
    }
}

/// Maps Slack's `error` code from an `ok: false` response.
fn api_error(code: &str) -> PublishError {
    match code {
        "invalid_auth" | "not_authed" | "account_inactive" | "token_revoked"
        | "token_expired" => PublishError::Unauthorized {
            adapter: ADAPTER,
            detail: code.to_string(),
        },
        "ratelimited" => PublishError::RateLimited {
            adapter: ADAPTER,
            retry_after_secs: None,
        },
        other => PublishError::Api {
            adapter: ADAPTER,
            detail: other.to_string(),
        },
    }
}

/// Thin Web API client. Every call goes through the shared rate limiter.
#[derive(Clone)]
pub struct SlackClient {
    http: reqwest::Client,
    api_base: String,
    token: String,
    limiter: ApiRateLimiter,
}

impl SlackClient {
    pub fn new(token: &str, requests_per_minute: u32) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: SLACK_API_BASE.to_string(),
            token: token.to_string(),
            limiter: ApiRateLimiter::per_minute(requests_per_minute),
        }
    }

    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    pub async fn call(&self, method: &str, body: &Value) -> Result<Value, PublishError> {
        self.limiter.acquire().await;
        debug!("Slack API call: {}", method);

        let res = self
            .http
            .post(format!("{}/{}", self.api_base, method))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(transport)?;

        if res.status() == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = res
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(PublishError::RateLimited {
                adapter: ADAPTER,
                retry_after_secs,
            });
        }
        if !res.status().is_success() {
            return Err(PublishError::Api {
                adapter: ADAPTER,
                detail: format!("{} returned HTTP {}", method, res.status()),
            });
        }

        let payload: Value = res.json().await.map_err(transport)?;
        if payload["ok"].as_bool() == Some(true) {
            Ok(payload)
        } else {
            Err(api_error(payload["error"].as_str().unwrap_or("unknown_error")))
        }
    }

    pub async fn post_message(
        &self,
        channel: &str,
        message: &SlackMessage,
    ) -> Result<PublishRef, PublishError> {
        let payload = self
            .call(
                "chat.postMessage",
                &json!({
                    "channel": channel,
                    "text": message.text,
                    "blocks": message.blocks,
                    "unfurl_links": false,
                }),
            )
            .await?;
        let ts = payload["ts"].as_str().ok_or_else(|| PublishError::Api {
            adapter: ADAPTER,
            detail: "chat.postMessage response has no ts".into(),
        })?;
        Ok(PublishRef {
            id: ts.to_string(),
            url: None,
        })
    }

    /// Opens (or reuses) the DM channel with `user_id`.
    pub async fn open_dm(&self, user_id: &str) -> Result<String, PublishError> {
        let payload = self
            .call("conversations.open", &json!({ "users": user_id }))
            .await?;
        payload["channel"]["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| PublishError::Api {
                adapter: ADAPTER,
                detail: "conversations.open response has no channel id".into(),
            })
    }
}

/// Channels the bot writes to.
#[derive(Debug, Clone)]
pub struct SlackTargets {
    pub content_channel: String,
    pub report_channel: String,
    pub owner_user_id: Option<String>,
}

pub struct SlackPublisher {
    client: SlackClient,
    targets: SlackTargets,
    language: Language,
}

impl SlackPublisher {
    pub fn new(client: SlackClient, targets: SlackTargets, language: Language) -> Self {
        Self {
            client,
            targets,
            language,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let client = SlackClient::new(&config.slack_bot_token, config.slack_rate_limit);
        let targets = SlackTargets {
            content_channel: config.slack_channel_id.clone(),
            report_channel: config.report_channel().to_string(),
            owner_user_id: config
                .slack_owner_user_id
                .clone()
                .filter(|u| !u.trim().is_empty()),
        };
        Self::new(client, targets, config.language)
    }

    /// DM with the owner when configured, otherwise the content channel.
    async fn owner_channel(&self) -> Result<String, PublishError> {
        match &self.targets.owner_user_id {
            Some(user) => self.client.open_dm(user).await,
            None => Ok(self.targets.content_channel.clone()),
        }
    }
}

#[async_trait]
impl Publisher for SlackPublisher {
    fn name(&self) -> &'static str {
        ADAPTER
    }

    async fn publish(&self, record: &ContentRecord) -> Result<PublishRef, PublishError> {
        let message = blocks::content_message(record, self.language);
        let posted = self
            .client
            .post_message(&self.targets.content_channel, &message)
            .await?;
        info!(
            "Posted '{}' to Slack channel {} (ts {})",
            record.title, self.targets.content_channel, posted.id
        );
        Ok(posted)
    }

    async fn health_check(&self) -> HealthStatus {
        match self.client.call("auth.test", &json!({})).await {
            Ok(payload) => {
                debug!(
                    "Slack auth.test ok as {}",
                    payload["user"].as_str().unwrap_or("?")
                );
                HealthStatus::Ok
            }
            Err(e) => HealthStatus::Degraded(e.to_string()),
        }
    }
}

#[async_trait]
impl ChatChannel for SlackPublisher {
    async fn notify_owner(
        &self,
        message: &str,
        context: &[(&str, String)],
    ) -> Result<(), PublishError> {
        let channel = match self.owner_channel().await {
            Ok(channel) => channel,
            Err(e) => {
                warn!("Could not open owner DM, using content channel: {}", e);
                self.targets.content_channel.clone()
            }
        };
        let notice = blocks::error_message(message, context, Utc::now());
        self.client.post_message(&channel, &notice).await?;
        info!("Sent failure notice to {}", channel);
        Ok(())
    }

    async fn post_report(
        &self,
        report: &ReportData,
        page_url: Option<&str>,
    ) -> Result<PublishRef, PublishError> {
        let message = blocks::report_message(report, page_url, self.language);
        let posted = self
            .client
            .post_message(&self.targets.report_channel, &message)
            .await?;
        info!(
            "Posted {} report to Slack channel {}",
            report.kind, self.targets.report_channel
        );
        Ok(posted)
    }
}
