//! Notion adapter. Pages live under the database's first data source
//! (API version 2025-09-03).

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::{Value, json};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

use crate::core::config::Config;
use crate::core::domain::{ContentRecord, Language, ReportKind};
use crate::core::errors::PublishError;
use crate::core::health::HealthStatus;
use crate::core::publish::{PublishRef, Publisher, WorkspaceChannel};
use crate::core::rate_limit::ApiRateLimiter;
use crate::core::reports::ReportData;

pub const NOTION_API_BASE: &str = "https://api.notion.com/v1";
pub const NOTION_VERSION: &str = "2025-09-03";
const ADAPTER: &str = "notion";

const SUMMARY_LIMIT: usize = 2000;
const TAG_LIMIT: usize = 10;
const LEGACY_TITLE: &str = "Name";
const TITLE: &str = "Title";

fn transport(source: reqwest::Error) -> PublishError {
    PublishError::Transport {
        adapter: ADAPTER,
        source,
    }
}

fn rich_text(content: &str) -> Value {
    json!([{ "type": "text", "text": { "content": content } }])
}

fn bullet(content: &str) -> Value {
    json!({ "type": "bulleted_list_item", "bulleted_list_item": { "rich_text": rich_text(content) } })
}

fn heading(content: &str) -> Value {
    json!({ "type": "heading_2", "heading_2": { "rich_text": rich_text(content) } })
}

/// Properties the daily content pages rely on, keyed by name.
fn expected_schema() -> Vec<(&'static str, Value)> {
    vec![
        ("Category", json!({ "select": { "options": [] } })),
        ("Difficulty", json!({ "select": { "options": [] } })),
        ("Tags", json!({ "multi_select": { "options": [] } })),
        ("Created", json!({ "date": {} })),
        ("Author", json!({ "rich_text": {} })),
        ("Status", json!({ "select": { "options": [] } })),
    ]
}

/// Changes needed to bring `existing` up to the expected schema, or `None`.
pub fn schema_patch(existing: &Value) -> Option<Value> {
    let has = |name: &str| existing.get(name).is_some();
    let mut patch = serde_json::Map::new();
    for (name, config) in expected_schema() {
        if !has(name) {
            patch.insert(name.to_string(), config);
        }
    }
    if has(LEGACY_TITLE) && !has(TITLE) {
        patch.insert(LEGACY_TITLE.to_string(), json!({ "name": TITLE }));
    }
    (!patch.is_empty()).then_some(Value::Object(patch))
}

fn page_properties(
    title: &str,
    category: &str,
    difficulty: &str,
    tags: &[String],
    created: &str,
    author: &str,
) -> Value {
    let tags: Vec<Value> = tags
        .iter()
        .take(TAG_LIMIT)
        .map(|tag| json!({ "name": tag }))
        .collect();
    json!({
        TITLE: { "title": rich_text(title) },
        "Category": { "select": { "name": category } },
        "Difficulty": { "select": { "name": difficulty } },
        "Tags": { "multi_select": tags },
        "Created": { "date": { "start": created } },
        "Author": { "rich_text": rich_text(author) },
        "Status": { "select": { "name": "Published" } },
    })
}

pub fn content_page(record: &ContentRecord, language: Language) -> (Value, Vec<Value>) {
    let properties = page_properties(
        &record.title,
        record.category.display_name(language),
        record.difficulty.display_name(language),
        &record.tags,
        &record.created_at.format("%Y-%m-%d").to_string(),
        &record.author,
    );
    let summary: String = record.summary.chars().take(SUMMARY_LIMIT).collect();
    let children = vec![json!({
        "type": "callout",
        "callout": {
            "rich_text": rich_text(&summary),
            "icon": { "type": "emoji", "emoji": "💡" },
        }
    })];
    (properties, children)
}

pub fn report_page(report: &ReportData, language: Language) -> (Value, Vec<Value>) {
    let kind_tag = match report.kind {
        ReportKind::Weekly => "weekly",
        ReportKind::Monthly => "monthly",
    };
    let properties = page_properties(
        &report.title(language),
        "Report",
        "-",
        &[kind_tag.to_string(), "stats".to_string()],
        &report.generated_at.format("%Y-%m-%d").to_string(),
        "Daily-Bot",
    );

    let mut children = vec![
        heading("Summary"),
        bullet(&format!("Period: {}", report.period_label())),
        bullet(&format!("Content generated: {}", report.total_count)),
        bullet(&format!("Successful runs: {}", report.success_count)),
        bullet(&format!("Failed runs: {}", report.failed_count)),
        bullet(&format!("Retries: {}", report.retry_count)),
    ];
    if let (Some(avg), Some(min), Some(max)) = (
        report.avg_duration_ms,
        report.min_duration_ms,
        report.max_duration_ms,
    ) {
        children.push(bullet(&format!(
            "Average run time: {:.0}ms (min {}ms, max {}ms)",
            avg, min, max
        )));
    }
    children.push(json!({ "type": "divider", "divider": {} }));

    let distribution = report.top_categories(report.category_distribution.len());
    if !distribution.is_empty() {
        children.push(heading("Categories"));
        for (category, count) in distribution {
            children.push(bullet(&format!(
                "{}: {}",
                category.display_name(language),
                count
            )));
        }
        children.push(json!({ "type": "divider", "divider": {} }));
    }

    if !report.uncovered_categories.is_empty() {
        let names: Vec<&str> = report
            .uncovered_categories
            .iter()
            .map(|c| c.display_name(language))
            .collect();
        children.push(heading("Not covered yet"));
        children.push(json!({
            "type": "paragraph",
            "paragraph": { "rich_text": rich_text(&names.join(", ")) }
        }));
    }
    (properties, children)
}

pub struct NotionClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    database_id: String,
    limiter: ApiRateLimiter,
    data_source_id: OnceCell<String>,
    schema_ready: Mutex<bool>,
}

impl NotionClient {
    pub fn new(api_key: &str, database_id: &str, requests_per_second: u32) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: NOTION_API_BASE.to_string(),
            api_key: api_key.to_string(),
            database_id: database_id.to_string(),
            limiter: ApiRateLimiter::per_second(requests_per_second),
            data_source_id: OnceCell::new(),
            schema_ready: Mutex::new(false),
        }
    }

    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, PublishError> {
        self.limiter.acquire().await;
        debug!("Notion API {} {}", method, path);

        let mut req = self
            .http
            .request(method, format!("{}{}", self.api_base, path))
            .bearer_auth(&self.api_key)
            .header("Notion-Version", NOTION_VERSION);
        if let Some(body) = body {
            req = req.json(body);
        }
        let res = req.send().await.map_err(transport)?;
        let status = res.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
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

        let payload: Value = res.json().await.map_err(transport)?;
        if status.is_success() {
            return Ok(payload);
        }
        let detail = format!(
            "{}: {}",
            payload["code"].as_str().unwrap_or("error"),
            payload["message"].as_str().unwrap_or("no message")
        );
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            Err(PublishError::Unauthorized {
                adapter: ADAPTER,
                detail,
            })
        } else {
            Err(PublishError::Api {
                adapter: ADAPTER,
                detail,
            })
        }
    }

    /// First data source of the configured database, resolved once.
    pub async fn data_source_id(&self) -> Result<&str, PublishError> {
        let id = self
            .data_source_id
            .get_or_try_init(|| async {
                let db = self
                    .request(Method::GET, &format!("/databases/{}", self.database_id), None)
                    .await?;
                let id = db["data_sources"][0]["id"]
                    .as_str()
                    .ok_or_else(|| PublishError::Api {
                        adapter: ADAPTER,
                        detail: format!(
                            "database {} has no data sources; check that the integration has access",
                            self.database_id
                        ),
                    })?
                    .to_string();
                info!("Resolved Notion data source {}", id);
                Ok::<String, PublishError>(id)
            })
            .await?;
        Ok(id.as_str())
    }

    /// Adds missing properties and renames the legacy title once. Failures
    /// are logged and retried before the next publish.
    pub async fn ensure_schema(&self) {
        let mut ready = self.schema_ready.lock().await;
        if *ready {
            return;
        }
        match self.reconcile_schema().await {
            Ok(changed) => {
                if !changed.is_empty() {
                    info!("Notion schema updated: {}", changed.join(", "));
                }
                *ready = true;
            }
            Err(e) => warn!("Failed to ensure Notion schema: {}", e),
        }
    }

    async fn reconcile_schema(&self) -> Result<Vec<String>, PublishError> {
        let ds_id = self.data_source_id().await?.to_string();
        let path = format!("/data_sources/{}", ds_id);
        let source = self.request(Method::GET, &path, None).await?;
        let Some(patch) = schema_patch(&source["properties"]) else {
            return Ok(Vec::new());
        };
        let changed: Vec<String> = patch
            .as_object()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        self.request(Method::PATCH, &path, Some(&json!({ "properties": patch })))
            .await?;
        Ok(changed)
    }

    pub async fn create_page(
        &self,
        properties: Value,
        children: Vec<Value>,
    ) -> Result<PublishRef, PublishError> {
        self.ensure_schema().await;
        let ds_id = self.data_source_id().await?.to_string();
        let page = self
            .request(
                Method::POST,
                "/pages",
                Some(&json!({
                    "parent": { "type": "data_source_id", "data_source_id": ds_id },
                    "properties": properties,
                    "children": children,
                })),
            )
            .await?;
        let id = page["id"].as_str().ok_or_else(|| PublishError::Api {
            adapter: ADAPTER,
            detail: "page response has no id".into(),
        })?;
        Ok(PublishRef {
            id: id.to_string(),
            url: page["url"].as_str().map(str::to_string),
        })
    }
}

/// Optional workspace surface. Without credentials every call is skipped.
pub struct NotionPublisher {
    client: Option<NotionClient>,
    language: Language,
}

impl NotionPublisher {
    pub fn new(client: Option<NotionClient>, language: Language) -> Self {
        Self { client, language }
    }

    pub fn from_config(config: &Config) -> Self {
        let client = match (&config.notion_api_key, &config.notion_database_id) {
            (Some(key), Some(db)) if config.notion_enabled() => {
                Some(NotionClient::new(key, db, config.notion_rate_limit))
            }
            _ => None,
        };
        Self::new(client, config.language)
    }

    fn client(&self) -> Result<&NotionClient, PublishError> {
        self.client
            .as_ref()
            .ok_or(PublishError::NotConfigured(ADAPTER))
    }
}

#[async_trait]
impl Publisher for NotionPublisher {
    fn name(&self) -> &'static str {
        ADAPTER
    }

    fn is_configured(&self) -> bool {
        self.client.is_some()
    }

    async fn publish(&self, record: &ContentRecord) -> Result<PublishRef, PublishError> {
        let client = self.client()?;
        let (properties, children) = content_page(record, self.language);
        let page = client.create_page(properties, children).await?;
        info!("Created Notion page {} for '{}'", page.id, record.title);
        Ok(page)
    }

    async fn health_check(&self) -> HealthStatus {
        match &self.client {
            None => HealthStatus::Skipped("not configured".into()),
            Some(client) => match client.data_source_id().await {
                Ok(_) => HealthStatus::Ok,
                Err(e) => HealthStatus::Degraded(e.to_string()),
            },
        }
    }
}

#[async_trait]
impl WorkspaceChannel for NotionPublisher {
    async fn publish_report(&self, report: &ReportData) -> Result<PublishRef, PublishError> {
        let client = self.client()?;
        let (properties, children) = report_page(report, self.language);
        let page = client.create_page(properties, children).await?;
        info!("Created Notion {} report page {}", report.kind, page.id);
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::{Category, ContentStatus, Difficulty};
    use axum::extract::{Path, State};
    use axum::http::HeaderMap;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use chrono::Utc;
    use std::sync::{Arc, Mutex as StdMutex};

    #[derive(Clone, Default)]
    struct MockNotion {
        calls: Arc<StdMutex<Vec<(String, Value)>>>,
    }

    impl MockNotion {
        fn record(&self, headers: &HeaderMap, call: String, body: Value) {
            assert_eq!(headers.get("notion-version").unwrap(), NOTION_VERSION);
            self.calls.lock().unwrap().push((call, body));
        }

        fn calls(&self, prefix: &str) -> Vec<Value> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(c, _)| c.starts_with(prefix))
                .map(|(_, b)| b.clone())
                .collect()
        }
    }

    async fn get_database(
        State(mock): State<MockNotion>,
        headers: HeaderMap,
        Path(id): Path<String>,
    ) -> Json<Value> {
        mock.record(&headers, format!("GET /databases/{}", id), Value::Null);
        Json(json!({ "id": id, "data_sources": [{ "id": "ds-1", "name": "Daily" }] }))
    }

    async fn get_source(
        State(mock): State<MockNotion>,
        headers: HeaderMap,
        Path(id): Path<String>,
    ) -> Json<Value> {
        mock.record(&headers, format!("GET /data_sources/{}", id), Value::Null);
        Json(json!({ "id": id, "properties": { "Name": { "title": {} }, "Tags": { "multi_select": {} } } }))
    }

    async fn patch_source(
        State(mock): State<MockNotion>,
        headers: HeaderMap,
        Path(id): Path<String>,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        mock.record(&headers, format!("PATCH /data_sources/{}", id), body);
        Json(json!({ "id": id }))
    }

    async fn create_page(
        State(mock): State<MockNotion>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        mock.record(&headers, "POST /pages".into(), body);
        Json(json!({ "id": "page-1", "url": "https://www.notion.so/page-1" }))
    }

    async fn spawn_mock() -> (String, MockNotion) {
        let mock = MockNotion::default();
        let app = Router::new()
            .route("/v1/databases/{id}", get(get_database))
            .route("/v1/data_sources/{id}", get(get_source).patch(patch_source))
            .route("/v1/pages", post(create_page))
            .with_state(mock.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}/v1", addr), mock)
    }

    fn record() -> ContentRecord {
        ContentRecord {
            id: 3,
            topic: "TCP 3-way handshake".into(),
            title: "TCP 3-way handshake".into(),
            category: Category::Network,
            difficulty: Difficulty::Intermediate,
            summary: "s".repeat(2500),
            tags: (0..12).map(|i| format!("tag{}", i)).collect(),
            notion_page_id: None,
            notion_url: None,
            slack_ts: None,
            author: "User".into(),
            status: ContentStatus::Draft,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn schema_patch_adds_missing_and_renames_legacy_title() {
        let patch = schema_patch(&json!({ "Name": {}, "Category": {} })).unwrap();
        assert_eq!(patch["Name"], json!({ "name": "Title" }));
        assert!(patch.get("Category").is_none());
        assert!(patch.get("Status").is_some());

        let complete: serde_json::Map<String, Value> = expected_schema()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .chain([(TITLE.to_string(), json!({}))])
            .collect();
        assert_eq!(schema_patch(&Value::Object(complete)), None);
    }

    #[test]
    fn content_page_caps_tags_and_summary() {
        let (properties, children) = content_page(&record(), Language::En);
        assert_eq!(properties["Title"]["title"][0]["text"]["content"], "TCP 3-way handshake");
        assert_eq!(properties["Category"]["select"]["name"], "Network");
        assert_eq!(properties["Tags"]["multi_select"].as_array().unwrap().len(), 10);
        assert_eq!(properties["Status"]["select"]["name"], "Published");
        let callout = &children[0]["callout"];
        assert_eq!(callout["icon"]["emoji"], "💡");
        assert_eq!(
            callout["rich_text"][0]["text"]["content"].as_str().unwrap().len(),
            2000
        );
    }

    #[tokio::test]
    async fn publish_reconciles_schema_once_and_creates_pages() {
        let (base, mock) = spawn_mock().await;
        let notion = NotionPublisher::new(
            Some(NotionClient::new("secret", "db-1", 100).with_api_base(&base)),
            Language::En,
        );
        assert!(notion.is_configured());

        let page = notion.publish(&record()).await.unwrap();
        assert_eq!(page.id, "page-1");
        assert_eq!(page.url.as_deref(), Some("https://www.notion.so/page-1"));
        notion.publish(&record()).await.unwrap();

        assert_eq!(mock.calls("GET /databases/db-1").len(), 1);
        let patches = mock.calls("PATCH /data_sources/ds-1");
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0]["properties"]["Name"]["name"], "Title");
        assert!(patches[0]["properties"].get("Tags").is_none());

        let pages = mock.calls("POST /pages");
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0]["parent"]["type"], "data_source_id");
        assert_eq!(pages[0]["parent"]["data_source_id"], "ds-1");
    }

    #[tokio::test]
    async fn unconfigured_adapter_is_skipped() {
        let notion = NotionPublisher::new(None, Language::En);
        assert!(!notion.is_configured());
        assert_eq!(
            notion.health_check().await,
            HealthStatus::Skipped("not configured".into())
        );
        assert!(matches!(
            notion.publish(&record()).await,
            Err(PublishError::NotConfigured("notion"))
        ));
    }
}
