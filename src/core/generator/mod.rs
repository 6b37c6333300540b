mod prompt;

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{info, warn};

use crate::core::config::Config;
use crate::core::domain::{GeneratedContent, Language, Topic};
use crate::core::errors::GenerationError;
use crate::core::health::HealthStatus;

pub use prompt::build_prompt;

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_STDERR_CHARS: usize = 500;

#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, topic: &Topic) -> Result<GeneratedContent, GenerationError>;
    async fn health_check(&self) -> HealthStatus;
}

/// Runs the `claude` CLI in print mode, feeding the prompt on stdin.
pub struct ClaudeCliGenerator {
    program: String,
    leading_args: Vec<String>,
    model: String,
    timeout: Duration,
    language: Language,
}

impl ClaudeCliGenerator {
    /// `command` may carry leading arguments (`"npx claude"`); they are split
    /// on whitespace.
    pub fn new(command: &str, model: &str, timeout: Duration, language: Language) -> Self {
        let mut parts = command.split_whitespace().map(String::from);
        let program = parts.next().unwrap_or_else(|| "claude".to_string());
        Self {
            program,
            leading_args: parts.collect(),
            model: model.to_string(),
            timeout,
            language,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.generator_command,
            &config.generator_model,
            config.generator_timeout(),
            config.language,
        )
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.leading_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn execute(&self, prompt: &str) -> Result<String, GenerationError> {
        let mut cmd = self.command();
        cmd.args(["--print", "--model", &self.model, "-p", "-"]);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(GenerationError::NotInstalled(self.program.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        let stdin = child.stdin.take();
        let run = async move {
            if let Some(mut stdin) = stdin {
                match stdin.write_all(prompt.as_bytes()).await {
                    Ok(()) => {}
                    // The tool may exit before draining stdin; its exit status decides.
                    Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                    Err(e) => return Err(e),
                }
            }
            child.wait_with_output().await
        };

        let output = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| GenerationError::Timeout(self.timeout.as_secs()))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GenerationError::Failed {
                status: output.status.to_string(),
                stderr: stderr.trim().chars().take(MAX_STDERR_CHARS).collect(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl ContentGenerator for ClaudeCliGenerator {
    async fn generate(&self, topic: &Topic) -> Result<GeneratedContent, GenerationError> {
        info!(
            "Generating content for '{}' ({}, {})",
            topic.title, topic.category, topic.difficulty
        );
        let prompt = build_prompt(topic, self.language);
        let raw = self.execute(&prompt).await?;
        let content = parse_response(&raw)?;
        info!("Generated '{}' with {} tags", content.title, content.tags.len());
        Ok(content)
    }

    async fn health_check(&self) -> HealthStatus {
        let mut cmd = self.command();
        cmd.arg("--version").stdin(Stdio::null());
        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return HealthStatus::Degraded(format!("`{}` not found on PATH", self.program));
            }
            Err(e) => return HealthStatus::Degraded(e.to_string()),
        };
        match tokio::time::timeout(HEALTH_CHECK_TIMEOUT, child.wait_with_output()).await {
            Ok(Ok(output)) if output.status.success() => HealthStatus::Ok,
            Ok(Ok(output)) => HealthStatus::Degraded(format!("--version exited with {}", output.status)),
            Ok(Err(e)) => HealthStatus::Degraded(e.to_string()),
            Err(_) => {
                warn!("Generator health check timed out");
                HealthStatus::Degraded("--version timed out".into())
            }
        }
    }
}

#[derive(Deserialize)]
struct RawContent {
    title: Option<String>,
    summary: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

/// Extracts `{title, summary, tags}` from generator output. A fenced
/// ```` ```json ```` block wins; otherwise the outermost `{...}` span is used.
pub fn parse_response(raw: &str) -> Result<GeneratedContent, GenerationError> {
    let malformed = |msg: String| GenerationError::Malformed(msg);
    let fenced = Regex::new(r"```json\s*([\s\S]*?)\s*```").map_err(|e| malformed(e.to_string()))?;
    let bare = Regex::new(r"\{[\s\S]*\}").map_err(|e| malformed(e.to_string()))?;

    let candidate = match fenced.captures(raw).and_then(|c| c.get(1)) {
        Some(m) => m.as_str(),
        None => match bare.find(raw) {
            Some(m) => m.as_str(),
            None => return Err(malformed("no JSON object in output".into())),
        },
    };

    let payload: RawContent =
        serde_json::from_str(candidate).map_err(|e| malformed(format!("invalid JSON: {}", e)))?;

    let required = |value: Option<String>, field: &str| {
        value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| malformed(format!("missing {}", field)))
    };
    let title = required(payload.title, "title")?;
    let summary = required(payload.summary, "summary")?;

    let mut tags: Vec<String> = Vec::new();
    for tag in payload.tags {
        let tag = tag.trim().to_string();
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
    }

    Ok(GeneratedContent {
        title,
        summary,
        tags,
    })
}
