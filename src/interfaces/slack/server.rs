use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::post,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::core::commands::CommandHandler;
use crate::core::lifecycle::LifecycleComponent;

/// Requests older than this are treated as replays.
const SIGNATURE_WINDOW_SECS: u64 = 300;

#[derive(Clone)]
struct CommandState {
    handler: CommandHandler,
    signing_secret: String,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Verifies Slack's `v0` request signature against `now` (unix seconds).
pub fn verify_slack_signature(
    headers: &HeaderMap,
    body: &[u8],
    signing_secret: &str,
    now: u64,
) -> bool {
    use hmac::Mac;
    use sha2::Sha256;
    type HmacSha256 = hmac::Hmac<Sha256>;

    let Some(timestamp) = headers
        .get("x-slack-request-timestamp")
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };
    match timestamp.parse::<u64>() {
        Ok(ts) if now.abs_diff(ts) <= SIGNATURE_WINDOW_SECS => {}
        _ => return false,
    }

    let Some(sig) = headers
        .get("x-slack-signature")
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(signing_secret.as_bytes()) else {
        return false;
    };
    mac.update(format!("v0:{}:", timestamp).as_bytes());
    mac.update(body);
    let expected = format!("v0={}", hex::encode(mac.finalize().into_bytes()));

    // Constant-time comparison
    if sig.len() != expected.len() {
        return false;
    }
    sig.as_bytes()
        .iter()
        .zip(expected.as_bytes().iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

async fn slash_command(
    State(state): State<CommandState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !state.signing_secret.is_empty()
        && !verify_slack_signature(&headers, &body, &state.signing_secret, unix_now())
    {
        warn!("Rejected slash command with an invalid signature");
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "Invalid signature" })),
        )
            .into_response();
    }

    let mut text = String::new();
    let mut user_id = String::new();
    for (key, value) in url::form_urlencoded::parse(&body) {
        match key.as_ref() {
            "text" => text = value.into_owned(),
            "user_id" => user_id = value.into_owned(),
            // Slack's periodic certificate probe.
            "ssl_check" => return StatusCode::OK.into_response(),
            _ => {}
        }
    }

    let reply = state.handler.handle(&text, &user_id).await;
    Json(serde_json::json!({
        "response_type": "ephemeral",
        "text": reply,
    }))
    .into_response()
}

pub fn router(handler: CommandHandler, signing_secret: &str) -> Router {
    Router::new()
        .route("/slack/commands", post(slash_command))
        .with_state(CommandState {
            handler,
            signing_secret: signing_secret.to_string(),
        })
}

/// HTTP listener for the slash command, bound for the lifetime of the daemon.
pub struct SlackCommandServer {
    listen_addr: String,
    handler: CommandHandler,
    signing_secret: String,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SlackCommandServer {
    pub fn new(
        listen_addr: &str,
        handler: CommandHandler,
        signing_secret: &str,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            listen_addr: listen_addr.to_string(),
            handler,
            signing_secret: signing_secret.to_string(),
            shutdown,
            task: None,
        }
    }
}

#[async_trait]
impl LifecycleComponent for SlackCommandServer {
    async fn on_init(&mut self) -> Result<()> {
        if self.signing_secret.is_empty() {
            warn!(
                "SLACK_SIGNING_SECRET is not set. Slash command requests will NOT be verified."
            );
        }
        Ok(())
    }

    async fn on_start(&mut self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(&self.listen_addr)
            .await
            .with_context(|| format!("failed to bind slash command listener on {}", self.listen_addr))?;
        let app = router(self.handler.clone(), &self.signing_secret);
        let shutdown = self.shutdown.clone();
        let addr = self.listen_addr.clone();
        info!("Slash commands listening at http://{}/slack/commands", addr);

        self.task = Some(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await
            {
                error!("Slash command listener on {} crashed: {}", addr, e);
            }
        }));
        Ok(())
    }

    async fn on_shutdown(&mut self) -> Result<()> {
        self.shutdown.cancel();
        if let Some(task) = self.task.take() {
            task.await?;
        }
        info!("Slash command listener stopped");
        Ok(())
    }
}
