//! Chat-group webhook transport with a bounded client-level retry loop.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde_json::json;
use tracing::{debug, warn};

use crate::{AppError, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_CLIENT_RETRIES: u32 = 2;
const INITIAL_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Outbound webhook transport.
///
/// Implementations are stateless; the notification manager owns the pacing
/// between calls. `send` returns `false` on any error code or transport
/// failure and the manager treats that as a task-level failure.
pub trait WebhookSender: Send + Sync {
    /// Deliver a text body to the webhook. Returns whether delivery
    /// succeeded.
    fn send(
        &self,
        webhook_url: &str,
        text_body: &str,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + '_>>;
}

/// HTTP sender for chat-robot webhooks.
///
/// Wraps the body in the robot's markdown envelope and retries transient
/// failures with exponential backoff. These client-level retries are
/// distinct from the task-level retry count, which spans ticks.
pub struct ChatWebhookSender {
    client: reqwest::Client,
}

impl ChatWebhookSender {
    /// Build a sender with the platform-mandated timeouts.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the HTTP client cannot be constructed.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(READ_TIMEOUT)
            .build()
            .map_err(|err| AppError::Config(format!("failed to build webhook client: {err}")))?;
        Ok(Self { client })
    }

    async fn deliver(&self, webhook_url: &str, text_body: &str) -> bool {
        let payload = json!({
            "msgtype": "markdown",
            "markdown": { "content": text_body },
        });

        let mut delay = INITIAL_RETRY_DELAY;
        for attempt in 0..=MAX_CLIENT_RETRIES {
            match self.post_once(webhook_url, &payload).await {
                Ok(()) => return true,
                Err(err) => {
                    warn!(attempt, %err, "webhook delivery attempt failed");
                    if attempt < MAX_CLIENT_RETRIES {
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                }
            }
        }
        false
    }

    async fn post_once(&self, webhook_url: &str, payload: &serde_json::Value) -> Result<()> {
        let response = self
            .client
            .post(webhook_url)
            .json(payload)
            .send()
            .await
            .map_err(|err| AppError::Webhook(format!("request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Webhook(format!("webhook returned {status}")));
        }

        // Chat robots report API-level failures inside a 200 body.
        if let Ok(body) = response.json::<serde_json::Value>().await {
            if let Some(code) = body.get("errcode").and_then(serde_json::Value::as_i64) {
                if code != 0 {
                    let msg = body
                        .get("errmsg")
                        .and_then(serde_json::Value::as_str)
                        .unwrap_or("unknown");
                    return Err(AppError::Webhook(format!("robot error {code}: {msg}")));
                }
            }
        }

        debug!("webhook delivered");
        Ok(())
    }
}

impl WebhookSender for ChatWebhookSender {
    fn send(
        &self,
        webhook_url: &str,
        text_body: &str,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        let url = webhook_url.to_owned();
        let body = text_body.to_owned();
        Box::pin(async move { self.deliver(&url, &body).await })
    }
}
