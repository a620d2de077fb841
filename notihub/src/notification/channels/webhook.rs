//! Generic webhook notification channel.
//!
//! POSTs the event as JSON, plus a plain-text rendering under `text`.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, header::HeaderMap};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::{Channel, ChannelContext, ChannelType};
use crate::domain::{Event, SendResult};
use crate::utils::http_client::install_rustls_provider;
use crate::{Error, Result};

/// Response header carrying the receiver's message id, when it sends one.
const MESSAGE_ID_HEADER: &str = "x-message-id";

/// Header telling the receiver which retry attempt this is.
const RETRY_COUNT_HEADER: &str = "x-notihub-retry";

/// Webhook channel configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Unique channel name.
    pub name: String,
    /// Whether the channel is enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Webhook URL.
    pub url: String,
    /// Custom headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Bearer token sent as `Authorization`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_timeout() -> u64 {
    30
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            name: "webhook".to_string(),
            enabled: true,
            url: String::new(),
            headers: BTreeMap::new(),
            bearer_token: None,
            timeout_secs: 30,
        }
    }
}

/// Generic webhook notification channel.
pub struct WebhookChannel {
    config: WebhookConfig,
    client: Client,
}

impl WebhookChannel {
    /// Create a new Webhook channel.
    pub fn new(config: WebhookConfig) -> Self {
        install_rustls_provider();
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();

        Self { config, client }
    }

    /// Build the request headers.
    fn build_headers(&self, context: Option<&ChannelContext>) -> HeaderMap {
        let mut headers = HeaderMap::new();

        for (name, value) in &self.config.headers {
            match (
                name.parse::<reqwest::header::HeaderName>(),
                value.parse::<reqwest::header::HeaderValue>(),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => warn!("Ignoring invalid header {} on webhook {}", name, self.config.name),
            }
        }

        if let Some(token) = &self.config.bearer_token {
            if let Ok(value) = format!("Bearer {}", token).parse() {
                headers.insert(reqwest::header::AUTHORIZATION, value);
            }
        }

        if let Some(ctx) = context {
            headers.insert(RETRY_COUNT_HEADER, ctx.retry_count.into());
        }

        headers
    }

    /// Build the JSON payload.
    fn build_payload(&self, event: &Event) -> Result<Value> {
        let mut payload = serde_json::to_value(event)?;
        if let Value::Object(map) = &mut payload {
            map.insert("text".to_string(), Value::String(event.to_plain_text()));
        }
        Ok(payload)
    }
}

#[async_trait]
impl Channel for WebhookChannel {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn channel_type(&self) -> ChannelType {
        ChannelType::Webhook
    }

    async fn send(&self, event: &Event, context: Option<&ChannelContext>) -> Result<SendResult> {
        if self.config.url.is_empty() {
            return Err(Error::channel(&self.config.name, "webhook url is not configured"));
        }

        let payload = self.build_payload(event)?;
        let response = self
            .client
            .post(&self.config.url)
            .headers(self.build_headers(context))
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                Error::channel(&self.config.name, format!("Webhook request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Webhook {} failed: {} - {}", self.config.name, status, body);
            return Err(Error::channel(
                &self.config.name,
                format!("Webhook failed: {} - {}", status, body),
            ));
        }

        let message_id = response
            .headers()
            .get(MESSAGE_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        debug!(
            "Webhook {} delivered {} ({})",
            self.config.name,
            event.trace_id(),
            status
        );

        let result = SendResult::success(&self.config.name);
        Ok(match message_id {
            Some(id) => result.with_message_id(id),
            None => result,
        })
    }
}
