//! Notification channels.
//!
//! A channel delivers one event to one external system. The service owns an
//! ordered list of channels built from configuration; nothing is registered
//! globally.

mod webhook;

pub use webhook::{WebhookChannel, WebhookConfig};

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::Result;
use crate::domain::{Event, EventType, SendResult};

/// Kind of external system a channel talks to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChannelType {
    Webhook,
    Mcp,
    Api,
    Email,
}

/// Per-attempt information handed to a channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelContext {
    /// Zero-based attempt number within the current retry sequence.
    pub retry_count: u32,
    pub metadata: Map<String, Value>,
}

impl ChannelContext {
    pub fn attempt(retry_count: u32) -> Self {
        Self {
            retry_count,
            metadata: Map::new(),
        }
    }
}

/// Trait for notification channels.
///
/// `send` may be invoked several times for the same event while retrying, so
/// it must produce the same logical delivery each time. Returning an error
/// marks the attempt as failed and lets the retry executor try again.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Unique channel name from configuration.
    fn name(&self) -> &str;

    fn channel_type(&self) -> ChannelType;

    /// Deliver an event.
    async fn send(&self, event: &Event, context: Option<&ChannelContext>) -> Result<SendResult>;

    /// Verify connectivity by sending a synthetic probe event.
    async fn health_check(&self) -> Result<bool> {
        match self.send(&Event::health_probe(), None).await {
            Ok(result) => Ok(result.success),
            Err(e) => {
                debug!("Health check for {} failed: {}", self.name(), e);
                Ok(false)
            }
        }
    }

    fn supported_event_types(&self) -> &'static [EventType] {
        EventType::ALL
    }
}

/// Channel configuration wrapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelConfig {
    /// Generic JSON webhook.
    Webhook(WebhookConfig),
}

impl ChannelConfig {
    pub fn name(&self) -> &str {
        match self {
            Self::Webhook(c) => &c.name,
        }
    }

    pub fn channel_type(&self) -> ChannelType {
        match self {
            Self::Webhook(_) => ChannelType::Webhook,
        }
    }

    pub fn is_enabled(&self) -> bool {
        match self {
            Self::Webhook(c) => c.enabled,
        }
    }

    /// Instantiate the configured channel.
    pub fn build(&self) -> Arc<dyn Channel> {
        match self {
            Self::Webhook(c) => Arc::new(WebhookChannel::new(c.clone())),
        }
    }
}

/// Build the enabled channels, preserving configuration order.
pub fn build_channels(configs: &[ChannelConfig]) -> Vec<Arc<dyn Channel>> {
    let channels: Vec<Arc<dyn Channel>> = configs
        .iter()
        .filter(|c| {
            if !c.is_enabled() {
                debug!("Skipping disabled channel {}", c.name());
            }
            c.is_enabled()
        })
        .map(|c| {
            info!(
                "Initialized notification channel: {} ({})",
                c.name(),
                c.channel_type()
            );
            c.build()
        })
        .collect();

    info!("Built {} notification channels", channels.len());
    channels
}
