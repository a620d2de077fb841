//! Dispatch orchestrator.
//!
//! The NotificationService is responsible for:
//! - Rejecting events already seen inside the dedup window
//! - Fanning an event out to every configured channel, each behind its own retry executor
//! - Turning per-channel failures into failed `SendResult`s instead of errors
//! - Handing the outcome to the event store on a detached task

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tokio::task::JoinHandle;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::channels::{Channel, ChannelContext};
use super::dedup::DeduplicationGate;
use super::retry::RetryPolicy;
use crate::cache::Cache;
use crate::config::NotifyConfig;
use crate::domain::{Event, EventRecord, SendResult};
use crate::store::EventStore;
use crate::{Error, Result};

/// Detached task storing one dispatch outcome.
pub type PersistHandle = JoinHandle<Result<EventRecord>>;

/// Health of a single channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelStatus {
    pub healthy: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The notification service.
pub struct NotificationService {
    channels: Vec<Arc<dyn Channel>>,
    dedup: Option<DeduplicationGate>,
    retry: RetryPolicy,
    event_store: Option<Arc<EventStore>>,
}

impl NotificationService {
    /// Create a service without dedup or persistence.
    pub fn new(channels: Vec<Arc<dyn Channel>>, retry: RetryPolicy) -> Self {
        Self {
            channels,
            dedup: None,
            retry,
            event_store: None,
        }
    }

    /// Create a service from configuration, using `cache` for dedup marks.
    pub fn from_config(
        config: &NotifyConfig,
        channels: Vec<Arc<dyn Channel>>,
        cache: Arc<dyn Cache>,
    ) -> Self {
        let service = Self::new(channels, RetryPolicy::from_config(&config.retry));
        match DeduplicationGate::from_config(&config.dedup, cache) {
            Some(gate) => service.with_dedup(gate),
            None => service,
        }
    }

    pub fn with_dedup(mut self, gate: DeduplicationGate) -> Self {
        self.dedup = Some(gate);
        self
    }

    pub fn with_event_store(mut self, store: Arc<EventStore>) -> Self {
        self.event_store = Some(store);
        self
    }

    /// Configured channel names, in dispatch order.
    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    pub fn dedup_gate(&self) -> Option<&DeduplicationGate> {
        self.dedup.as_ref()
    }

    /// Send an event to every configured channel.
    ///
    /// Returns one result per channel in configuration order, or an empty list
    /// when the event is a duplicate or fails [`Event::validate`]. Never fails:
    /// channel errors become failed results and storage errors are only logged.
    pub async fn notify(&self, event: &Event) -> Vec<SendResult> {
        let (results, _persist) = self.notify_tracked(event).await;
        results
    }

    /// Like [`Self::notify`], but also hands back the detached persistence task.
    ///
    /// The task is `None` when nothing will be stored: no event store, a
    /// duplicate, or an invalid event. Dropping the handle does not cancel it.
    pub async fn notify_tracked(&self, event: &Event) -> (Vec<SendResult>, Option<PersistHandle>) {
        if let Err(e) = event.validate() {
            warn!("Rejecting event {}: {}", event.trace_id(), e);
            return (Vec::new(), None);
        }

        if let Some(gate) = &self.dedup {
            if gate.is_duplicate(event) {
                info!(
                    "Skipping duplicate event {} ({})",
                    event.trace_id(),
                    event.event_type
                );
                return (Vec::new(), None);
            }
        }

        let targets: Vec<&Arc<dyn Channel>> = self.channels.iter().collect();
        let results = self.dispatch(event, &targets).await;

        let persist = self.persist_detached(event, &results);

        (results, persist)
    }

    /// Send an event to the named channels only.
    ///
    /// Skips dedup and persistence. Fails when the event is invalid or no
    /// configured channel matches.
    pub async fn notify_channels<S: AsRef<str>>(
        &self,
        event: &Event,
        channel_names: &[S],
    ) -> Result<Vec<SendResult>> {
        event.validate()?;

        let targets: Vec<&Arc<dyn Channel>> = self
            .channels
            .iter()
            .filter(|c| channel_names.iter().any(|n| n.as_ref() == c.name()))
            .collect();

        if targets.is_empty() {
            let requested: Vec<&str> = channel_names.iter().map(|n| n.as_ref()).collect();
            return Err(Error::NoMatchingChannel(requested.join(", ")));
        }

        Ok(self.dispatch(event, &targets).await)
    }

    /// Run a channel's health check.
    pub async fn test_channel(&self, name: &str) -> Result<bool> {
        let channel = self
            .channels
            .iter()
            .find(|c| c.name() == name)
            .ok_or_else(|| Error::not_found("Channel", name))?;
        channel.health_check().await
    }

    /// Health of every channel. A failing check marks only that channel unhealthy.
    pub async fn channel_statuses(&self) -> HashMap<String, ChannelStatus> {
        let checks = self.channels.iter().map(|channel| async move {
            let status = match channel.health_check().await {
                Ok(healthy) => ChannelStatus {
                    healthy,
                    error: None,
                },
                Err(e) => ChannelStatus {
                    healthy: false,
                    error: Some(e.to_string()),
                },
            };
            (channel.name().to_string(), status)
        });

        join_all(checks).await.into_iter().collect()
    }

    /// Send to each target concurrently; results keep the order of `targets`.
    async fn dispatch(&self, event: &Event, targets: &[&Arc<dyn Channel>]) -> Vec<SendResult> {
        let sends = targets
            .iter()
            .map(|&channel| self.send_with_retry(channel.as_ref(), event));
        join_all(sends).await
    }

    async fn send_with_retry(&self, channel: &dyn Channel, event: &Event) -> SendResult {
        let mut retry_count = 0u32;
        let outcome = self
            .retry
            .execute(channel.name(), || {
                let context = ChannelContext::attempt(retry_count);
                retry_count += 1;
                async move { channel.send(event, Some(&context)).await }
            })
            .await;

        match outcome {
            Ok(result) => {
                if result.success {
                    debug!("[{}] Sent {}", channel.name(), event.trace_id());
                } else {
                    warn!(
                        "[{}] Failed {}: {}",
                        channel.name(),
                        event.trace_id(),
                        result.error.as_deref().unwrap_or("unknown error")
                    );
                }
                result
            }
            Err(e) => {
                warn!("[{}] Error {}: {}", channel.name(), event.trace_id(), e);
                SendResult::failure(channel.name(), e.to_string())
            }
        }
    }

    /// Store the dispatch outcome without making the caller wait.
    fn persist_detached(&self, event: &Event, results: &[SendResult]) -> Option<PersistHandle> {
        let store = self.event_store.as_ref().map(Arc::clone)?;

        let event = event.clone();
        let results = results.to_vec();
        Some(tokio::spawn(async move {
            let saved = store.save(&event, &results).await;
            match &saved {
                Ok(_) => {}
                Err(Error::Conflict(reason)) => {
                    debug!("[EventStore] Skipped already recorded event: {}", reason);
                }
                Err(e) => warn!(
                    "[EventStore] Failed to save {} ({}): {}",
                    event.trace_id(),
                    event.event_type,
                    e
                ),
            }
            saved
        }))
    }
}
