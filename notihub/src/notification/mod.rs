//! Notification dispatch pipeline.
//!
//! Delivers events to every configured channel with:
//!
//! - Deduplication per `(trace_id, event_type)` inside a TTL window
//! - Bounded retry with a fixed backoff schedule, per channel
//! - Concurrent fan-out with partial-failure accounting
//! - Fire-and-forget persistence of the outcome
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use notihub::cache::MemoryCache;
//! use notihub::config::NotifyConfig;
//! use notihub::notification::{NotificationService, channels::build_channels};
//!
//! let config = NotifyConfig::from_env()?;
//! let channels = build_channels(&config.channels);
//! let service = NotificationService::from_config(&config, channels, Arc::new(MemoryCache::default()));
//! let results = service.notify(&event).await;
//! ```

pub mod channels;
pub mod dedup;
pub mod retry;
pub mod service;

pub use channels::{Channel, ChannelConfig, ChannelContext, ChannelType};
pub use dedup::DeduplicationGate;
pub use retry::RetryPolicy;
pub use service::{ChannelStatus, NotificationService, PersistHandle};
