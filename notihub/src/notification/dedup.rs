//! Deduplication gate.
//!
//! An event is accepted once per `(trace_id, event_type)` inside the dedup
//! window. The mark is a presence-only cache entry that expires on its own.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::cache::Cache;
use crate::config::DedupConfig;
use crate::domain::Event;

/// Prefix separating dedup marks from anything else stored in the cache.
const DEDUP_KEY_PREFIX: &str = "dedup:";

pub struct DeduplicationGate {
    cache: Arc<dyn Cache>,
    ttl: Duration,
}

impl DeduplicationGate {
    pub fn new(cache: Arc<dyn Cache>, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    /// Build a gate from configuration, or `None` when dedup is disabled.
    pub fn from_config(config: &DedupConfig, cache: Arc<dyn Cache>) -> Option<Self> {
        config
            .enabled
            .then(|| Self::new(cache, Duration::from_secs(config.ttl_secs)))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns `true` when the event was already accepted inside the window.
    ///
    /// The first sighting writes the mark and returns `false`. A duplicate
    /// leaves the existing mark and its expiry untouched.
    pub fn is_duplicate(&self, event: &Event) -> bool {
        let key = Self::key_for(event);
        if self.cache.has(&key) {
            debug!(key = %key, "Dedup mark present");
            return true;
        }

        self.cache.set(&key, Value::Bool(true), Some(self.ttl));
        false
    }

    /// Drop every dedup mark.
    pub fn clear(&self) {
        for key in self
            .cache
            .keys()
            .into_iter()
            .filter(|k| k.starts_with(DEDUP_KEY_PREFIX))
        {
            self.cache.delete(&key);
        }
    }

    fn key_for(event: &Event) -> String {
        format!("{}{}", DEDUP_KEY_PREFIX, event.dedup_key())
    }
}
