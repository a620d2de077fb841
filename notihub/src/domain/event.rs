//! Event domain model.
//!
//! An [`Event`] is the normalized record every producer hands to the
//! notification service. Producers may omit most fields; deserialization fills
//! them with defaults and assigns a fresh `trace_id` when none is supplied.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Error, Result};

/// Open-ended context attached to an event.
///
/// Keys keep their insertion order.
pub type EventContext = Map<String, Value>;

/// Kind of event being reported.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventType {
    Success,
    Error,
    Warning,
    #[default]
    Info,
}

impl EventType {
    /// Every event type, in declaration order.
    pub const ALL: &'static [EventType] = &[
        EventType::Success,
        EventType::Error,
        EventType::Warning,
        EventType::Info,
    ];
}

/// Event severity.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Severity {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

/// Kind of interactive action attached to an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Opens `url`.
    Link,
    /// Calls back into the producer with `callback`.
    Postback,
}

/// An action a recipient can take on an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl Action {
    pub fn link(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::Link,
            text: text.into(),
            url: Some(url.into()),
            callback: None,
            metadata: None,
        }
    }

    pub fn postback(text: impl Into<String>, callback: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::Postback,
            text: text.into(),
            url: None,
            callback: Some(callback.into()),
            metadata: None,
        }
    }
}

/// A normalized notification event.
///
/// `trace_id` is fixed when the event is built and has no setter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default)]
    pub event_type: EventType,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<EventContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<Vec<Action>>,
    #[serde(default = "generate_trace_id")]
    trace_id: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

fn default_source() -> String {
    "unknown".to_string()
}

/// Generate a new trace id.
pub fn generate_trace_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

impl Event {
    /// Create an event with a generated trace id and the current timestamp.
    pub fn new(
        source: impl Into<String>,
        event_type: EventType,
        severity: Severity,
        title: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            event_type,
            severity,
            title: title.into(),
            summary: String::new(),
            context: None,
            actions: None,
            trace_id: generate_trace_id(),
            timestamp: Utc::now(),
        }
    }

    /// Synthetic event used by channel health checks.
    pub fn health_probe() -> Self {
        Self::new(
            "notihub-health-check",
            EventType::Info,
            Severity::Low,
            "Health Check",
        )
        .with_summary("Testing channel connectivity")
        .with_trace_id("health-check")
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn with_context(mut self, context: EventContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_actions(mut self, actions: Vec<Action>) -> Self {
        self.actions = Some(actions);
        self
    }

    /// Use a producer-supplied trace id instead of the generated one.
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = trace_id.into();
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// Check the invariants producers must satisfy.
    pub fn validate(&self) -> Result<()> {
        if self.source.trim().is_empty() {
            return Err(Error::validation("event source must not be empty"));
        }
        if self.title.trim().is_empty() {
            return Err(Error::validation("event title must not be empty"));
        }
        Ok(())
    }

    /// Identity of the logical occurrence: `trace_id` plus `event_type`.
    pub fn dedup_key(&self) -> String {
        format!("{}:{}", self.trace_id, self.event_type)
    }

    /// Plain-text rendering for channels without rich formatting.
    pub fn to_plain_text(&self) -> String {
        let mut lines = vec![
            format!(
                "[{}] {}",
                self.severity.as_ref().to_uppercase(),
                self.title
            ),
            format!("Source: {}", self.source),
            format!("Type: {}", self.event_type),
            format!("Summary: {}", self.summary),
        ];

        if let Some(context) = self.context.as_ref().filter(|c| !c.is_empty()) {
            lines.push("Context:".to_string());
            for (key, value) in context {
                let rendered = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                lines.push(format!("  {}: {}", key, rendered));
            }
        }

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_fills_defaults() {
        let event: Event = serde_json::from_str(r#"{"title": "Build finished"}"#).unwrap();

        assert_eq!(event.source, "unknown");
        assert_eq!(event.event_type, EventType::Info);
        assert_eq!(event.severity, Severity::Low);
        assert!(event.summary.is_empty());
        assert!(!event.trace_id().is_empty());
        assert!(event.validate().is_ok());
    }

    #[test]
    fn test_deserialize_keeps_producer_trace_id() {
        let event: Event = serde_json::from_value(json!({
            "source": "ci",
            "event_type": "error",
            "severity": "critical",
            "title": "Deploy failed",
            "trace_id": "run-42",
            "actions": [{"type": "link", "text": "Open", "url": "https://ci.example/42"}]
        }))
        .unwrap();

        assert_eq!(event.trace_id(), "run-42");
        assert_eq!(event.event_type, EventType::Error);
        assert_eq!(event.severity, Severity::Critical);
        let actions = event.actions.unwrap();
        assert_eq!(actions[0].kind, ActionKind::Link);
        assert_eq!(actions[0].url.as_deref(), Some("https://ci.example/42"));
    }

    #[test]
    fn test_generated_trace_ids_differ() {
        let a = Event::new("svc", EventType::Info, Severity::Low, "a");
        let b = Event::new("svc", EventType::Info, Severity::Low, "a");
        assert_ne!(a.trace_id(), b.trace_id());
    }

    #[test]
    fn test_validate_rejects_blank_fields() {
        let event = Event::new("  ", EventType::Info, Severity::Low, "title");
        assert!(matches!(event.validate(), Err(Error::Validation(_))));

        let event = Event::new("svc", EventType::Info, Severity::Low, "");
        assert!(matches!(event.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_dedup_key() {
        let event =
            Event::new("svc", EventType::Warning, Severity::High, "disk").with_trace_id("t-1");
        assert_eq!(event.dedup_key(), "t-1:warning");
    }

    #[test]
    fn test_context_keeps_insertion_order() {
        let mut context = EventContext::new();
        context.insert("zeta".to_string(), json!(1));
        context.insert("alpha".to_string(), json!("two"));

        let event = Event::new("svc", EventType::Info, Severity::Low, "t").with_context(context);
        let keys: Vec<_> = event.context.unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_plain_text() {
        let mut context = EventContext::new();
        context.insert("branch".to_string(), json!("main"));
        context.insert("attempt".to_string(), json!(2));

        let event = Event::new("ci", EventType::Error, Severity::High, "Tests failed")
            .with_summary("3 failures")
            .with_context(context);

        let text = event.to_plain_text();
        assert_eq!(
            text,
            "[HIGH] Tests failed\nSource: ci\nType: error\nSummary: 3 failures\nContext:\n  branch: main\n  attempt: 2"
        );
    }

    #[test]
    fn test_health_probe() {
        let probe = Event::health_probe();
        assert_eq!(probe.trace_id(), "health-check");
        assert_eq!(probe.source, "notihub-health-check");
        assert!(probe.validate().is_ok());
    }
}
