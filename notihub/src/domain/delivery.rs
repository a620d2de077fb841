//! Per-channel delivery outcomes and the aggregate dispatch status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Final outcome of delivering one event to one channel.
///
/// Only the last attempt made by the retry executor is recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendResult {
    pub success: bool,
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl SendResult {
    pub fn success(channel: impl Into<String>) -> Self {
        Self {
            success: true,
            channel: channel.into(),
            message_id: None,
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failure(channel: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            channel: channel.into(),
            message_id: None,
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }
}

/// Aggregate status of one dispatch.
#[derive(
    Debug,
    Clone,
    Copy,
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
pub enum DeliveryStatus {
    Success,
    Partial,
    Failed,
}

impl DeliveryStatus {
    /// Derive the status from the per-channel results of one dispatch.
    ///
    /// An empty result set counts as `Failed`.
    pub fn from_results(results: &[SendResult]) -> Self {
        let successes = results.iter().filter(|r| r.success).count();
        match successes {
            0 => Self::Failed,
            n if n == results.len() => Self::Success,
            _ => Self::Partial,
        }
    }
}
