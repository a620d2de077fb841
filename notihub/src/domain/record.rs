//! Persisted event records and their query types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::delivery::{DeliveryStatus, SendResult};
use super::event::{Event, EventType, Severity};

/// Default page size for record queries.
pub const DEFAULT_QUERY_LIMIT: u32 = 50;

/// A dispatched event together with its delivery outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Storage-assigned, monotonically increasing id.
    pub id: i64,
    #[serde(flatten)]
    pub event: Event,
    /// Channels attempted, in dispatch order.
    pub channels_sent: Vec<String>,
    pub status: DeliveryStatus,
    pub created_at: DateTime<Utc>,
}

/// A record that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEventRecord {
    pub event: Event,
    pub channels_sent: Vec<String>,
    pub status: DeliveryStatus,
    pub created_at: DateTime<Utc>,
}

impl NewEventRecord {
    /// Build the record for one dispatch, deriving its status from `results`.
    pub fn from_dispatch(event: &Event, results: &[SendResult]) -> Self {
        Self {
            event: event.clone(),
            channels_sent: results.iter().map(|r| r.channel.clone()).collect(),
            status: DeliveryStatus::from_results(results),
            created_at: Utc::now(),
        }
    }

    pub fn with_id(self, id: i64) -> EventRecord {
        EventRecord {
            id,
            event: self.event,
            channels_sent: self.channels_sent,
            status: self.status,
            created_at: self.created_at,
        }
    }
}

/// Filters for listing event records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFilters {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub event_type: Option<EventType>,
    #[serde(default)]
    pub severity: Option<Severity>,
    /// Inclusive lower bound on the event timestamp.
    #[serde(default)]
    pub timestamp_gte: Option<DateTime<Utc>>,
    /// Exclusive upper bound on the event timestamp.
    #[serde(default)]
    pub timestamp_lt: Option<DateTime<Utc>>,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

fn default_limit() -> u32 {
    DEFAULT_QUERY_LIMIT
}

impl Default for EventFilters {
    fn default() -> Self {
        Self {
            source: None,
            event_type: None,
            severity: None,
            timestamp_gte: None,
            timestamp_lt: None,
            limit: DEFAULT_QUERY_LIMIT,
            offset: 0,
        }
    }
}

/// One page of query results.
#[derive(Debug, Clone, Serialize)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    /// Number of rows matching the filters, ignoring pagination.
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
}

impl<T> PaginatedResult<T> {
    pub fn new(items: Vec<T>, total: u64, limit: u32, offset: u32) -> Self {
        Self {
            items,
            total,
            limit,
            offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_from_dispatch() {
        let event = Event::new("svc", EventType::Error, Severity::High, "down");
        let results = vec![
            SendResult::success("webhook"),
            SendResult::failure("email", "smtp refused"),
        ];

        let record = NewEventRecord::from_dispatch(&event, &results);
        assert_eq!(record.channels_sent, vec!["webhook", "email"]);
        assert_eq!(record.status, DeliveryStatus::Partial);

        let record = record.with_id(7);
        assert_eq!(record.id, 7);
        assert_eq!(record.event.trace_id(), event.trace_id());
    }

    #[test]
    fn test_record_serializes_flat() {
        let event = Event::new("svc", EventType::Info, Severity::Low, "hello").with_trace_id("t");
        let record = NewEventRecord::from_dispatch(&event, &[]).with_id(1);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["trace_id"], "t");
        assert_eq!(json["status"], "failed");
        assert_eq!(json["id"], 1);
    }

    #[test]
    fn test_filters_default() {
        let filters: EventFilters = serde_json::from_str("{}").unwrap();
        assert_eq!(filters, EventFilters::default());
        assert_eq!(filters.limit, 50);
    }
}
