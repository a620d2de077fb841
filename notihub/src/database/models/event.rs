//! Event record database model.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::database::time::{datetime_to_ms, ms_to_datetime};
use crate::domain::{
    Action, DeliveryStatus, Event, EventContext, EventRecord, EventType, NewEventRecord, Severity,
};
use crate::{Error, Result};

/// Row of the `events` table.
///
/// `context`, `actions` and `channels_sent` are JSON text; timestamps are
/// epoch milliseconds.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EventDbModel {
    pub id: i64,
    pub trace_id: String,
    pub source: String,
    pub event_type: String,
    pub severity: String,
    pub title: String,
    pub summary: String,
    pub context: Option<String>,
    pub actions: Option<String>,
    pub timestamp: i64,
    pub channels_sent: String,
    pub status: String,
    pub created_at: i64,
}

fn parse_column<T: FromStr>(column: &str, value: &str) -> Result<T> {
    T::from_str(value)
        .map_err(|_| Error::Database(format!("invalid {} value in events row: {}", column, value)))
}

impl EventDbModel {
    /// Row for a record that has not been inserted yet (`id` is ignored on insert).
    pub fn from_new(record: &NewEventRecord) -> Result<Self> {
        let event = &record.event;
        Ok(Self {
            id: 0,
            trace_id: event.trace_id().to_string(),
            source: event.source.clone(),
            event_type: event.event_type.to_string(),
            severity: event.severity.to_string(),
            title: event.title.clone(),
            summary: event.summary.clone(),
            context: event
                .context
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
            actions: event
                .actions
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
            timestamp: datetime_to_ms(event.timestamp),
            channels_sent: serde_json::to_string(&record.channels_sent)?,
            status: record.status.to_string(),
            created_at: datetime_to_ms(record.created_at),
        })
    }

    pub fn into_record(self) -> Result<EventRecord> {
        let event_type: EventType = parse_column("event_type", &self.event_type)?;
        let severity: Severity = parse_column("severity", &self.severity)?;
        let status: DeliveryStatus = parse_column("status", &self.status)?;

        let mut event = Event::new(self.source, event_type, severity, self.title)
            .with_summary(self.summary)
            .with_trace_id(self.trace_id)
            .with_timestamp(ms_to_datetime(self.timestamp));
        if let Some(context) = self.context {
            event = event.with_context(serde_json::from_str::<EventContext>(&context)?);
        }
        if let Some(actions) = self.actions {
            event = event.with_actions(serde_json::from_str::<Vec<Action>>(&actions)?);
        }

        Ok(EventRecord {
            id: self.id,
            event,
            channels_sent: serde_json::from_str(&self.channels_sent)?,
            status,
            created_at: ms_to_datetime(self.created_at),
        })
    }
}
