//! Event record repository.

use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::debug;

use crate::database::models::EventDbModel;
use crate::database::time::datetime_to_ms;
use crate::domain::{EventFilters, EventRecord, NewEventRecord, PaginatedResult};
use crate::{Error, Result};

/// Storage contract for event records.
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Insert a record and return it as stored, with its assigned id.
    ///
    /// A second record for the same `(trace_id, event_type)` is rejected with
    /// [`Error::Conflict`].
    async fn insert(&self, record: &NewEventRecord) -> Result<EventRecord>;
    async fn query(&self, filters: &EventFilters) -> Result<PaginatedResult<EventRecord>>;
    async fn find_by_id(&self, id: i64) -> Result<Option<EventRecord>>;
    /// Most recent record carrying `trace_id`.
    async fn find_by_trace_id(&self, trace_id: &str) -> Result<Option<EventRecord>>;
    /// Returns `false` when no record had this id.
    async fn delete(&self, id: i64) -> Result<bool>;
    async fn close(&self);
}

/// SQLx implementation of EventRepository.
pub struct SqlxEventRepository {
    pool: SqlitePool,
}

impl SqlxEventRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// WHERE clause and its bound values, in placeholder order.
    fn build_filter(filters: &EventFilters) -> (String, Vec<FilterValue>) {
        let mut conditions: Vec<&str> = Vec::new();
        let mut values = Vec::new();

        if let Some(source) = &filters.source {
            conditions.push("source = ?");
            values.push(FilterValue::Text(source.clone()));
        }
        if let Some(event_type) = filters.event_type {
            conditions.push("event_type = ?");
            values.push(FilterValue::Text(event_type.to_string()));
        }
        if let Some(severity) = filters.severity {
            conditions.push("severity = ?");
            values.push(FilterValue::Text(severity.to_string()));
        }
        if let Some(gte) = filters.timestamp_gte {
            conditions.push("timestamp >= ?");
            values.push(FilterValue::Int(datetime_to_ms(gte)));
        }
        if let Some(lt) = filters.timestamp_lt {
            conditions.push("timestamp < ?");
            values.push(FilterValue::Int(datetime_to_ms(lt)));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, values)
    }
}

enum FilterValue {
    Text(String),
    Int(i64),
}

#[async_trait]
impl EventRepository for SqlxEventRepository {
    async fn insert(&self, record: &NewEventRecord) -> Result<EventRecord> {
        let row = EventDbModel::from_new(record)?;

        let result = sqlx::query(
            r#"
            INSERT INTO events (
                trace_id, source, event_type, severity, title, summary,
                context, actions, timestamp, channels_sent, status, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.trace_id)
        .bind(&row.source)
        .bind(&row.event_type)
        .bind(&row.severity)
        .bind(&row.title)
        .bind(&row.summary)
        .bind(&row.context)
        .bind(&row.actions)
        .bind(row.timestamp)
        .bind(&row.channels_sent)
        .bind(&row.status)
        .bind(row.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                Error::Conflict(format!(
                    "event {} ({}) already recorded",
                    row.trace_id, row.event_type
                ))
            }
            other => Error::from(other),
        })?;

        let id = result.last_insert_rowid();
        debug!("Inserted event record {} for {}", id, row.trace_id);

        // Read back so callers see the stored (millisecond) timestamps.
        self.find_by_id(id)
            .await?
            .ok_or_else(|| Error::Database(format!("event record {} missing after insert", id)))
    }

    async fn query(&self, filters: &EventFilters) -> Result<PaginatedResult<EventRecord>> {
        let (where_clause, values) = Self::build_filter(filters);

        let count_sql = format!("SELECT COUNT(*) FROM events {}", where_clause);
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        for value in &values {
            count_query = match value {
                FilterValue::Text(s) => count_query.bind(s),
                FilterValue::Int(i) => count_query.bind(i),
            };
        }
        let total = count_query.fetch_one(&self.pool).await? as u64;

        // Newest first; id breaks timestamp ties so later inserts come first.
        let data_sql = format!(
            "SELECT * FROM events {} ORDER BY timestamp DESC, id DESC LIMIT ? OFFSET ?",
            where_clause
        );
        let mut data_query = sqlx::query_as::<_, EventDbModel>(&data_sql);
        for value in &values {
            data_query = match value {
                FilterValue::Text(s) => data_query.bind(s),
                FilterValue::Int(i) => data_query.bind(i),
            };
        }
        data_query = data_query
            .bind(filters.limit as i64)
            .bind(filters.offset as i64);

        let items = data_query
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(EventDbModel::into_record)
            .collect::<Result<Vec<_>>>()?;

        Ok(PaginatedResult::new(
            items,
            total,
            filters.limit,
            filters.offset,
        ))
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<EventRecord>> {
        sqlx::query_as::<_, EventDbModel>("SELECT * FROM events WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(EventDbModel::into_record)
            .transpose()
    }

    async fn find_by_trace_id(&self, trace_id: &str) -> Result<Option<EventRecord>> {
        sqlx::query_as::<_, EventDbModel>(
            "SELECT * FROM events WHERE trace_id = ? ORDER BY id DESC LIMIT 1",
        )
        .bind(trace_id)
        .fetch_optional(&self.pool)
        .await?
        .map(EventDbModel::into_record)
        .transpose()
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM events WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
