//! Durable record of dispatched events.
//!
//! The store wraps an [`EventRepository`] and broadcasts a notification to
//! subscribers after every successful write.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::database::repositories::EventRepository;
use crate::domain::{Event, EventFilters, EventRecord, NewEventRecord, PaginatedResult, SendResult};
use crate::{Error, Result};

/// Default channel capacity for store notifications.
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Change notification published by the store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreNotification {
    Created(EventRecord),
    Deleted { id: i64 },
}

pub struct EventStore {
    repo: Arc<dyn EventRepository>,
    event_tx: broadcast::Sender<StoreNotification>,
}

impl EventStore {
    pub fn new(repo: Arc<dyn EventRepository>) -> Self {
        let (event_tx, _) = broadcast::channel(DEFAULT_CHANNEL_CAPACITY);
        Self { repo, event_tx }
    }

    /// Subscribe to store notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreNotification> {
        self.event_tx.subscribe()
    }

    /// Record one dispatch outcome.
    ///
    /// Fails with [`Error::Conflict`] when this `(trace_id, event_type)` pair
    /// is already recorded; nothing is broadcast in that case.
    pub async fn save(&self, event: &Event, results: &[SendResult]) -> Result<EventRecord> {
        let record = self
            .repo
            .insert(&NewEventRecord::from_dispatch(event, results))
            .await?;

        debug!(
            "[EventStore] Saved {} as #{} ({})",
            record.event.trace_id(),
            record.id,
            record.status
        );
        self.publish(StoreNotification::Created(record.clone()));
        Ok(record)
    }

    pub async fn query(&self, filters: &EventFilters) -> Result<PaginatedResult<EventRecord>> {
        self.repo.query(filters).await
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<EventRecord>> {
        self.repo.find_by_id(id).await
    }

    /// Most recent record for a trace id.
    pub async fn get_by_trace_id(&self, trace_id: &str) -> Result<Option<EventRecord>> {
        self.repo.find_by_trace_id(trace_id).await
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        if !self.repo.delete(id).await? {
            return Err(Error::not_found("EventRecord", id.to_string()));
        }
        self.publish(StoreNotification::Deleted { id });
        Ok(())
    }

    pub async fn close(&self) {
        self.repo.close().await;
        info!("[EventStore] Closed");
    }

    fn publish(&self, notification: StoreNotification) {
        // No receivers is fine.
        let _ = self.event_tx.send(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::repositories::SqlxEventRepository;
    use crate::database::{init_pool_with_size, run_migrations};
    use crate::domain::{DeliveryStatus, EventType, Severity};
    use tokio::sync::broadcast::error::TryRecvError;

    async fn setup_store() -> EventStore {
        let pool = init_pool_with_size("sqlite::memory:", 1).await.unwrap();
        run_migrations(&pool).await.unwrap();
        EventStore::new(Arc::new(SqlxEventRepository::new(pool)))
    }

    fn event(trace_id: &str, event_type: EventType) -> Event {
        Event::new("ci", event_type, Severity::Medium, "Deploy").with_trace_id(trace_id)
    }

    #[tokio::test]
    async fn test_save_derives_status_and_notifies() {
        let store = setup_store().await;
        let mut rx = store.subscribe();

        let results = vec![
            SendResult::success("a"),
            SendResult::failure("b", "timeout"),
        ];
        let record = store
            .save(&event("t-1", EventType::Success), &results)
            .await
            .unwrap();

        assert_eq!(record.status, DeliveryStatus::Partial);
        assert_eq!(record.channels_sent, vec!["a", "b"]);

        match rx.try_recv().unwrap() {
            StoreNotification::Created(created) => assert_eq!(created, record),
            other => panic!("unexpected notification: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_saved_record_matches_stored_row() {
        let store = setup_store().await;
        let mut rx = store.subscribe();

        let saved = store
            .save(&event("t-1", EventType::Error), &[SendResult::success("a")])
            .await
            .unwrap();

        let fetched = store.get_by_id(saved.id).await.unwrap().unwrap();
        assert_eq!(saved, fetched);
        assert_eq!(
            rx.try_recv().unwrap(),
            StoreNotification::Created(fetched)
        );
    }

    #[tokio::test]
    async fn test_save_without_results_is_failed() {
        let store = setup_store().await;
        let record = store
            .save(&event("t-1", EventType::Info), &[])
            .await
            .unwrap();

        assert_eq!(record.status, DeliveryStatus::Failed);
        assert!(record.channels_sent.is_empty());
    }

    #[tokio::test]
    async fn test_conflict_keeps_first_record_and_is_silent() {
        let store = setup_store().await;
        let first = store
            .save(&event("t-1", EventType::Error), &[SendResult::success("a")])
            .await
            .unwrap();

        let mut rx = store.subscribe();
        let err = store
            .save(&event("t-1", EventType::Error), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));

        let stored = store.get_by_id(first.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DeliveryStatus::Success);
    }

    #[tokio::test]
    async fn test_get_by_trace_id_returns_newest() {
        let store = setup_store().await;
        store
            .save(&event("t-1", EventType::Error), &[])
            .await
            .unwrap();
        let newer = store
            .save(&event("t-1", EventType::Success), &[])
            .await
            .unwrap();

        let found = store.get_by_trace_id("t-1").await.unwrap().unwrap();
        assert_eq!(found.id, newer.id);
        assert!(store.get_by_trace_id("t-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete() {
        let store = setup_store().await;
        let record = store
            .save(&event("t-1", EventType::Info), &[])
            .await
            .unwrap();

        let mut rx = store.subscribe();
        store.delete(record.id).await.unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            StoreNotification::Deleted { id: record.id }
        );
        assert!(store.get_by_id(record.id).await.unwrap().is_none());

        let err = store.delete(record.id).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test]
    async fn test_query_passes_filters() {
        let store = setup_store().await;
        store
            .save(&event("t-1", EventType::Error), &[])
            .await
            .unwrap();
        store
            .save(&event("t-2", EventType::Info), &[])
            .await
            .unwrap();

        let page = store
            .query(&EventFilters {
                event_type: Some(EventType::Info),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].event.trace_id(), "t-2");
    }
}
