//! End-to-end dispatch: dedup gate, retrying fan-out and the delivery log.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::time::Instant;

use notihub::cache::MemoryCache;
use notihub::config::NotifyConfig;
use notihub::database::repositories::{EventRepository, SqlxEventRepository};
use notihub::database::{init_pool_with_size, run_migrations};
use notihub::domain::{
    DeliveryStatus, Event, EventFilters, EventRecord, EventType, NewEventRecord, PaginatedResult,
    SendResult, Severity,
};
use notihub::notification::{Channel, ChannelContext, ChannelType, NotificationService};
use notihub::store::{EventStore, StoreNotification};
use notihub::{Error, Result};

/// Succeeds unless told to fail every attempt.
struct TestChannel {
    name: String,
    always_fail: bool,
    calls: AtomicU32,
}

impl TestChannel {
    fn ok(name: &str) -> Arc<Self> {
        Self::build(name, false)
    }

    fn broken(name: &str) -> Arc<Self> {
        Self::build(name, true)
    }

    fn build(name: &str, always_fail: bool) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            always_fail,
            calls: AtomicU32::new(0),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Channel for TestChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn channel_type(&self) -> ChannelType {
        ChannelType::Webhook
    }

    async fn send(&self, _event: &Event, context: Option<&ChannelContext>) -> Result<SendResult> {
        let attempt = context.map(|c| c.retry_count).unwrap_or_default();
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.always_fail {
            Err(Error::channel(&self.name, format!("refused attempt {attempt}")))
        } else {
            Ok(SendResult::success(&self.name).with_message_id(format!("{}-{attempt}", self.name)))
        }
    }
}

/// Repository that takes its time on every insert.
struct SlowRepository {
    delay: Duration,
}

#[async_trait]
impl EventRepository for SlowRepository {
    async fn insert(&self, record: &NewEventRecord) -> Result<EventRecord> {
        tokio::time::sleep(self.delay).await;
        Ok(record.clone().with_id(1))
    }

    async fn query(&self, filters: &EventFilters) -> Result<PaginatedResult<EventRecord>> {
        Ok(PaginatedResult::new(Vec::new(), 0, filters.limit, filters.offset))
    }

    async fn find_by_id(&self, _id: i64) -> Result<Option<EventRecord>> {
        Ok(None)
    }

    async fn find_by_trace_id(&self, _trace_id: &str) -> Result<Option<EventRecord>> {
        Ok(None)
    }

    async fn delete(&self, _id: i64) -> Result<bool> {
        Ok(false)
    }

    async fn close(&self) {}
}

fn test_config() -> NotifyConfig {
    NotifyConfig::from_json(r#"{"retry": {"max_attempts": 3, "backoff": []}}"#).unwrap()
}

async fn sqlite_store() -> Arc<EventStore> {
    let pool = init_pool_with_size("sqlite::memory:", 1).await.unwrap();
    run_migrations(&pool).await.unwrap();
    Arc::new(EventStore::new(Arc::new(SqlxEventRepository::new(pool))))
}

fn build_service(channels: Vec<Arc<TestChannel>>, store: Arc<EventStore>) -> NotificationService {
    let channels: Vec<Arc<dyn Channel>> = channels
        .into_iter()
        .map(|c| c as Arc<dyn Channel>)
        .collect();
    NotificationService::from_config(&test_config(), channels, Arc::new(MemoryCache::default()))
        .with_event_store(store)
}

fn event(trace_id: &str) -> Event {
    Event::new("billing", EventType::Error, Severity::Critical, "Invoice job failed")
        .with_summary("3 invoices not generated")
        .with_trace_id(trace_id)
}

async fn next_created(rx: &mut broadcast::Receiver<StoreNotification>) -> EventRecord {
    let notification = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("record was not written in time")
        .unwrap();
    match notification {
        StoreNotification::Created(record) => record,
        other => panic!("unexpected notification: {:?}", other),
    }
}

#[tokio::test]
async fn test_partial_delivery_is_recorded() {
    let store = sqlite_store().await;
    let mut rx = store.subscribe();
    let ok = TestChannel::ok("ops");
    let broken = TestChannel::broken("pager");
    let service = build_service(vec![ok.clone(), broken.clone()], store.clone());

    let results = service.notify(&event("inv-1")).await;

    assert_eq!(results.len(), 2);
    assert!(results[0].success);
    assert_eq!(results[0].message_id.as_deref(), Some("ops-0"));
    assert!(!results[1].success);
    assert_eq!(
        results[1].error.as_deref(),
        Some("Channel pager failed: refused attempt 2")
    );
    assert_eq!(ok.calls(), 1);
    assert_eq!(broken.calls(), 3);

    let record = next_created(&mut rx).await;
    assert_eq!(record.status, DeliveryStatus::Partial);
    assert_eq!(record.channels_sent, vec!["ops", "pager"]);
    assert_eq!(record.event.summary, "3 invoices not generated");

    let stored = store.get_by_trace_id("inv-1").await.unwrap().unwrap();
    assert_eq!(stored.id, record.id);
    assert_eq!(stored.status, DeliveryStatus::Partial);
    assert_eq!(stored.event.severity, Severity::Critical);
}

#[tokio::test]
async fn test_duplicate_is_neither_sent_nor_recorded() {
    let store = sqlite_store().await;
    let mut rx = store.subscribe();
    let ok = TestChannel::ok("ops");
    let service = build_service(vec![ok.clone()], store.clone());

    assert_eq!(service.notify(&event("inv-2")).await.len(), 1);
    next_created(&mut rx).await;

    assert!(service.notify(&event("inv-2")).await.is_empty());
    assert_eq!(ok.calls(), 1);

    // A new event type for the same trace is a new occurrence.
    let recovered = Event::new("billing", EventType::Success, Severity::Low, "Invoice job ok")
        .with_trace_id("inv-2");
    assert_eq!(service.notify(&recovered).await.len(), 1);
    next_created(&mut rx).await;

    let page = store.query(&EventFilters::default()).await.unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(ok.calls(), 2);
}

#[tokio::test]
async fn test_zero_channels_records_failure() {
    let store = sqlite_store().await;
    let mut rx = store.subscribe();
    let service = build_service(Vec::new(), store.clone());

    assert!(service.notify(&event("inv-3")).await.is_empty());

    let record = next_created(&mut rx).await;
    assert_eq!(record.status, DeliveryStatus::Failed);
    assert!(record.channels_sent.is_empty());
}

#[tokio::test]
async fn test_targeted_send_skips_dedup_and_log() {
    let store = sqlite_store().await;
    let ops = TestChannel::ok("ops");
    let pager = TestChannel::ok("pager");
    let service = build_service(vec![ops.clone(), pager.clone()], store.clone());

    for _ in 0..2 {
        let results = service
            .notify_channels(&event("inv-4"), &["pager"])
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].channel, "pager");
    }
    assert_eq!(pager.calls(), 2);
    assert_eq!(ops.calls(), 0);

    let err = service
        .notify_channels(&event("inv-4"), &["nonexistent"])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NoMatchingChannel(_)));
    assert_eq!(pager.calls() + ops.calls(), 2);

    tokio::task::yield_now().await;
    let page = store.query(&EventFilters::default()).await.unwrap();
    assert_eq!(page.total, 0);
}

#[tokio::test(start_paused = true)]
async fn test_notify_does_not_wait_for_storage() {
    let store = Arc::new(EventStore::new(Arc::new(SlowRepository {
        delay: Duration::from_secs(30),
    })));
    let mut rx = store.subscribe();
    let service = build_service(vec![TestChannel::ok("ops")], store);
    let start = Instant::now();

    let results = service.notify(&event("inv-5")).await;
    assert_eq!(results.len(), 1);
    assert_eq!(start.elapsed(), Duration::ZERO);

    let notification = tokio::time::timeout(Duration::from_secs(60), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(notification, StoreNotification::Created(_)));
    assert!(start.elapsed() >= Duration::from_secs(30));
}

#[tokio::test]
async fn test_already_recorded_event_resolves_promptly() {
    let store = sqlite_store().await;
    // Separate dedup caches, so the second service sends again and only the store objects.
    let first = build_service(vec![TestChannel::ok("ops")], store.clone());
    let second = build_service(vec![TestChannel::ok("ops")], store.clone());

    let (_, persist) = first.notify_tracked(&event("inv-6")).await;
    let record = persist.unwrap().await.unwrap().unwrap();
    assert_eq!(record.status, DeliveryStatus::Success);

    let (results, persist) = second.notify_tracked(&event("inv-6")).await;
    assert_eq!(results.len(), 1);
    let outcome = tokio::time::timeout(Duration::from_secs(1), persist.unwrap())
        .await
        .expect("conflicting save should finish without waiting")
        .unwrap();
    assert!(matches!(outcome, Err(Error::Conflict(_))));

    let page = store.query(&EventFilters::default()).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].id, record.id);
}

#[tokio::test]
async fn test_invalid_event_is_not_recorded() {
    let store = sqlite_store().await;
    let ok = TestChannel::ok("ops");
    let service = build_service(vec![ok.clone()], store.clone());
    let mut untitled = event("inv-7");
    untitled.title.clear();

    let (results, persist) = service.notify_tracked(&untitled).await;
    assert!(results.is_empty());
    assert!(persist.is_none());
    assert_eq!(ok.calls(), 0);
    assert!(store.get_by_trace_id("inv-7").await.unwrap().is_none());
}
