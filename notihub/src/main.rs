mod cli;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

use notihub::cache::MemoryCache;
use notihub::config::NotifyConfig;
use notihub::database::{self, repositories::SqlxEventRepository};
use notihub::domain::Event;
use notihub::logging::init_logging;
use notihub::notification::{NotificationService, PersistHandle, channels::build_channels};
use notihub::store::EventStore;

use crate::cli::{Args, Commands};

/// How long `send` waits for the delivery log write before exiting.
const PERSIST_WAIT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = NotifyConfig::resolve(args.config.as_deref())?;
    init_logging(&config.log_filter)?;

    let pool = database::init_pool(&config.database_url).await?;
    database::run_migrations(&pool).await?;
    let store = Arc::new(EventStore::new(Arc::new(SqlxEventRepository::new(pool))));

    let cache = Arc::new(MemoryCache::new(
        config.dedup.max_entries,
        Duration::from_secs(config.dedup.ttl_secs),
    ));
    let service =
        NotificationService::from_config(&config, build_channels(&config.channels), cache)
            .with_event_store(Arc::clone(&store));

    info!(
        "notihub ready with {} channels: [{}]",
        service.channel_names().len(),
        service.channel_names().join(", ")
    );

    let result = run(args.command, &service, &store).await;
    store.close().await;
    result
}

async fn run(
    command: Commands,
    service: &NotificationService,
    store: &EventStore,
) -> anyhow::Result<()> {
    let filters = command.event_filters();

    match command {
        Commands::Send {
            file,
            inline,
            channels,
        } => {
            let event = match inline.to_event() {
                Some(event) => event,
                None => read_event(file.as_deref()).await?,
            };
            event.validate()?;

            if !channels.is_empty() {
                let results = service.notify_channels(&event, &channels).await?;
                return print_json(&results);
            }

            let (results, persist) = service.notify_tracked(&event).await;
            print_json(&results)?;

            // Duplicates are neither sent nor recorded.
            if let Some(persist) = persist {
                wait_for_record(persist, &event).await;
            }
            Ok(())
        }
        Commands::Status => {
            let statuses: BTreeMap<_, _> = service.channel_statuses().await.into_iter().collect();
            print_json(&statuses)
        }
        Commands::Test { name } => {
            let healthy = service.test_channel(&name).await?;
            print_json(&serde_json::json!({ "channel": name, "healthy": healthy }))
        }
        Commands::Show { id, trace_id } => {
            let record = match (id, trace_id) {
                (Some(id), _) => store
                    .get_by_id(id)
                    .await?
                    .ok_or_else(|| notihub::Error::not_found("EventRecord", id.to_string()))?,
                (None, Some(trace_id)) => store
                    .get_by_trace_id(&trace_id)
                    .await?
                    .ok_or_else(|| notihub::Error::not_found("EventRecord", trace_id))?,
                (None, None) => anyhow::bail!("an id or --trace-id is required"),
            };
            print_json(&record)
        }
        Commands::Delete { id } => {
            store.delete(id).await?;
            info!("Deleted event record {}", id);
            Ok(())
        }
        Commands::Events { .. } => {
            print_json(&store.query(&filters.unwrap_or_default()).await?)
        }
    }
}

async fn read_event(file: Option<&Path>) -> anyhow::Result<Event> {
    let content = match file {
        Some(path) => tokio::fs::read_to_string(path).await?,
        None => {
            let mut buf = String::new();
            tokio::io::stdin().read_to_string(&mut buf).await?;
            buf
        }
    };
    Ok(serde_json::from_str(&content)?)
}

/// Block until the detached save for `event` finishes, or give up after [`PERSIST_WAIT`].
async fn wait_for_record(persist: PersistHandle, event: &Event) {
    match tokio::time::timeout(PERSIST_WAIT, persist).await {
        Ok(Ok(Ok(record))) => info!("Recorded as #{} ({})", record.id, record.status),
        Ok(Ok(Err(notihub::Error::Conflict(_)))) => {
            info!("{} ({}) was already recorded", event.trace_id(), event.event_type)
        }
        // The persistence task already logged the failure.
        Ok(Ok(Err(e))) => debug!("Delivery record not written: {}", e),
        Ok(Err(e)) => warn!("Delivery record task failed: {}", e),
        Err(_) => warn!(
            "Delivery record for {} not written within {:?}",
            event.trace_id(),
            PERSIST_WAIT
        ),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
