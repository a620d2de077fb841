use std::path::PathBuf;

use clap::{Parser, Subcommand};
use notihub::domain::Event;
use notihub::domain::record::DEFAULT_QUERY_LIMIT;
use notihub::domain::{EventFilters, EventType, Severity};

#[derive(Parser, Debug)]
#[command(name = "notihub")]
#[command(about = "Route events to notification channels and inspect the delivery log")]
#[command(version)]
pub struct Args {
    /// Configuration file (overrides NOTIHUB_CONFIG)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Dispatch one event given inline, as a JSON file, or as JSON on stdin
    Send {
        /// Event file; reads stdin when neither this nor --title is given
        #[arg(short, long, conflicts_with = "title")]
        file: Option<PathBuf>,

        #[command(flatten)]
        inline: InlineEvent,

        /// Only send to these channels (skips dedup and the delivery log)
        #[arg(long = "channel", value_name = "NAME")]
        channels: Vec<String>,
    },

    /// Health of every configured channel
    Status,

    /// Run the health check of one channel
    Test {
        name: String,
    },

    /// List recorded events, newest first
    Events {
        #[arg(long)]
        source: Option<String>,

        #[arg(long = "type")]
        event_type: Option<EventType>,

        #[arg(long)]
        severity: Option<Severity>,

        #[arg(long, default_value_t = DEFAULT_QUERY_LIMIT)]
        limit: u32,

        #[arg(long, default_value_t = 0)]
        offset: u32,
    },

    /// Show a recorded event by id or trace id
    Show {
        #[arg(required_unless_present = "trace_id")]
        id: Option<i64>,

        #[arg(long, conflicts_with = "id")]
        trace_id: Option<String>,
    },

    /// Delete a recorded event
    Delete {
        id: i64,
    },
}

/// Event fields given on the command line.
#[derive(clap::Args, Debug, Default)]
pub struct InlineEvent {
    #[arg(long, requires = "title")]
    pub source: Option<String>,

    #[arg(long = "type", requires = "title")]
    pub event_type: Option<EventType>,

    #[arg(long, requires = "title")]
    pub severity: Option<Severity>,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(long, requires = "title")]
    pub summary: Option<String>,
}

impl InlineEvent {
    /// Build the event when a title was given.
    pub fn to_event(&self) -> Option<Event> {
        let title = self.title.as_ref()?;
        let event = Event::new(
            self.source.as_deref().unwrap_or("cli"),
            self.event_type.unwrap_or_default(),
            self.severity.unwrap_or_default(),
            title,
        );
        Some(match &self.summary {
            Some(summary) => event.with_summary(summary),
            None => event,
        })
    }
}

impl Commands {
    /// Query filters for the `events` subcommand.
    pub fn event_filters(&self) -> Option<EventFilters> {
        match self {
            Self::Events {
                source,
                event_type,
                severity,
                limit,
                offset,
            } => Some(EventFilters {
                source: source.clone(),
                event_type: *event_type,
                severity: *severity,
                limit: *limit,
                offset: *offset,
                ..Default::default()
            }),
            _ => None,
        }
    }
}
