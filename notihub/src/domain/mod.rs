//! Domain types shared across the dispatch pipeline.

pub mod delivery;
pub mod event;
pub mod record;

pub use delivery::{DeliveryStatus, SendResult};
pub use event::{Action, ActionKind, Event, EventContext, EventType, Severity};
pub use record::{EventFilters, EventRecord, NewEventRecord, PaginatedResult};
