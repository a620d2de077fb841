//! Repository layer.

pub mod event;

pub use event::{EventRepository, SqlxEventRepository};
