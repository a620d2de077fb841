//! Database row models.

pub mod event;

pub use event::EventDbModel;
