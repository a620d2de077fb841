//! NotiHub library crate.
//!
//! Routes normalized events to every configured notification channel with
//! deduplication, bounded retry and a durable record of each dispatch.

pub mod cache;
pub mod config;
pub mod database;
pub mod domain;
pub mod error;
pub mod logging;
pub mod notification;
pub mod store;
pub mod utils;

pub use error::{Error, Result};
