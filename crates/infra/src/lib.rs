//! # Locus Infra
//!
//! Infrastructure layer for the locus timeline library.
//!
//! This crate contains:
//! - The SQLite-backed `TimelineStore` implementation
//! - The database manager with scoped read/write transactions
//! - The change-notification bus
//! - The live timeline segment observer
//! - The composition root that wires core services to their adapters

pub mod changes;
pub mod database;
pub mod errors;
pub mod observer;
pub mod runtime;

pub use changes::TimelineChangeBus;
pub use database::{DbManager, SqliteTimelineStore};
pub use observer::TimelineSegment;
pub use runtime::{AppForegroundState, RecorderHandle, TimelineRuntime};
