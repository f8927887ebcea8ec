//! Database layer: connection management and the SQLite-backed
//! timeline store.

pub mod manager;
pub mod timeline_store;

pub use manager::DbManager;
pub use timeline_store::SqliteTimelineStore;
