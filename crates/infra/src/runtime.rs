//! Composition root wiring the timeline core to its adapters.
//!
//! The core was written against ports; this module provides the
//! in-process implementations and threads them through explicitly so
//! there are no static singletons. The single-processor-pass guarantee
//! lives inside `TimelineProcessor` itself.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use locus_core::{ForegroundState, MergeScores, RecorderState, TimelineProcessor};
use locus_domain::{DateInterval, Result};

use crate::changes::TimelineChangeBus;
use crate::database::{DbManager, SqliteTimelineStore};
use crate::observer::TimelineSegment;

/// Tracks which item the recorder is currently appending to.
#[derive(Default)]
pub struct RecorderHandle {
    current: RwLock<Option<String>>,
}

impl RecorderHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_current_item_id(&self, item_id: Option<String>) {
        if let Ok(mut current) = self.current.write() {
            *current = item_id;
        }
    }
}

impl RecorderState for RecorderHandle {
    fn current_item_id(&self) -> Option<String> {
        self.current.read().ok().and_then(|current| current.clone())
    }
}

/// Tracks whether the host process is foreground-active.
pub struct AppForegroundState {
    active: AtomicBool,
}

impl AppForegroundState {
    pub fn new(active: bool) -> Self {
        Self { active: AtomicBool::new(active) }
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }
}

impl ForegroundState for AppForegroundState {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

/// Owns the wired-together timeline stack: database, store, change bus,
/// and processor. Segments are created on demand.
pub struct TimelineRuntime {
    db: Arc<DbManager>,
    store: Arc<SqliteTimelineStore>,
    changes: Arc<TimelineChangeBus>,
    processor: Arc<TimelineProcessor>,
    foreground: Arc<AppForegroundState>,
    recorder: Arc<RecorderHandle>,
}

impl TimelineRuntime {
    /// Open the database at the given path, run migrations, and wire the
    /// processing stack.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        Self::with_scores(db_path, MergeScores::new())
    }

    /// Same as [`TimelineRuntime::new`] with a custom scoring service,
    /// e.g. one carrying a classifier-probability plug.
    pub fn with_scores<P: AsRef<Path>>(db_path: P, scores: MergeScores) -> Result<Self> {
        let db = Arc::new(DbManager::new(db_path)?);
        db.run_migrations()?;

        let changes = Arc::new(TimelineChangeBus::new());
        let store = Arc::new(SqliteTimelineStore::new(db.clone(), changes.clone()));
        let foreground = Arc::new(AppForegroundState::new(true));
        let recorder = Arc::new(RecorderHandle::new());
        let processor =
            Arc::new(TimelineProcessor::new(store.clone(), scores, recorder.clone()));

        Ok(Self { db, store, changes, processor, foreground, recorder })
    }

    /// Observe a date range, optionally reprocessing on every update.
    pub fn segment(&self, date_range: DateInterval, should_reprocess_on_update: bool) -> TimelineSegment {
        TimelineSegment::new(
            self.store.clone(),
            &self.changes,
            self.processor.clone(),
            self.foreground.clone(),
            self.recorder.clone(),
            date_range,
            should_reprocess_on_update,
        )
    }

    pub fn db(&self) -> &Arc<DbManager> {
        &self.db
    }

    pub fn store(&self) -> &Arc<SqliteTimelineStore> {
        &self.store
    }

    pub fn changes(&self) -> &Arc<TimelineChangeBus> {
        &self.changes
    }

    pub fn processor(&self) -> &Arc<TimelineProcessor> {
        &self.processor
    }

    pub fn foreground(&self) -> &Arc<AppForegroundState> {
        &self.foreground
    }

    pub fn recorder(&self) -> &Arc<RecorderHandle> {
        &self.recorder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn recorder_handle_round_trips() {
        let recorder = RecorderHandle::new();
        assert_eq!(recorder.current_item_id(), None);
        recorder.set_current_item_id(Some("item-1".into()));
        assert_eq!(recorder.current_item_id(), Some("item-1".into()));
        recorder.set_current_item_id(None);
        assert_eq!(recorder.current_item_id(), None);
    }

    #[test]
    fn foreground_state_toggles() {
        let foreground = AppForegroundState::new(false);
        assert!(!foreground.is_active());
        foreground.set_active(true);
        assert!(foreground.is_active());
    }

    #[tokio::test]
    async fn runtime_wires_a_working_stack() {
        let temp_dir = TempDir::new().expect("temp dir");
        let runtime =
            TimelineRuntime::new(temp_dir.path().join("timeline.db")).expect("runtime built");
        runtime.db().health_check().expect("database healthy");
    }
}
