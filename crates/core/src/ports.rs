//! Port interfaces between the timeline core and its collaborators.
//!
//! These traits define the boundaries between core business logic and
//! infrastructure implementations. Persistence is async; runtime state
//! lookups (foreground, recorder) are cheap synchronous reads.

use async_trait::async_trait;
use locus_domain::{ActivityType, DateInterval, LocomotionSample, Result, TimelineItem};

use crate::merging::MergeCommit;

/// Transactional access to the persisted timeline.
///
/// Reads observe a consistent snapshot; every mutating call commits one
/// transaction and publishes the union of the date ranges it touched on
/// the change-notification bus.
#[async_trait]
pub trait TimelineStore: Send + Sync {
    /// Fetch a single non-deleted item with samples hydrated.
    ///
    /// When the item's `samples_changed` flag is set, derived fields
    /// (date range, visit geofence, trip distance/speed) are refreshed
    /// from the samples, persisted, and the flag cleared before the item
    /// is returned.
    async fn hydrated_item(&self, item_id: &str) -> Result<Option<TimelineItem>>;

    /// Non-deleted items whose date range intersects the given interval,
    /// ordered by end date descending. Samples are not hydrated.
    async fn items_overlapping(&self, range: &DateInterval) -> Result<Vec<TimelineItem>>;

    /// Samples assigned to an item, ordered by date.
    async fn samples_for_item(&self, item_id: &str) -> Result<Vec<LocomotionSample>>;

    /// Insert or replace an item (base plus variant payload).
    async fn save_item(&self, item: &TimelineItem) -> Result<()>;

    /// Insert or replace samples in one transaction.
    async fn save_samples(&self, samples: &[LocomotionSample]) -> Result<()>;

    /// Apply a merge atomically.
    ///
    /// The store must re-check the commit's topology preconditions
    /// inside the transaction (via
    /// [`crate::merging::verify_merge_topology`]) and abort with
    /// [`locus_domain::LocusError::Topology`] if the links no longer
    /// match a canonical orientation.
    async fn commit_merge(&self, commit: &MergeCommit) -> Result<()>;

    /// Reassign one sample between neighbouring items and re-mark both
    /// endpoints `samples_changed`, in one transaction.
    async fn move_sample(&self, sample_id: &str, from_item_id: &str, to_item_id: &str)
        -> Result<()>;
}

/// Identity of the item the recorder is currently appending to.
///
/// The active recorder is the sole authority on in-flight items; the
/// processor refuses to touch a window containing the current item until
/// it is worth keeping.
pub trait RecorderState: Send + Sync {
    fn current_item_id(&self) -> Option<String>;
}

/// Whether the host process is in the foreground-active state.
pub trait ForegroundState: Send + Sync {
    fn is_active(&self) -> bool;
}

/// Optional plug point for classifier probabilities in trip-consumes-trip
/// scoring.
///
/// Implementations return the probability in `[0, 1]` that the item's
/// samples match the given activity type, or `None` when the classifier
/// has no opinion.
pub trait ActivityProbabilities: Send + Sync {
    fn probability(&self, item: &TimelineItem, activity_type: ActivityType) -> Option<f64>;
}
