//! In-memory store mock and item builders for processor integration
//! tests.
//!
//! Provides a deterministic `TimelineStore` double so the processing
//! loop can be exercised without a database.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use locus_core::{verify_merge_topology, MergeCommit, TimelineStore};
use locus_domain::{
    ActivityType, Coordinate, DateInterval, ItemKind, LocomotionSample, LocusError,
    RecordingState, Result, TimelineItem, TimelineItemBase, TripFields, VisitFields,
};

pub const TEST_EPOCH: i64 = 1_700_000_000;

pub fn date(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(TEST_EPOCH + secs, 0).single().expect("valid timestamp")
}

#[derive(Default)]
struct MemoryState {
    items: HashMap<String, TimelineItem>,
    samples: HashMap<String, LocomotionSample>,
}

/// In-memory mock for `TimelineStore`.
///
/// Items are stored without samples; hydration joins the sample map by
/// `timeline_item_id`. Merge commits re-verify topology the way the
/// SQLite store does, and heal the neighbours' back-links.
#[derive(Default)]
pub struct MemoryTimelineStore {
    inner: Mutex<MemoryState>,
}

impl MemoryTimelineStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an item (and any samples it carries) into the store.
    pub fn seed_item(&self, item: &TimelineItem) {
        let mut state = self.inner.lock().expect("store mutex");
        if let Some(samples) = &item.samples {
            for sample in samples {
                state.samples.insert(sample.id.clone(), sample.clone());
            }
        }
        let mut stored = item.clone();
        stored.samples = None;
        state.items.insert(stored.base.id.clone(), stored);
    }

    pub fn item_base(&self, item_id: &str) -> Option<TimelineItemBase> {
        let state = self.inner.lock().expect("store mutex");
        state.items.get(item_id).map(|item| item.base.clone())
    }

    pub fn sample(&self, sample_id: &str) -> Option<LocomotionSample> {
        let state = self.inner.lock().expect("store mutex");
        state.samples.get(sample_id).cloned()
    }

    /// Count of items that are neither deleted nor disabled.
    pub fn live_item_count(&self) -> usize {
        let state = self.inner.lock().expect("store mutex");
        state.items.values().filter(|item| !item.base.deleted && !item.base.disabled).count()
    }

    /// Snapshot of every base, ordered by id, for byte-equality checks.
    pub fn bases_snapshot(&self) -> Vec<TimelineItemBase> {
        let state = self.inner.lock().expect("store mutex");
        let mut bases: Vec<TimelineItemBase> =
            state.items.values().map(|item| item.base.clone()).collect();
        bases.sort_by(|a, b| a.id.cmp(&b.id));
        bases
    }
}

#[async_trait]
impl TimelineStore for MemoryTimelineStore {
    async fn hydrated_item(&self, item_id: &str) -> Result<Option<TimelineItem>> {
        let state = self.inner.lock().expect("store mutex");
        let Some(stored) = state.items.get(item_id) else {
            return Ok(None);
        };
        if stored.base.deleted {
            return Ok(None);
        }
        let mut item = stored.clone();
        let mut samples: Vec<LocomotionSample> = state
            .samples
            .values()
            .filter(|s| s.timeline_item_id == item_id)
            .cloned()
            .collect();
        samples.sort_by(|a, b| a.date.cmp(&b.date));
        item.samples = Some(samples);
        Ok(Some(item))
    }

    async fn items_overlapping(&self, range: &DateInterval) -> Result<Vec<TimelineItem>> {
        let state = self.inner.lock().expect("store mutex");
        let mut items: Vec<TimelineItem> = state
            .items
            .values()
            .filter(|item| !item.base.deleted && item.base.date_range().intersects(range))
            .cloned()
            .collect();
        items.sort_by(|a, b| b.base.end_date.cmp(&a.base.end_date));
        Ok(items)
    }

    async fn samples_for_item(&self, item_id: &str) -> Result<Vec<LocomotionSample>> {
        let state = self.inner.lock().expect("store mutex");
        let mut samples: Vec<LocomotionSample> = state
            .samples
            .values()
            .filter(|s| s.timeline_item_id == item_id)
            .cloned()
            .collect();
        samples.sort_by(|a, b| a.date.cmp(&b.date));
        Ok(samples)
    }

    async fn save_item(&self, item: &TimelineItem) -> Result<()> {
        self.seed_item(item);
        Ok(())
    }

    async fn save_samples(&self, samples: &[LocomotionSample]) -> Result<()> {
        let mut state = self.inner.lock().expect("store mutex");
        for sample in samples {
            state.samples.insert(sample.id.clone(), sample.clone());
        }
        Ok(())
    }

    async fn commit_merge(&self, commit: &MergeCommit) -> Result<()> {
        let mut state = self.inner.lock().expect("store mutex");

        // re-check preconditions against the stored rows, the way the
        // real store does inside its transaction
        let stored_keeper = state
            .items
            .get(&commit.keeper.id)
            .map(|item| item.base.clone())
            .ok_or_else(|| LocusError::NotFound(commit.keeper.id.clone()))?;
        let stored_deadman = state
            .items
            .get(&commit.deadman.id)
            .map(|item| item.base.clone())
            .ok_or_else(|| LocusError::NotFound(commit.deadman.id.clone()))?;
        let stored_betweener = match &commit.betweener {
            Some(betweener) => Some(
                state
                    .items
                    .get(&betweener.id)
                    .map(|item| item.base.clone())
                    .ok_or_else(|| LocusError::NotFound(betweener.id.clone()))?,
            ),
            None => None,
        };
        verify_merge_topology(&stored_keeper, stored_betweener.as_ref(), &stored_deadman)?;

        for base in [Some(&commit.keeper), commit.betweener.as_ref(), Some(&commit.deadman)]
            .into_iter()
            .flatten()
        {
            if let Some(item) = state.items.get_mut(&base.id) {
                item.base = base.clone();
            }
        }

        // heal the neighbours' back-links around the keeper
        if let Some(next_id) = commit.keeper.next_item_id.clone() {
            if let Some(next) = state.items.get_mut(&next_id) {
                next.base.previous_item_id = Some(commit.keeper.id.clone());
            }
        }
        if let Some(previous_id) = commit.keeper.previous_item_id.clone() {
            if let Some(previous) = state.items.get_mut(&previous_id) {
                previous.base.next_item_id = Some(commit.keeper.id.clone());
            }
        }

        for sample_id in &commit.moved_sample_ids {
            if let Some(sample) = state.samples.get_mut(sample_id) {
                sample.timeline_item_id = commit.keeper.id.clone();
            }
        }

        Ok(())
    }

    async fn move_sample(
        &self,
        sample_id: &str,
        from_item_id: &str,
        to_item_id: &str,
    ) -> Result<()> {
        let mut state = self.inner.lock().expect("store mutex");
        let sample = state
            .samples
            .get_mut(sample_id)
            .ok_or_else(|| LocusError::NotFound(sample_id.to_string()))?;
        if sample.timeline_item_id != from_item_id {
            return Err(LocusError::InvalidInput(format!(
                "sample {sample_id} does not belong to {from_item_id}"
            )));
        }
        sample.timeline_item_id = to_item_id.to_string();
        for item_id in [from_item_id, to_item_id] {
            if let Some(item) = state.items.get_mut(item_id) {
                item.base.samples_changed = true;
            }
        }
        Ok(())
    }
}

// ============================================================================
// Item builders
// ============================================================================

pub fn base(id: &str, start: i64, end: i64) -> TimelineItemBase {
    TimelineItemBase {
        id: id.to_string(),
        start_date: date(start),
        end_date: date(end),
        source: "locus".into(),
        previous_item_id: None,
        next_item_id: None,
        disabled: false,
        deleted: false,
        samples_changed: false,
    }
}

pub fn sample_at(id: &str, secs: i64, coordinate: Option<Coordinate>) -> LocomotionSample {
    LocomotionSample {
        id: id.to_string(),
        date: date(secs),
        coordinate,
        horizontal_accuracy: 10.0,
        speed: 1.0,
        course: 0.0,
        altitude: 0.0,
        recording_state: RecordingState::Recording,
        classified_activity_type: None,
        confirmed_activity_type: None,
        timeline_item_id: "unassigned".into(),
        disabled: false,
    }
}

/// A visit with evenly spread samples clustered at the given center.
pub fn visit(id: &str, start: i64, end: i64, latitude: f64, longitude: f64) -> TimelineItem {
    let duration = end - start;
    let count = 4.max(duration / 30).min(12);
    let samples: Vec<LocomotionSample> = (0..count)
        .map(|i| {
            let mut sample = sample_at(
                &format!("{id}-s{i}"),
                start + i * duration / count.max(1),
                Some(Coordinate::new(latitude, longitude)),
            );
            sample.timeline_item_id = id.to_string();
            sample.speed = 0.1;
            sample
        })
        .collect();

    TimelineItem {
        base: base(id, start, end),
        kind: ItemKind::Visit(VisitFields { latitude, longitude, radius: 40.0 }),
        samples: Some(samples),
    }
}

/// A trip with samples interpolated between two coordinates.
pub fn trip(
    id: &str,
    start: i64,
    end: i64,
    from: Coordinate,
    to: Coordinate,
    activity_type: Option<ActivityType>,
    sample_count: usize,
) -> TimelineItem {
    let duration = (end - start) as f64;
    let count = sample_count.max(2);
    let samples: Vec<LocomotionSample> = (0..count)
        .map(|i| {
            let fraction = i as f64 / (count - 1) as f64;
            let coordinate = Coordinate::new(
                from.latitude + (to.latitude - from.latitude) * fraction,
                from.longitude + (to.longitude - from.longitude) * fraction,
            );
            let mut sample = sample_at(
                &format!("{id}-s{i}"),
                start + ((end - start) as f64 * fraction) as i64,
                Some(coordinate),
            );
            sample.timeline_item_id = id.to_string();
            sample.classified_activity_type = activity_type;
            sample
        })
        .collect();

    let distance = from.distance_from(&to);
    TimelineItem {
        base: base(id, start, end),
        kind: ItemKind::Trip(TripFields {
            distance: Some(distance),
            speed: if duration > 0.0 { Some(distance / duration) } else { None },
            classified_activity_type: activity_type,
            confirmed_activity_type: None,
        }),
        samples: Some(samples),
    }
}

/// A trip with no samples.
pub fn empty_trip(id: &str, start: i64, end: i64) -> TimelineItem {
    TimelineItem {
        base: base(id, start, end),
        kind: ItemKind::Trip(TripFields {
            distance: None,
            speed: None,
            classified_activity_type: None,
            confirmed_activity_type: None,
        }),
        samples: Some(Vec::new()),
    }
}

/// Chain items by id in the order given, then seed them all.
pub fn seed_chain(store: &MemoryTimelineStore, items: &mut [TimelineItem]) {
    for i in 0..items.len() {
        if i > 0 {
            let previous_id = items[i - 1].base.id.clone();
            items[i].base.previous_item_id = Some(previous_id);
        }
        if i + 1 < items.len() {
            let next_id = items[i + 1].base.id.clone();
            items[i].base.next_item_id = Some(next_id);
        }
    }
    for item in items.iter() {
        store.seed_item(item);
    }
}

/// Recorder stub with a fixed current item.
pub struct FixedRecorder(pub Option<String>);

impl locus_core::RecorderState for FixedRecorder {
    fn current_item_id(&self) -> Option<String> {
        self.0.clone()
    }
}
