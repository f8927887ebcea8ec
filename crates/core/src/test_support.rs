//! Builders for timeline items and samples used across unit tests.

use chrono::{DateTime, TimeZone, Utc};
use locus_domain::{
    ActivityType, Coordinate, ItemKind, LocomotionSample, RecordingState, TimelineItem,
    TimelineItemBase, TripFields, VisitFields,
};

/// Shared epoch so tests can talk in small second offsets.
pub(crate) const TEST_EPOCH: i64 = 1_700_000_000;

pub(crate) fn date(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(TEST_EPOCH + secs, 0).single().expect("valid timestamp")
}

/// Identity and date range for a test item.
#[derive(Clone)]
pub(crate) struct ItemSpec {
    pub id: String,
    pub start: i64,
    pub end: i64,
    pub source: String,
}

impl ItemSpec {
    pub fn new(id: &str, start: i64, end: i64) -> Self {
        Self { id: id.to_string(), start, end, source: "locus".into() }
    }

    pub fn with_source(mut self, source: &str) -> Self {
        self.source = source.to_string();
        self
    }

    fn base(&self) -> TimelineItemBase {
        TimelineItemBase {
            id: self.id.clone(),
            start_date: date(self.start),
            end_date: date(self.end),
            source: self.source.clone(),
            previous_item_id: None,
            next_item_id: None,
            disabled: false,
            deleted: false,
            samples_changed: false,
        }
    }
}

pub(crate) fn sample_at(id: &str, secs: i64, coordinate: Option<Coordinate>) -> LocomotionSample {
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

/// A keeper-grade visit: samples spread over the full range, clustered at
/// the given center.
pub(crate) fn visit_at(
    spec: ItemSpec,
    latitude: f64,
    longitude: f64,
    radius: f64,
) -> TimelineItem {
    let duration = spec.end - spec.start;
    let count = 4.max(duration / 30).min(12);
    let samples: Vec<LocomotionSample> = (0..count)
        .map(|i| {
            let secs = spec.start + i * duration / count.max(1);
            let mut sample = sample_at(
                &format!("{}-s{i}", spec.id),
                secs,
                Some(Coordinate::new(latitude, longitude)),
            );
            sample.timeline_item_id = spec.id.clone();
            sample.speed = 0.1;
            sample
        })
        .collect();

    TimelineItem {
        base: spec.base(),
        kind: ItemKind::Visit(VisitFields { latitude, longitude, radius }),
        samples: Some(samples),
    }
}

/// A two-sample trip between two coordinates.
pub(crate) fn trip_between(spec: ItemSpec, from: Coordinate, to: Coordinate) -> TimelineItem {
    let mut first = sample_at(&format!("{}-s0", spec.id), spec.start, Some(from));
    let mut last = sample_at(&format!("{}-s1", spec.id), spec.end, Some(to));
    first.timeline_item_id = spec.id.clone();
    last.timeline_item_id = spec.id.clone();

    let distance = from.distance_from(&to);
    let duration = (spec.end - spec.start) as f64;
    let speed = if duration > 0.0 { distance / duration } else { 0.0 };

    TimelineItem {
        base: spec.base(),
        kind: ItemKind::Trip(TripFields {
            distance: Some(distance),
            speed: Some(speed),
            classified_activity_type: Some(ActivityType::Walking),
            confirmed_activity_type: None,
        }),
        samples: Some(vec![first, last]),
    }
}

/// A trip with no samples at all (the classic consumable leftover).
pub(crate) fn empty_trip(spec: ItemSpec) -> TimelineItem {
    TimelineItem {
        base: spec.base(),
        kind: ItemKind::Trip(TripFields {
            distance: None,
            speed: None,
            classified_activity_type: None,
            confirmed_activity_type: None,
        }),
        samples: Some(Vec::new()),
    }
}

/// Chain items together by id, in the order given.
pub(crate) fn link(items: &mut [&mut TimelineItem]) {
    for i in 0..items.len() {
        if i > 0 {
            items[i].base.previous_item_id = Some(items[i - 1].base.id.clone());
        }
        if i + 1 < items.len() {
            items[i].base.next_item_id = Some(items[i + 1].base.id.clone());
        }
    }
}
