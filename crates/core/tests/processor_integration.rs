//! End-to-end processing scenarios against the in-memory store.

mod support;

use std::sync::Arc;

use locus_core::{MergeScores, TimelineProcessor, TimelineStore};
use locus_domain::Coordinate;
use support::{
    empty_trip, seed_chain, trip, visit, FixedRecorder, MemoryTimelineStore,
};

fn processor(store: Arc<MemoryTimelineStore>, current_item: Option<String>) -> TimelineProcessor {
    TimelineProcessor::new(store, MergeScores::new(), Arc::new(FixedRecorder(current_item)))
}

/// An empty trip after a keeper visit is absorbed without touching the
/// visit's dates.
#[tokio::test]
async fn empty_trip_merges_into_keeper_visit() {
    let store = Arc::new(MemoryTimelineStore::new());
    let mut items = vec![
        visit("v", 0, 120, -37.8136, 144.9631),
        empty_trip("t", 120, 150),
    ];
    seed_chain(&store, &mut items);

    let before = store.item_base("v").expect("visit stored");
    processor(store.clone(), None).process_from("v").await.expect("processing");

    let visit_after = store.item_base("v").expect("visit survives");
    let trip_after = store.item_base("t").expect("trip row remains");

    assert!(!visit_after.deleted);
    assert!(trip_after.deleted);
    assert_eq!(trip_after.previous_item_id, None);
    assert_eq!(trip_after.next_item_id, None);
    assert_eq!(visit_after.next_item_id, None);
    // no samples moved, so the visit's range must be untouched
    assert_eq!(visit_after.start_date, before.start_date);
    assert_eq!(visit_after.end_date, before.end_date);
}

/// A weak trip between two keeper visits dies; its samples go to the
/// winning anchor and the anchors stay separate.
#[tokio::test]
async fn weak_betweener_dies_and_anchors_stay_separate() {
    let store = Arc::new(MemoryTimelineStore::new());
    let inside = Coordinate::new(-37.81361, 144.96311);
    let mut items = vec![
        visit("a", 0, 300, -37.8136, 144.9631),
        trip("b", 300, 305, inside, inside, None, 2),
        visit("c", 305, 605, -37.8136, 144.9631),
    ];
    seed_chain(&store, &mut items);

    processor(store.clone(), None).process_from("b").await.expect("processing");

    let a = store.item_base("a").expect("a stored");
    let b = store.item_base("b").expect("b stored");
    let c = store.item_base("c").expect("c stored");

    assert!(b.deleted, "the weak trip must die");
    assert!(!a.deleted && !c.deleted, "both anchors survive");
    assert_eq!(a.next_item_id.as_deref(), Some("c"));
    assert_eq!(c.previous_item_id.as_deref(), Some("a"));

    // b's samples belong to whichever anchor won the consumption score
    let s0 = store.sample("b-s0").expect("sample survives");
    let s1 = store.sample("b-s1").expect("sample survives");
    assert_eq!(s0.timeline_item_id, s1.timeline_item_id);
    assert!(s0.timeline_item_id == "a" || s0.timeline_item_id == "c");
}

/// A window with no executable merge returns without touching anything.
#[tokio::test]
async fn no_possible_merge_leaves_bases_untouched() {
    let store = Arc::new(MemoryTimelineStore::new());
    let mut items = vec![
        visit("a", 0, 300, -37.8136, 144.9631),
        visit("b", 600, 900, -37.9000, 144.9631),
    ];
    seed_chain(&store, &mut items);

    let before = store.bases_snapshot();
    processor(store.clone(), None).process_from("a").await.expect("processing");
    assert_eq!(store.bases_snapshot(), before);
}

/// Processing stands down while the recorder's current item is in the
/// window and not yet a keeper.
#[tokio::test]
async fn active_recording_blocks_processing() {
    let store = Arc::new(MemoryTimelineStore::new());
    let mut items = vec![
        visit("v", 0, 120, -37.8136, 144.9631),
        // 20s visit: valid-ish duration but not a keeper
        visit("current", 120, 140, -37.8136, 144.9631),
    ];
    seed_chain(&store, &mut items);

    let before = store.bases_snapshot();
    processor(store.clone(), Some("current".into()))
        .process_from("v")
        .await
        .expect("processing");
    assert_eq!(store.bases_snapshot(), before, "no merge may run");
}

/// The recorder gate only applies while the current item is inside the
/// window.
#[tokio::test]
async fn recording_outside_the_window_does_not_block() {
    let store = Arc::new(MemoryTimelineStore::new());
    let mut items = vec![
        visit("v", 0, 120, -37.8136, 144.9631),
        empty_trip("t", 120, 150),
    ];
    seed_chain(&store, &mut items);

    processor(store.clone(), Some("elsewhere".into()))
        .process_from("v")
        .await
        .expect("processing");
    assert!(store.item_base("t").expect("trip stored").deleted);
}

/// Repeated processing only ever shrinks the live item count.
#[tokio::test]
async fn processing_is_monotone() {
    let store = Arc::new(MemoryTimelineStore::new());
    let inside = Coordinate::new(-37.81362, 144.96312);
    let mut items = vec![
        visit("a", 0, 300, -37.8136, 144.9631),
        trip("b", 300, 304, inside, inside, None, 2),
        empty_trip("c", 304, 330),
        visit("d", 330, 630, -37.8136, 144.9631),
    ];
    seed_chain(&store, &mut items);

    let mut live = store.live_item_count();
    let processor = processor(store.clone(), None);
    for seed in ["a", "b", "c", "d"] {
        processor.process_from(seed).await.expect("processing");
        let now = store.live_item_count();
        assert!(now <= live, "live items grew from {live} to {now}");
        live = now;
    }
    assert!(live < 4, "at least one merge must have executed");
}

/// process_items drives the same loop from already-hydrated items.
#[tokio::test]
async fn process_items_merges_from_a_hydrated_batch() {
    let store = Arc::new(MemoryTimelineStore::new());
    let mut items = vec![
        visit("v", 0, 120, -37.8136, 144.9631),
        empty_trip("t", 120, 150),
    ];
    seed_chain(&store, &mut items);

    let hydrated = vec![
        store.hydrated_item("v").await.expect("fetch").expect("exists"),
        store.hydrated_item("t").await.expect("fetch").expect("exists"),
    ];
    processor(store.clone(), None).process_items(hydrated).await.expect("processing");
    assert!(store.item_base("t").expect("trip stored").deleted);
}
