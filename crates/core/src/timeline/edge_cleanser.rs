//! Edge cleansing: fixpoint reassignment of boundary samples between
//! neighbouring items.
//!
//! Samples near an item boundary are often tagged with the wrong parent
//! (the recorder cuts items on coarse state changes, the classifier on
//! fine ones). Each pass walks the window and lets every item steal
//! misassigned edge samples from its trip neighbours, one at a time,
//! until nothing new moves.

use ahash::AHashSet;
use locus_domain::constants::{
    EDGE_CLEANSING_MAX_TIME_INTERVAL_SECS, MAXIMUM_EDGE_STEALS, MAXIMUM_MODE_SHIFT_SPEED,
    VISIT_EDGE_PAIR_MAX_DURATION_SECS,
};
use locus_domain::{ItemKind, LocomotionSample, Result, TimelineItem};
use tracing::debug;

use crate::merging::mergeability::{is_within_mergeable_distance, time_interval_secs};
use crate::ports::TimelineStore;
use crate::timeline::linked_list::TimelineLinkedList;

/// One boundary sample changing hands.
#[derive(Debug, Clone)]
pub(crate) struct EdgeMove {
    pub sample: LocomotionSample,
    pub from: String,
    pub to: String,
}

/// Run one cleansing pass over the window.
///
/// Every moved sample is persisted through the store and mirrored on the
/// in-memory items (so the pass converges), with both endpoints re-marked
/// `samples_changed`. Samples in `excluding` are never touched again;
/// the returned set holds the ids moved by this pass.
pub async fn cleanse_edges(
    list: &mut TimelineLinkedList,
    excluding: &AHashSet<String>,
    store: &dyn TimelineStore,
) -> Result<AHashSet<String>> {
    let mut moved_all: AHashSet<String> = AHashSet::new();
    for item_id in list.ordered_ids() {
        let moved = sanitise_item_edges(list, &item_id, excluding, &moved_all, store).await?;
        moved_all.extend(moved);
    }
    if !moved_all.is_empty() {
        debug!(moved = moved_all.len(), "edge cleansing pass moved samples");
    }
    Ok(moved_all)
}

/// Fixpoint loop for a single item: steal at most
/// [`MAXIMUM_EDGE_STEALS`] samples across both edges, stopping when a
/// loop moves nothing new or would re-move an already-moved sample.
async fn sanitise_item_edges(
    list: &mut TimelineLinkedList,
    item_id: &str,
    excluding: &AHashSet<String>,
    moved_elsewhere: &AHashSet<String>,
    store: &dyn TimelineStore,
) -> Result<AHashSet<String>> {
    let mut moved: AHashSet<String> = AHashSet::new();

    while moved.len() < MAXIMUM_EDGE_STEALS {
        let mut moved_this_loop: AHashSet<String> = AHashSet::new();

        for direction in [Direction::Previous, Direction::Next] {
            let edge_move = {
                let Some(item) = list.item(item_id) else { return Ok(moved) };
                if item.base.deleted || item.base.disabled {
                    return Ok(moved);
                }
                let neighbour = match direction {
                    Direction::Previous => list.previous_item(item_id),
                    Direction::Next => list.next_item(item_id),
                };
                let Some(neighbour) = neighbour else { continue };

                // only same-source, live trip neighbours within ten
                // minutes and mergeable range are cleansed against
                if neighbour.base.deleted || !neighbour.is_trip() {
                    continue;
                }
                if neighbour.base.source != item.base.source {
                    continue;
                }
                if time_interval_secs(item, neighbour) >= EDGE_CLEANSING_MAX_TIME_INTERVAL_SECS {
                    continue;
                }
                if !is_within_mergeable_distance(item, neighbour)? {
                    continue;
                }

                let is_excluded = |sample_id: &str| {
                    excluding.contains(sample_id)
                        || moved_elsewhere.contains(sample_id)
                        || moved.contains(sample_id)
                        || moved_this_loop.contains(sample_id)
                };
                cleanse_edge(item, neighbour, &is_excluded)?
            };

            if let Some(edge_move) = edge_move {
                apply_move(list, &edge_move, store).await?;
                moved_this_loop.insert(edge_move.sample.id);
            }
        }

        if moved_this_loop.is_empty() {
            break;
        }
        // cycle guard: a sample coming back means we are ping-ponging
        if !moved.is_disjoint(&moved_this_loop) {
            break;
        }
        moved.extend(moved_this_loop);
    }

    Ok(moved)
}

#[derive(Clone, Copy)]
enum Direction {
    Previous,
    Next,
}

/// Decide whether one sample should change hands between `item` and its
/// trip neighbour.
pub(crate) fn cleanse_edge(
    item: &TimelineItem,
    neighbour: &TimelineItem,
    is_excluded: &dyn Fn(&str) -> bool,
) -> Result<Option<EdgeMove>> {
    match (&item.kind, &neighbour.kind) {
        (ItemKind::Trip(_), ItemKind::Trip(_)) => cleanse_trip_trip_edge(item, neighbour, is_excluded),
        (ItemKind::Visit(_), ItemKind::Trip(_)) => {
            cleanse_visit_trip_edge(item, neighbour, is_excluded)
        }
        // visit neighbours are handled when the visit is the focus item
        _ => Ok(None),
    }
}

/// Trip-to-trip: steal the neighbour's edge sample when the classifier
/// says it belongs to this trip's mode, as long as both edges sit on the
/// same side of the mode-shift speed.
fn cleanse_trip_trip_edge(
    me: &TimelineItem,
    them: &TimelineItem,
    is_excluded: &dyn Fn(&str) -> bool,
) -> Result<Option<EdgeMove>> {
    let my_type = me.trip().and_then(|t| t.activity_type());
    let their_type = them.trip().and_then(|t| t.activity_type());
    let (Some(my_type), Some(their_type)) = (my_type, their_type) else {
        return Ok(None);
    };
    if my_type == their_type {
        return Ok(None);
    }

    let my_edge = me.edge_sample(&them.date_range())?;
    let their_edge = them.edge_sample(&me.date_range())?;
    let (Some(my_edge), Some(their_edge)) = (my_edge, their_edge) else {
        return Ok(None);
    };

    let my_slow = my_edge.speed < MAXIMUM_MODE_SHIFT_SPEED;
    let their_slow = their_edge.speed < MAXIMUM_MODE_SHIFT_SPEED;
    if my_slow != their_slow {
        return Ok(None);
    }

    if their_edge.classified_activity_type == Some(my_type) && !is_excluded(&their_edge.id) {
        return Ok(Some(EdgeMove {
            sample: their_edge.clone(),
            from: them.base.id.clone(),
            to: me.base.id.clone(),
        }));
    }
    Ok(None)
}

/// Visit-to-trip: pull the trip's edge inside the geofence, or push the
/// visit's own edge out to a trip that has clearly left.
fn cleanse_visit_trip_edge(
    visit_item: &TimelineItem,
    trip_item: &TimelineItem,
    is_excluded: &dyn Fn(&str) -> bool,
) -> Result<Option<EdgeMove>> {
    let Some(visit) = visit_item.visit() else {
        return Ok(None);
    };

    let trip_edge = trip_item.edge_sample(&visit_item.date_range())?;
    let trip_edge_next = trip_item.second_to_edge_sample(&visit_item.date_range())?;

    // both of the trip's nearest samples inside the geofence: the trip
    // hasn't actually left yet, absorb its edge
    if let (Some(edge), Some(next)) = (trip_edge, trip_edge_next) {
        let both_inside = edge.usable_coordinate().is_some_and(|c| visit.contains(&c))
            && next.usable_coordinate().is_some_and(|c| visit.contains(&c));
        if both_inside && !is_excluded(&edge.id) {
            return Ok(Some(EdgeMove {
                sample: edge.clone(),
                from: trip_item.base.id.clone(),
                to: visit_item.base.id.clone(),
            }));
        }
    }

    // a sparse visit edge means the boundary is already settled
    let visit_edge = visit_item.edge_sample(&trip_item.date_range())?;
    let visit_edge_next = visit_item.second_to_edge_sample(&trip_item.date_range())?;
    let (Some(visit_edge), Some(visit_edge_next)) = (visit_edge, visit_edge_next) else {
        return Ok(None);
    };
    let edge_pair_secs =
        (visit_edge.date - visit_edge_next.date).num_milliseconds().abs() as f64 / 1_000.0;
    if edge_pair_secs > VISIT_EDGE_PAIR_MAX_DURATION_SECS {
        return Ok(None);
    }

    // trip's nearest sample is outside the geofence: the visit edge
    // belongs to the departure
    if let Some(edge) = trip_edge {
        let outside = edge.usable_coordinate().is_some_and(|c| !visit.contains(&c));
        if outside && !is_excluded(&visit_edge.id) {
            return Ok(Some(EdgeMove {
                sample: visit_edge.clone(),
                from: visit_item.base.id.clone(),
                to: trip_item.base.id.clone(),
            }));
        }
    }
    Ok(None)
}

/// Persist a move and mirror it on the in-memory window.
async fn apply_move(
    list: &mut TimelineLinkedList,
    edge_move: &EdgeMove,
    store: &dyn TimelineStore,
) -> Result<()> {
    store.move_sample(&edge_move.sample.id, &edge_move.from, &edge_move.to).await?;

    if let Some(donor) = list.item_mut(&edge_move.from) {
        if let Some(samples) = donor.samples.as_mut() {
            samples.retain(|s| s.id != edge_move.sample.id);
        }
        donor.base.samples_changed = true;
    }
    if let Some(recipient) = list.item_mut(&edge_move.to) {
        let mut sample = edge_move.sample.clone();
        sample.timeline_item_id = edge_move.to.clone();
        if let Some(samples) = recipient.samples.as_mut() {
            samples.push(sample);
            samples.sort_by(|a, b| a.date.cmp(&b.date));
        }
        recipient.base.samples_changed = true;
    }

    debug!(
        sample = %edge_move.sample.id,
        from = %edge_move.from,
        to = %edge_move.to,
        "edge sample reassigned"
    );
    Ok(())
}
