//! Merge-candidate enumeration over a processing window.
//!
//! Three shapes are considered for every item: adjacent pairs (both
//! directions, both role assignments), betweeners (a weak item between
//! two stronger ones), and bridges (the same triple gated on shared
//! source). Candidates dedup on (keeper, deadman, betweener, keeper
//! start) and come back sorted by score, best first.

use ahash::AHashSet;
use locus_domain::constants::MAX_POTENTIAL_MERGES_IN_PROCESSING_LOOP;
use locus_domain::{Result, TimelineItem};

use crate::merging::merge::Merge;
use crate::merging::scores::{MergeScore, MergeScores};
use crate::timeline::linked_list::TimelineLinkedList;

/// Dedup identity for a candidate.
#[derive(Hash, PartialEq, Eq)]
struct CandidateKey {
    keeper: String,
    deadman: String,
    betweener: Option<String>,
    keeper_start_ms: i64,
}

impl CandidateKey {
    fn of(keeper: &TimelineItem, betweener: Option<&TimelineItem>, deadman: &TimelineItem) -> Self {
        Self {
            keeper: keeper.base.id.clone(),
            deadman: deadman.base.id.clone(),
            betweener: betweener.map(|b| b.base.id.clone()),
            keeper_start_ms: keeper.base.start_date.timestamp_millis(),
        }
    }
}

/// Enumerate and score every plausible merge in the window.
///
/// Stops early once at least [`MAX_POTENTIAL_MERGES_IN_PROCESSING_LOOP`]
/// candidates exist and one of them is executable. The result is sorted
/// by score descending; ties keep insertion order.
pub fn collect_potential_merges(
    list: &TimelineLinkedList,
    scores: &MergeScores,
) -> Result<Vec<Merge>> {
    let mut seen: AHashSet<CandidateKey> = AHashSet::new();
    let mut merges: Vec<Merge> = Vec::new();

    for item_id in list.ordered_ids() {
        let Some(item) = list.item(&item_id) else { continue };
        if item.base.deleted || item.base.disabled {
            continue;
        }

        let previous = list
            .previous_item(&item_id)
            .filter(|neighbour| !neighbour.base.deleted && !neighbour.base.disabled);
        let next = list
            .next_item(&item_id)
            .filter(|neighbour| !neighbour.base.deleted && !neighbour.base.disabled);

        // adjacent merges, both directions and both role assignments
        for neighbour in [previous, next].into_iter().flatten() {
            push_candidate(&mut merges, &mut seen, scores, item, None, neighbour)?;
            push_candidate(&mut merges, &mut seen, scores, neighbour, None, item)?;
        }

        if let (Some(previous), Some(next)) = (previous, next) {
            let keepness = item.keepness()?;

            // betweener: a weak item absorbed along with the far anchor
            if keepness < previous.keepness()?
                && next.keepness()? > keepness
                && !previous.is_data_gap()?
                && !next.is_data_gap()?
            {
                push_candidate(&mut merges, &mut seen, scores, previous, Some(item), next)?;
                push_candidate(&mut merges, &mut seen, scores, next, Some(item), previous)?;
            }

            // bridge: the same triple, gated on a shared source
            if previous.keepness()? > keepness
                && next.keepness()? > keepness
                && previous.base.source == item.base.source
                && next.base.source == item.base.source
            {
                push_candidate(&mut merges, &mut seen, scores, previous, Some(item), next)?;
                push_candidate(&mut merges, &mut seen, scores, next, Some(item), previous)?;
            }
        }

        if merges.len() >= MAX_POTENTIAL_MERGES_IN_PROCESSING_LOOP
            && merges.iter().any(|merge| merge.score > MergeScore::Impossible)
        {
            break;
        }
    }

    merges.sort_by(|a, b| b.score.cmp(&a.score));
    Ok(merges)
}

fn push_candidate(
    merges: &mut Vec<Merge>,
    seen: &mut AHashSet<CandidateKey>,
    scores: &MergeScores,
    keeper: &TimelineItem,
    betweener: Option<&TimelineItem>,
    deadman: &TimelineItem,
) -> Result<()> {
    if !seen.insert(CandidateKey::of(keeper, betweener, deadman)) {
        return Ok(());
    }
    let merge =
        Merge::new(keeper.clone(), betweener.cloned(), deadman.clone(), scores)?;
    merges.push(merge);
    Ok(())
}
