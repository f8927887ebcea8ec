//! Merge execution: topology splice, sample reassignment, and the
//! atomic commit plan handed to the store.

use locus_domain::{LocusError, Result, TimelineItem, TimelineItemBase};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::merging::scores::{MergeScore, MergeScores};
use crate::ports::TimelineStore;

/// Which side of the keeper the deadman sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergeOrientation {
    DeadmanOnPrevious,
    DeadmanOnNext,
}

/// A scored merge candidate: the keeper absorbs the deadman (and the
/// betweener, when present), inheriting its samples and link boundary.
#[derive(Debug, Clone)]
pub struct Merge {
    pub keeper: TimelineItem,
    pub betweener: Option<TimelineItem>,
    pub deadman: TimelineItem,
    pub score: MergeScore,
}

/// The persisted outcome of a merge.
#[derive(Debug, Clone)]
pub struct MergeResult {
    pub kept: TimelineItem,
    pub killed: Vec<TimelineItem>,
}

/// Everything the store needs to apply a merge in one transaction.
///
/// Bases are persisted in order: keeper, betweener (when present),
/// deadman; then every sample in `moved_sample_ids` is reassigned to the
/// keeper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeCommit {
    pub keeper: TimelineItemBase,
    pub betweener: Option<TimelineItemBase>,
    pub deadman: TimelineItemBase,
    pub moved_sample_ids: Vec<String>,
}

/// Check that the three participants still form one of the two canonical
/// link orientations, and that none of them has been deleted.
///
/// Called once when the merge is planned and again by the store inside
/// the write transaction; a failure there aborts the merge.
pub fn verify_merge_topology(
    keeper: &TimelineItemBase,
    betweener: Option<&TimelineItemBase>,
    deadman: &TimelineItemBase,
) -> Result<MergeOrientation> {
    if keeper.deleted || deadman.deleted || betweener.is_some_and(|b| b.deleted) {
        return Err(LocusError::Topology(format!(
            "merge participant deleted (keeper {}, deadman {})",
            keeper.id, deadman.id
        )));
    }

    let orientation = match betweener {
        None => {
            if keeper.next_item_id.as_deref() == Some(&deadman.id) {
                Some(MergeOrientation::DeadmanOnNext)
            } else if deadman.next_item_id.as_deref() == Some(&keeper.id) {
                Some(MergeOrientation::DeadmanOnPrevious)
            } else {
                None
            }
        }
        Some(betweener) => {
            if keeper.next_item_id.as_deref() == Some(&betweener.id)
                && betweener.next_item_id.as_deref() == Some(&deadman.id)
            {
                Some(MergeOrientation::DeadmanOnNext)
            } else if deadman.next_item_id.as_deref() == Some(&betweener.id)
                && betweener.next_item_id.as_deref() == Some(&keeper.id)
            {
                Some(MergeOrientation::DeadmanOnPrevious)
            } else {
                None
            }
        }
    };

    orientation.ok_or_else(|| {
        LocusError::Topology(format!(
            "no canonical orientation between keeper {} and deadman {}",
            keeper.id, deadman.id
        ))
    })
}

impl Merge {
    /// Plan a merge and score it. A worth-keeping betweener makes the
    /// merge impossible; otherwise the score is the keeper's consumption
    /// score for the deadman.
    pub fn new(
        keeper: TimelineItem,
        betweener: Option<TimelineItem>,
        deadman: TimelineItem,
        scores: &MergeScores,
    ) -> Result<Self> {
        let score = match &betweener {
            Some(betweener) if betweener.is_worth_keeping()? => MergeScore::Impossible,
            _ => scores.consumption_score(&keeper, &deadman)?,
        };
        Ok(Self { keeper, betweener, deadman, score })
    }

    /// Execute the merge through the store.
    ///
    /// Splices the keeper's boundary link past the deadman, collects the
    /// victims' non-disabled samples for reassignment, marks each victim
    /// deleted (or disabled, when it holds disabled samples), and commits
    /// the whole plan in one transaction. Derived fields on the keeper
    /// are not recomputed here; the next hydration observes
    /// `samples_changed` and refreshes them.
    pub async fn execute(&self, store: &dyn TimelineStore) -> Result<MergeResult> {
        let orientation =
            verify_merge_topology(&self.keeper.base, self.betweener.as_ref().map(|b| &b.base), &self.deadman.base)?;

        let mut keeper = self.keeper.clone();
        match orientation {
            MergeOrientation::DeadmanOnPrevious => {
                keeper.base.previous_item_id = self.deadman.base.previous_item_id.clone();
            }
            MergeOrientation::DeadmanOnNext => {
                keeper.base.next_item_id = self.deadman.base.next_item_id.clone();
            }
        }

        let mut betweener = self.betweener.clone();
        let mut deadman = self.deadman.clone();
        let mut moved = Vec::new();
        if let Some(betweener) = betweener.as_mut() {
            strip_victim(betweener, &mut moved)?;
        }
        strip_victim(&mut deadman, &mut moved)?;

        if !moved.is_empty() {
            keeper.base.samples_changed = true;
        }

        let commit = MergeCommit {
            keeper: keeper.base.clone(),
            betweener: betweener.as_ref().map(|b| b.base.clone()),
            deadman: deadman.base.clone(),
            moved_sample_ids: moved.iter().map(|s| s.id.clone()).collect(),
        };

        store.commit_merge(&commit).await?;

        debug!(
            keeper = %keeper.base.id,
            deadman = %self.deadman.base.id,
            betweener = self.betweener.as_ref().map(|b| b.base.id.as_str()),
            moved_samples = commit.moved_sample_ids.len(),
            "merge committed"
        );

        // mirror the committed state on the in-memory keeper
        if let Some(samples) = keeper.samples.as_mut() {
            for mut sample in moved {
                sample.timeline_item_id = keeper.base.id.clone();
                samples.push(sample);
            }
            samples.sort_by(|a, b| a.date.cmp(&b.date));
        }

        let mut killed = vec![deadman];
        if let Some(betweener) = betweener {
            killed.push(betweener);
        }
        Ok(MergeResult { kept: keeper, killed })
    }
}

/// Collect a victim's movable samples and take it off the timeline: an
/// item holding disabled samples is parked as disabled, everything else
/// is deleted outright.
fn strip_victim(
    victim: &mut TimelineItem,
    moved: &mut Vec<locus_domain::LocomotionSample>,
) -> Result<()> {
    let samples = victim.samples()?;
    let holds_disabled = samples.iter().any(|s| s.disabled);
    moved.extend(samples.iter().filter(|s| !s.disabled).cloned());
    if holds_disabled {
        victim.base.disabled = true;
    } else {
        victim.base.deleted = true;
    }
    victim.base.previous_item_id = None;
    victim.base.next_item_id = None;
    Ok(())
}
