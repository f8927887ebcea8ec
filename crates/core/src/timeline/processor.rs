//! The timeline processor: a convergent merge loop over a processing
//! window.
//!
//! One logical actor owns all in-memory timeline state: the processor
//! holds its mutable state behind a single async mutex and every public
//! entry point runs the whole cleanse/collect/execute cycle inside that
//! critical section, so at most one pass runs at a time no matter how
//! the processor is reached.

use std::sync::Arc;

use ahash::AHashSet;
use locus_domain::{LocusError, Result, TimelineItem};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::merging::candidates::collect_potential_merges;
use crate::merging::merge::MergeResult;
use crate::merging::scores::{MergeScore, MergeScores};
use crate::ports::{RecorderState, TimelineStore};
use crate::timeline::edge_cleanser::cleanse_edges;
use crate::timeline::linked_list::TimelineLinkedList;

/// Mutable state owned by the processing critical section.
#[derive(Default)]
struct ProcessorState {
    /// Samples moved by the most recent cleansing pass. Carried across
    /// calls to stop boundary samples ping-ponging between neighbours;
    /// overwritten by each pass.
    already_moved: AHashSet<String>,
}

/// Drives timeline reconstruction: edge cleansing to fixpoint, then one
/// best merge at a time until none remain.
pub struct TimelineProcessor {
    store: Arc<dyn TimelineStore>,
    scores: MergeScores,
    recorder: Arc<dyn RecorderState>,
    state: Mutex<ProcessorState>,
}

impl TimelineProcessor {
    pub fn new(
        store: Arc<dyn TimelineStore>,
        scores: MergeScores,
        recorder: Arc<dyn RecorderState>,
    ) -> Self {
        Self { store, scores, recorder, state: Mutex::new(ProcessorState::default()) }
    }

    /// Recursive merge driver: build a window around the seed, execute
    /// the best merge, and continue from the surviving item until no
    /// further merges exist.
    ///
    /// Persistence failures are logged here and leave the timeline at
    /// its last consistent state; the next change event re-triggers
    /// processing. Predicate failures propagate.
    pub async fn process_from(&self, item_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let mut seed = item_id.to_string();

        loop {
            let list = match TimelineLinkedList::from_seed(self.store.as_ref(), &seed).await {
                Ok(Some(list)) => list,
                Ok(None) => break,
                Err(LocusError::Database(message)) => {
                    error!(seed = %seed, error = %message, "window load failed; leaving timeline as-is");
                    break;
                }
                Err(err) => return Err(err),
            };

            match self.process(list, &mut state).await {
                Ok(Some(result)) => seed = result.kept.base.id.clone(),
                Ok(None) => break,
                Err(LocusError::Database(message)) | Err(LocusError::Topology(message)) => {
                    error!(seed = %seed, error = %message, "merge aborted; leaving timeline as-is");
                    break;
                }
                Err(err) => return Err(err),
            }
        }

        Ok(())
    }

    /// Process a batch of already-hydrated items (the segment observer's
    /// entry point). Merging continues from each survivor via
    /// store-backed windows.
    pub async fn process_items(&self, items: Vec<TimelineItem>) -> Result<()> {
        let first = {
            let mut state = self.state.lock().await;
            let Some(list) = TimelineLinkedList::from_items(items) else {
                return Ok(());
            };
            match self.process(list, &mut state).await {
                Ok(result) => result,
                Err(LocusError::Database(message)) | Err(LocusError::Topology(message)) => {
                    error!(error = %message, "merge aborted; leaving timeline as-is");
                    return Ok(());
                }
                Err(err) => return Err(err),
            }
        };

        if let Some(result) = first {
            self.process_from(&result.kept.base.id).await?;
        }
        Ok(())
    }

    /// One processing step over a window: recorder gate, cleansing to
    /// fixpoint, candidate collection, and at most one merge.
    async fn process(
        &self,
        mut list: TimelineLinkedList,
        state: &mut ProcessorState,
    ) -> Result<Option<MergeResult>> {
        // the active recorder owns in-flight items; stand down until the
        // current item is durable
        if let Some(current_id) = self.recorder.current_item_id() {
            if let Some(current) = list.item(&current_id) {
                if !current.is_worth_keeping()? {
                    debug!(current = %current_id, "current item not yet a keeper; skipping pass");
                    return Ok(None);
                }
            }
        }

        let moved =
            cleanse_edges(&mut list, &state.already_moved, self.store.as_ref()).await?;
        state.already_moved = moved;

        let merges = collect_potential_merges(&list, &self.scores)?;
        let Some(best) = merges.into_iter().next() else {
            return Ok(None);
        };
        if best.score == MergeScore::Impossible {
            return Ok(None);
        }

        info!(
            keeper = %best.keeper.base.id,
            deadman = %best.deadman.base.id,
            score = ?best.score,
            "executing merge"
        );
        let result = best.execute(self.store.as_ref()).await?;
        Ok(Some(result))
    }
}
