//! # Locus Core
//!
//! Timeline reconstruction logic - no infrastructure dependencies.
//!
//! This crate contains:
//! - Port/adapter interfaces (traits) for persistence and runtime state
//! - Pairwise item geometry and the mergeability rules
//! - The consumption-score lattice
//! - The processing window (linked list view), merge candidate
//!   collection, merge execution, and edge cleansing
//! - The timeline processor that drives all of the above
//!
//! ## Architecture Principles
//! - Only depends on `locus-domain`
//! - No database or platform code
//! - All external dependencies via traits
//! - Pure, testable business logic

pub mod merging;
pub mod ports;
pub mod timeline;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export specific items to avoid ambiguity
pub use merging::{
    collect_potential_merges, verify_merge_topology, Merge, MergeCommit, MergeOrientation,
    MergeResult, MergeScore, MergeScores,
};
pub use ports::{ActivityProbabilities, ForegroundState, RecorderState, TimelineStore};
pub use timeline::{cleanse_edges, TimelineLinkedList, TimelineProcessor};
