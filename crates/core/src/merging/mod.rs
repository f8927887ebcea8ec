//! Merge machinery: pairwise mergeability, the consumption-score
//! lattice, candidate enumeration, and merge execution.

pub mod candidates;
pub mod merge;
pub mod mergeability;
pub mod scores;

pub use candidates::collect_potential_merges;
pub use merge::{verify_merge_topology, Merge, MergeCommit, MergeOrientation, MergeResult};
pub use mergeability::{
    distance_between, is_within_mergeable_distance, maximum_mergeable_distance, time_interval_secs,
};
pub use scores::{MergeScore, MergeScores};
