//! Error types used throughout the library

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for locus
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum LocusError {
    /// A predicate or scoring call needed samples that were never hydrated.
    #[error("samples not loaded for item {0}")]
    SamplesNotLoaded(String),

    #[error("database error: {0}")]
    Database(String),

    /// A merge pre-check found neither canonical link orientation.
    #[error("topology invariant violated: {0}")]
    Topology(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias for locus operations
pub type Result<T> = std::result::Result<T, LocusError>;
