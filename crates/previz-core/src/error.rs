//! Error types for Previz.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Previz operations.
#[derive(Error, Debug)]
pub enum PrevizError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Contradictory or missing parameters at a constructor boundary.
    #[error("bad argument: {0}")]
    BadArgument(String),

    /// Frame index, crop region, or subclip bounds outside the valid range.
    #[error("out of range: {0}")]
    OutOfRange(String),

    /// Malformed timecode string.
    #[error("invalid timecode: {0:?}")]
    BadTimecode(String),

    /// Load path does not exist.
    #[error("the file {0:?} does not exist")]
    FileNotFound(PathBuf),

    /// Source clips come from different composition graphs.
    #[error("the sources are not all in the same graph")]
    GraphDomainMismatch,

    /// Attempted to remove a clip that is not a leaf of its graph.
    #[error("clip was not found among the graph's leaves")]
    NotALeaf,

    /// Internal cache invariant violation. Never caused by user input.
    #[error("cache inconsistency: {0}")]
    CacheInconsistency(String),

    /// An algebraic rewrite whose semantics are not defined.
    #[error("unsupported composition: {0}")]
    UnsupportedComposition(String),
}

/// Result type alias for Previz operations.
pub type Result<T> = std::result::Result<T, PrevizError>;
