//! Error types for vocabtree.

use thiserror::Error;

/// Errors that can occur during training, quantization, indexing or
/// persistence operations.
#[derive(Debug, Error)]
pub enum VocabError {
    /// Out-of-range parameter (branching factor, depth, level, image id).
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    /// Training requested over a dataset with zero rows.
    #[error("dataset is empty")]
    EmptyDataset,

    /// Quantize or save called on a tree that has not been built or loaded.
    #[error("tree is empty")]
    TreeEmpty,

    /// Descriptor length differs from the tree's vector length, or a tree
    /// and an index built from a different tree were paired.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// File open/read/write failure, including gzip stream errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed persisted file.
    #[error("parse error: {0}")]
    Parse(String),

    /// Unknown norm kind or descriptor element type.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Build abandoned through the observer's cancellation hook.
    #[error("operation cancelled")]
    Cancelled,
}

/// Result type alias for vocabtree operations.
pub type Result<T> = std::result::Result<T, VocabError>;
