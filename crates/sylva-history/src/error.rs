//! Error types for version history.

use sylva_store::StoreError;
use sylva_types::Digest;

/// Errors that can occur while reading or extending history.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A version may have at most two parents.
    #[error("version has {0} parents, at most 2 are allowed")]
    TooManyParents(usize),

    /// A version's timestamp does not come after one of its parents.
    #[error("version is not after its parent {parent:?}")]
    TemporalViolation { parent: Digest },
}

/// Convenience alias for history results.
pub type HistoryResult<T> = Result<T, HistoryError>;
