//! Error types for the merge crate.

use sylva_diff::DiffError;
use sylva_tree::TreeError;

use crate::conflict::Conflict;

/// Errors that can occur during a merge.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("tree error: {0}")]
    Tree(#[from] TreeError),

    #[error("diff error: {0}")]
    Diff(#[from] DiffError),

    /// Raised instead of resolving when `fail_on_conflict` is set.
    #[error("merge has {} unresolved conflicts", .0.len())]
    Conflicts(Vec<Conflict>),
}

/// Convenience alias for merge results.
pub type MergeResult<T> = Result<T, MergeError>;
