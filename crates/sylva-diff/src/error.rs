//! Error types for the diff crate.

use sylva_store::StoreError;
use sylva_tree::TreeError;

/// Errors that can occur during diff operations.
#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    #[error("tree error: {0}")]
    Tree(#[from] TreeError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Convenience alias for diff results.
pub type DiffResult<T> = Result<T, DiffError>;
