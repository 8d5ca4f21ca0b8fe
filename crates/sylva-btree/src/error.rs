use sylva_store::StoreError;

/// Errors from B-tree operations.
#[derive(Debug, thiserror::Error)]
pub enum BTreeError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A structural invariant does not hold. Reported by `validate`.
    #[error("invalid b-tree: {0}")]
    Invalid(String),
}

/// Result alias for B-tree operations.
pub type BTreeResult<T> = Result<T, BTreeError>;
