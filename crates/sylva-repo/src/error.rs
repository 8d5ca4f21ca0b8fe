//! Error types for the repository crate.

use sylva_diff::DiffError;
use sylva_history::HistoryError;
use sylva_merge::MergeError;
use sylva_refs::RefError;
use sylva_store::StoreError;
use sylva_tree::TreeError;
use sylva_types::{Digest, TypeError};

/// Errors that can occur in repository operations.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("tree error: {0}")]
    Tree(#[from] TreeError),

    #[error("ref error: {0}")]
    Ref(#[from] RefError),

    #[error("history error: {0}")]
    History(#[from] HistoryError),

    #[error("diff error: {0}")]
    Diff(#[from] DiffError),

    #[error("merge error: {0}")]
    Merge(#[from] MergeError),

    #[error("type error: {0}")]
    Type(#[from] TypeError),

    #[error("branch not found: {0}")]
    BranchNotFound(String),

    #[error("branch already exists: {0}")]
    BranchExists(String),

    /// The branch moved since the caller read it. Recompute against
    /// `actual` and retry.
    #[error("branch {branch} moved (now at {actual:?})")]
    Conflict {
        branch: String,
        actual: Option<Digest>,
    },

    #[error("versions {ours:?} and {theirs:?} share no history")]
    UnrelatedHistories { ours: Digest, theirs: Digest },

    #[error("gave up advancing {branch} after {attempts} attempts")]
    RetriesExhausted { branch: String, attempts: usize },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias for repository results.
pub type RepoResult<T> = Result<T, RepoError>;
