//! Error types for branch operations.

use thiserror::Error;

/// Errors that can occur during branch operations.
#[derive(Debug, Error)]
pub enum RefError {
    /// The branch was not found.
    #[error("branch not found: {name}")]
    NotFound { name: String },

    /// The branch name is invalid.
    #[error("invalid branch name: {name}: {reason}")]
    InvalidBranchName { name: String, reason: String },

    /// A lock guarding the branch table was poisoned by a panicking writer.
    #[error("branch store unavailable: {0}")]
    Unavailable(String),
}

/// Convenience type alias for branch operations.
pub type RefResult<T> = std::result::Result<T, RefError>;
