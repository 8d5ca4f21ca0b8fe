use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Client partition 0 is reserved for the root node.
    #[error("invalid client id: {0}")]
    InvalidClientId(u32),

    /// The client's 32-bit sequence space is used up. Not retryable.
    #[error("id range exhausted for client {client}")]
    RangeExhausted { client: u32 },

    #[error("requested an empty id range")]
    EmptyRange,

    #[error("invalid node reference: {0:?}")]
    InvalidNodeReference(String),
}
