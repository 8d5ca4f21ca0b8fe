use sylva_types::Digest;

/// Errors from object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested record was not found.
    #[error("record not found: {0}")]
    NotFound(Digest),

    /// Content hash mismatch on read (data corruption).
    #[error("hash mismatch for {id}: computed {computed}")]
    HashMismatch { id: Digest, computed: Digest },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The record bytes are well-formed but not what the caller asked for,
    /// or cannot be decoded at all.
    #[error("malformed record {id}: {reason}")]
    Malformed { id: Digest, reason: String },

    /// Attempted to write a record whose digest is null.
    #[error("cannot store record with null digest")]
    NullDigest,
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
