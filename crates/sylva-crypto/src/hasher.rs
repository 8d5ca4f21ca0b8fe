use sylva_types::Digest;

/// Domain-separated BLAKE3 content hasher.
///
/// Each hasher carries a domain tag (e.g., `"sylva-node-v1"`) that is
/// prepended to every hash computation. A node record and a B-tree page with
/// identical bytes therefore produce different digests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for node records.
    pub const NODE: Self = Self {
        domain: "sylva-node-v1",
    };
    /// Hasher for persistent B-tree pages.
    pub const PAGE: Self = Self {
        domain: "sylva-page-v1",
    };
    /// Hasher for tree header records.
    pub const TREE: Self = Self {
        domain: "sylva-tree-v1",
    };
    /// Hasher for version records.
    pub const VERSION: Self = Self {
        domain: "sylva-version-v1",
    };
    /// Hasher for opaque blobs.
    pub const BLOB: Self = Self {
        domain: "sylva-blob-v1",
    };

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> Digest {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        Digest::from_hash(*hasher.finalize().as_bytes())
    }

    /// Hash the canonical (bincode) encoding of a value.
    pub fn hash_encoded<T: serde::Serialize>(&self, value: &T) -> Result<Digest, HasherError> {
        let data =
            bincode::serialize(value).map_err(|e| HasherError::Serialization(e.to_string()))?;
        Ok(self.hash(&data))
    }

    /// Verify that data produces the expected digest.
    pub fn verify(&self, data: &[u8], expected: &Digest) -> bool {
        self.hash(data) == *expected
    }

    pub fn domain(&self) -> &str {
        self.domain
    }
}

/// Errors from hashing operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HasherError {
    #[error("serialization error: {0}")]
    Serialization(String),
}
