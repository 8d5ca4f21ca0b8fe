use serde::{Deserialize, Serialize};
use sylva_store::{ObjectKind, ObjectStore, Record, RecordStoreExt};
use sylva_types::{Digest, TemporalAnchor};
use tracing::debug;

use crate::error::{HistoryError, HistoryResult};

/// The stored form of a version: an immutable snapshot of one tree plus
/// its place in history.
///
/// - no parents: the initial version of a branch
/// - one parent: an ordinary commit
/// - two parents: a merge
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub parents: Vec<Digest>,
    /// Digest of the tree header record.
    pub tree: Digest,
    pub author: String,
    pub timestamp: TemporalAnchor,
    pub message: Option<String>,
}

impl Record for VersionRecord {
    const KIND: ObjectKind = ObjectKind::Version;
}

/// A stored version together with its digest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Version {
    pub digest: Digest,
    pub record: VersionRecord,
}

impl Version {
    /// Validate and store `record`.
    ///
    /// Parents must exist and every parent must have an earlier timestamp.
    pub fn create<S: ObjectStore + ?Sized>(store: &S, record: VersionRecord) -> HistoryResult<Self> {
        if record.parents.len() > 2 {
            return Err(HistoryError::TooManyParents(record.parents.len()));
        }
        for parent in &record.parents {
            let parent_record: VersionRecord = store.load(parent)?;
            if !record.timestamp.is_after(&parent_record.timestamp) {
                return Err(HistoryError::TemporalViolation { parent: *parent });
            }
        }
        let digest = store.save(&record)?;
        debug!(
            version = %digest.short_hex(),
            tree = %record.tree.short_hex(),
            parents = record.parents.len(),
            "created version"
        );
        Ok(Self { digest, record })
    }

    pub fn load<S: ObjectStore + ?Sized>(store: &S, digest: Digest) -> HistoryResult<Self> {
        Ok(Self {
            digest,
            record: store.load(&digest)?,
        })
    }

    pub fn tree(&self) -> Digest {
        self.record.tree
    }

    pub fn timestamp(&self) -> TemporalAnchor {
        self.record.timestamp
    }

    pub fn parents(&self) -> &[Digest] {
        &self.record.parents
    }

    pub fn is_merge(&self) -> bool {
        self.record.parents.len() == 2
    }

    /// Ordering key used to pick "the later" of two versions: timestamp,
    /// then digest.
    pub fn order_key(&self) -> (TemporalAnchor, Digest) {
        (self.record.timestamp, self.digest)
    }
}
