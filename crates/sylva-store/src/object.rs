use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sylva_crypto::ContentHasher;
use sylva_types::Digest;

use crate::error::{StoreError, StoreResult};

/// The kind of record stored. Selects the hashing domain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    /// A model node.
    Node,
    /// A persistent B-tree page.
    Page,
    /// A tree header (root node + parent index).
    Tree,
    /// A version header.
    Version,
    /// Opaque bytes.
    Blob,
}

impl ObjectKind {
    pub fn hasher(&self) -> ContentHasher {
        match self {
            Self::Node => ContentHasher::NODE,
            Self::Page => ContentHasher::PAGE,
            Self::Tree => ContentHasher::TREE,
            Self::Version => ContentHasher::VERSION,
            Self::Blob => ContentHasher::BLOB,
        }
    }

    /// One-byte tag used by on-disk backends.
    pub fn tag(&self) -> u8 {
        match self {
            Self::Node => 1,
            Self::Page => 2,
            Self::Tree => 3,
            Self::Version => 4,
            Self::Blob => 5,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Node),
            2 => Some(Self::Page),
            3 => Some(Self::Tree),
            4 => Some(Self::Version),
            5 => Some(Self::Blob),
            _ => None,
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Node => write!(f, "node"),
            Self::Page => write!(f, "page"),
            Self::Tree => write!(f, "tree"),
            Self::Version => write!(f, "version"),
            Self::Blob => write!(f, "blob"),
        }
    }
}

/// A stored record: kind tag + serialized data + cached size.
///
/// `StoredObject` is the unit of storage. The store never interprets the
/// contents of the data; it is a pure key-value store keyed by content hash.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    pub kind: ObjectKind,
    pub data: Vec<u8>,
    /// The size of `data` in bytes.
    pub size: u64,
}

impl StoredObject {
    pub fn new(kind: ObjectKind, data: Vec<u8>) -> Self {
        let size = data.len() as u64;
        Self { kind, data, size }
    }

    /// Compute the content-addressed digest for this record.
    pub fn compute_id(&self) -> Digest {
        self.kind.hasher().hash(&self.data)
    }
}

/// A typed value persisted as a [`StoredObject`].
///
/// Records are encoded with bincode. Implementors must only contain
/// deterministically ordered collections (`Vec`, `BTreeMap`) so that equal
/// values always encode to equal bytes.
pub trait Record: Serialize + DeserializeOwned {
    const KIND: ObjectKind;

    fn to_stored_object(&self) -> StoreResult<StoredObject> {
        let data =
            bincode::serialize(self).map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(StoredObject::new(Self::KIND, data))
    }

    fn from_stored_object(obj: &StoredObject) -> StoreResult<Self> {
        if obj.kind != Self::KIND {
            return Err(StoreError::Malformed {
                id: obj.compute_id(),
                reason: format!("expected {}, got {}", Self::KIND, obj.kind),
            });
        }
        bincode::deserialize(&obj.data).map_err(|e| StoreError::Malformed {
            id: obj.compute_id(),
            reason: e.to_string(),
        })
    }

    /// The digest this record is stored under, without storing it.
    fn digest(&self) -> StoreResult<Digest> {
        Ok(self.to_stored_object()?.compute_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        values: Vec<u32>,
    }

    impl Record for Sample {
        const KIND: ObjectKind = ObjectKind::Blob;
    }

    fn sample() -> Sample {
        Sample {
            name: "sample".into(),
            values: vec![1, 2, 3],
        }
    }

    #[test]
    fn record_roundtrip() {
        let stored = sample().to_stored_object().unwrap();
        assert_eq!(stored.kind, ObjectKind::Blob);
        assert_eq!(stored.size, stored.data.len() as u64);
        assert_eq!(Sample::from_stored_object(&stored).unwrap(), sample());
    }

    #[test]
    fn kind_mismatch_is_malformed() {
        let stored = StoredObject::new(ObjectKind::Node, b"not a sample".to_vec());
        let err = Sample::from_stored_object(&stored).unwrap_err();
        assert!(matches!(err, StoreError::Malformed { .. }));
    }

    #[test]
    fn garbage_bytes_are_malformed() {
        let stored = StoredObject::new(ObjectKind::Blob, vec![0xff]);
        let err = Sample::from_stored_object(&stored).unwrap_err();
        assert!(matches!(err, StoreError::Malformed { .. }));
    }

    #[test]
    fn digest_matches_stored_id() {
        let record = sample();
        assert_eq!(
            record.digest().unwrap(),
            record.to_stored_object().unwrap().compute_id()
        );
    }

    #[test]
    fn different_kinds_produce_different_ids() {
        let data = b"same data".to_vec();
        let node = StoredObject::new(ObjectKind::Node, data.clone());
        let page = StoredObject::new(ObjectKind::Page, data.clone());
        let version = StoredObject::new(ObjectKind::Version, data);
        assert_ne!(node.compute_id(), page.compute_id());
        assert_ne!(node.compute_id(), version.compute_id());
    }

    #[test]
    fn tags_roundtrip() {
        for kind in [
            ObjectKind::Node,
            ObjectKind::Page,
            ObjectKind::Tree,
            ObjectKind::Version,
            ObjectKind::Blob,
        ] {
            assert_eq!(ObjectKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(ObjectKind::from_tag(0), None);
    }

    #[test]
    fn object_kind_display() {
        assert_eq!(format!("{}", ObjectKind::Node), "node");
        assert_eq!(format!("{}", ObjectKind::Page), "page");
        assert_eq!(format!("{}", ObjectKind::Version), "version");
    }
}
