use std::collections::HashMap;
use std::sync::RwLock;

use sylva_types::Digest;

use crate::error::{StoreError, StoreResult};
use crate::object::{ObjectKind, StoredObject};
use crate::traits::ObjectStore;

/// Object store backed by a `HashMap` behind a `RwLock`.
///
/// The default backend for tests and for embedding a repository in a
/// single process.
#[derive(Default)]
pub struct InMemoryObjectStore {
    records: RwLock<HashMap<Digest, StoredObject>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().expect("record map lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of stored records of `kind`.
    pub fn count(&self, kind: ObjectKind) -> usize {
        self.records
            .read()
            .expect("record map lock poisoned")
            .values()
            .filter(|record| record.kind == kind)
            .count()
    }

    /// Every stored digest, in ascending order.
    pub fn digests(&self) -> Vec<Digest> {
        let mut digests: Vec<Digest> = self
            .records
            .read()
            .expect("record map lock poisoned")
            .keys()
            .copied()
            .collect();
        digests.sort_unstable();
        digests
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn read(&self, id: &Digest) -> StoreResult<Option<StoredObject>> {
        Ok(self.records.read().expect("record map lock poisoned").get(id).cloned())
    }

    fn write(&self, object: &StoredObject) -> StoreResult<Digest> {
        let digest = object.compute_id();
        if digest.is_null() {
            return Err(StoreError::NullDigest);
        }
        self.records
            .write()
            .expect("record map lock poisoned")
            .entry(digest)
            .or_insert_with(|| object.clone());
        Ok(digest)
    }

    fn exists(&self, id: &Digest) -> StoreResult<bool> {
        Ok(self.records.read().expect("record map lock poisoned").contains_key(id))
    }

    fn delete(&self, id: &Digest) -> StoreResult<bool> {
        Ok(self.records.write().expect("record map lock poisoned").remove(id).is_some())
    }

    // One lock acquisition for the whole batch.
    fn read_batch(&self, ids: &[Digest]) -> StoreResult<Vec<Option<StoredObject>>> {
        let records = self.records.read().expect("record map lock poisoned");
        Ok(ids.iter().map(|id| records.get(id).cloned()).collect())
    }
}

impl std::fmt::Debug for InMemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryObjectStore")
            .field("records", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    fn node(bytes: &[u8]) -> StoredObject {
        StoredObject::new(ObjectKind::Node, bytes.to_vec())
    }

    #[test]
    fn stores_and_returns_records() {
        let store = InMemoryObjectStore::new();
        let record = node(b"root");
        let digest = store.write(&record).unwrap();
        assert_eq!(store.read(&digest).unwrap(), Some(record));
        assert!(store.read(&Digest::of(b"absent")).unwrap().is_none());
    }

    #[test]
    fn equal_records_share_one_entry() {
        let store = InMemoryObjectStore::new();
        let first = store.write(&node(b"same")).unwrap();
        let second = store.write(&node(b"same")).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.len(), 1);
        assert_eq!(store.read(&first).unwrap().unwrap().compute_id(), first);
    }

    #[test]
    fn kinds_hash_into_separate_domains() {
        let store = InMemoryObjectStore::new();
        let as_node = store.write(&node(b"bytes")).unwrap();
        let as_page = store
            .write(&StoredObject::new(ObjectKind::Page, b"bytes".to_vec()))
            .unwrap();
        assert_ne!(as_node, as_page);
        assert_eq!(store.count(ObjectKind::Node), 1);
        assert_eq!(store.count(ObjectKind::Page), 1);
        assert_eq!(store.count(ObjectKind::Version), 0);
    }

    #[test]
    fn delete_reports_presence() {
        let store = InMemoryObjectStore::new();
        let digest = store.write(&node(b"gone")).unwrap();
        assert!(store.exists(&digest).unwrap());
        assert!(store.delete(&digest).unwrap());
        assert!(!store.exists(&digest).unwrap());
        assert!(!store.delete(&digest).unwrap());
    }

    #[test]
    fn batch_read_keeps_request_order() {
        let store = InMemoryObjectStore::new();
        let records = [node(b"a"), node(b"b")];
        let digests = store.write_batch(&records).unwrap();
        let request = [digests[1], Digest::of(b"absent"), digests[0]];
        let found = store.read_batch(&request).unwrap();
        assert_eq!(found[0].as_ref(), Some(&records[1]));
        assert!(found[1].is_none());
        assert_eq!(found[2].as_ref(), Some(&records[0]));
    }

    #[test]
    fn digests_are_sorted() {
        let store = InMemoryObjectStore::new();
        for i in 0..5u8 {
            store.write(&node(&[i])).unwrap();
        }
        let digests = store.digests();
        assert_eq!(digests.len(), 5);
        assert!(digests.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn parallel_writers() {
        let store = Arc::new(InMemoryObjectStore::new());
        let handles: Vec<_> = (0..8u8)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    store.write(&node(b"shared")).unwrap();
                    store.write(&node(&[i])).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("writer thread should not panic");
        }
        assert_eq!(store.len(), 9);
        assert!(format!("{store:?}").contains("records: 9"));
    }
}
