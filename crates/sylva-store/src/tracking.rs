use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use sylva_types::Digest;

use crate::error::StoreResult;
use crate::object::StoredObject;
use crate::traits::ObjectStore;

/// Wraps a store and counts the reads that reach it.
///
/// Used to assert how many backend round-trips an operation costs, e.g.
/// that a warmed cache never re-fetches a record.
pub struct AccessTrackingStore<S> {
    inner: S,
    reads: AtomicU64,
    batches: AtomicU64,
    writes: AtomicU64,
    per_record: Mutex<HashMap<Digest, u64>>,
}

impl<S: ObjectStore> AccessTrackingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            reads: AtomicU64::new(0),
            batches: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            per_record: Mutex::new(HashMap::new()),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Total records requested, whether singly or in batches.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of `read_batch` calls.
    pub fn batches(&self) -> u64 {
        self.batches.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// How often `id` was requested.
    pub fn reads_of(&self, id: &Digest) -> u64 {
        self.per_record
            .lock()
            .expect("access counter mutex poisoned")
            .get(id)
            .copied()
            .unwrap_or(0)
    }

    pub fn reset(&self) {
        self.reads.store(0, Ordering::SeqCst);
        self.batches.store(0, Ordering::SeqCst);
        self.writes.store(0, Ordering::SeqCst);
        self.per_record.lock().expect("access counter mutex poisoned").clear();
    }

    fn record(&self, ids: &[Digest]) {
        self.reads.fetch_add(ids.len() as u64, Ordering::SeqCst);
        let mut per_record = self.per_record.lock().expect("access counter mutex poisoned");
        for id in ids {
            *per_record.entry(*id).or_insert(0) += 1;
        }
    }
}

impl<S: ObjectStore> ObjectStore for AccessTrackingStore<S> {
    fn read(&self, id: &Digest) -> StoreResult<Option<StoredObject>> {
        self.record(std::slice::from_ref(id));
        self.inner.read(id)
    }

    fn write(&self, object: &StoredObject) -> StoreResult<Digest> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.write(object)
    }

    fn exists(&self, id: &Digest) -> StoreResult<bool> {
        self.inner.exists(id)
    }

    fn delete(&self, id: &Digest) -> StoreResult<bool> {
        self.inner.delete(id)
    }

    fn read_batch(&self, ids: &[Digest]) -> StoreResult<Vec<Option<StoredObject>>> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        self.record(ids);
        self.inner.read_batch(ids)
    }
}

impl<S> std::fmt::Debug for AccessTrackingStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessTrackingStore")
            .field("reads", &self.reads.load(Ordering::SeqCst))
            .field("batches", &self.batches.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryObjectStore;
    use crate::object::ObjectKind;

    #[test]
    fn counts_single_and_batched_reads() {
        let store = AccessTrackingStore::new(InMemoryObjectStore::new());
        let a = store.put(ObjectKind::Blob, b"a".to_vec()).unwrap();
        let b = store.put(ObjectKind::Blob, b"b".to_vec()).unwrap();
        assert_eq!(store.writes(), 2);

        store.read(&a).unwrap();
        store.read_batch(&[a, b]).unwrap();
        assert_eq!(store.reads(), 3);
        assert_eq!(store.batches(), 1);
        assert_eq!(store.reads_of(&a), 2);
        assert_eq!(store.reads_of(&b), 1);

        store.reset();
        assert_eq!(store.reads(), 0);
        assert_eq!(store.reads_of(&a), 0);
    }

    #[test]
    fn get_goes_through_read() {
        let store = AccessTrackingStore::new(InMemoryObjectStore::new());
        let id = store.put(ObjectKind::Blob, b"x".to_vec()).unwrap();
        store.get(&id).unwrap();
        assert_eq!(store.reads(), 1);
    }
}
