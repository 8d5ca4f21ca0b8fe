use async_trait::async_trait;
use sylva_types::Digest;

use crate::error::{StoreError, StoreResult};
use crate::object::{ObjectKind, Record, StoredObject};

/// Content-addressed record store.
///
/// All implementations must satisfy these invariants:
/// - Records are immutable once written. The same kind and bytes always
///   produce the same digest.
/// - Writes are idempotent and safe to issue concurrently.
/// - The store never interprets record contents.
/// - All I/O errors are propagated, never silently ignored.
pub trait ObjectStore: Send + Sync {
    /// Read a record by digest.
    ///
    /// Returns `Ok(None)` if the record does not exist.
    /// Returns `Err` on I/O failure or data corruption.
    fn read(&self, id: &Digest) -> StoreResult<Option<StoredObject>>;

    /// Write a record and return its digest.
    ///
    /// If the record already exists, this is a no-op.
    fn write(&self, object: &StoredObject) -> StoreResult<Digest>;

    fn exists(&self, id: &Digest) -> StoreResult<bool>;

    /// Delete a record by digest. Returns `true` if the record existed.
    ///
    /// Intended for garbage collection only. Deleting a referenced record
    /// corrupts every tree that reaches it.
    fn delete(&self, id: &Digest) -> StoreResult<bool>;

    /// Read a record that must exist.
    fn get(&self, id: &Digest) -> StoreResult<StoredObject> {
        self.read(id)?.ok_or(StoreError::NotFound(*id))
    }

    /// Store raw bytes under the given kind.
    fn put(&self, kind: ObjectKind, data: Vec<u8>) -> StoreResult<Digest> {
        self.write(&StoredObject::new(kind, data))
    }

    /// Read multiple records in a batch.
    ///
    /// Default implementation calls `read()` for each digest. Backends may
    /// override for fewer round-trips.
    fn read_batch(&self, ids: &[Digest]) -> StoreResult<Vec<Option<StoredObject>>> {
        ids.iter().map(|id| self.read(id)).collect()
    }

    fn write_batch(&self, objects: &[StoredObject]) -> StoreResult<Vec<Digest>> {
        objects.iter().map(|obj| self.write(obj)).collect()
    }
}

impl<S: ObjectStore + ?Sized> ObjectStore for std::sync::Arc<S> {
    fn read(&self, id: &Digest) -> StoreResult<Option<StoredObject>> {
        (**self).read(id)
    }

    fn write(&self, object: &StoredObject) -> StoreResult<Digest> {
        (**self).write(object)
    }

    fn exists(&self, id: &Digest) -> StoreResult<bool> {
        (**self).exists(id)
    }

    fn delete(&self, id: &Digest) -> StoreResult<bool> {
        (**self).delete(id)
    }

    fn read_batch(&self, ids: &[Digest]) -> StoreResult<Vec<Option<StoredObject>>> {
        (**self).read_batch(ids)
    }

    fn write_batch(&self, objects: &[StoredObject]) -> StoreResult<Vec<Digest>> {
        (**self).write_batch(objects)
    }
}

/// Typed access to records, available on every [`ObjectStore`] including
/// `dyn ObjectStore`.
pub trait RecordStoreExt: ObjectStore {
    /// Load and decode a record that must exist.
    fn load<R: Record>(&self, id: &Digest) -> StoreResult<R> {
        R::from_stored_object(&self.get(id)?)
    }

    /// Encode and store a record.
    fn save<R: Record>(&self, record: &R) -> StoreResult<Digest> {
        self.write(&record.to_stored_object()?)
    }
}

impl<S: ObjectStore + ?Sized> RecordStoreExt for S {}

/// Suspension-capable call shape of an object store.
///
/// Every blocking [`ObjectStore`] implements this trait, so async callers
/// can be written against it regardless of backend.
#[async_trait]
pub trait AsyncObjectStore: Send + Sync {
    async fn read_async(&self, id: &Digest) -> StoreResult<Option<StoredObject>>;

    async fn write_async(&self, object: &StoredObject) -> StoreResult<Digest>;

    async fn exists_async(&self, id: &Digest) -> StoreResult<bool>;

    async fn read_batch_async(&self, ids: &[Digest]) -> StoreResult<Vec<Option<StoredObject>>>;

    async fn get_async(&self, id: &Digest) -> StoreResult<StoredObject> {
        self.read_async(id).await?.ok_or(StoreError::NotFound(*id))
    }
}

#[async_trait]
impl<S: ObjectStore + ?Sized> AsyncObjectStore for S {
    async fn read_async(&self, id: &Digest) -> StoreResult<Option<StoredObject>> {
        self.read(id)
    }

    async fn write_async(&self, object: &StoredObject) -> StoreResult<Digest> {
        self.write(object)
    }

    async fn exists_async(&self, id: &Digest) -> StoreResult<bool> {
        self.exists(id)
    }

    async fn read_batch_async(&self, ids: &[Digest]) -> StoreResult<Vec<Option<StoredObject>>> {
        self.read_batch(ids)
    }
}
