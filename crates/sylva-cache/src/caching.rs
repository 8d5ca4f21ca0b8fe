use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use lru::LruCache;
use sylva_store::{AsyncObjectStore, ObjectStore, Record, StoreError, StoredObject};
use sylva_types::Digest;
use tracing::debug;

use crate::CacheResult;

/// Point-in-time cache counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub len: usize,
    pub capacity: usize,
}

/// A transparent, bounded caching proxy over an [`ObjectStore`].
///
/// Reads are served from an LRU keyed by digest; misses fall through to the
/// inner store and populate the cache. Writes pass through and populate the
/// cache as well.
pub struct CachingStore<S> {
    inner: S,
    cache: Mutex<LruCache<Digest, StoredObject>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<S: ObjectStore> CachingStore<S> {
    pub fn new(inner: S, capacity: NonZeroUsize) -> Self {
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Like [`CachingStore::new`]; a capacity of zero is raised to one.
    pub fn with_capacity(inner: S, capacity: usize) -> Self {
        Self::new(inner, NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN))
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn stats(&self) -> CacheStats {
        let cache = self.cache.lock().expect("cache mutex poisoned");
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            len: cache.len(),
            capacity: cache.cap().get(),
        }
    }

    pub fn contains(&self, id: &Digest) -> bool {
        self.cache.lock().expect("cache mutex poisoned").contains(id)
    }

    /// Resolve `ids` in order, mapping each record through `mapper`.
    ///
    /// All ids not already cached are fetched with a single batched read
    /// of the inner store. Any id missing from the store fails the whole
    /// call with [`StoreError::NotFound`].
    pub fn get_all<T>(
        &self,
        ids: &[Digest],
        mapper: impl Fn(&StoredObject) -> CacheResult<T>,
    ) -> CacheResult<Vec<T>> {
        let (mut found, missing) = self.partition(ids);
        if !missing.is_empty() {
            let fetched = self.inner.read_batch(&missing)?;
            self.absorb(&missing, fetched, &mut found)?;
        }
        self.resolve(ids, found, mapper)
    }

    /// Async form of [`CachingStore::get_all`], fetching misses through the
    /// suspension-capable store shape.
    pub async fn get_all_async<T>(
        &self,
        ids: &[Digest],
        mapper: impl Fn(&StoredObject) -> CacheResult<T>,
    ) -> CacheResult<Vec<T>> {
        let (mut found, missing) = self.partition(ids);
        if !missing.is_empty() {
            let fetched = self.inner.read_batch_async(&missing).await?;
            self.absorb(&missing, fetched, &mut found)?;
        }
        self.resolve(ids, found, mapper)
    }

    /// Decode records of one type.
    pub fn get_records<R: Record>(&self, ids: &[Digest]) -> CacheResult<Vec<R>> {
        self.get_all(ids, R::from_stored_object)
    }

    /// Warm the cache for `ids`. Returns the number of records fetched.
    ///
    /// Ids absent from the inner store are ignored.
    pub fn prefetch(&self, ids: &[Digest]) -> CacheResult<usize> {
        let (_, missing) = self.partition(ids);
        if missing.is_empty() {
            return Ok(0);
        }
        let fetched = self.inner.read_batch(&missing)?;
        let mut cache = self.cache.lock().expect("cache mutex poisoned");
        let mut count = 0;
        for (id, object) in missing.iter().zip(fetched) {
            if let Some(object) = object {
                cache.put(*id, object);
                count += 1;
            }
        }
        debug!(requested = ids.len(), fetched = count, "prefetched records");
        Ok(count)
    }

    /// Split `ids` into cached records and distinct uncached digests.
    fn partition(&self, ids: &[Digest]) -> (Vec<(Digest, StoredObject)>, Vec<Digest>) {
        let mut cache = self.cache.lock().expect("cache mutex poisoned");
        let mut found = Vec::new();
        let mut missing = Vec::new();
        let mut seen = HashSet::new();
        for id in ids {
            if !seen.insert(*id) {
                continue;
            }
            match cache.get(id) {
                Some(object) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    found.push((*id, object.clone()));
                }
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    missing.push(*id);
                }
            }
        }
        (found, missing)
    }

    fn absorb(
        &self,
        missing: &[Digest],
        fetched: Vec<Option<StoredObject>>,
        found: &mut Vec<(Digest, StoredObject)>,
    ) -> CacheResult<()> {
        debug!(missing = missing.len(), "batched cache fill");
        let mut cache = self.cache.lock().expect("cache mutex poisoned");
        for (id, object) in missing.iter().zip(fetched) {
            let object = object.ok_or(StoreError::NotFound(*id))?;
            cache.put(*id, object.clone());
            found.push((*id, object));
        }
        Ok(())
    }

    fn resolve<T>(
        &self,
        ids: &[Digest],
        found: Vec<(Digest, StoredObject)>,
        mapper: impl Fn(&StoredObject) -> CacheResult<T>,
    ) -> CacheResult<Vec<T>> {
        let found: std::collections::HashMap<Digest, StoredObject> = found.into_iter().collect();
        ids.iter()
            .map(|id| {
                let object = found.get(id).ok_or(StoreError::NotFound(*id))?;
                mapper(object)
            })
            .collect()
    }
}

impl<S: ObjectStore> ObjectStore for CachingStore<S> {
    fn read(&self, id: &Digest) -> CacheResult<Option<StoredObject>> {
        if let Some(object) = self.cache.lock().expect("cache mutex poisoned").get(id) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Some(object.clone()));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let object = self.inner.read(id)?;
        if let Some(object) = &object {
            self.cache
                .lock()
                .expect("cache mutex poisoned")
                .put(*id, object.clone());
        }
        Ok(object)
    }

    fn write(&self, object: &StoredObject) -> CacheResult<Digest> {
        let id = self.inner.write(object)?;
        self.cache
            .lock()
            .expect("cache mutex poisoned")
            .put(id, object.clone());
        Ok(id)
    }

    fn exists(&self, id: &Digest) -> CacheResult<bool> {
        if self.contains(id) {
            return Ok(true);
        }
        self.inner.exists(id)
    }

    fn delete(&self, id: &Digest) -> CacheResult<bool> {
        self.cache.lock().expect("cache mutex poisoned").pop(id);
        self.inner.delete(id)
    }

    fn read_batch(&self, ids: &[Digest]) -> CacheResult<Vec<Option<StoredObject>>> {
        let (found, missing) = self.partition(ids);
        let mut found: std::collections::HashMap<Digest, StoredObject> =
            found.into_iter().collect();
        if !missing.is_empty() {
            let fetched = self.inner.read_batch(&missing)?;
            let mut cache = self.cache.lock().expect("cache mutex poisoned");
            for (id, object) in missing.iter().zip(fetched) {
                if let Some(object) = object {
                    cache.put(*id, object.clone());
                    found.insert(*id, object);
                }
            }
        }
        Ok(ids.iter().map(|id| found.get(id).cloned()).collect())
    }
}

impl<S> std::fmt::Debug for CachingStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachingStore")
            .field("hits", &self.hits.load(Ordering::Relaxed))
            .field("misses", &self.misses.load(Ordering::Relaxed))
            .finish()
    }
}
