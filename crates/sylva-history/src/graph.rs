//! Traversals over the version DAG.
//!
//! The DAG lives entirely in the object store: every version names its
//! parents by digest. Traversals load versions on demand.

use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use sylva_store::ObjectStore;
use sylva_types::{Digest, TemporalAnchor};

use crate::error::HistoryResult;
use crate::version::Version;

/// Read access to the history stored in `S`.
pub struct History<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S: ObjectStore + ?Sized> History<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    pub fn load(&self, digest: Digest) -> HistoryResult<Version> {
        Version::load(self.store, digest)
    }

    /// Whether `ancestor` is reachable from `descendant` (or equal to it).
    pub fn is_ancestor(&self, ancestor: Digest, descendant: Digest) -> HistoryResult<bool> {
        if ancestor == descendant {
            return Ok(true);
        }
        let target = self.load(ancestor)?.timestamp();

        let mut visited = HashSet::from([descendant]);
        let mut queue = VecDeque::from([descendant]);
        while let Some(current) = queue.pop_front() {
            let version = self.load(current)?;
            // Parents are strictly older than their children.
            if version.timestamp() <= target {
                continue;
            }
            for parent in version.parents() {
                if *parent == ancestor {
                    return Ok(true);
                }
                if visited.insert(*parent) {
                    queue.push_back(*parent);
                }
            }
        }
        Ok(false)
    }

    /// `head` and every version reachable from it.
    pub fn ancestors(&self, head: Digest) -> HistoryResult<HashMap<Digest, Version>> {
        let mut found = HashMap::new();
        let mut queue = VecDeque::from([head]);
        while let Some(current) = queue.pop_front() {
            if found.contains_key(&current) {
                continue;
            }
            let version = self.load(current)?;
            queue.extend(version.parents().iter().copied());
            found.insert(current, version);
        }
        Ok(found)
    }

    /// The latest-timestamped version reachable from both `a` and `b`.
    ///
    /// Ties on timestamp are broken by digest. Returns `None` for unrelated
    /// histories.
    pub fn common_ancestor(&self, a: Digest, b: Digest) -> HistoryResult<Option<Version>> {
        if a == b {
            return Ok(Some(self.load(a)?));
        }
        let ancestors_a = self.ancestors(a)?;
        let mut ancestors_b = self.ancestors(b)?;
        Ok(ancestors_a
            .into_keys()
            .filter_map(|d| ancestors_b.remove(&d))
            .max_by_key(Version::order_key))
    }

    /// Versions reachable from `head`, newest first, at most `limit`.
    pub fn log(&self, head: Digest, limit: usize) -> HistoryResult<Vec<Version>> {
        let mut out = Vec::new();
        let mut seen = HashSet::from([head]);
        let mut heap: BinaryHeap<(TemporalAnchor, Digest)> = BinaryHeap::new();
        let first = self.load(head)?;
        heap.push(first.order_key());

        while let Some((_, digest)) = heap.pop() {
            if out.len() == limit {
                break;
            }
            let version = self.load(digest)?;
            for parent in version.parents() {
                if seen.insert(*parent) {
                    let timestamp = self.load(*parent)?.timestamp();
                    heap.push((timestamp, *parent));
                }
            }
            out.push(version);
        }
        Ok(out)
    }
}
