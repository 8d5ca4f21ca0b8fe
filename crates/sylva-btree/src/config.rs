use std::cmp::Ordering;
use std::fmt;

use crate::error::{BTreeError, BTreeResult};

/// Default maximum number of entries per page.
pub const DEFAULT_MAX_ENTRIES: usize = 32;

/// Shape and key ordering of a persistent B-tree.
///
/// The comparison function must be a total order and must never change for
/// a given tree; pages written under one ordering are unreadable under
/// another.
pub struct BTreeConfig<K> {
    max_entries: usize,
    compare: fn(&K, &K) -> Ordering,
}

impl<K> BTreeConfig<K> {
    pub fn new(max_entries: usize, compare: fn(&K, &K) -> Ordering) -> BTreeResult<Self> {
        if max_entries < 2 {
            return Err(BTreeError::InvalidConfig(format!(
                "max_entries must be at least 2, got {max_entries}"
            )));
        }
        Ok(Self {
            max_entries,
            compare,
        })
    }

    /// Same ordering, different page size.
    pub fn with_max_entries(self, max_entries: usize) -> BTreeResult<Self> {
        Self::new(max_entries, self.compare)
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Minimum fill of every non-root page.
    pub fn min_entries(&self) -> usize {
        self.max_entries / 2
    }

    pub fn compare(&self, a: &K, b: &K) -> Ordering {
        (self.compare)(a, b)
    }
}

impl<K: Ord> BTreeConfig<K> {
    /// Keys ordered by their `Ord` implementation.
    pub fn natural() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            compare: K::cmp,
        }
    }
}

impl<K: Ord> Default for BTreeConfig<K> {
    fn default() -> Self {
        Self::natural()
    }
}

impl<K> Clone for BTreeConfig<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for BTreeConfig<K> {}

impl<K> fmt::Debug for BTreeConfig<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BTreeConfig")
            .field("max_entries", &self.max_entries)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_tiny_pages() {
        assert!(BTreeConfig::<u32>::new(1, u32::cmp).is_err());
        assert!(BTreeConfig::<u32>::new(2, u32::cmp).is_ok());
    }

    #[test]
    fn min_is_half_of_max() {
        let config = BTreeConfig::<u32>::natural().with_max_entries(5).unwrap();
        assert_eq!(config.min_entries(), 2);
        assert_eq!(config.max_entries(), 5);
    }

    #[test]
    fn custom_ordering() {
        let reversed = BTreeConfig::<u32>::new(4, |a, b| b.cmp(a)).unwrap();
        assert_eq!(reversed.compare(&1, &2), Ordering::Greater);
    }
}
