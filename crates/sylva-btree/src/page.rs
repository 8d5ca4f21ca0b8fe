use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sylva_store::{ObjectKind, Record};
use sylva_types::Digest;

/// Link from a page to a child page.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildRef {
    pub digest: Digest,
    /// Number of entries in the child's subtree.
    pub count: u64,
}

/// One immutable B-tree page.
///
/// Leaf pages have no children. Internal pages have exactly
/// `entries.len() + 1` children; every key under `children[i]` sorts
/// strictly between `entries[i - 1]` and `entries[i]`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<K, V> {
    pub entries: Vec<(K, V)>,
    pub children: Vec<ChildRef>,
}

impl<K, V> Page<K, V> {
    pub fn leaf(entries: Vec<(K, V)>) -> Self {
        Self {
            entries,
            children: Vec::new(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Entries in this page and all of its descendants.
    pub fn count(&self) -> u64 {
        self.entries.len() as u64 + self.children.iter().map(|c| c.count).sum::<u64>()
    }
}

impl<K, V> Record for Page<K, V>
where
    K: Serialize + DeserializeOwned,
    V: Serialize + DeserializeOwned,
{
    const KIND: ObjectKind = ObjectKind::Page;
}
