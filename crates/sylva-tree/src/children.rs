use serde::{Deserialize, Serialize};
use sylva_btree::{BTree, BTreeConfig};
use sylva_store::ObjectStore;
use sylva_types::{Digest, NodeId};

use crate::error::TreeResult;
use crate::order_key::OrderKey;

/// Stable sort key of a child: order key first, node id as tie-break.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChildKey {
    pub position: OrderKey,
    pub id: NodeId,
}

/// One child link: where the child sorts and which record it is.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildEntry {
    pub key: ChildKey,
    pub digest: Digest,
}

/// The ordered children of one role.
///
/// Short lists live inline in the node record. Long lists live in a
/// persistent B-tree so that an insert rewrites O(log n) pages instead of
/// the whole list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChildList {
    Inline(Vec<ChildEntry>),
    Paged(BTree<ChildKey, Digest>),
}

/// Layout parameters for one list operation.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ListLayout {
    pub inline_threshold: usize,
    pub btree: BTreeConfig<ChildKey>,
}

impl ChildList {
    pub fn empty() -> Self {
        Self::Inline(Vec::new())
    }

    pub fn len(&self) -> u64 {
        match self {
            Self::Inline(entries) => entries.len() as u64,
            Self::Paged(tree) => tree.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_paged(&self) -> bool {
        matches!(self, Self::Paged(_))
    }

    /// All entries in order.
    pub fn entries<S: ObjectStore + ?Sized>(&self, store: &S) -> TreeResult<Vec<ChildEntry>> {
        match self {
            Self::Inline(entries) => Ok(entries.clone()),
            Self::Paged(tree) => Ok(tree
                .entries(store)?
                .into_iter()
                .map(|(key, digest)| ChildEntry { key, digest })
                .collect()),
        }
    }

    /// The entry at `index`.
    pub fn get<S: ObjectStore + ?Sized>(
        &self,
        store: &S,
        index: u64,
    ) -> TreeResult<Option<ChildEntry>> {
        match self {
            Self::Inline(entries) => Ok(entries.get(index as usize).cloned()),
            Self::Paged(tree) => Ok(tree
                .nth(store, index)?
                .map(|(key, digest)| ChildEntry { key, digest })),
        }
    }

    pub(crate) fn find<S: ObjectStore + ?Sized>(
        &self,
        store: &S,
        layout: &ListLayout,
        key: &ChildKey,
    ) -> TreeResult<Option<Digest>> {
        match self {
            Self::Inline(entries) => Ok(entries
                .binary_search_by(|e| e.key.cmp(key))
                .ok()
                .map(|i| entries[i].digest)),
            Self::Paged(tree) => Ok(tree.get(store, &layout.btree, key)?),
        }
    }

    pub(crate) fn position<S: ObjectStore + ?Sized>(
        &self,
        store: &S,
        layout: &ListLayout,
        key: &ChildKey,
    ) -> TreeResult<Option<u64>> {
        match self {
            Self::Inline(entries) => Ok(entries
                .binary_search_by(|e| e.key.cmp(key))
                .ok()
                .map(|i| i as u64)),
            Self::Paged(tree) => Ok(tree.rank(store, &layout.btree, key)?),
        }
    }

    /// Insert or overwrite the entry for `entry.key`.
    pub(crate) fn upsert<S: ObjectStore + ?Sized>(
        self,
        store: &S,
        layout: &ListLayout,
        entry: ChildEntry,
    ) -> TreeResult<Self> {
        match self {
            Self::Inline(mut entries) => {
                match entries.binary_search_by(|e| e.key.cmp(&entry.key)) {
                    Ok(i) => entries[i] = entry,
                    Err(i) => entries.insert(i, entry),
                }
                if entries.len() > layout.inline_threshold {
                    let tree = BTree::from_entries(
                        store,
                        &layout.btree,
                        entries.into_iter().map(|e| (e.key, e.digest)),
                    )?;
                    return Ok(Self::Paged(tree));
                }
                Ok(Self::Inline(entries))
            }
            Self::Paged(tree) => Ok(Self::Paged(tree.put(
                store,
                &layout.btree,
                entry.key,
                entry.digest,
            )?)),
        }
    }

    /// Remove the entry for `key`, returning the child's digest.
    pub(crate) fn remove<S: ObjectStore + ?Sized>(
        self,
        store: &S,
        layout: &ListLayout,
        key: &ChildKey,
    ) -> TreeResult<(Self, Option<Digest>)> {
        match self {
            Self::Inline(mut entries) => {
                let removed = entries
                    .binary_search_by(|e| e.key.cmp(key))
                    .ok()
                    .map(|i| entries.remove(i).digest);
                Ok((Self::Inline(entries), removed))
            }
            Self::Paged(tree) => {
                let (tree, removed) = tree.remove(store, &layout.btree, key)?;
                if (tree.len() as usize) < layout.inline_threshold / 2 {
                    let entries = tree
                        .entries(store)?
                        .into_iter()
                        .map(|(key, digest)| ChildEntry { key, digest })
                        .collect();
                    return Ok((Self::Inline(entries), removed));
                }
                Ok((Self::Paged(tree), removed))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use sylva_store::InMemoryObjectStore;

    use super::*;

    fn layout(threshold: usize) -> ListLayout {
        ListLayout {
            inline_threshold: threshold,
            btree: BTreeConfig::natural().with_max_entries(4).unwrap(),
        }
    }

    fn entry(i: u64, position: &OrderKey) -> ChildEntry {
        ChildEntry {
            key: ChildKey {
                position: position.clone(),
                id: NodeId::from_raw(i),
            },
            digest: Digest::of(&i.to_le_bytes()),
        }
    }

    #[test]
    fn equal_positions_are_ordered_by_id() {
        let store = InMemoryObjectStore::new();
        let layout = layout(8);
        let position = OrderKey::between(None, None);
        let list = ChildList::empty()
            .upsert(&store, &layout, entry(9, &position))
            .unwrap()
            .upsert(&store, &layout, entry(3, &position))
            .unwrap();
        let ids: Vec<u64> = list
            .entries(&store)
            .unwrap()
            .iter()
            .map(|e| e.key.id.raw())
            .collect();
        assert_eq!(ids, vec![3, 9]);
    }

    #[test]
    fn grows_into_btree_and_shrinks_back() {
        let store = InMemoryObjectStore::new();
        let layout = layout(8);
        let keys = OrderKey::sequence(None, None, 12);
        let mut list = ChildList::empty();
        for (i, k) in keys.iter().enumerate() {
            list = list.upsert(&store, &layout, entry(i as u64, k)).unwrap();
            assert_eq!(list.is_paged(), i + 1 > 8);
        }
        assert_eq!(list.len(), 12);
        assert_eq!(list.get(&store, 5).unwrap().unwrap().key.id.raw(), 5);

        for (i, k) in keys.iter().enumerate().take(9) {
            let key = entry(i as u64, k).key;
            assert_eq!(list.position(&store, &layout, &key).unwrap(), Some(0));
            let (next, removed) = list.remove(&store, &layout, &key).unwrap();
            assert!(removed.is_some());
            list = next;
        }
        // 3 left, below half the threshold.
        assert!(!list.is_paged());
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn paged_positions_follow_key_order() {
        let store = InMemoryObjectStore::new();
        let layout = layout(4);
        let keys = OrderKey::sequence(None, None, 30);
        let mut list = ChildList::empty();
        for (i, k) in keys.iter().enumerate().rev() {
            list = list.upsert(&store, &layout, entry(i as u64, k)).unwrap();
        }
        assert!(list.is_paged());
        for (i, k) in keys.iter().enumerate() {
            let key = entry(i as u64, k).key;
            assert_eq!(list.position(&store, &layout, &key).unwrap(), Some(i as u64));
            assert_eq!(list.get(&store, i as u64).unwrap().unwrap().key, key);
        }
        let missing = entry(99, &keys[3]).key;
        assert_eq!(list.position(&store, &layout, &missing).unwrap(), None);
    }

    #[test]
    fn serde_roundtrip_of_both_layouts() {
        let store = InMemoryObjectStore::new();
        let layout = layout(2);
        let keys = OrderKey::sequence(None, None, 3);
        let inline = ChildList::empty()
            .upsert(&store, &layout, entry(1, &keys[0]))
            .unwrap();
        let paged = keys
            .iter()
            .enumerate()
            .try_fold(ChildList::empty(), |list, (i, k)| {
                list.upsert(&store, &layout, entry(i as u64, k))
            })
            .unwrap();
        assert!(!inline.is_paged());
        assert!(paged.is_paged());
        for list in [inline, paged] {
            let json = serde_json::to_string(&list).unwrap();
            let back: ChildList = serde_json::from_str(&json).unwrap();
            assert_eq!(back.entries(&store).unwrap(), list.entries(&store).unwrap());
            assert_eq!(back, list);
        }
    }

    #[test]
    fn find_and_missing_remove() {
        let store = InMemoryObjectStore::new();
        let layout = layout(8);
        let k = OrderKey::between(None, None);
        let e = entry(1, &k);
        let list = ChildList::empty().upsert(&store, &layout, e.clone()).unwrap();
        assert_eq!(list.find(&store, &layout, &e.key).unwrap(), Some(e.digest));
        let missing = entry(2, &k).key;
        let (same, removed) = list.clone().remove(&store, &layout, &missing).unwrap();
        assert_eq!(removed, None);
        assert_eq!(same, list);
    }
}
