use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sylva_store::{ObjectStore, RecordStoreExt};
use sylva_types::Digest;
use tracing::debug;

use crate::config::BTreeConfig;
use crate::error::{BTreeError, BTreeResult};
use crate::page::{ChildRef, Page};

/// Handle to a persistent B-tree: root page digest plus entry count.
///
/// Handles are plain values. Mutating operations return a new handle and
/// never touch pages reachable from the old one.
#[derive(Serialize, Deserialize)]
#[serde(bound = "")]
pub struct BTree<K, V> {
    root: Option<Digest>,
    len: u64,
    #[serde(skip)]
    _marker: PhantomData<fn() -> (K, V)>,
}

enum Inserted<K, V> {
    Single(Page<K, V>),
    Split(Page<K, V>, (K, V), Page<K, V>),
}

impl<K, V> BTree<K, V>
where
    K: Clone + Serialize + DeserializeOwned,
    V: Clone + Serialize + DeserializeOwned,
{
    /// The empty tree. Has no pages.
    pub fn empty() -> Self {
        Self::from_parts(None, 0)
    }

    /// Rebuild a handle from a stored root digest and entry count.
    pub fn from_parts(root: Option<Digest>, len: u64) -> Self {
        Self {
            root,
            len,
            _marker: PhantomData,
        }
    }

    pub fn root(&self) -> Option<Digest> {
        self.root
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    // ---- Reads ----

    pub fn get<S>(&self, store: &S, config: &BTreeConfig<K>, key: &K) -> BTreeResult<Option<V>>
    where
        S: ObjectStore + ?Sized,
    {
        let mut next = self.root;
        while let Some(digest) = next {
            let page: Page<K, V> = store.load(&digest)?;
            match search(config, &page, key) {
                Ok(i) => return Ok(Some(page.entries[i].1.clone())),
                Err(_) if page.is_leaf() => return Ok(None),
                Err(i) => next = Some(page.children[i].digest),
            }
        }
        Ok(None)
    }

    pub fn contains_key<S>(&self, store: &S, config: &BTreeConfig<K>, key: &K) -> BTreeResult<bool>
    where
        S: ObjectStore + ?Sized,
    {
        Ok(self.get(store, config, key)?.is_some())
    }

    /// The entry at in-order position `index`.
    pub fn nth<S>(&self, store: &S, index: u64) -> BTreeResult<Option<(K, V)>>
    where
        S: ObjectStore + ?Sized,
    {
        if index >= self.len {
            return Ok(None);
        }
        let mut remaining = index;
        let mut next = self.root;
        'pages: while let Some(digest) = next {
            let page: Page<K, V> = store.load(&digest)?;
            if page.is_leaf() {
                return Ok(page.entries.get(remaining as usize).cloned());
            }
            for (i, child) in page.children.iter().enumerate() {
                if remaining < child.count {
                    next = Some(child.digest);
                    continue 'pages;
                }
                remaining -= child.count;
                if i < page.entries.len() {
                    if remaining == 0 {
                        return Ok(Some(page.entries[i].clone()));
                    }
                    remaining -= 1;
                }
            }
            return Ok(None);
        }
        Ok(None)
    }

    /// In-order position of `key`, if present.
    pub fn rank<S>(&self, store: &S, config: &BTreeConfig<K>, key: &K) -> BTreeResult<Option<u64>>
    where
        S: ObjectStore + ?Sized,
    {
        let mut before = 0u64;
        let mut next = self.root;
        while let Some(digest) = next {
            let page: Page<K, V> = store.load(&digest)?;
            let (i, found) = match search(config, &page, key) {
                Ok(i) => (i, true),
                Err(i) => (i, false),
            };
            before += i as u64;
            if !page.is_leaf() {
                before += page.children[..i].iter().map(|c| c.count).sum::<u64>();
            }
            if found {
                let left = page.children.get(i).map_or(0, |c| c.count);
                return Ok(Some(before + left));
            }
            if page.is_leaf() {
                return Ok(None);
            }
            next = Some(page.children[i].digest);
        }
        Ok(None)
    }

    pub fn first<S>(&self, store: &S) -> BTreeResult<Option<(K, V)>>
    where
        S: ObjectStore + ?Sized,
    {
        self.edge(store, |page| page.children.first(), |page| page.entries.first())
    }

    pub fn last<S>(&self, store: &S) -> BTreeResult<Option<(K, V)>>
    where
        S: ObjectStore + ?Sized,
    {
        self.edge(store, |page| page.children.last(), |page| page.entries.last())
    }

    fn edge<S>(
        &self,
        store: &S,
        child: impl Fn(&Page<K, V>) -> Option<&ChildRef>,
        entry: impl Fn(&Page<K, V>) -> Option<&(K, V)>,
    ) -> BTreeResult<Option<(K, V)>>
    where
        S: ObjectStore + ?Sized,
    {
        let mut next = self.root;
        while let Some(digest) = next {
            let page: Page<K, V> = store.load(&digest)?;
            match child(&page) {
                Some(c) => next = Some(c.digest),
                None => return Ok(entry(&page).cloned()),
            }
        }
        Ok(None)
    }

    /// All entries in key order.
    pub fn entries<S>(&self, store: &S) -> BTreeResult<Vec<(K, V)>>
    where
        S: ObjectStore + ?Sized,
    {
        let mut out = Vec::with_capacity(self.len as usize);
        if let Some(root) = self.root {
            collect(store, &root, &mut out)?;
        }
        Ok(out)
    }

    pub fn keys<S>(&self, store: &S) -> BTreeResult<Vec<K>>
    where
        S: ObjectStore + ?Sized,
    {
        Ok(self.entries(store)?.into_iter().map(|(k, _)| k).collect())
    }

    pub fn values<S>(&self, store: &S) -> BTreeResult<Vec<V>>
    where
        S: ObjectStore + ?Sized,
    {
        Ok(self.entries(store)?.into_iter().map(|(_, v)| v).collect())
    }

    // ---- Writes ----

    /// Insert or overwrite `key`.
    pub fn put<S>(&self, store: &S, config: &BTreeConfig<K>, key: K, value: V) -> BTreeResult<Self>
    where
        S: ObjectStore + ?Sized,
    {
        let Some(root_digest) = self.root else {
            let root = save(store, &Page::leaf(vec![(key, value)]))?;
            return Ok(Self::from_parts(Some(root.digest), 1));
        };

        let root: Page<K, V> = store.load(&root_digest)?;
        let (inserted, replaced) = insert(store, config, root, key, value)?;
        let root = match inserted {
            Inserted::Single(page) => save(store, &page)?,
            Inserted::Split(left, median, right) => {
                debug!(len = self.len, "b-tree root split");
                let page = Page {
                    entries: vec![median],
                    children: vec![save(store, &left)?, save(store, &right)?],
                };
                save(store, &page)?
            }
        };
        let len = if replaced { self.len } else { self.len + 1 };
        Ok(Self::from_parts(Some(root.digest), len))
    }

    /// Remove `key`, returning the new tree and the removed value.
    ///
    /// Removing an absent key returns an identical handle and writes
    /// nothing.
    pub fn remove<S>(
        &self,
        store: &S,
        config: &BTreeConfig<K>,
        key: &K,
    ) -> BTreeResult<(Self, Option<V>)>
    where
        S: ObjectStore + ?Sized,
    {
        let Some(root_digest) = self.root else {
            return Ok((self.clone(), None));
        };
        let mut root: Page<K, V> = store.load(&root_digest)?;
        let Some(removed) = delete(store, config, &mut root, key)? else {
            return Ok((self.clone(), None));
        };

        let new_root = if !root.entries.is_empty() {
            Some(save(store, &root)?.digest)
        } else if root.is_leaf() {
            None
        } else {
            debug!(len = self.len, "b-tree root collapsed");
            Some(root.children[0].digest)
        };
        Ok((Self::from_parts(new_root, self.len - 1), Some(removed)))
    }

    /// Build a tree from entries in any order. Later duplicates win.
    pub fn from_entries<S>(
        store: &S,
        config: &BTreeConfig<K>,
        entries: impl IntoIterator<Item = (K, V)>,
    ) -> BTreeResult<Self>
    where
        S: ObjectStore + ?Sized,
    {
        entries
            .into_iter()
            .try_fold(Self::empty(), |tree, (k, v)| tree.put(store, config, k, v))
    }
}

fn search<K, V>(config: &BTreeConfig<K>, page: &Page<K, V>, key: &K) -> Result<usize, usize> {
    page.entries
        .binary_search_by(|(k, _)| config.compare(k, key))
}

fn save<K, V, S>(store: &S, page: &Page<K, V>) -> BTreeResult<ChildRef>
where
    K: Serialize + DeserializeOwned,
    V: Serialize + DeserializeOwned,
    S: ObjectStore + ?Sized,
{
    let digest = store.save(page)?;
    Ok(ChildRef {
        digest,
        count: page.count(),
    })
}

fn collect<K, V, S>(store: &S, digest: &Digest, out: &mut Vec<(K, V)>) -> BTreeResult<()>
where
    K: Serialize + DeserializeOwned,
    V: Serialize + DeserializeOwned,
    S: ObjectStore + ?Sized,
{
    let page: Page<K, V> = store.load(digest)?;
    if page.is_leaf() {
        out.extend(page.entries);
        return Ok(());
    }
    let mut entries = page.entries.into_iter();
    for child in &page.children {
        collect(store, &child.digest, out)?;
        if let Some(entry) = entries.next() {
            out.push(entry);
        }
    }
    Ok(())
}

/// Insert into `page`, returning the rewritten page (or its two halves) and
/// whether an existing entry was overwritten.
fn insert<K, V, S>(
    store: &S,
    config: &BTreeConfig<K>,
    mut page: Page<K, V>,
    key: K,
    value: V,
) -> BTreeResult<(Inserted<K, V>, bool)>
where
    K: Clone + Serialize + DeserializeOwned,
    V: Clone + Serialize + DeserializeOwned,
    S: ObjectStore + ?Sized,
{
    let replaced = match search(config, &page, &key) {
        Ok(i) => {
            page.entries[i].1 = value;
            return Ok((Inserted::Single(page), true));
        }
        Err(i) if page.is_leaf() => {
            page.entries.insert(i, (key, value));
            false
        }
        Err(i) => {
            let child: Page<K, V> = store.load(&page.children[i].digest)?;
            let (inserted, replaced) = insert(store, config, child, key, value)?;
            match inserted {
                Inserted::Single(child) => page.children[i] = save(store, &child)?,
                Inserted::Split(left, median, right) => {
                    page.children[i] = save(store, &left)?;
                    page.children.insert(i + 1, save(store, &right)?);
                    page.entries.insert(i, median);
                }
            }
            replaced
        }
    };

    if page.entries.len() <= config.max_entries() {
        return Ok((Inserted::Single(page), replaced));
    }

    let mid = page.entries.len() / 2;
    let mut right_entries = page.entries.split_off(mid);
    let median = right_entries.remove(0);
    let right_children = if page.is_leaf() {
        Vec::new()
    } else {
        page.children.split_off(mid + 1)
    };
    debug!(left = page.entries.len(), right = right_entries.len(), "b-tree page split");
    let right = Page {
        entries: right_entries,
        children: right_children,
    };
    Ok((Inserted::Split(page, median, right), replaced))
}

/// Remove `key` from the subtree rooted at `page`, rewriting `page` in
/// place. Returns `None` (and leaves `page` untouched) if the key is absent.
/// `page` may be left underfull; the caller rebalances.
fn delete<K, V, S>(
    store: &S,
    config: &BTreeConfig<K>,
    page: &mut Page<K, V>,
    key: &K,
) -> BTreeResult<Option<V>>
where
    K: Clone + Serialize + DeserializeOwned,
    V: Clone + Serialize + DeserializeOwned,
    S: ObjectStore + ?Sized,
{
    match search(config, page, key) {
        Ok(i) if page.is_leaf() => Ok(Some(page.entries.remove(i).1)),
        Ok(i) => {
            // Replace with the in-order predecessor.
            let mut child: Page<K, V> = store.load(&page.children[i].digest)?;
            let predecessor = remove_max(store, config, &mut child)?;
            let (_, value) = std::mem::replace(&mut page.entries[i], predecessor);
            rebalance(store, config, page, i, child)?;
            Ok(Some(value))
        }
        Err(_) if page.is_leaf() => Ok(None),
        Err(i) => {
            let mut child: Page<K, V> = store.load(&page.children[i].digest)?;
            let Some(value) = delete(store, config, &mut child, key)? else {
                return Ok(None);
            };
            rebalance(store, config, page, i, child)?;
            Ok(Some(value))
        }
    }
}

fn remove_max<K, V, S>(
    store: &S,
    config: &BTreeConfig<K>,
    page: &mut Page<K, V>,
) -> BTreeResult<(K, V)>
where
    K: Clone + Serialize + DeserializeOwned,
    V: Clone + Serialize + DeserializeOwned,
    S: ObjectStore + ?Sized,
{
    if page.is_leaf() {
        return page
            .entries
            .pop()
            .ok_or_else(|| BTreeError::Invalid("empty leaf page".into()));
    }
    let last = page.children.len() - 1;
    let mut child: Page<K, V> = store.load(&page.children[last].digest)?;
    let max = remove_max(store, config, &mut child)?;
    rebalance(store, config, page, last, child)?;
    Ok(max)
}

/// Store the rewritten `child` at `parent.children[i]`, first fixing an
/// underflow by borrowing from a sibling or merging with one.
fn rebalance<K, V, S>(
    store: &S,
    config: &BTreeConfig<K>,
    parent: &mut Page<K, V>,
    i: usize,
    mut child: Page<K, V>,
) -> BTreeResult<()>
where
    K: Clone + Serialize + DeserializeOwned,
    V: Clone + Serialize + DeserializeOwned,
    S: ObjectStore + ?Sized,
{
    let min = config.min_entries();
    if child.entries.len() >= min {
        parent.children[i] = save(store, &child)?;
        return Ok(());
    }

    let left = match i.checked_sub(1) {
        Some(l) => Some(store.load::<Page<K, V>>(&parent.children[l].digest)?),
        None => None,
    };
    let left = match left {
        Some(mut left) if left.entries.len() > min => {
            let last = left.entries.len() - 1;
            let borrowed = left.entries.remove(last);
            let separator = std::mem::replace(&mut parent.entries[i - 1], borrowed);
            child.entries.insert(0, separator);
            if let Some(c) = left.children.pop() {
                child.children.insert(0, c);
            }
            parent.children[i - 1] = save(store, &left)?;
            parent.children[i] = save(store, &child)?;
            return Ok(());
        }
        other => other,
    };

    let right = match parent.children.get(i + 1) {
        Some(r) => Some(store.load::<Page<K, V>>(&r.digest)?),
        None => None,
    };
    let right = match right {
        Some(mut right) if right.entries.len() > min => {
            let borrowed = right.entries.remove(0);
            let separator = std::mem::replace(&mut parent.entries[i], borrowed);
            child.entries.push(separator);
            if !right.is_leaf() {
                child.children.push(right.children.remove(0));
            }
            parent.children[i] = save(store, &child)?;
            parent.children[i + 1] = save(store, &right)?;
            return Ok(());
        }
        other => other,
    };

    // Neither sibling can lend: merge with one of them.
    match (left, right) {
        (Some(mut left), _) => {
            let separator = parent.entries.remove(i - 1);
            left.entries.push(separator);
            left.entries.append(&mut child.entries);
            left.children.append(&mut child.children);
            parent.children.remove(i);
            parent.children[i - 1] = save(store, &left)?;
            debug!(entries = left.entries.len(), "b-tree pages merged");
        }
        (None, Some(mut right)) => {
            let separator = parent.entries.remove(i);
            child.entries.push(separator);
            child.entries.append(&mut right.entries);
            child.children.append(&mut right.children);
            parent.children.remove(i + 1);
            parent.children[i] = save(store, &child)?;
            debug!(entries = child.entries.len(), "b-tree pages merged");
        }
        (None, None) => {
            return Err(BTreeError::Invalid("underfull page has no siblings".into()));
        }
    }
    Ok(())
}

impl<K, V> Clone for BTree<K, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K, V> Copy for BTree<K, V> {}

impl<K, V> PartialEq for BTree<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root && self.len == other.len
    }
}

impl<K, V> Eq for BTree<K, V> {}

impl<K, V> fmt::Debug for BTree<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BTree")
            .field("root", &self.root)
            .field("len", &self.len)
            .finish()
    }
}
