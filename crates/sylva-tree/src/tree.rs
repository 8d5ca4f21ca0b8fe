use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use sylva_btree::{BTree, BTreeConfig};
use sylva_store::{ObjectStore, Record, RecordStoreExt, StoreError};
use sylva_types::{Digest, NodeId, NodeReference};
use tracing::debug;

use crate::children::{ChildEntry, ChildKey, ChildList, ListLayout};
use crate::config::TreeConfig;
use crate::error::{TreeError, TreeResult};
use crate::node::{NodeRecord, ParentLink, TreeRecord};
use crate::order_key::OrderKey;

type Index = BTree<NodeId, ParentLink>;

/// An immutable model tree.
///
/// A `Tree` is a handle on a stored [`TreeRecord`]. Every edit returns a
/// new `Tree` that shares all untouched records with the old one: only the
/// edited node, its ancestors, the touched index pages and the tree header
/// are written.
#[derive(Clone)]
pub struct Tree {
    store: Arc<dyn ObjectStore>,
    config: TreeConfig,
    digest: Digest,
    record: TreeRecord,
}

/// One node on the root-to-node path, as loaded.
struct PathStep {
    id: NodeId,
    record: NodeRecord,
    digest: Digest,
    link: Option<ParentLink>,
}

/// A sibling whose order key is replaced to make room for an insert.
struct Rekey {
    old: ChildKey,
    position: OrderKey,
    digest: Digest,
}

impl Tree {
    /// Create a tree holding only an empty root node.
    pub fn create(
        store: Arc<dyn ObjectStore>,
        config: TreeConfig,
        tree_id: impl Into<String>,
    ) -> TreeResult<Self> {
        config.validate()?;
        let root = store.save(&NodeRecord::new(NodeId::ROOT, None))?;
        let record = TreeRecord {
            tree_id: tree_id.into(),
            root,
            index: BTree::empty(),
        };
        let digest = store.save(&record)?;
        debug!(tree = %digest.short_hex(), "created tree");
        Ok(Self {
            store,
            config,
            digest,
            record,
        })
    }

    /// Open the tree stored under `digest`.
    pub fn load(store: Arc<dyn ObjectStore>, config: TreeConfig, digest: Digest) -> TreeResult<Self> {
        config.validate()?;
        let record = store.load(&digest)?;
        Ok(Self {
            store,
            config,
            digest,
            record,
        })
    }

    pub fn digest(&self) -> Digest {
        self.digest
    }

    pub fn tree_id(&self) -> &str {
        &self.record.tree_id
    }

    pub fn record(&self) -> &TreeRecord {
        &self.record
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Digest of the root node record.
    pub fn root_digest(&self) -> Digest {
        self.record.root
    }

    /// Number of nodes, root included.
    pub fn len(&self) -> u64 {
        self.record.index.len() + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    // ---- Reads ----

    pub fn contains(&self, id: NodeId) -> TreeResult<bool> {
        Ok(id.is_root() || self.parent_link(id)?.is_some())
    }

    /// Parent link of `id`; `None` for the root and for unknown ids.
    pub fn parent_link(&self, id: NodeId) -> TreeResult<Option<ParentLink>> {
        Ok(self
            .record
            .index
            .get(&*self.store, &self.index_config()?, &id)?)
    }

    pub fn node(&self, id: NodeId) -> TreeResult<NodeRecord> {
        let mut path = self.load_path(id)?;
        path.pop()
            .map(|s| s.record)
            .ok_or(TreeError::NodeNotFound(id))
    }

    /// Digest of the record of `id`. Equal digests mean equal subtrees.
    pub fn node_digest(&self, id: NodeId) -> TreeResult<Digest> {
        let path = self.load_path(id)?;
        path.last()
            .map(|s| s.digest)
            .ok_or(TreeError::NodeNotFound(id))
    }

    /// Load a node record by digest.
    pub fn load_node(&self, digest: &Digest) -> TreeResult<NodeRecord> {
        Ok(self.store.load(digest)?)
    }

    /// Load several node records with one batched store read.
    pub fn load_nodes(&self, digests: &[Digest]) -> TreeResult<Vec<NodeRecord>> {
        if digests.is_empty() {
            return Ok(Vec::new());
        }
        let objects = self.store.read_batch(digests)?;
        digests
            .iter()
            .zip(objects)
            .map(|(digest, object)| {
                let object = object.ok_or(StoreError::NotFound(*digest))?;
                Ok(NodeRecord::from_stored_object(&object)?)
            })
            .collect()
    }

    pub fn child_entries(&self, id: NodeId, role: &str) -> TreeResult<Vec<ChildEntry>> {
        match self.node(id)?.children.get(role) {
            Some(list) => list.entries(&*self.store),
            None => Ok(Vec::new()),
        }
    }

    /// Position of `id` among its siblings.
    pub fn index_of(&self, id: NodeId) -> TreeResult<Option<u64>> {
        let Some(link) = self.parent_link(id)? else {
            return Ok(None);
        };
        let parent = self.node(link.parent)?;
        match parent.children.get(&link.role) {
            Some(list) => list.position(&*self.store, &self.layout()?, &link.child_key(id)),
            None => Ok(None),
        }
    }

    /// All node ids in id order, root first.
    pub fn all_node_ids(&self) -> TreeResult<Vec<NodeId>> {
        let mut ids = vec![NodeId::ROOT];
        ids.extend(self.record.index.keys(&*self.store)?);
        Ok(ids)
    }

    /// `id` and all of its descendants, in pre-order.
    pub fn subtree(&self, id: NodeId) -> TreeResult<Vec<NodeId>> {
        self.collect_subtree(self.node_digest(id)?)
    }

    /// Ids of the subtree stored under `digest`, in pre-order.
    ///
    /// Records are fetched one level at a time, each level with a single
    /// batched read.
    fn collect_subtree(&self, digest: Digest) -> TreeResult<Vec<NodeId>> {
        let mut loaded: HashMap<Digest, (NodeId, Vec<Digest>)> = HashMap::new();
        let mut level = vec![digest];
        while !level.is_empty() {
            let records = self.load_nodes(&level)?;
            let mut next = Vec::new();
            for (digest, record) in level.into_iter().zip(records) {
                let mut children = Vec::new();
                for list in record.children.values() {
                    children.extend(list.entries(&*self.store)?.into_iter().map(|e| e.digest));
                }
                next.extend(children.iter().copied());
                loaded.insert(digest, (record.id, children));
            }
            level = next;
        }

        let mut out = Vec::with_capacity(loaded.len());
        let mut stack = vec![digest];
        while let Some(digest) = stack.pop() {
            let (id, children) = loaded.get(&digest).ok_or_else(|| {
                TreeError::Inconsistent(format!("record {} missing from subtree", digest.short_hex()))
            })?;
            out.push(*id);
            stack.extend(children.iter().rev().copied());
        }
        Ok(out)
    }

    /// Whether `ancestor` is `id` or one of its ancestors.
    pub fn is_ancestor_or_self(&self, ancestor: NodeId, id: NodeId) -> TreeResult<bool> {
        if ancestor == id || ancestor.is_root() {
            return Ok(true);
        }
        Ok(self.ancestry(id)?.iter().any(|(_, link)| link.parent == ancestor))
    }

    // ---- Edits ----

    /// Set (`Some`) or clear (`None`) a property.
    pub fn set_property(&self, id: NodeId, role: &str, value: Option<String>) -> TreeResult<Tree> {
        self.edit_node(id, |record| {
            match value {
                Some(value) => record.properties.insert(role.to_owned(), value),
                None => record.properties.remove(role),
            };
            Ok(())
        })
    }

    /// Set (`Some`) or clear (`None`) a reference.
    pub fn set_reference(
        &self,
        id: NodeId,
        role: &str,
        target: Option<NodeReference>,
    ) -> TreeResult<Tree> {
        self.edit_node(id, |record| {
            match target {
                Some(target) => record.references.insert(role.to_owned(), target),
                None => record.references.remove(role),
            };
            Ok(())
        })
    }

    pub fn set_concept(&self, id: NodeId, concept: Option<String>) -> TreeResult<Tree> {
        self.edit_node(id, |record| {
            record.concept = concept;
            Ok(())
        })
    }

    /// Create node `id` as a child of `parent` at `index` in `role`.
    ///
    /// `index` may equal the current number of children to append.
    pub fn add_new_child(
        &self,
        parent: NodeId,
        role: &str,
        index: u64,
        id: NodeId,
        concept: Option<String>,
    ) -> TreeResult<Tree> {
        self.ensure_absent(id)?;
        let path = self.load_path(parent)?;
        let (position, rekeyed) = self.position_for(&last(&path)?.record, role, index, id)?;
        let digest = self.store.save(&NodeRecord::new(id, concept))?;
        let tree = self.attach(path, role, id, position, digest, rekeyed, self.record.index)?;
        debug!(tree = %tree.digest.short_hex(), node = %id, parent = %parent, role, "added child");
        Ok(tree)
    }

    /// Create node `id` under `parent` with an explicit order key.
    pub fn add_child_at(
        &self,
        parent: NodeId,
        role: &str,
        position: OrderKey,
        id: NodeId,
        concept: Option<String>,
    ) -> TreeResult<Tree> {
        self.ensure_absent(id)?;
        let path = self.load_path(parent)?;
        let digest = self.store.save(&NodeRecord::new(id, concept))?;
        self.attach(path, role, id, position, digest, Vec::new(), self.record.index)
    }

    /// Create node `id` after the last child of `parent` in `role`.
    pub fn append_child(
        &self,
        parent: NodeId,
        role: &str,
        id: NodeId,
        concept: Option<String>,
    ) -> TreeResult<Tree> {
        let len = self
            .node(parent)?
            .children
            .get(role)
            .map_or(0, ChildList::len);
        self.add_new_child(parent, role, len, id, concept)
    }

    /// Move `child` (with its subtree) to `index` in `role` of `new_parent`.
    ///
    /// `index` is interpreted after `child` has been detached.
    pub fn move_child(
        &self,
        new_parent: NodeId,
        role: &str,
        index: u64,
        child: NodeId,
    ) -> TreeResult<Tree> {
        self.check_move(child, new_parent)?;
        let (detached, digest) = self.detach(child)?;
        let path = detached.load_path(new_parent)?;
        let (position, rekeyed) = detached.position_for(&last(&path)?.record, role, index, child)?;
        let tree = detached.attach(
            path,
            role,
            child,
            position,
            digest,
            rekeyed,
            detached.record.index,
        )?;
        debug!(tree = %tree.digest.short_hex(), node = %child, parent = %new_parent, role, "moved node");
        Ok(tree)
    }

    /// Move `child` under `new_parent` with an explicit order key.
    pub fn move_to(
        &self,
        child: NodeId,
        new_parent: NodeId,
        role: &str,
        position: OrderKey,
    ) -> TreeResult<Tree> {
        self.check_move(child, new_parent)?;
        let (detached, digest) = self.detach(child)?;
        let path = detached.load_path(new_parent)?;
        detached.attach(
            path,
            role,
            child,
            position,
            digest,
            Vec::new(),
            detached.record.index,
        )
    }

    /// Remove `id` and its whole subtree.
    pub fn remove_node(&self, id: NodeId) -> TreeResult<Tree> {
        if id.is_root() {
            return Err(TreeError::RootImmutable);
        }
        let (detached, digest) = self.detach(id)?;
        let removed = self.collect_subtree(digest)?;

        let config = self.index_config()?;
        let mut index = detached.record.index;
        for node in &removed {
            index = index.remove(&*self.store, &config, node)?.0;
        }
        let tree = detached.with_root(detached.record.root, index)?;
        debug!(tree = %tree.digest.short_hex(), node = %id, removed = removed.len(), "removed subtree");
        Ok(tree)
    }

    // ---- Internals ----

    fn layout(&self) -> TreeResult<ListLayout> {
        Ok(ListLayout {
            inline_threshold: self.config.inline_threshold,
            btree: self.config.children_btree()?,
        })
    }

    fn index_config(&self) -> TreeResult<BTreeConfig<NodeId>> {
        self.config.index_btree()
    }

    fn ensure_absent(&self, id: NodeId) -> TreeResult<()> {
        if self.contains(id)? {
            return Err(TreeError::DuplicateNode(id));
        }
        Ok(())
    }

    fn check_move(&self, child: NodeId, new_parent: NodeId) -> TreeResult<()> {
        if child.is_root() {
            return Err(TreeError::RootImmutable);
        }
        if !self.contains(child)? {
            return Err(TreeError::NodeNotFound(child));
        }
        if !self.contains(new_parent)? {
            return Err(TreeError::NodeNotFound(new_parent));
        }
        if self.is_ancestor_or_self(child, new_parent)? {
            return Err(TreeError::ContainmentCycle {
                node: child,
                new_parent,
            });
        }
        Ok(())
    }

    /// Parent links from the root down to `id`, excluding the root.
    fn ancestry(&self, id: NodeId) -> TreeResult<Vec<(NodeId, ParentLink)>> {
        let config = self.index_config()?;
        let mut links = Vec::new();
        let mut current = id;
        while !current.is_root() {
            if links.len() as u64 > self.record.index.len() {
                return Err(TreeError::Inconsistent("parent index contains a cycle".into()));
            }
            let link = self
                .record
                .index
                .get(&*self.store, &config, &current)?
                .ok_or(TreeError::NodeNotFound(current))?;
            let parent = link.parent;
            links.push((current, link));
            current = parent;
        }
        links.reverse();
        Ok(links)
    }

    fn load_path(&self, id: NodeId) -> TreeResult<Vec<PathStep>> {
        let links = self.ancestry(id)?;
        let layout = self.layout()?;
        let mut path = vec![PathStep {
            id: NodeId::ROOT,
            record: self.store.load(&self.record.root)?,
            digest: self.record.root,
            link: None,
        }];
        for (node, link) in links {
            let parent = &last(&path)?.record;
            let digest = match parent.children.get(&link.role) {
                Some(list) => list.find(&*self.store, &layout, &link.child_key(node))?,
                None => None,
            }
            .ok_or_else(|| {
                TreeError::Inconsistent(format!("{node} missing from its parent {}", link.parent))
            })?;
            path.push(PathStep {
                id: node,
                record: self.store.load(&digest)?,
                digest,
                link: Some(link),
            });
        }
        Ok(path)
    }

    fn edit_node(
        &self,
        id: NodeId,
        edit: impl FnOnce(&mut NodeRecord) -> TreeResult<()>,
    ) -> TreeResult<Tree> {
        let mut path = self.load_path(id)?;
        let step = last_mut(&mut path)?;
        edit(&mut step.record)?;
        if step.record.digest()? == step.digest {
            return Ok(self.clone());
        }
        self.rewrite(path, self.record.index)
    }

    /// Save the last record of `path` and every ancestor above it, then a
    /// new header with `index`.
    fn rewrite(&self, path: Vec<PathStep>, index: Index) -> TreeResult<Tree> {
        let layout = self.layout()?;
        let store = &*self.store;
        let mut steps = path.into_iter().rev();
        let leaf = steps
            .next()
            .ok_or_else(|| TreeError::Inconsistent("empty path".into()))?;
        let mut digest = store.save(&leaf.record)?;
        let mut link = leaf.link;
        let mut child = leaf.id;
        for mut step in steps {
            let l = link.ok_or_else(|| {
                TreeError::Inconsistent(format!("{child} has no parent link"))
            })?;
            let entry = ChildEntry {
                key: l.child_key(child),
                digest,
            };
            edit_list(&mut step.record, &l.role, |list| list.upsert(store, &layout, entry))?;
            digest = store.save(&step.record)?;
            link = step.link;
            child = step.id;
        }
        self.with_root(digest, index)
    }

    fn with_root(&self, root: Digest, index: Index) -> TreeResult<Tree> {
        let record = TreeRecord {
            tree_id: self.record.tree_id.clone(),
            root,
            index,
        };
        let digest = self.store.save(&record)?;
        Ok(Tree {
            store: Arc::clone(&self.store),
            config: self.config,
            digest,
            record,
        })
    }

    /// Unlink `child` from its parent. The returned tree still carries the
    /// child's (now stale) index entries.
    fn detach(&self, child: NodeId) -> TreeResult<(Tree, Digest)> {
        let layout = self.layout()?;
        let store = &*self.store;
        let mut path = self.load_path(child)?;
        let leaf = path.pop().ok_or(TreeError::NodeNotFound(child))?;
        let link = leaf.link.ok_or(TreeError::RootImmutable)?;
        let key = link.child_key(child);
        edit_list(&mut last_mut(&mut path)?.record, &link.role, |list| {
            Ok(list.remove(store, &layout, &key)?.0)
        })?;
        Ok((self.rewrite(path, self.record.index)?, leaf.digest))
    }

    /// Link the record `digest` as `child` under the last node of `path`.
    #[allow(clippy::too_many_arguments)]
    fn attach(
        &self,
        mut path: Vec<PathStep>,
        role: &str,
        child: NodeId,
        position: OrderKey,
        digest: Digest,
        rekeyed: Vec<Rekey>,
        index: Index,
    ) -> TreeResult<Tree> {
        let layout = self.layout()?;
        let config = self.index_config()?;
        let store = &*self.store;
        let parent = last(&path)?.id;

        let mut index = index;
        for r in &rekeyed {
            let link = ParentLink {
                parent,
                role: role.to_owned(),
                position: r.position.clone(),
            };
            index = index.put(store, &config, r.old.id, link)?;
        }
        let link = ParentLink {
            parent,
            role: role.to_owned(),
            position,
        };
        let key = link.child_key(child);
        index = index.put(store, &config, child, link)?;

        edit_list(&mut last_mut(&mut path)?.record, role, |mut list| {
            for r in rekeyed {
                list = list.remove(store, &layout, &r.old)?.0;
                let key = ChildKey {
                    position: r.position,
                    id: r.old.id,
                };
                list = list.upsert(store, &layout, ChildEntry { key, digest: r.digest })?;
            }
            list.upsert(store, &layout, ChildEntry { key, digest })
        })?;
        self.rewrite(path, index)
    }

    /// Order key for a new child at `index`, plus any siblings that must be
    /// re-keyed first.
    ///
    /// Siblings only share an order key after concurrent inserts at the same
    /// spot. Inserting between two of them re-keys that run of siblings
    /// unless the new id already sorts between them.
    fn position_for(
        &self,
        parent: &NodeRecord,
        role: &str,
        index: u64,
        id: NodeId,
    ) -> TreeResult<(OrderKey, Vec<Rekey>)> {
        let store = &*self.store;
        let empty = ChildList::empty();
        let list = parent.children.get(role).unwrap_or(&empty);
        let len = list.len();
        if index > len {
            return Err(TreeError::IndexOutOfBounds { index, len });
        }
        let lo = match index.checked_sub(1) {
            Some(i) => list.get(store, i)?,
            None => None,
        };
        let hi = list.get(store, index)?;

        if let (Some(lo), Some(hi)) = (&lo, &hi) {
            if lo.key.position == hi.key.position {
                if lo.key.id < id && id < hi.key.id {
                    return Ok((lo.key.position.clone(), Vec::new()));
                }
                return self.rekey_run(list, index as usize);
            }
        }
        let position = OrderKey::between(
            lo.as_ref().map(|e| &e.key.position),
            hi.as_ref().map(|e| &e.key.position),
        );
        Ok((position, Vec::new()))
    }

    fn rekey_run(&self, list: &ChildList, index: usize) -> TreeResult<(OrderKey, Vec<Rekey>)> {
        let entries = list.entries(&*self.store)?;
        let shared = entries[index - 1].key.position.clone();
        let mut start = index - 1;
        while start > 0 && entries[start - 1].key.position == shared {
            start -= 1;
        }
        let mut end = index;
        while end < entries.len() && entries[end].key.position == shared {
            end += 1;
        }

        let prev = start.checked_sub(1).map(|s| &entries[s].key.position);
        let next = entries.get(end).map(|e| &e.key.position);
        let keys = OrderKey::sequence(prev, next, end - start + 1);

        let slots = entries[start..index]
            .iter()
            .map(Some)
            .chain(std::iter::once(None))
            .chain(entries[index..end].iter().map(Some));
        let mut position = None;
        let mut rekeyed = Vec::new();
        for (slot, key) in slots.zip(keys) {
            match slot {
                Some(entry) => rekeyed.push(Rekey {
                    old: entry.key.clone(),
                    position: key,
                    digest: entry.digest,
                }),
                None => position = Some(key),
            }
        }
        debug!(siblings = rekeyed.len(), "re-keyed children sharing an order key");
        let position = position
            .ok_or_else(|| TreeError::Inconsistent("no slot for the new child".into()))?;
        Ok((position, rekeyed))
    }
}

fn last(path: &[PathStep]) -> TreeResult<&PathStep> {
    path.last()
        .ok_or_else(|| TreeError::Inconsistent("empty path".into()))
}

fn last_mut(path: &mut [PathStep]) -> TreeResult<&mut PathStep> {
    path.last_mut()
        .ok_or_else(|| TreeError::Inconsistent("empty path".into()))
}

/// Apply `edit` to the child list of `role`, dropping the role when the
/// list ends up empty.
fn edit_list(
    record: &mut NodeRecord,
    role: &str,
    edit: impl FnOnce(ChildList) -> TreeResult<ChildList>,
) -> TreeResult<()> {
    let list = record.children.remove(role).unwrap_or_else(ChildList::empty);
    let list = edit(list)?;
    if !list.is_empty() {
        record.children.insert(role.to_owned(), list);
    }
    Ok(())
}

impl PartialEq for Tree {
    fn eq(&self, other: &Self) -> bool {
        self.digest == other.digest
    }
}

impl Eq for Tree {}

impl fmt::Debug for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tree")
            .field("tree_id", &self.record.tree_id)
            .field("digest", &self.digest)
            .field("nodes", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use sylva_store::{AccessTrackingStore, InMemoryObjectStore};

    use super::*;
    use crate::field::FieldKind;
    use crate::query::ModelQuery;

    fn id(n: u64) -> NodeId {
        NodeId::from_raw(0x1_0000_0000 + n)
    }

    fn store() -> Arc<dyn ObjectStore> {
        Arc::new(InMemoryObjectStore::new())
    }

    fn small() -> TreeConfig {
        TreeConfig {
            inline_threshold: 4,
            btree_max_entries: 4,
        }
    }

    fn empty_tree() -> Tree {
        Tree::create(store(), TreeConfig::default(), "test").unwrap()
    }

    /// root -> a -> b, root -> c
    fn sample() -> Tree {
        empty_tree()
            .add_new_child(NodeId::ROOT, "items", 0, id(1), Some("Folder".into()))
            .unwrap()
            .add_new_child(id(1), "items", 0, id(2), Some("File".into()))
            .unwrap()
            .add_new_child(NodeId::ROOT, "items", 1, id(3), None)
            .unwrap()
    }

    // ---- Reads ----

    #[test]
    fn new_tree_has_only_a_root() {
        let tree = empty_tree();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.all_node_ids().unwrap(), vec![NodeId::ROOT]);
        assert_eq!(tree.resolve_root(), NodeId::ROOT);
        assert!(tree.get_all_children(NodeId::ROOT).unwrap().is_empty());
    }

    #[test]
    fn children_parents_and_concepts() {
        let tree = sample();
        assert_eq!(tree.get_children(NodeId::ROOT, "items").unwrap(), vec![id(1), id(3)]);
        assert_eq!(tree.get_children(id(1), "items").unwrap(), vec![id(2)]);
        assert_eq!(tree.get_parent(id(2)).unwrap(), Some((id(1), "items".into())));
        assert_eq!(tree.get_parent(NodeId::ROOT).unwrap(), None);
        assert_eq!(tree.get_concept(id(2)).unwrap().as_deref(), Some("File"));
        assert_eq!(tree.get_concept(id(3)).unwrap(), None);
        assert_eq!(tree.subtree(id(1)).unwrap(), vec![id(1), id(2)]);
        assert_eq!(tree.index_of(id(3)).unwrap(), Some(1));
        assert_eq!(tree.len(), 4);
    }

    #[test]
    fn unknown_nodes_are_not_found() {
        let tree = sample();
        assert!(matches!(tree.node(id(99)), Err(TreeError::NodeNotFound(_))));
        assert!(matches!(tree.get_parent(id(99)), Err(TreeError::NodeNotFound(_))));
        assert!(!tree.contains_node(id(99)).unwrap());
    }

    #[test]
    fn reload_from_digest() {
        let tree = sample().set_property(id(2), "name", Some("b".into())).unwrap();
        let reloaded = Tree::load(Arc::clone(tree.store()), small(), tree.digest()).unwrap();
        assert_eq!(reloaded.get_property(id(2), "name").unwrap().as_deref(), Some("b"));
        assert_eq!(reloaded.all_node_ids().unwrap(), tree.all_node_ids().unwrap());
    }

    // ---- Fields ----

    #[test]
    fn properties_and_references() {
        let tree = sample()
            .set_property(id(1), "name", Some("a".into()))
            .unwrap()
            .set_reference(id(3), "target", Some(NodeReference::Local(id(2))))
            .unwrap();
        assert_eq!(tree.get_property(id(1), "name").unwrap().as_deref(), Some("a"));
        assert_eq!(
            tree.get_reference_target(id(3), "target").unwrap(),
            Some(NodeReference::Local(id(2)))
        );
        assert_eq!(tree.get_roles(id(1), FieldKind::Property).unwrap(), vec!["name"]);
        assert_eq!(tree.get_roles(id(1), FieldKind::Child).unwrap(), vec!["items"]);

        let cleared = tree.set_property(id(1), "name", None).unwrap();
        assert_eq!(cleared.get_property(id(1), "name").unwrap(), None);
        assert!(cleared.get_roles(id(1), FieldKind::Property).unwrap().is_empty());
    }

    #[test]
    fn reference_cycles_are_allowed() {
        let tree = sample()
            .set_reference(id(1), "next", Some(id(3).into()))
            .unwrap()
            .set_reference(id(3), "next", Some(id(1).into()))
            .unwrap();
        assert_eq!(tree.get_reference_target(id(3), "next").unwrap(), Some(id(1).into()));
    }

    #[test]
    fn no_op_edit_keeps_the_digest() {
        let tree = sample().set_property(id(1), "name", Some("a".into())).unwrap();
        let again = tree.set_property(id(1), "name", Some("a".into())).unwrap();
        assert_eq!(again.digest(), tree.digest());
    }

    #[test]
    fn input_tree_is_untouched() {
        let before = sample();
        let after = before.set_concept(id(3), Some("Note".into())).unwrap();
        assert_eq!(before.get_concept(id(3)).unwrap(), None);
        assert_eq!(after.get_concept(id(3)).unwrap().as_deref(), Some("Note"));
        assert_ne!(before.digest(), after.digest());
    }

    // ---- Structure ----

    #[test]
    fn insert_positions() {
        let mut tree = empty_tree();
        tree = tree.add_new_child(NodeId::ROOT, "r", 0, id(1), None).unwrap();
        tree = tree.add_new_child(NodeId::ROOT, "r", 0, id(2), None).unwrap();
        tree = tree.add_new_child(NodeId::ROOT, "r", 2, id(3), None).unwrap();
        tree = tree.add_new_child(NodeId::ROOT, "r", 1, id(4), None).unwrap();
        assert_eq!(
            tree.get_children(NodeId::ROOT, "r").unwrap(),
            vec![id(2), id(4), id(1), id(3)]
        );
    }

    #[test]
    fn add_errors() {
        let tree = sample();
        assert!(matches!(
            tree.add_new_child(NodeId::ROOT, "items", 5, id(9), None),
            Err(TreeError::IndexOutOfBounds { index: 5, len: 2 })
        ));
        assert!(matches!(
            tree.add_new_child(NodeId::ROOT, "items", 0, id(2), None),
            Err(TreeError::DuplicateNode(_))
        ));
        assert!(matches!(
            tree.add_new_child(id(42), "items", 0, id(9), None),
            Err(TreeError::NodeNotFound(_))
        ));
    }

    #[test]
    fn remove_drops_the_whole_subtree() {
        let tree = sample().remove_node(id(1)).unwrap();
        assert_eq!(tree.all_node_ids().unwrap(), vec![NodeId::ROOT, id(3)]);
        assert!(!tree.contains(id(2)).unwrap());
        assert_eq!(tree.get_children(NodeId::ROOT, "items").unwrap(), vec![id(3)]);

        let emptied = tree.remove_node(id(3)).unwrap();
        assert!(emptied.get_roles(NodeId::ROOT, FieldKind::Child).unwrap().is_empty());
        assert_eq!(emptied.node_digest(NodeId::ROOT).unwrap(), empty_tree().root_digest());
    }

    #[test]
    fn move_carries_the_subtree() {
        let tree = sample()
            .set_property(id(2), "name", Some("b".into()))
            .unwrap()
            .move_child(id(3), "nested", 0, id(1))
            .unwrap();
        assert_eq!(tree.get_parent(id(1)).unwrap(), Some((id(3), "nested".into())));
        assert_eq!(tree.get_children(NodeId::ROOT, "items").unwrap(), vec![id(3)]);
        assert_eq!(tree.get_property(id(2), "name").unwrap().as_deref(), Some("b"));
        assert_eq!(tree.subtree(id(3)).unwrap(), vec![id(3), id(1), id(2)]);
    }

    #[test]
    fn move_within_the_same_list() {
        let tree = sample().move_child(NodeId::ROOT, "items", 1, id(1)).unwrap();
        assert_eq!(tree.get_children(NodeId::ROOT, "items").unwrap(), vec![id(3), id(1)]);
    }

    #[test]
    fn move_rejections() {
        let tree = sample();
        assert!(matches!(
            tree.move_child(id(2), "items", 0, id(1)),
            Err(TreeError::ContainmentCycle { .. })
        ));
        assert!(matches!(
            tree.move_child(id(1), "items", 0, id(1)),
            Err(TreeError::ContainmentCycle { .. })
        ));
        assert!(matches!(
            tree.move_child(id(1), "items", 0, NodeId::ROOT),
            Err(TreeError::RootImmutable)
        ));
        assert!(matches!(tree.remove_node(NodeId::ROOT), Err(TreeError::RootImmutable)));
    }

    #[test]
    fn append_goes_after_the_last_child() {
        let tree = sample()
            .append_child(NodeId::ROOT, "items", id(4), None)
            .unwrap()
            .append_child(id(3), "notes", id(5), Some("Note".into()))
            .unwrap();
        assert_eq!(
            tree.get_children(NodeId::ROOT, "items").unwrap(),
            vec![id(1), id(3), id(4)]
        );
        assert_eq!(tree.get_children(id(3), "notes").unwrap(), vec![id(5)]);
        assert_eq!(tree.index_of(id(4)).unwrap(), Some(2));
        assert!(matches!(
            tree.append_child(id(42), "items", id(6), None),
            Err(TreeError::NodeNotFound(_))
        ));
    }

    // ---- Sharing ----

    #[test]
    fn untouched_subtrees_keep_their_digest() {
        let tree = sample();
        let sibling = tree.node_digest(id(3)).unwrap();
        let edited = tree.set_property(id(2), "name", Some("x".into())).unwrap();
        assert_eq!(edited.node_digest(id(3)).unwrap(), sibling);
        assert_ne!(edited.node_digest(id(1)).unwrap(), tree.node_digest(id(1)).unwrap());
    }

    #[test]
    fn edit_writes_only_the_path() {
        let tracked = Arc::new(AccessTrackingStore::new(InMemoryObjectStore::new()));
        let store: Arc<dyn ObjectStore> = tracked.clone();
        let tree = Tree::create(store, TreeConfig::default(), "t")
            .unwrap()
            .add_new_child(NodeId::ROOT, "a", 0, id(1), None)
            .unwrap()
            .add_new_child(id(1), "a", 0, id(2), None)
            .unwrap()
            .add_new_child(NodeId::ROOT, "b", 0, id(3), None)
            .unwrap();

        tracked.reset();
        tree.set_property(id(2), "name", Some("deep".into())).unwrap();
        // Three node records on the path plus the header.
        assert_eq!(tracked.writes(), 4);
    }

    #[test]
    fn subtree_reads_one_batch_per_level() {
        let tracked = Arc::new(AccessTrackingStore::new(InMemoryObjectStore::new()));
        let store: Arc<dyn ObjectStore> = tracked.clone();
        let mut tree = Tree::create(store, TreeConfig::default(), "wide").unwrap();
        for n in 0..8 {
            tree = tree.append_child(NodeId::ROOT, "items", id(n), None).unwrap();
        }
        for n in 0..8 {
            tree = tree.append_child(id(n), "items", id(100 + n), None).unwrap();
        }

        let children: Vec<Digest> = (0..8).map(|n| tree.node_digest(id(n)).unwrap()).collect();

        tracked.reset();
        let ids = tree.subtree(NodeId::ROOT).unwrap();
        assert_eq!(ids.len(), 17);
        assert_eq!(ids[..3], [NodeId::ROOT, id(0), id(100)]);
        // Root, its eight children, their eight children.
        assert_eq!(tracked.batches(), 3);
        for digest in &children {
            assert_eq!(tracked.reads_of(digest), 1);
        }
    }

    #[test]
    fn load_nodes_keeps_request_order_and_reports_missing() {
        let tree = sample();
        let digests = [tree.node_digest(id(3)).unwrap(), tree.node_digest(id(1)).unwrap()];
        let records = tree.load_nodes(&digests).unwrap();
        assert_eq!(records.iter().map(|r| r.id).collect::<Vec<_>>(), vec![id(3), id(1)]);
        assert!(tree.load_nodes(&[]).unwrap().is_empty());
        assert!(matches!(
            tree.load_nodes(&[Digest::of(b"absent")]),
            Err(TreeError::Store(StoreError::NotFound(_)))
        ));
    }

    // ---- Ordering ----

    #[test]
    fn concurrent_inserts_converge() {
        let base = sample();
        let left = base.add_new_child(NodeId::ROOT, "items", 1, id(10), None).unwrap();
        let right = base.add_new_child(NodeId::ROOT, "items", 1, id(11), None).unwrap();

        let key = |t: &Tree, n| t.parent_link(n).unwrap().unwrap().position;
        assert_eq!(key(&left, id(10)), key(&right, id(11)));

        let lr = left
            .add_child_at(NodeId::ROOT, "items", key(&right, id(11)), id(11), None)
            .unwrap();
        let rl = right
            .add_child_at(NodeId::ROOT, "items", key(&left, id(10)), id(10), None)
            .unwrap();
        assert_eq!(lr.digest(), rl.digest());
        assert_eq!(
            lr.get_children(NodeId::ROOT, "items").unwrap(),
            vec![id(1), id(10), id(11), id(3)]
        );
    }

    #[test]
    fn inserting_between_equal_keys_rekeys_the_run() {
        let base = sample();
        let shared = base
            .add_new_child(NodeId::ROOT, "items", 1, id(10), None)
            .unwrap()
            .parent_link(id(10))
            .unwrap()
            .unwrap()
            .position;
        let tree = base
            .add_child_at(NodeId::ROOT, "items", shared.clone(), id(10), None)
            .unwrap()
            .add_child_at(NodeId::ROOT, "items", shared, id(11), None)
            .unwrap();
        // id(5) sorts before both tied siblings, so the run is re-keyed.
        let tree = tree.add_new_child(NodeId::ROOT, "items", 2, id(5), None).unwrap();
        assert_eq!(
            tree.get_children(NodeId::ROOT, "items").unwrap(),
            vec![id(1), id(10), id(5), id(11), id(3)]
        );
        let positions: Vec<OrderKey> = [id(10), id(5), id(11)]
            .iter()
            .map(|n| tree.parent_link(*n).unwrap().unwrap().position)
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(tree.index_of(id(11)).unwrap(), Some(3));
    }

    #[test]
    fn long_lists_move_into_a_btree_and_back() {
        let mut tree = Tree::create(store(), small(), "paged").unwrap();
        for n in 0..20 {
            tree = tree.add_new_child(NodeId::ROOT, "r", 0, id(n), None).unwrap();
        }
        let root = tree.node(NodeId::ROOT).unwrap();
        assert!(root.children["r"].is_paged());
        let expected: Vec<NodeId> = (0..20).rev().map(id).collect();
        assert_eq!(tree.get_children(NodeId::ROOT, "r").unwrap(), expected);
        for n in 0..20 {
            assert_eq!(tree.index_of(id(n)).unwrap(), Some(19 - n));
        }

        for n in 0..19 {
            tree = tree.remove_node(id(n)).unwrap();
        }
        let root = tree.node(NodeId::ROOT).unwrap();
        assert!(!root.children["r"].is_paged());
        assert_eq!(tree.get_children(NodeId::ROOT, "r").unwrap(), vec![id(19)]);
    }

    #[derive(Clone, Debug)]
    enum Op {
        Insert(u64),
        Move(usize, u64),
        Remove(usize),
    }

    fn ops() -> impl Strategy<Value = Vec<Op>> {
        prop::collection::vec(
            prop_oneof![
                3 => any::<u64>().prop_map(Op::Insert),
                1 => (any::<usize>(), any::<u64>()).prop_map(|(a, b)| Op::Move(a, b)),
                1 => any::<usize>().prop_map(Op::Remove),
            ],
            1..60,
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn child_order_matches_a_vec(ops in ops()) {
            let mut tree = Tree::create(store(), small(), "model").unwrap();
            let mut model: Vec<NodeId> = Vec::new();
            let mut next = 0;
            for op in ops {
                match op {
                    Op::Insert(at) => {
                        let index = at % (model.len() as u64 + 1);
                        tree = tree.add_new_child(NodeId::ROOT, "r", index, id(next), None).unwrap();
                        model.insert(index as usize, id(next));
                        next += 1;
                    }
                    Op::Move(from, to) if !model.is_empty() => {
                        let node = model.remove(from % model.len());
                        let index = to % (model.len() as u64 + 1);
                        tree = tree.move_child(NodeId::ROOT, "r", index, node).unwrap();
                        model.insert(index as usize, node);
                    }
                    Op::Remove(at) if !model.is_empty() => {
                        let node = model.remove(at % model.len());
                        tree = tree.remove_node(node).unwrap();
                    }
                    _ => {}
                }
                prop_assert_eq!(tree.get_children(NodeId::ROOT, "r").unwrap(), model.clone());
            }
        }
    }
}
