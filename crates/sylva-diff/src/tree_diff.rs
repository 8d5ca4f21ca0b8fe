//! Structural diff: compare two model trees and produce a list of changes.
//!
//! Both trees are walked in lockstep from the root. Subtrees whose digests
//! match are skipped without being loaded, so the cost is proportional to
//! the size of the change, not the size of the tree.
//!
//! Children are matched by node id. A node that is still under the same
//! parent with the same child key is compared recursively; one that
//! appears somewhere else is a move; one that disappears from the new tree
//! entirely is a removal of its whole subtree.
//!
//! The children of a changed node that the walk will descend into are
//! fetched together, with one batched read per tree.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use sylva_tree::{ChildEntry, ChildKey, NodeRecord, Tree};
use sylva_types::{Digest, NodeId};
use tracing::debug;

use crate::change::{Change, Placement};
use crate::error::DiffResult;

/// The result of comparing two trees.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TreeDiff {
    /// Changes in walk order: pre-order over the new tree, parents before
    /// children.
    pub changes: Vec<Change>,
}

impl TreeDiff {
    /// Returns `true` if there are no changes.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Number of changes.
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Change> {
        self.changes.iter()
    }
}

impl<'a> IntoIterator for &'a TreeDiff {
    type Item = &'a Change;
    type IntoIter = std::slice::Iter<'a, Change>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}

/// Compare `old` with `new`.
pub fn diff_trees(old: &Tree, new: &Tree) -> DiffResult<TreeDiff> {
    let mut walker = Walker {
        old,
        new,
        loaded: HashMap::new(),
        changes: Vec::new(),
    };
    walker.compare(old.root_digest(), new.root_digest())?;
    debug!(
        old = %old.digest().short_hex(),
        new = %new.digest().short_hex(),
        changes = walker.changes.len(),
        "diffed trees"
    );
    Ok(TreeDiff {
        changes: walker.changes,
    })
}

struct Walker<'a> {
    old: &'a Tree,
    new: &'a Tree,
    /// Records fetched ahead of the walk, by digest.
    loaded: HashMap<Digest, NodeRecord>,
    changes: Vec<Change>,
}

/// The child lists of one role on both sides.
struct RoleLists {
    role: String,
    old: Vec<ChildEntry>,
    new: Vec<ChildEntry>,
}

impl Walker<'_> {
    /// Compare two records of the same node.
    fn compare(&mut self, old_digest: Digest, new_digest: Digest) -> DiffResult<()> {
        if old_digest == new_digest {
            return Ok(());
        }
        let old = self.take(self.old, old_digest)?;
        let new = self.take(self.new, new_digest)?;
        if old.concept != new.concept {
            self.changes.push(Change::ConceptChanged {
                id: new.id,
                old: old.concept.clone(),
                new: new.concept.clone(),
            });
        }
        self.fields(Some(&old), &new);

        let roles: BTreeSet<&String> = old.children.keys().chain(new.children.keys()).collect();
        let mut lists = Vec::with_capacity(roles.len());
        for role in roles {
            lists.push(RoleLists {
                role: role.clone(),
                old: entries(self.old, &old, role)?,
                new: entries(self.new, &new, role)?,
            });
        }

        let mut old_wanted = Vec::new();
        let mut new_wanted = Vec::new();
        for list in &lists {
            let old_keys: HashMap<NodeId, &ChildEntry> =
                list.old.iter().map(|e| (e.key.id, e)).collect();
            for entry in &list.new {
                match old_keys.get(&entry.key.id) {
                    Some(before) if before.key == entry.key => {
                        if before.digest != entry.digest {
                            old_wanted.push(before.digest);
                            new_wanted.push(entry.digest);
                        }
                    }
                    _ => new_wanted.push(entry.digest),
                }
            }
        }
        self.fetch(self.old, old_wanted)?;
        self.fetch(self.new, new_wanted)?;

        for list in &lists {
            let role = list.role.as_str();
            let old_keys: HashMap<NodeId, &ChildEntry> =
                list.old.iter().map(|e| (e.key.id, e)).collect();
            let new_keys: HashMap<NodeId, &ChildKey> =
                list.new.iter().map(|e| (e.key.id, &e.key)).collect();

            for entry in &list.new {
                match old_keys.get(&entry.key.id) {
                    Some(before) if before.key == entry.key => {
                        self.compare(before.digest, entry.digest)?
                    }
                    _ => self.arrive(new.id, role, entry)?,
                }
            }
            for entry in &list.old {
                let stayed = new_keys.get(&entry.key.id) == Some(&&entry.key);
                if !stayed && !self.new.contains(entry.key.id)? {
                    self.changes.push(Change::NodeRemoved {
                        id: entry.key.id,
                        placement: Placement {
                            parent: old.id,
                            role: role.to_owned(),
                            position: entry.key.position.clone(),
                        },
                    });
                }
            }
        }
        Ok(())
    }

    /// A record fetched ahead of time, or a single read from `tree`.
    fn take(&mut self, tree: &Tree, digest: Digest) -> DiffResult<NodeRecord> {
        match self.loaded.remove(&digest) {
            Some(record) => Ok(record),
            None => Ok(tree.load_node(&digest)?),
        }
    }

    /// Fetch the records of `digests` from `tree` with one batched read.
    fn fetch(&mut self, tree: &Tree, mut digests: Vec<Digest>) -> DiffResult<()> {
        digests.retain(|d| !self.loaded.contains_key(d));
        digests.sort_unstable();
        digests.dedup();
        let records = tree.load_nodes(&digests)?;
        self.loaded.extend(digests.into_iter().zip(records));
        Ok(())
    }

    /// A child that is new at this placement: either moved here or added.
    fn arrive(&mut self, parent: NodeId, role: &str, entry: &ChildEntry) -> DiffResult<()> {
        let id = entry.key.id;
        let to = Placement {
            parent,
            role: role.to_owned(),
            position: entry.key.position.clone(),
        };
        match self.old.parent_link(id)? {
            Some(link) => {
                self.changes.push(Change::NodeMoved {
                    id,
                    from: link.into(),
                    to,
                });
                let before = self.old.node_digest(id)?;
                self.compare(before, entry.digest)
            }
            None => self.add(to, entry.digest),
        }
    }

    fn add(&mut self, placement: Placement, digest: Digest) -> DiffResult<()> {
        let record = self.take(self.new, digest)?;
        self.changes.push(Change::NodeAdded {
            id: record.id,
            placement,
            concept: record.concept.clone(),
        });
        self.fields(None, &record);
        let mut lists = Vec::with_capacity(record.children.len());
        for role in record.children.keys() {
            lists.push((role, entries(self.new, &record, role)?));
        }
        let wanted = lists
            .iter()
            .flat_map(|(_, entries)| entries.iter().map(|e| e.digest))
            .collect();
        self.fetch(self.new, wanted)?;
        for (role, entries) in lists {
            for entry in entries {
                self.arrive(record.id, role, &entry)?;
            }
        }
        Ok(())
    }

    /// Property and reference changes of one node.
    fn fields(&mut self, old: Option<&NodeRecord>, new: &NodeRecord) {
        let empty = NodeRecord::new(new.id, None);
        let old = old.unwrap_or(&empty);
        let id = new.id;

        for (role, value) in &new.properties {
            let before = old.properties.get(role);
            if before != Some(value) {
                self.changes.push(Change::PropertySet {
                    id,
                    role: role.clone(),
                    old: before.cloned(),
                    new: value.clone(),
                });
            }
        }
        for (role, value) in removed(&old.properties, &new.properties) {
            self.changes.push(Change::PropertyRemoved {
                id,
                role: role.clone(),
                old: value.clone(),
            });
        }

        for (role, target) in &new.references {
            let before = old.references.get(role);
            if before != Some(target) {
                self.changes.push(Change::ReferenceSet {
                    id,
                    role: role.clone(),
                    old: before.cloned(),
                    new: target.clone(),
                });
            }
        }
        for (role, target) in removed(&old.references, &new.references) {
            self.changes.push(Change::ReferenceRemoved {
                id,
                role: role.clone(),
                old: target.clone(),
            });
        }
    }
}

fn entries(tree: &Tree, record: &NodeRecord, role: &str) -> DiffResult<Vec<ChildEntry>> {
    match record.children.get(role) {
        Some(list) => Ok(list.entries(&**tree.store())?),
        None => Ok(Vec::new()),
    }
}

fn removed<'a, V>(
    old: &'a BTreeMap<String, V>,
    new: &'a BTreeMap<String, V>,
) -> impl Iterator<Item = (&'a String, &'a V)> {
    old.iter().filter(move |(role, _)| !new.contains_key(*role))
}
