use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sylva_btree::BTree;
use sylva_store::{ObjectKind, Record};
use sylva_types::{Digest, NodeId, NodeReference};

use crate::children::{ChildKey, ChildList};
use crate::order_key::OrderKey;

/// The stored form of one node.
///
/// Child lists hold the digests of the child records, so a node's digest
/// covers its whole subtree: two nodes with equal digests have equal
/// subtrees.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: NodeId,
    /// Opaque concept reference.
    pub concept: Option<String>,
    pub properties: BTreeMap<String, String>,
    pub references: BTreeMap<String, NodeReference>,
    /// Non-empty child lists by role.
    pub children: BTreeMap<String, ChildList>,
}

impl NodeRecord {
    pub fn new(id: NodeId, concept: Option<String>) -> Self {
        Self {
            id,
            concept,
            properties: BTreeMap::new(),
            references: BTreeMap::new(),
            children: BTreeMap::new(),
        }
    }
}

impl Record for NodeRecord {
    const KIND: ObjectKind = ObjectKind::Node;
}

/// Where a non-root node hangs in the tree.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParentLink {
    pub parent: NodeId,
    pub role: String,
    pub position: OrderKey,
}

impl ParentLink {
    /// The key of `child` in its parent's list.
    pub fn child_key(&self, child: NodeId) -> ChildKey {
        ChildKey {
            position: self.position.clone(),
            id: child,
        }
    }
}

/// The stored form of a tree: its root node plus the parent index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeRecord {
    pub tree_id: String,
    /// Digest of the root node record.
    pub root: Digest,
    /// Every non-root node id mapped to its parent link.
    pub index: BTree<NodeId, ParentLink>,
}

impl Record for TreeRecord {
    const KIND: ObjectKind = ObjectKind::Tree;
}
