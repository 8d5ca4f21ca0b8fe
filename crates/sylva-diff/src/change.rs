use std::fmt;

use serde::{Deserialize, Serialize};
use sylva_tree::{OrderKey, ParentLink};
use sylva_types::{NodeId, NodeReference};

/// Where a node hangs: parent, containment role and order key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Placement {
    pub parent: NodeId,
    pub role: String,
    pub position: OrderKey,
}

impl From<ParentLink> for Placement {
    fn from(link: ParentLink) -> Self {
        Self {
            parent: link.parent,
            role: link.role,
            position: link.position,
        }
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}@{:?}", self.parent, self.role, self.position)
    }
}

/// A single change between two trees.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Change {
    /// A node that did not exist before. Its fields follow as separate
    /// `PropertySet` / `ReferenceSet` changes, its children as further
    /// `NodeAdded` (or `NodeMoved`) changes.
    NodeAdded {
        id: NodeId,
        placement: Placement,
        concept: Option<String>,
    },
    /// A node and its whole subtree are gone.
    NodeRemoved { id: NodeId, placement: Placement },
    /// A node changed parent, role or order key.
    NodeMoved {
        id: NodeId,
        from: Placement,
        to: Placement,
    },
    ConceptChanged {
        id: NodeId,
        old: Option<String>,
        new: Option<String>,
    },
    PropertySet {
        id: NodeId,
        role: String,
        old: Option<String>,
        new: String,
    },
    PropertyRemoved {
        id: NodeId,
        role: String,
        old: String,
    },
    ReferenceSet {
        id: NodeId,
        role: String,
        old: Option<NodeReference>,
        new: NodeReference,
    },
    ReferenceRemoved {
        id: NodeId,
        role: String,
        old: NodeReference,
    },
}

impl Change {
    /// The node the change is about.
    pub fn node(&self) -> NodeId {
        match self {
            Self::NodeAdded { id, .. }
            | Self::NodeRemoved { id, .. }
            | Self::NodeMoved { id, .. }
            | Self::ConceptChanged { id, .. }
            | Self::PropertySet { id, .. }
            | Self::PropertyRemoved { id, .. }
            | Self::ReferenceSet { id, .. }
            | Self::ReferenceRemoved { id, .. } => *id,
        }
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NodeAdded { id, placement, .. } => write!(f, "+ {id} at {placement}"),
            Self::NodeRemoved { id, .. } => write!(f, "- {id}"),
            Self::NodeMoved { id, to, .. } => write!(f, "~ {id} to {to}"),
            Self::ConceptChanged { id, new, .. } => write!(f, "{id}: concept = {new:?}"),
            Self::PropertySet { id, role, new, .. } => write!(f, "{id}.{role} = {new:?}"),
            Self::PropertyRemoved { id, role, .. } => write!(f, "{id}.{role} unset"),
            Self::ReferenceSet { id, role, new, .. } => write!(f, "{id}.{role} -> {new}"),
            Self::ReferenceRemoved { id, role, .. } => write!(f, "{id}.{role} -> none"),
        }
    }
}
