use std::fmt;

use serde::{Deserialize, Serialize};
use sylva_types::{NodeId, NodeReference};

use crate::policy::MergeSide;

/// A single-valued node field, as seen by the merge.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Slot {
    Concept,
    Property(String),
    Reference(String),
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Concept => write!(f, "concept"),
            Self::Property(role) => write!(f, "property {role}"),
            Self::Reference(role) => write!(f, "reference {role}"),
        }
    }
}

/// The value a side gave a [`Slot`]; `None` clears it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum SlotValue {
    Text(Option<String>),
    Reference(Option<NodeReference>),
}

/// A conflict found, and resolved, during a merge.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Conflict {
    /// Both sides set the same field to different values.
    Field {
        node: NodeId,
        slot: Slot,
        kept: MergeSide,
    },
    /// Both sides moved the same node to different places.
    Move { node: NodeId, kept: MergeSide },
    /// One side removed a subtree the other side edited. The subtree is kept.
    DeleteEdit { node: NodeId, removed_by: MergeSide },
    /// A move would have made a node its own ancestor and was dropped.
    Cycle { node: NodeId, dropped_from: MergeSide },
}

impl Conflict {
    pub fn node(&self) -> NodeId {
        match self {
            Self::Field { node, .. }
            | Self::Move { node, .. }
            | Self::DeleteEdit { node, .. }
            | Self::Cycle { node, .. } => *node,
        }
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field { node, slot, kept } => write!(f, "{node}: {slot} changed on both sides, kept {kept:?}"),
            Self::Move { node, kept } => write!(f, "{node}: moved on both sides, kept {kept:?}"),
            Self::DeleteEdit { node, removed_by } => {
                write!(f, "{node}: removed by {removed_by:?} but edited on the other side, kept")
            }
            Self::Cycle { node, dropped_from } => {
                write!(f, "{node}: move from {dropped_from:?} would create a cycle, dropped")
            }
        }
    }
}
