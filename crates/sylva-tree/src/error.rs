use sylva_btree::BTreeError;
use sylva_store::StoreError;
use sylva_types::NodeId;

/// Errors from tree reads and edits.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("b-tree error: {0}")]
    BTree(#[from] BTreeError),

    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("node already exists: {0}")]
    DuplicateNode(NodeId),

    /// Moving `node` under `new_parent` would make it its own ancestor.
    #[error("moving {node} under {new_parent} would create a containment cycle")]
    ContainmentCycle { node: NodeId, new_parent: NodeId },

    #[error("the root node cannot be moved or removed")]
    RootImmutable,

    #[error("index {index} out of bounds for {len} children")]
    IndexOutOfBounds { index: u64, len: u64 },

    #[error("write access requested inside a read scope")]
    WriteInReadScope,

    /// The parent index and the node records disagree.
    #[error("inconsistent tree: {0}")]
    Inconsistent(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result alias for tree operations.
pub type TreeResult<T> = Result<T, TreeError>;
