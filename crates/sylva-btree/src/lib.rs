//! Persistent B-tree for Sylva.
//!
//! An ordered map whose pages are immutable records in an
//! [`ObjectStore`](sylva_store::ObjectStore). A [`BTree`] handle is just a
//! root digest and an entry count; every mutation writes the modified
//! root-to-leaf path and returns a new handle, leaving the old one valid.
//!
//! Child links carry the entry count of their subtree, so [`BTree::len`] is
//! O(1) and [`BTree::nth`] / [`BTree::rank`] are O(log n).

pub mod config;
pub mod error;
pub mod page;
pub mod tree;
pub mod validate;

pub use config::BTreeConfig;
pub use error::{BTreeError, BTreeResult};
pub use page::{ChildRef, Page};
pub use tree::BTree;
