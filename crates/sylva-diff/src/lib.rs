//! Structural diff between Sylva model trees.
//!
//! [`diff_trees`] walks two [`Tree`](sylva_tree::Tree)s in lockstep and
//! reports node additions, removals and moves plus concept, property and
//! reference changes. Equal subtree digests are skipped.

pub mod change;
pub mod error;
pub mod tree_diff;

pub use change::{Change, Placement};
pub use error::{DiffError, DiffResult};
pub use tree_diff::{diff_trees, TreeDiff};
