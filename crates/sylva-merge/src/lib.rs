//! Three-way merge of Sylva model trees.
//!
//! [`merge_trees`] diffs both sides against their common base and applies
//! the union of the changes to the base. Conflicts are resolved by a
//! [`ConflictPolicy`] and reported in the [`MergeOutcome`].
//!
//! Rules:
//!
//! - additions never conflict
//! - removing a subtree the other side edited keeps the subtree
//! - a node moved to different places on both sides goes where the
//!   winning side put it
//! - a move that would create a containment cycle is dropped
//! - concurrent insertions at one position are ordered by node id

pub mod conflict;
pub mod error;
pub mod merge;
pub mod policy;

pub use conflict::{Conflict, Slot};
pub use error::{MergeError, MergeResult};
pub use merge::{merge_trees, MergeInput, MergeOutcome};
pub use policy::{ConflictPolicy, MergeOptions, MergeSide};
