//! Branch pointers for Sylva.
//!
//! A branch is a mutable, named pointer to a version digest. Branches are
//! the only mutable shared state in a repository and only move by
//! compare-and-swap, so concurrent writers can never lose each other's
//! commits.
//!
//! # Modules
//!
//! - [`error`]: Error types for branch operations
//! - [`traits`]: The [`BranchStore`] trait and [`CasOutcome`]
//! - [`names`]: Branch name validation
//! - [`memory`]: In-memory [`InMemoryBranchStore`]

pub mod error;
pub mod memory;
pub mod names;
pub mod traits;

pub use error::{RefError, RefResult};
pub use memory::InMemoryBranchStore;
pub use names::validate_branch_name;
pub use traits::{BranchStore, CasOutcome};
