//! The [`BranchStore`] trait defining the branch storage interface.

use serde::{Deserialize, Serialize};
use sylva_types::Digest;

use crate::error::RefResult;

/// Result of a compare-and-swap on a branch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CasOutcome {
    /// The branch now points at the candidate version.
    Advanced,
    /// The branch did not hold the expected value; nothing changed.
    Conflict {
        /// What the branch actually points at (`None` if it does not exist).
        actual: Option<Digest>,
    },
}

impl CasOutcome {
    pub fn is_advanced(&self) -> bool {
        matches!(self, Self::Advanced)
    }
}

/// Storage backend for named branch pointers.
///
/// A branch is the only mutable shared state in a repository. It can only
/// move through [`advance`](Self::advance), which succeeds when the branch
/// still holds the value the caller last observed.
pub trait BranchStore: Send + Sync {
    /// Current head of `name`, or `None` if the branch does not exist.
    fn get(&self, name: &str) -> RefResult<Option<Digest>>;

    /// Point `name` at `candidate` if it currently holds `expected`.
    ///
    /// `expected = None` means the branch must not exist yet.
    fn advance(
        &self,
        name: &str,
        expected: Option<Digest>,
        candidate: Digest,
    ) -> RefResult<CasOutcome>;

    /// All branches with their heads, sorted by name.
    fn list(&self) -> RefResult<Vec<(String, Digest)>>;

    /// Delete a branch. Returns `Ok(false)` if it did not exist.
    fn delete(&self, name: &str) -> RefResult<bool>;

    /// Whether `name` exists.
    fn contains(&self, name: &str) -> RefResult<bool> {
        Ok(self.get(name)?.is_some())
    }
}
