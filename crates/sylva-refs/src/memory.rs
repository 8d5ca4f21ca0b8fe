//! In-memory branch store.
//!
//! [`InMemoryBranchStore`] keeps all branches in a `BTreeMap` behind a
//! `RwLock`. Data is lost when the store is dropped.

use std::collections::BTreeMap;
use std::sync::RwLock;

use sylva_types::Digest;
use tracing::{debug, warn};

use crate::error::{RefError, RefResult};
use crate::names::validate_branch_name;
use crate::traits::{BranchStore, CasOutcome};

/// An in-memory implementation of [`BranchStore`].
#[derive(Debug, Default)]
pub struct InMemoryBranchStore {
    branches: RwLock<BTreeMap<String, Digest>>,
}

impl InMemoryBranchStore {
    /// Create a new empty branch store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned(e: impl std::fmt::Display) -> RefError {
    RefError::Unavailable(format!("lock poisoned: {e}"))
}

impl BranchStore for InMemoryBranchStore {
    fn get(&self, name: &str) -> RefResult<Option<Digest>> {
        let branches = self.branches.read().map_err(poisoned)?;
        Ok(branches.get(name).copied())
    }

    fn advance(
        &self,
        name: &str,
        expected: Option<Digest>,
        candidate: Digest,
    ) -> RefResult<CasOutcome> {
        validate_branch_name(name)?;

        let mut branches = self.branches.write().map_err(poisoned)?;
        let actual = branches.get(name).copied();
        if actual != expected {
            warn!(
                branch = name,
                expected = ?expected.map(|d| d.short_hex()),
                actual = ?actual.map(|d| d.short_hex()),
                "branch CAS conflict"
            );
            return Ok(CasOutcome::Conflict { actual });
        }
        branches.insert(name.to_string(), candidate);
        debug!(branch = name, head = %candidate.short_hex(), "advanced branch");
        Ok(CasOutcome::Advanced)
    }

    fn list(&self) -> RefResult<Vec<(String, Digest)>> {
        let branches = self.branches.read().map_err(poisoned)?;
        Ok(branches.iter().map(|(k, v)| (k.clone(), *v)).collect())
    }

    fn delete(&self, name: &str) -> RefResult<bool> {
        let mut branches = self.branches.write().map_err(poisoned)?;
        Ok(branches.remove(name).is_some())
    }
}
