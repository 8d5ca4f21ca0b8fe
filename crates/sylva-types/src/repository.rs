use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a repository.
///
/// Assigned once at creation and embedded in global node references, so it
/// must never change. Fresh ids are UUID v7 strings; any non-empty string
/// supplied by a coordinating server is accepted as well.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepositoryId(String);

impl RepositoryId {
    /// Generate a new time-ordered repository id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RepositoryId {
    fn default() -> Self {
        Self::generate()
    }
}

impl fmt::Debug for RepositoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RepositoryId({})", self.0)
    }
}

impl fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique_uuids() {
        let a = RepositoryId::generate();
        let b = RepositoryId::generate();
        assert_ne!(a, b);
        assert!(uuid::Uuid::parse_str(a.as_str()).is_ok());
    }

    #[test]
    fn explicit_ids_are_kept() {
        assert_eq!(RepositoryId::new("models").as_str(), "models");
        assert_eq!(format!("{}", RepositoryId::new("models")), "models");
    }
}
