use std::path::Path;

use serde::{Deserialize, Serialize};
use sylva_merge::MergeOptions;
use sylva_tree::TreeConfig;
use sylva_types::{ClientId, RepositoryId};

use crate::error::{RepoError, RepoResult};

/// Settings for one [`Repository`](crate::Repository) handle.
///
/// Every field has a default, so a TOML file only needs the values it
/// changes:
///
/// ```toml
/// client_id = 7
/// author = "alice"
///
/// [tree]
/// inline_threshold = 16
///
/// [merge]
/// policy = "prefer_left"
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Id partition handed out by the coordinating server. Must be unique
    /// among live clients and never 0.
    pub client_id: u32,
    /// Embedded in global node references. A fresh UUID v7 by default.
    pub repository_id: RepositoryId,
    /// Recorded on every version this handle creates.
    pub author: String,
    /// Record cache size, in entries.
    pub cache_capacity: usize,
    /// Buffered events per replication subscriber before it lags.
    pub feed_capacity: usize,
    /// Attempts to advance a branch before giving up under contention.
    pub max_commit_retries: usize,
    pub tree: TreeConfig,
    pub merge: MergeOptions,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            client_id: 1,
            repository_id: RepositoryId::generate(),
            author: "anonymous".to_string(),
            cache_capacity: 4096,
            feed_capacity: 1024,
            max_commit_retries: 16,
            tree: TreeConfig::default(),
            merge: MergeOptions::default(),
        }
    }
}

impl RepositoryConfig {
    pub fn from_toml_str(s: &str) -> RepoResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| RepoError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> RepoResult<Self> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    pub fn to_toml_string(&self) -> RepoResult<String> {
        toml::to_string(self).map_err(|e| RepoError::Config(e.to_string()))
    }

    pub fn validate(&self) -> RepoResult<()> {
        self.client()?;
        self.tree.validate()?;
        if self.feed_capacity == 0 {
            return Err(RepoError::Config("feed_capacity must be positive".into()));
        }
        if self.max_commit_retries == 0 {
            return Err(RepoError::Config("max_commit_retries must be positive".into()));
        }
        Ok(())
    }

    pub fn client(&self) -> RepoResult<ClientId> {
        Ok(ClientId::new(self.client_id)?)
    }
}
