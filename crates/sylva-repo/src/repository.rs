//! The [`Repository`] facade: one client's handle on a shared model
//! repository.

use std::sync::{Arc, Mutex};

use sylva_cache::{CacheStats, CachingStore};
use sylva_diff::{diff_trees, TreeDiff};
use sylva_history::{History, Version, VersionRecord};
use sylva_merge::{merge_trees, Conflict, MergeInput};
use sylva_refs::{validate_branch_name, BranchStore, CasOutcome, InMemoryBranchStore};
use sylva_store::{InMemoryObjectStore, ObjectStore};
use sylva_tree::{AccessScope, Tree};
use sylva_types::{ClientId, Digest, IdGenerator, IdRange, NodeId, RepositoryId, TemporalAnchor};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::config::RepositoryConfig;
use crate::error::{RepoError, RepoResult};
use crate::feed::ReplicationEvent;

/// How two heads were reconciled.
#[derive(Clone, Debug)]
pub enum MergeResolution {
    /// One head already contained the other. No version was created.
    FastForward(Version),
    /// A new two-parent version holds the merged tree.
    Merged {
        version: Version,
        conflicts: Vec<Conflict>,
    },
}

impl MergeResolution {
    pub fn version(&self) -> &Version {
        match self {
            Self::FastForward(version) | Self::Merged { version, .. } => version,
        }
    }

    pub fn into_version(self) -> Version {
        match self {
            Self::FastForward(version) | Self::Merged { version, .. } => version,
        }
    }

    pub fn conflicts(&self) -> &[Conflict] {
        match self {
            Self::FastForward(_) => &[],
            Self::Merged { conflicts, .. } => conflicts,
        }
    }

    pub fn is_fast_forward(&self) -> bool {
        matches!(self, Self::FastForward(_))
    }
}

/// A client's handle on a repository.
///
/// Holds the explicit context every operation needs: configuration, a
/// cached view of the object store, the branch store, this client's id
/// generator and clock, and the outgoing replication feed. Trees are
/// immutable snapshots; the only shared mutable state is the branch store,
/// which moves by compare-and-swap.
pub struct Repository {
    config: RepositoryConfig,
    store: Arc<CachingStore<Arc<dyn ObjectStore>>>,
    branches: Arc<dyn BranchStore>,
    ids: IdGenerator,
    clock: Mutex<TemporalAnchor>,
    feed: broadcast::Sender<ReplicationEvent>,
}

impl Repository {
    pub fn open(
        config: RepositoryConfig,
        store: Arc<dyn ObjectStore>,
        branches: Arc<dyn BranchStore>,
    ) -> RepoResult<Self> {
        config.validate()?;
        let client = config.client()?;
        let (feed, _) = broadcast::channel(config.feed_capacity);
        info!(
            client = client.get(),
            repository = %config.repository_id,
            "opened repository"
        );
        Ok(Self {
            store: Arc::new(CachingStore::with_capacity(store, config.cache_capacity)),
            branches,
            ids: IdGenerator::new(client),
            clock: Mutex::new(TemporalAnchor::new(0, 0, client.get())),
            feed,
            config,
        })
    }

    /// A repository over fresh in-memory stores.
    pub fn in_memory(config: RepositoryConfig) -> RepoResult<Self> {
        Self::open(
            config,
            Arc::new(InMemoryObjectStore::new()),
            Arc::new(InMemoryBranchStore::new()),
        )
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub fn client(&self) -> ClientId {
        self.ids.client()
    }

    pub fn repository_id(&self) -> &RepositoryId {
        &self.config.repository_id
    }

    /// The cached object store, as trees see it.
    pub fn store(&self) -> Arc<dyn ObjectStore> {
        self.store.clone()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.store.stats()
    }

    pub(crate) fn feed(&self) -> &broadcast::Sender<ReplicationEvent> {
        &self.feed
    }

    // ---- ids ----

    pub fn new_node_id(&self) -> RepoResult<NodeId> {
        Ok(self.ids.generate()?)
    }

    pub fn new_node_ids(&self, quantity: u32) -> RepoResult<IdRange> {
        Ok(self.ids.generate_range(quantity)?)
    }

    // ---- branches ----

    /// Create `name` pointing at a new version holding an empty tree.
    pub fn init_branch(&self, name: &str) -> RepoResult<Version> {
        validate_branch_name(name)?;
        let tree = Tree::create(self.store(), self.config.tree, self.config.repository_id.as_str())?;
        let version = self.create_version(&[], tree.digest(), "initial version".to_string())?;
        match self.branches.advance(name, None, version.digest)? {
            CasOutcome::Advanced => {
                info!(branch = name, version = %version.digest.short_hex(), "initialized branch");
                self.publish(name, &version);
                Ok(version)
            }
            CasOutcome::Conflict { .. } => Err(RepoError::BranchExists(name.to_string())),
        }
    }

    /// Create `name` pointing at the head of `source`.
    pub fn fork_branch(&self, source: &str, name: &str) -> RepoResult<Version> {
        validate_branch_name(name)?;
        let head = self.head(source)?;
        match self.branches.advance(name, None, head.digest)? {
            CasOutcome::Advanced => {
                info!(source, branch = name, version = %head.digest.short_hex(), "forked branch");
                self.publish(name, &head);
                Ok(head)
            }
            CasOutcome::Conflict { .. } => Err(RepoError::BranchExists(name.to_string())),
        }
    }

    pub fn delete_branch(&self, name: &str) -> RepoResult<bool> {
        Ok(self.branches.delete(name)?)
    }

    /// All branches with their head digests, sorted by name.
    pub fn branches(&self) -> RepoResult<Vec<(String, Digest)>> {
        Ok(self.branches.list()?)
    }

    pub fn head(&self, branch: &str) -> RepoResult<Version> {
        let digest = self
            .branches
            .get(branch)?
            .ok_or_else(|| RepoError::BranchNotFound(branch.to_string()))?;
        self.load_version(digest)
    }

    // ---- versions and trees ----

    pub fn load_version(&self, digest: Digest) -> RepoResult<Version> {
        Ok(Version::load(self.store.as_ref(), digest)?)
    }

    pub fn tree_of(&self, version: &Version) -> RepoResult<Tree> {
        Ok(Tree::load(self.store(), self.config.tree, version.tree())?)
    }

    /// The tree at the head of `branch`.
    pub fn checkout(&self, branch: &str) -> RepoResult<Tree> {
        self.tree_of(&self.head(branch)?)
    }

    /// Versions reachable from the head of `branch`, newest first.
    pub fn history(&self, branch: &str, limit: usize) -> RepoResult<Vec<Version>> {
        let head = self.head(branch)?;
        Ok(History::new(self.store.as_ref()).log(head.digest, limit)?)
    }

    pub fn diff(&self, old: &Version, new: &Version) -> RepoResult<TreeDiff> {
        Ok(diff_trees(&self.tree_of(old)?, &self.tree_of(new)?)?)
    }

    /// Record `tree` as a child of `parent` and advance `branch` to it.
    ///
    /// Fails with [`RepoError::Conflict`] if `branch` no longer points at
    /// `parent`. The new version is stored either way.
    pub fn commit(
        &self,
        branch: &str,
        parent: &Version,
        tree: &Tree,
        message: impl Into<String>,
    ) -> RepoResult<Version> {
        let version = self.create_version(&[parent], tree.digest(), message.into())?;
        match self.branches.advance(branch, Some(parent.digest), version.digest)? {
            CasOutcome::Advanced => {
                info!(
                    branch,
                    version = %version.digest.short_hex(),
                    tree = %tree.digest().short_hex(),
                    "committed"
                );
                self.publish(branch, &version);
                Ok(version)
            }
            CasOutcome::Conflict { actual } => Err(RepoError::Conflict {
                branch: branch.to_string(),
                actual,
            }),
        }
    }

    // ---- scoped access ----

    /// Run `f` against the head tree of `branch` under a read guard.
    pub fn read<T>(
        &self,
        scope: &AccessScope,
        branch: &str,
        f: impl FnOnce(&Tree) -> RepoResult<T>,
    ) -> RepoResult<T> {
        let _guard = scope.enter_read();
        let tree = self.checkout(branch)?;
        f(&tree)
    }

    /// Edit the head tree of `branch` and commit the result.
    ///
    /// If another writer advanced the branch meanwhile, the edit is merged
    /// with the new head instead of being re-run. Returns the version the
    /// branch ends up at; an edit that changes nothing returns the current
    /// head without creating a version.
    pub fn write(
        &self,
        scope: &AccessScope,
        branch: &str,
        message: impl Into<String>,
        f: impl FnOnce(&Tree) -> RepoResult<Tree>,
    ) -> RepoResult<Version> {
        let _guard = scope.enter_write()?;
        let head = self.head(branch)?;
        let edited = f(&self.tree_of(&head)?)?;
        if edited.digest() == head.tree() {
            return Ok(head);
        }
        let version = self.create_version(&[&head], edited.digest(), message.into())?;
        self.advance_merging(branch, head, version)
    }

    fn advance_merging(
        &self,
        branch: &str,
        mut expected: Version,
        mut candidate: Version,
    ) -> RepoResult<Version> {
        for attempt in 1..=self.config.max_commit_retries {
            match self
                .branches
                .advance(branch, Some(expected.digest), candidate.digest)?
            {
                CasOutcome::Advanced => {
                    info!(branch, version = %candidate.digest.short_hex(), attempt, "committed");
                    self.publish(branch, &candidate);
                    return Ok(candidate);
                }
                CasOutcome::Conflict { actual: None } => {
                    return Err(RepoError::BranchNotFound(branch.to_string()));
                }
                CasOutcome::Conflict {
                    actual: Some(actual),
                } => {
                    debug!(branch, attempt, head = %actual.short_hex(), "branch moved, merging");
                    let current = self.load_version(actual)?;
                    candidate = self.merge_versions(&current, &candidate)?.into_version();
                    if candidate.digest == current.digest {
                        return Ok(current);
                    }
                    expected = current;
                }
            }
        }
        Err(RepoError::RetriesExhausted {
            branch: branch.to_string(),
            attempts: self.config.max_commit_retries,
        })
    }

    // ---- merging ----

    /// Reconcile two versions.
    ///
    /// Equal heads, or one head descending from the other, fast-forward.
    /// Otherwise the trees are merged against the latest common ancestor
    /// and stored as a version with parents `[ours, theirs]`.
    pub fn merge_versions(&self, ours: &Version, theirs: &Version) -> RepoResult<MergeResolution> {
        if ours.digest == theirs.digest {
            return Ok(MergeResolution::FastForward(ours.clone()));
        }
        let history = History::new(self.store.as_ref());
        if history.is_ancestor(theirs.digest, ours.digest)? {
            return Ok(MergeResolution::FastForward(ours.clone()));
        }
        if history.is_ancestor(ours.digest, theirs.digest)? {
            return Ok(MergeResolution::FastForward(theirs.clone()));
        }
        let base = history
            .common_ancestor(ours.digest, theirs.digest)?
            .ok_or(RepoError::UnrelatedHistories {
                ours: ours.digest,
                theirs: theirs.digest,
            })?;

        let base_tree = self.tree_of(&base)?;
        let ours_tree = self.tree_of(ours)?;
        let theirs_tree = self.tree_of(theirs)?;
        let outcome = merge_trees(
            &base_tree,
            MergeInput::new(&ours_tree, ours.timestamp(), ours.digest),
            MergeInput::new(&theirs_tree, theirs.timestamp(), theirs.digest),
            &self.config.merge,
        )?;
        let message = format!(
            "merge {} into {}",
            theirs.digest.short_hex(),
            ours.digest.short_hex()
        );
        let version = self.create_version(&[ours, theirs], outcome.tree.digest(), message)?;
        info!(
            version = %version.digest.short_hex(),
            base = %base.digest.short_hex(),
            conflicts = outcome.conflicts.len(),
            "merged versions"
        );
        Ok(MergeResolution::Merged {
            version,
            conflicts: outcome.conflicts,
        })
    }

    /// Merge the head of `source` into `target` and advance `target`.
    pub fn merge_branch(&self, target: &str, source: &str) -> RepoResult<MergeResolution> {
        let theirs = self.head(source)?;
        for attempt in 1..=self.config.max_commit_retries {
            let ours = self.head(target)?;
            let resolution = self.merge_versions(&ours, &theirs)?;
            let merged = resolution.version();
            if merged.digest == ours.digest {
                return Ok(resolution);
            }
            match self.branches.advance(target, Some(ours.digest), merged.digest)? {
                CasOutcome::Advanced => {
                    info!(
                        branch = target,
                        source,
                        version = %merged.digest.short_hex(),
                        fast_forward = resolution.is_fast_forward(),
                        "merged branch"
                    );
                    self.publish(target, merged);
                    return Ok(resolution);
                }
                CasOutcome::Conflict { actual: None } => {
                    return Err(RepoError::BranchNotFound(target.to_string()));
                }
                CasOutcome::Conflict { .. } => {
                    debug!(branch = target, attempt, "target moved during merge, retrying");
                }
            }
        }
        Err(RepoError::RetriesExhausted {
            branch: target.to_string(),
            attempts: self.config.max_commit_retries,
        })
    }

    // ---- internals ----

    fn next_timestamp(&self, parents: &[&Version]) -> TemporalAnchor {
        let mut clock = self.clock.lock().expect("clock mutex poisoned");
        *clock = clock.tick(parents.iter().map(|v| &v.record.timestamp));
        *clock
    }

    pub(crate) fn create_version(
        &self,
        parents: &[&Version],
        tree: Digest,
        message: String,
    ) -> RepoResult<Version> {
        let record = VersionRecord {
            parents: parents.iter().map(|v| v.digest).collect(),
            tree,
            author: self.config.author.clone(),
            timestamp: self.next_timestamp(parents),
            message: Some(message),
        };
        Ok(Version::create(self.store.as_ref(), record)?)
    }

    pub(crate) fn branch_store(&self) -> &dyn BranchStore {
        self.branches.as_ref()
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("client", &self.client())
            .field("repository_id", &self.config.repository_id)
            .finish_non_exhaustive()
    }
}
