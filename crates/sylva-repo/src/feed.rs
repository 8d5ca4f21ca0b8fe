//! Replication between repository handles.
//!
//! Every branch advance is announced on a `tokio::sync::broadcast` channel
//! as a [`ReplicationEvent`]. A peer that can read the same objects applies
//! events with [`Repository::receive`], or drives a subscription with
//! [`Repository::run_replication`].

use serde::{Deserialize, Serialize};
use sylva_history::Version;
use sylva_refs::CasOutcome;
use sylva_types::Digest;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::error::{RepoError, RepoResult};
use crate::repository::Repository;

/// A branch advanced to a new version.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationEvent {
    pub branch: String,
    pub version: Digest,
}

impl Repository {
    /// Subscribe to this repository's branch advances.
    pub fn subscribe(&self) -> broadcast::Receiver<ReplicationEvent> {
        self.feed().subscribe()
    }

    pub(crate) fn publish(&self, branch: &str, version: &Version) {
        let event = ReplicationEvent {
            branch: branch.to_string(),
            version: version.digest,
        };
        // Sending only fails when nobody is subscribed.
        if let Ok(receivers) = self.feed().send(event) {
            debug!(branch, version = %version.digest.short_hex(), receivers, "published");
        }
    }

    /// Integrate a peer's branch head into the local branch of the same
    /// name.
    ///
    /// A missing local branch adopts the remote head. Otherwise the remote
    /// head is fast-forwarded to or merged with the local one and the
    /// branch advanced by compare-and-swap, recomputing if it moved.
    /// Returns the new local head, or `None` if the local branch already
    /// contained the remote version. A merge version created here is
    /// published in turn so the peer can pick it up.
    pub fn receive(&self, event: &ReplicationEvent) -> RepoResult<Option<Version>> {
        let remote = self.load_version(event.version)?;
        let branch = event.branch.as_str();
        let attempts = self.config().max_commit_retries;
        for attempt in 1..=attempts {
            let (expected, candidate) = match self.branch_store().get(branch)? {
                None => (None, remote.clone()),
                Some(local) if local == remote.digest => return Ok(None),
                Some(local) => {
                    let local = self.load_version(local)?;
                    let resolution = self.merge_versions(&local, &remote)?;
                    if resolution.version().digest == local.digest {
                        return Ok(None);
                    }
                    (Some(local.digest), resolution.into_version())
                }
            };
            match self.branch_store().advance(branch, expected, candidate.digest)? {
                CasOutcome::Advanced => {
                    info!(
                        branch,
                        remote = %remote.digest.short_hex(),
                        head = %candidate.digest.short_hex(),
                        "applied replication event"
                    );
                    if candidate.digest != remote.digest {
                        self.publish(branch, &candidate);
                    }
                    return Ok(Some(candidate));
                }
                CasOutcome::Conflict { .. } => {
                    debug!(branch, attempt, "branch moved while applying event, retrying");
                }
            }
        }
        Err(RepoError::RetriesExhausted {
            branch: branch.to_string(),
            attempts,
        })
    }

    /// Apply events from `feed` until every sender is gone.
    ///
    /// Events that fail to apply are logged and skipped. Returns how many
    /// events changed a local branch.
    pub async fn run_replication(&self, mut feed: broadcast::Receiver<ReplicationEvent>) -> usize {
        let mut applied = 0;
        loop {
            match feed.recv().await {
                Ok(event) => match self.receive(&event) {
                    Ok(Some(_)) => applied += 1,
                    Ok(None) => {}
                    Err(e) => warn!(
                        branch = %event.branch,
                        version = %event.version.short_hex(),
                        error = %e,
                        "failed to apply replication event"
                    ),
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "replication feed lagged, events dropped")
                }
                Err(RecvError::Closed) => break,
            }
        }
        info!(applied, "replication feed closed");
        applied
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use sylva_refs::{BranchStore, InMemoryBranchStore};
    use sylva_store::{InMemoryObjectStore, ObjectStore};
    use sylva_tree::{AccessScope, ModelQuery};
    use sylva_types::{NodeId, RepositoryId};

    use super::*;
    use crate::config::RepositoryConfig;

    fn config(client: u32) -> RepositoryConfig {
        RepositoryConfig {
            client_id: client,
            repository_id: RepositoryId::new("shared"),
            ..RepositoryConfig::default()
        }
    }

    /// Two clients sharing objects but each holding its own branch heads.
    fn peers() -> (Repository, Repository) {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemoryObjectStore::new());
        let open = |client| {
            let branches: Arc<dyn BranchStore> = Arc::new(InMemoryBranchStore::new());
            Repository::open(config(client), store.clone(), branches).unwrap()
        };
        (open(1), open(2))
    }

    fn event(branch: &str, version: &Version) -> ReplicationEvent {
        ReplicationEvent {
            branch: branch.to_string(),
            version: version.digest,
        }
    }

    #[test]
    fn commits_are_published() {
        let (a, _) = peers();
        let mut rx = a.subscribe();
        let v0 = a.init_branch("main").unwrap();
        assert_eq!(rx.try_recv().unwrap(), event("main", &v0));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn missing_branch_adopts_the_remote_head() {
        let (a, b) = peers();
        let v0 = a.init_branch("main").unwrap();
        assert_eq!(b.receive(&event("main", &v0)).unwrap(), Some(v0.clone()));
        assert_eq!(b.head("main").unwrap(), v0);
        // Replaying is a no-op.
        assert_eq!(b.receive(&event("main", &v0)).unwrap(), None);
    }

    #[test]
    fn older_remote_versions_are_ignored() {
        let (a, b) = peers();
        let v0 = a.init_branch("main").unwrap();
        b.receive(&event("main", &v0)).unwrap();
        let scope = AccessScope::new();
        let id = b.new_node_id().unwrap();
        let v1 = b
            .write(&scope, "main", "add", |tree| {
                Ok(tree.add_new_child(NodeId::ROOT, "children", 0, id, None)?)
            })
            .unwrap();
        assert_eq!(b.receive(&event("main", &v0)).unwrap(), None);
        assert_eq!(b.head("main").unwrap(), v1);
    }

    #[test]
    fn unknown_version_is_an_error() {
        let (_, b) = peers();
        let bogus = ReplicationEvent {
            branch: "main".into(),
            version: Digest::of(b"nothing"),
        };
        assert!(b.receive(&bogus).is_err());
        assert!(matches!(b.head("main"), Err(RepoError::BranchNotFound(_))));
    }

    /// Both clients start from a tree holding N1. A renames N1 to "b"
    /// while B adds N2 under N1. After exchanging heads both clients hold
    /// both changes.
    #[test]
    fn two_clients_converge() {
        let (a, b) = peers();
        let scope = AccessScope::new();
        a.init_branch("main").unwrap();
        let n1 = a.new_node_id().unwrap();
        let shared = a
            .write(&scope, "main", "add N1", |tree| {
                Ok(tree
                    .add_new_child(NodeId::ROOT, "children", 0, n1, Some("Node".into()))?
                    .set_property(n1, "name", Some("a".into()))?)
            })
            .unwrap();
        b.receive(&event("main", &shared)).unwrap();

        let renamed = a
            .write(&scope, "main", "rename N1", |tree| {
                Ok(tree.set_property(n1, "name", Some("b".into()))?)
            })
            .unwrap();
        let n2 = b.new_node_id().unwrap();
        let added = b
            .write(&scope, "main", "add N2", |tree| {
                Ok(tree.add_new_child(n1, "children", 0, n2, Some("Node".into()))?)
            })
            .unwrap();

        let merged = b.receive(&event("main", &renamed)).unwrap().unwrap();
        assert_eq!(merged.parents(), &[added.digest, renamed.digest]);
        let forwarded = a.receive(&event("main", &merged)).unwrap();
        assert_eq!(forwarded, Some(merged.clone()));

        for client in [&a, &b] {
            assert_eq!(client.head("main").unwrap(), merged);
            let tree = client.checkout("main").unwrap();
            assert_eq!(tree.get_property(n1, "name").unwrap().as_deref(), Some("b"));
            assert_eq!(tree.get_children(n1, "children").unwrap(), vec![n2]);
            assert_eq!(tree.get_parent(n2).unwrap(), Some((n1, "children".to_string())));
        }
    }

    #[tokio::test]
    async fn feed_drives_a_peer() {
        let (a, b) = peers();
        let b = Arc::new(b);
        let rx = a.subscribe();
        let follower = {
            let b = Arc::clone(&b);
            tokio::spawn(async move { b.run_replication(rx).await })
        };

        let scope = AccessScope::new();
        a.init_branch("main").unwrap();
        let mut head = None;
        for _ in 0..3 {
            let id = a.new_node_id().unwrap();
            head = Some(
                a.write(&scope, "main", "add", |tree| {
                    Ok(tree.append_child(NodeId::ROOT, "children", id, None)?)
                })
                .unwrap(),
            );
        }
        drop(a);

        let applied = follower.await.unwrap();
        assert_eq!(applied, 4);
        assert_eq!(b.head("main").unwrap(), head.unwrap());
        assert_eq!(b.checkout("main").unwrap().len(), 4);
    }

    #[tokio::test]
    async fn lagging_subscriber_catches_up_from_later_events() {
        let (_, b) = peers();
        let mut config = config(3);
        config.feed_capacity = 1;
        let small = Repository::open(config, b.store(), Arc::new(InMemoryBranchStore::new())).unwrap();
        let rx = small.subscribe();
        let scope = AccessScope::new();
        small.init_branch("main").unwrap();
        let mut last = None;
        for _ in 0..3 {
            let id = small.new_node_id().unwrap();
            last = Some(
                small
                    .write(&scope, "main", "add", |tree| {
                        Ok(tree.add_new_child(NodeId::ROOT, "children", 0, id, None)?)
                    })
                    .unwrap(),
            );
        }
        drop(small);

        // Only the newest event survives; it carries the whole history.
        assert_eq!(b.run_replication(rx).await, 1);
        assert_eq!(b.head("main").unwrap(), last.unwrap());
    }

    #[test]
    fn event_serde_roundtrip() {
        let e = ReplicationEvent {
            branch: "main".into(),
            version: Digest::of(b"v"),
        };
        let json = serde_json::to_string(&e).unwrap();
        assert_eq!(serde_json::from_str::<ReplicationEvent>(&json).unwrap(), e);
    }
}
