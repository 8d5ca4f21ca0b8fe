//! Repository facade for Sylva.
//!
//! A [`Repository`] ties the layers together for one client: it owns the
//! [`RepositoryConfig`], a cached view of the object store, the branch
//! store, the client's id generator and clock, and an outgoing replication
//! feed.
//!
//! # Modules
//!
//! - [`config`]: [`RepositoryConfig`], loadable from TOML
//! - [`error`]: [`RepoError`] and [`RepoResult`]
//! - [`repository`]: branches, commits, scoped reads and writes, merges
//! - [`feed`]: [`ReplicationEvent`] and the replication loop
//!
//! # Example
//!
//! ```
//! use sylva_repo::{Repository, RepositoryConfig};
//! use sylva_tree::{AccessScope, ModelQuery};
//! use sylva_types::NodeId;
//!
//! let repo = Repository::in_memory(RepositoryConfig::default()).unwrap();
//! repo.init_branch("main").unwrap();
//!
//! let scope = AccessScope::new();
//! let id = repo.new_node_id().unwrap();
//! repo.write(&scope, "main", "add a node", |tree| {
//!     Ok(tree.add_new_child(NodeId::ROOT, "children", 0, id, Some("Class".into()))?)
//! })
//! .unwrap();
//!
//! let children = repo
//!     .read(&scope, "main", |tree| Ok(tree.get_children(NodeId::ROOT, "children")?))
//!     .unwrap();
//! assert_eq!(children, vec![id]);
//! ```

pub mod config;
pub mod error;
pub mod feed;
pub mod repository;

pub use config::RepositoryConfig;
pub use error::{RepoError, RepoResult};
pub use feed::ReplicationEvent;
pub use repository::{MergeResolution, Repository};
