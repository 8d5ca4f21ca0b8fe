//! Immutable, structurally shared model trees for Sylva.
//!
//! A [`Tree`] is a node graph stored as content-addressed
//! [`NodeRecord`]s. Child lists carry the digests of the child records, so
//! a node's digest covers its whole subtree and every edit rewrites only
//! the edited node and its ancestors.
//!
//! Children of a role are ordered by a [`ChildKey`]: a fractional
//! [`OrderKey`] tie-broken by node id. Replicas that insert at the same
//! spot concurrently compute the same order key, so their lists converge.
//! Long child lists move into a persistent [`BTree`](sylva_btree::BTree).

pub mod children;
pub mod config;
pub mod error;
pub mod field;
pub mod node;
pub mod order_key;
pub mod query;
pub mod scope;
pub mod tree;

pub use children::{ChildEntry, ChildKey, ChildList};
pub use config::TreeConfig;
pub use error::{TreeError, TreeResult};
pub use field::{Field, FieldKind};
pub use node::{NodeRecord, ParentLink, TreeRecord};
pub use order_key::OrderKey;
pub use query::ModelQuery;
pub use scope::{AccessScope, ReadGuard, WriteGuard};
pub use tree::Tree;
