//! Version records and the history DAG for Sylva.
//!
//! A [`Version`] wraps one tree digest with its parents, author and
//! [`TemporalAnchor`](sylva_types::TemporalAnchor). Versions are records in
//! the object store and form a DAG: no parents for an initial version, one
//! for a commit, two for a merge. [`History`] answers ancestry questions
//! over that DAG.

pub mod error;
pub mod graph;
pub mod version;

pub use error::{HistoryError, HistoryResult};
pub use graph::History;
pub use version::{Version, VersionRecord};
