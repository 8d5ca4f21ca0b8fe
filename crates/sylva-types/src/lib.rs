//! Foundation types for Sylva.
//!
//! This crate provides the identity, addressing, and temporal types shared by
//! every other Sylva crate.
//!
//! # Key Types
//!
//! - [`Digest`]: Content-addressed record key (BLAKE3 hash)
//! - [`NodeId`]: Globally unique 64-bit node identifier (client partition + sequence)
//! - [`IdGenerator`]: Per-client, atomically incremented [`NodeId`] allocator
//! - [`NodeReference`]: Local, global, or opaque reference to a node
//! - [`RepositoryId`]: Identifier of a repository (UUID v7 by default)
//! - [`TemporalAnchor`]: Hybrid Logical Clock timestamp for version ordering

pub mod digest;
pub mod error;
pub mod id_generator;
pub mod node_id;
pub mod reference;
pub mod repository;
pub mod temporal;

pub use digest::Digest;
pub use error::TypeError;
pub use id_generator::{IdGenerator, IdRange};
pub use node_id::{ClientId, NodeId};
pub use reference::NodeReference;
pub use repository::RepositoryId;
pub use temporal::TemporalAnchor;
