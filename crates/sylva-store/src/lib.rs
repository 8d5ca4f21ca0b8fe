//! Content-addressed record storage for Sylva.
//!
//! Every persistent value in Sylva (nodes, B-tree pages, tree headers,
//! versions) is an immutable record stored under the domain-separated
//! BLAKE3 digest of its bytes.
//!
//! # Storage Backends
//!
//! All backends implement the [`ObjectStore`] trait:
//!
//! - [`InMemoryObjectStore`] -- `HashMap`-based store for tests and embedding
//! - [`FileObjectStore`] -- one file per record under a fan-out directory
//! - [`AccessTrackingStore`] -- wrapper that counts reads, for tests and tuning
//!
//! Every `ObjectStore` is also usable through [`AsyncObjectStore`].
//!
//! # Design Rules
//!
//! 1. Records are immutable once written.
//! 2. Writes are idempotent: writing the same bytes twice stores one copy.
//! 3. Concurrent reads and writes are always safe.
//! 4. The store never interprets record contents.
//! 5. All I/O errors are propagated, never retried or ignored.

pub mod error;
pub mod file;
pub mod memory;
pub mod object;
pub mod tracking;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use file::FileObjectStore;
pub use memory::InMemoryObjectStore;
pub use object::{ObjectKind, Record, StoredObject};
pub use tracking::AccessTrackingStore;
pub use traits::{AsyncObjectStore, ObjectStore, RecordStoreExt};
