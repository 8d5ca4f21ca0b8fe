//! Content hashing for Sylva.
//!
//! Every record kind hashes under its own domain tag, so two records of
//! different kinds with identical bytes never share a [`Digest`].
//!
//! [`Digest`]: sylva_types::Digest

pub mod hasher;

pub use hasher::{ContentHasher, HasherError};
