//! Textual encoding of node references.
//!
//! Three shapes are accepted on read:
//!
//! - `4c3000003eb`: a bare hex id, local to the containing tree
//! - `sylva:<repository>/<hex id>`: the current global format
//! - `pnode:<hex id>@<repository>`: the legacy global format
//!
//! Anything else is kept verbatim as an opaque, externally resolved
//! reference. Writes always use the current format. An opaque reference
//! whose text would read back as one of the shapes above is written as
//! `opaque:<text>`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::node_id::NodeId;

const CURRENT_PREFIX: &str = "sylva:";
const LEGACY_PREFIX: &str = "pnode:";
const OPAQUE_PREFIX: &str = "opaque:";

/// Target of a reference edge.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeReference {
    /// A node in the same tree.
    Local(NodeId),
    /// A node in another (or this) repository.
    Global { repository: String, id: NodeId },
    /// A reference in a format this crate does not interpret.
    Serialized(String),
}

impl NodeReference {
    /// Parse any supported encoding.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        if let Some(rest) = s.strip_prefix(OPAQUE_PREFIX) {
            return Ok(Self::Serialized(rest.to_string()));
        }
        if s.is_empty() {
            return Err(TypeError::InvalidNodeReference(s.to_string()));
        }
        if let Some(rest) = s.strip_prefix(CURRENT_PREFIX) {
            let (repository, hex) = rest
                .rsplit_once('/')
                .ok_or_else(|| TypeError::InvalidNodeReference(s.to_string()))?;
            return Self::global(repository, hex, s);
        }
        if let Some(rest) = s.strip_prefix(LEGACY_PREFIX) {
            let (hex, repository) = rest
                .split_once('@')
                .ok_or_else(|| TypeError::InvalidNodeReference(s.to_string()))?;
            return Self::global(repository, hex, s);
        }
        if s.len() <= 16 && s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Ok(Self::Local(NodeId::from_hex(s)?));
        }
        Ok(Self::Serialized(s.to_string()))
    }

    fn global(repository: &str, hex: &str, original: &str) -> Result<Self, TypeError> {
        if repository.is_empty() {
            return Err(TypeError::InvalidNodeReference(original.to_string()));
        }
        let id = NodeId::from_hex(hex)
            .map_err(|_| TypeError::InvalidNodeReference(original.to_string()))?;
        Ok(Self::Global {
            repository: repository.to_string(),
            id,
        })
    }

    /// Encode in the current format.
    pub fn serialize(&self) -> String {
        match self {
            Self::Local(id) => id.to_hex(),
            Self::Global { repository, id } => {
                format!("{CURRENT_PREFIX}{repository}/{}", id.to_hex())
            }
            Self::Serialized(s) => match Self::parse(s) {
                Ok(Self::Serialized(ref parsed)) if parsed == s => s.clone(),
                _ => format!("{OPAQUE_PREFIX}{s}"),
            },
        }
    }

    /// The node id, when the reference names one.
    pub fn node_id(&self) -> Option<NodeId> {
        match self {
            Self::Local(id) | Self::Global { id, .. } => Some(*id),
            Self::Serialized(_) => None,
        }
    }

    /// Qualify a local reference with the repository it belongs to.
    pub fn to_global(&self, repository: &str) -> Self {
        match self {
            Self::Local(id) => Self::Global {
                repository: repository.to_string(),
                id: *id,
            },
            other => other.clone(),
        }
    }

    /// Drop the repository qualifier if it names `repository`.
    pub fn to_local(&self, repository: &str) -> Self {
        match self {
            Self::Global {
                repository: owner,
                id,
            } if owner == repository => Self::Local(*id),
            other => other.clone(),
        }
    }
}

impl From<NodeId> for NodeReference {
    fn from(id: NodeId) -> Self {
        Self::Local(id)
    }
}

impl fmt::Display for NodeReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}

impl std::str::FromStr for NodeReference {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
