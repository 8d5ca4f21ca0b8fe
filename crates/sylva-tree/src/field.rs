use std::fmt;

use serde::{Deserialize, Serialize};

/// The kind of a node field. Together with a role name it addresses one
/// field of a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FieldKind {
    Property,
    Child,
    Reference,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Property => write!(f, "property"),
            Self::Child => write!(f, "child"),
            Self::Reference => write!(f, "reference"),
        }
    }
}

/// A `(FieldKind, role)` pair.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Field {
    pub kind: FieldKind,
    pub role: String,
}

impl Field {
    pub fn property(role: impl Into<String>) -> Self {
        Self {
            kind: FieldKind::Property,
            role: role.into(),
        }
    }

    pub fn child(role: impl Into<String>) -> Self {
        Self {
            kind: FieldKind::Child,
            role: role.into(),
        }
    }

    pub fn reference(role: impl Into<String>) -> Self {
        Self {
            kind: FieldKind::Reference,
            role: role.into(),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.role)
    }
}
