use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use sylva_types::{Digest, TemporalAnchor};

/// One of the two sides being merged.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MergeSide {
    Left,
    Right,
}

impl MergeSide {
    pub fn other(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

/// Which side wins when both sides changed the same thing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// The side whose version has the later timestamp; ties broken by
    /// version digest.
    #[default]
    LastWriterWins,
    PreferLeft,
    PreferRight,
}

impl ConflictPolicy {
    /// The winning side, given each side's `(timestamp, version digest)`.
    pub fn winner(
        &self,
        left: (TemporalAnchor, Digest),
        right: (TemporalAnchor, Digest),
    ) -> MergeSide {
        match self {
            Self::PreferLeft => MergeSide::Left,
            Self::PreferRight => MergeSide::Right,
            Self::LastWriterWins => match left.cmp(&right) {
                Ordering::Less => MergeSide::Right,
                _ => MergeSide::Left,
            },
        }
    }
}

/// Merge settings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeOptions {
    pub policy: ConflictPolicy,
    /// Report conflicts as [`MergeError::Conflicts`](crate::MergeError)
    /// instead of resolving them.
    pub fail_on_conflict: bool,
}
