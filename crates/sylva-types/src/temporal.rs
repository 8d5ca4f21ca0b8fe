use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Hybrid Logical Clock timestamp attached to every version.
///
/// Combines wall-clock milliseconds with a logical counter and the client
/// partition of the author, giving a total order across replicas without
/// synchronized clocks. Last-writer-wins conflict resolution relies on it.
///
/// Ordering: `physical_ms` → `logical` → `client`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TemporalAnchor {
    /// Wall-clock milliseconds since UNIX epoch.
    pub physical_ms: u64,
    /// Logical counter for events at the same physical time.
    pub logical: u32,
    /// Client partition of the author, to break ties between replicas.
    pub client: u32,
}

impl TemporalAnchor {
    pub fn new(physical_ms: u64, logical: u32, client: u32) -> Self {
        Self {
            physical_ms,
            logical,
            client,
        }
    }

    /// An anchor for the current wall-clock time.
    pub fn now(client: u32) -> Self {
        Self::new(wall_clock_ms(), 0, client)
    }

    /// The zero anchor.
    pub const fn zero() -> Self {
        Self {
            physical_ms: 0,
            logical: 0,
            client: 0,
        }
    }

    pub fn is_after(&self, other: &Self) -> bool {
        self > other
    }

    /// A new anchor strictly after both `self` and every anchor in `seen`.
    ///
    /// Used when committing on top of (or merging) existing versions so a
    /// child never sorts before its parents, even under clock skew.
    pub fn tick<'a>(&self, seen: impl IntoIterator<Item = &'a TemporalAnchor>) -> Self {
        let latest = seen.into_iter().fold(*self, |acc, t| acc.max(*t));
        let now_ms = wall_clock_ms();
        if now_ms > latest.physical_ms {
            Self::new(now_ms, 0, self.client)
        } else {
            Self::new(latest.physical_ms, latest.logical + 1, self.client)
        }
    }
}

fn wall_clock_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

impl PartialOrd for TemporalAnchor {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TemporalAnchor {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.physical_ms
            .cmp(&other.physical_ms)
            .then(self.logical.cmp(&other.logical))
            .then(self.client.cmp(&other.client))
    }
}

impl fmt::Debug for TemporalAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TemporalAnchor({}ms.{}.c{})",
            self.physical_ms, self.logical, self.client
        )
    }
}

impl fmt::Display for TemporalAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.physical_ms, self.logical)
    }
}
