//! Fractional order keys for child lists.
//!
//! A key is a base-256 fraction stored as its digits. Between any two
//! distinct keys there is always another, so inserting never requires
//! renumbering the neighbours. Key generation is deterministic: two
//! replicas inserting between the same neighbours produce the same key,
//! and the child's [`NodeId`](sylva_types::NodeId) decides their order.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Position of a child among its siblings. Compared lexicographically.
///
/// Generated keys are never empty and never end in a zero digit.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderKey(Vec<u8>);

impl OrderKey {
    /// A key strictly between `lo` and `hi`. `None` means unbounded.
    ///
    /// If `lo >= hi`, or no key fits between them (only possible for keys
    /// ending in a zero digit), the upper bound is ignored.
    pub fn between(lo: Option<&OrderKey>, hi: Option<&OrderKey>) -> OrderKey {
        let lo: &[u8] = lo.map_or(&[], |k| &k.0);
        let mut hi: Option<&[u8]> = hi.map(|k| k.0.as_slice()).filter(|h| lo < *h);

        let mut out = Vec::new();
        for i in 0.. {
            let l = lo.get(i).copied().map_or(0, u16::from);
            let h = match hi.map(|h| h.get(i)) {
                Some(Some(d)) => u16::from(*d),
                Some(None) => {
                    hi = None;
                    256
                }
                None => 256,
            };
            if h > l + 1 {
                out.push(((l + h) / 2) as u8);
                break;
            }
            out.push(l as u8);
            if h == l + 1 {
                // Every continuation of `out` now sorts below `hi`.
                hi = None;
            }
        }
        OrderKey(out)
    }

    /// `n` increasing keys strictly between `lo` and `hi`.
    pub fn sequence(lo: Option<&OrderKey>, hi: Option<&OrderKey>, n: usize) -> Vec<OrderKey> {
        let mut keys: Vec<OrderKey> = Vec::with_capacity(n);
        for _ in 0..n {
            let key = OrderKey::between(keys.last().or(lo), hi);
            keys.push(key);
        }
        keys
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for OrderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OrderKey(")?;
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        write!(f, ")")
    }
}
