use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// A client partition. Occupies the high 32 bits of every [`NodeId`] the
/// client allocates.
///
/// Client ids are handed out by a coordinating server; two live clients must
/// never share one. Partition 0 is reserved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(u32);

impl ClientId {
    pub fn new(id: u32) -> Result<Self, TypeError> {
        if id == 0 {
            return Err(TypeError::InvalidClientId(id));
        }
        Ok(Self(id))
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client:{}", self.0)
    }
}

/// Globally unique identifier of a model node.
///
/// Layout: `client << 32 | sequence`. Ids from different partitions never
/// collide; ids from one partition are issued in increasing order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(u64);

impl NodeId {
    /// The root node of every tree. Lives in the reserved partition 0.
    pub const ROOT: Self = Self(1);

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn from_parts(client: ClientId, sequence: u32) -> Self {
        Self(((client.get() as u64) << 32) | sequence as u64)
    }

    pub const fn raw(&self) -> u64 {
        self.0
    }

    /// High 32 bits.
    pub const fn partition(&self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Low 32 bits.
    pub const fn sequence(&self) -> u32 {
        self.0 as u32
    }

    pub fn is_root(&self) -> bool {
        *self == Self::ROOT
    }

    /// Lowercase hex without leading zeros.
    pub fn to_hex(&self) -> String {
        format!("{:x}", self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        if s.is_empty() || s.len() > 16 {
            return Err(TypeError::InvalidHex(s.to_string()));
        }
        u64::from_str_radix(s, 16)
            .map(Self)
            .map_err(|e| TypeError::InvalidHex(format!("{s}: {e}")))
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({:x})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_zero_is_reserved() {
        assert_eq!(ClientId::new(0), Err(TypeError::InvalidClientId(0)));
        assert_eq!(ClientId::new(7).unwrap().get(), 7);
    }

    #[test]
    fn parts_roundtrip() {
        let client = ClientId::new(0xdead).unwrap();
        let id = NodeId::from_parts(client, 42);
        assert_eq!(id.partition(), 0xdead);
        assert_eq!(id.sequence(), 42);
        assert_eq!(id.raw(), 0xdead_0000_002a);
    }

    #[test]
    fn root_lives_in_reserved_partition() {
        assert_eq!(NodeId::ROOT.partition(), 0);
        assert!(NodeId::ROOT.is_root());
    }

    #[test]
    fn hex_roundtrip() {
        let id = NodeId::from_raw(0x4c3000003eb);
        assert_eq!(id.to_hex(), "4c3000003eb");
        assert_eq!(NodeId::from_hex("4c3000003eb").unwrap(), id);
    }

    #[test]
    fn from_hex_rejects_garbage() {
        assert!(NodeId::from_hex("").is_err());
        assert!(NodeId::from_hex("xyz").is_err());
        assert!(NodeId::from_hex("11112222333344445").is_err());
    }

    #[test]
    fn ordering_follows_partition_then_sequence() {
        let a = NodeId::from_parts(ClientId::new(1).unwrap(), u32::MAX);
        let b = NodeId::from_parts(ClientId::new(2).unwrap(), 0);
        assert!(a < b);
    }
}
