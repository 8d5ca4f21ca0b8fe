use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::TypeError;
use crate::node_id::{ClientId, NodeId};

/// One past the largest sequence number a partition can hold.
const SEQUENCE_END: u64 = u32::MAX as u64 + 1;

/// Allocates [`NodeId`]s from a single client partition.
///
/// The sequence counter is an atomic, so one generator can be shared across
/// threads. It never wraps: once the 32-bit sequence space is used up every
/// call fails with [`TypeError::RangeExhausted`].
///
/// Generators are explicit context objects. Two generators for the same
/// client in one process would hand out duplicate ids; callers must share a
/// single instance per partition.
#[derive(Debug)]
pub struct IdGenerator {
    client: ClientId,
    next: AtomicU64,
}

impl IdGenerator {
    /// A generator whose first id has sequence 1.
    pub fn new(client: ClientId) -> Self {
        Self::starting_at(client, 1)
    }

    /// Resume allocation at `next_sequence`, e.g. after a restart.
    pub fn starting_at(client: ClientId, next_sequence: u32) -> Self {
        Self {
            client,
            next: AtomicU64::new(next_sequence as u64),
        }
    }

    pub fn client(&self) -> ClientId {
        self.client
    }

    /// Allocate one id.
    pub fn generate(&self) -> Result<NodeId, TypeError> {
        Ok(self.generate_range(1)?.first())
    }

    /// Allocate `quantity` contiguous ids.
    pub fn generate_range(&self, quantity: u32) -> Result<IdRange, TypeError> {
        if quantity == 0 {
            return Err(TypeError::EmptyRange);
        }
        let start = self
            .next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                let end = current.checked_add(quantity as u64)?;
                (end <= SEQUENCE_END).then_some(end)
            })
            .map_err(|_| TypeError::RangeExhausted {
                client: self.client.get(),
            })?;
        let first = NodeId::from_parts(self.client, start as u32);
        let last = NodeId::from_parts(self.client, (start + quantity as u64 - 1) as u32);
        Ok(IdRange { first, last })
    }
}

/// An inclusive, contiguous range of ids from one partition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IdRange {
    first: NodeId,
    last: NodeId,
}

impl IdRange {
    pub fn first(&self) -> NodeId {
        self.first
    }

    pub fn last(&self) -> NodeId {
        self.last
    }

    pub fn len(&self) -> u64 {
        self.last.raw() - self.first.raw() + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.first <= id && id <= self.last
    }

    pub fn iter(&self) -> impl Iterator<Item = NodeId> {
        (self.first.raw()..=self.last.raw()).map(NodeId::from_raw)
    }
}
