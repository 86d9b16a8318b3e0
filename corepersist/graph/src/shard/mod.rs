mod allocation;
mod cache;
mod compaction;
mod counter;
mod serialization;

pub use allocation::NodeShardAllocation;
pub use cache::NodeShardCache;
pub use compaction::{AuditResult, CompactionResult, ShardGroupCompaction};
pub use counter::{NodeShardApproximation, NodeShardCounterSerialization, ShardKey};
use serde::{Deserialize, Serialize};
pub use serialization::EdgeShardSerialization;

/// A physical partition of the edges of one meta.
///
/// `shard_index` is a pivot on edge timestamps: the shard was allocated to receive edges at or
/// after it. Shards are ordered by index, newest last.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Shard {
    pub shard_index: u64,
    pub created_time: u64,
    pub compacted: bool,
}

impl Shard {
    /// Every meta starts with this shard before any other is allocated.
    pub const ROOT: Shard = Shard {
        shard_index: 0,
        created_time: 0,
        compacted: false,
    };

    pub fn new(shard_index: u64, created_time: u64, compacted: bool) -> Self {
        Self {
            shard_index,
            created_time,
            compacted,
        }
    }

    /// Whether shards older than this one may be compacted into it at `now`.
    pub fn should_compact(&self, now: u64, min_delta: u64) -> bool {
        self.created_time.saturating_add(min_delta) <= now
    }
}

/// Shards that have not been compacted, newest first.
pub(crate) fn pending_group(shards: &[Shard]) -> Vec<Shard> {
    shards.iter().filter(|s| !s.compacted).copied().collect()
}
