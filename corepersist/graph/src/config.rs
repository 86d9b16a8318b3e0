use serde::{Deserialize, Serialize};

use crate::error::{GraphError, GraphResult};

/// Tuning knobs of the graph layer. Durations are in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Edges read per storage round trip, also the size of a compaction write batch.
    pub scan_page_size: usize,
    /// Edge count at which a shard is split.
    pub shard_size: u64,
    /// Probability that a pending compaction is attempted on a write.
    pub shard_repair_chance: f64,
    /// Entries in the shard metadata cache.
    pub shard_cache_size: usize,
    pub shard_cache_timeout: u64,
    /// Minimum age of the newest shard before older shards are compacted into it.
    pub shard_min_delta: u64,
    /// Counter increments accumulated before a flush is started.
    pub counter_flush_count: u64,
    pub counter_flush_interval: u64,
    /// Flushes that may be queued on the background pool before callers flush inline.
    pub counter_flush_queue_size: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            scan_page_size: 1000,
            shard_size: 500_000,
            shard_repair_chance: 1.0,
            shard_cache_size: 10_000,
            shard_cache_timeout: 30_000,
            shard_min_delta: 90_000,
            counter_flush_count: 100_000,
            counter_flush_interval: 30_000,
            counter_flush_queue_size: 1_000,
        }
    }
}

impl GraphConfig {
    /// A shard must outlive every cached view of the shard list before it can be compacted.
    pub fn validate(&self) -> GraphResult<()> {
        if self.shard_min_delta <= self.shard_cache_timeout * 2 {
            return Err(GraphError::InvalidConfiguration(format!(
                "shard_min_delta ({}) must be greater than twice shard_cache_timeout ({})",
                self.shard_min_delta, self.shard_cache_timeout
            )));
        }
        if self.scan_page_size == 0 || self.shard_size == 0 || self.shard_cache_size == 0 {
            return Err(GraphError::InvalidConfiguration(
                "scan_page_size, shard_size and shard_cache_size must be positive".to_owned(),
            ));
        }
        Ok(())
    }
}
