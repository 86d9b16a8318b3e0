use std::sync::Arc;

use corepersist_common::scope::ApplicationScope;
use corepersist_common::time::TimeService;
use corepersist_storage::column::Order;
use corepersist_storage::store::ColumnStoreRef;
use tracing::{debug, info};

use super::{
    EdgeShardSerialization, NodeShardApproximation, NodeShardCache, Shard, pending_group,
};
use crate::config::GraphConfig;
use crate::error::GraphResult;
use crate::meta::DirectedEdgeMeta;
use crate::serialization::ShardedEdgeSerialization;

/// Decides which shards a meta reads from and writes to, and splits shards that grew too large.
pub struct NodeShardAllocation {
    store: ColumnStoreRef,
    shards: EdgeShardSerialization,
    cache: Arc<NodeShardCache>,
    edges: ShardedEdgeSerialization,
    counter: Arc<NodeShardApproximation>,
    clock: Arc<dyn TimeService>,
    shard_size: u64,
    shard_cache_timeout: u64,
}

impl NodeShardAllocation {
    pub fn new(
        store: ColumnStoreRef,
        cache: Arc<NodeShardCache>,
        counter: Arc<NodeShardApproximation>,
        clock: Arc<dyn TimeService>,
        config: &GraphConfig,
    ) -> Self {
        Self {
            shards: EdgeShardSerialization::new(store.clone()),
            edges: ShardedEdgeSerialization::new(store.clone(), config.scan_page_size),
            store,
            cache,
            counter,
            clock,
            shard_size: config.shard_size,
            shard_cache_timeout: config.shard_cache_timeout,
        }
    }

    /// Every shard of the meta, newest first.
    pub fn get_shards(
        &self,
        scope: &ApplicationScope,
        meta: &DirectedEdgeMeta,
    ) -> GraphResult<Arc<[Shard]>> {
        self.cache.get_shards(scope, meta)
    }

    /// The newest shard that has not been compacted.
    pub fn get_write_shard(
        &self,
        scope: &ApplicationScope,
        meta: &DirectedEdgeMeta,
    ) -> GraphResult<Shard> {
        let shards = self.get_shards(scope, meta)?;
        Ok(shards
            .iter()
            .find(|s| !s.compacted)
            .copied()
            .unwrap_or(Shard::ROOT))
    }

    /// Allocates a new shard when the write shard holds at least `shard_size` edges.
    ///
    /// The new shard starts at the timestamp of the edge at position `min(count, 2 * shard_size)`
    /// of the write shard, oldest first, so that the write shard keeps at most that many edges once
    /// compacted. Returns whether a shard was written. Two concurrent audits may both allocate;
    /// compaction reconciles the extra shard.
    pub fn audit_shard(&self, scope: &ApplicationScope, meta: &DirectedEdgeMeta) -> GraphResult<bool> {
        let shards = self.get_shards(scope, meta)?;
        let group = pending_group(&shards);
        // A newer shard is still waiting for compaction.
        if group.len() > 1 {
            return Ok(false);
        }
        let write_shard = group.first().copied().unwrap_or(Shard::ROOT);

        let count = self.counter.get_count(scope, &write_shard, meta)?;
        if count < self.shard_size as i64 {
            return Ok(false);
        }

        let position = (count as u64).min(self.shard_size * 2) as usize;
        let pivot = self
            .edges
            .load_edges(scope, meta, &[write_shard], None, Order::Ascending)
            .nth(position.saturating_sub(1))
            .transpose()?;
        let Some(pivot) = pivot else {
            debug!(count, "graph.allocation.too_few_edges");
            return Ok(false);
        };

        let shard_index = pivot.timestamp().max(write_shard.shard_index + 1);
        let shard = Shard::new(shard_index, self.clock.current_time_millis(), false);
        self.store
            .execute(self.shards.write_shard_meta(scope, &shard, meta)?)?;
        self.cache.invalidate(scope, meta);
        info!(
            meta_type = %meta.meta_type(),
            shard_index,
            previous = write_shard.shard_index,
            count,
            "graph.allocation.shard_created"
        );
        Ok(true)
    }

    /// The oldest time a shard may have been created and still be absent from some cache.
    pub fn get_min_time(&self) -> u64 {
        self.clock
            .current_time_millis()
            .saturating_sub(self.shard_cache_timeout * 2)
    }
}
