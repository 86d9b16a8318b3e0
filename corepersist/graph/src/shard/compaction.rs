use std::sync::Arc;

use corepersist_common::scope::ApplicationScope;
use corepersist_common::time::TimeService;
use corepersist_storage::batch::MutationBatch;
use corepersist_storage::column::Order;
use corepersist_storage::store::ColumnStoreRef;
use dashmap::DashSet;
use rand::Rng;
use strum::Display;
use tracing::{debug, info, trace};

use super::{
    EdgeShardSerialization, NodeShardAllocation, NodeShardApproximation, NodeShardCache, Shard,
    pending_group,
};
use crate::config::GraphConfig;
use crate::error::{GraphError, GraphResult};
use crate::meta::DirectedEdgeMeta;
use crate::serialization::ShardedEdgeSerialization;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum AuditResult {
    /// Nothing needed checking.
    NotChecked,
    /// Checked, no new shard was needed.
    CheckedNoOp,
    /// A new shard was allocated.
    CheckedCreated,
    /// Another task is already compacting this group.
    Compacting,
    Compacted,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompactionResult {
    pub target_shard: Option<Shard>,
    pub source_shards: Vec<Shard>,
    pub copied_edges: u64,
    /// Source shards marked compacted by this run.
    pub compacted_shards: Vec<Shard>,
}

type TaskKey = (ApplicationScope, DirectedEdgeMeta);

/// Tracks the groups with a running task so that each group has at most one at a time.
#[derive(Default)]
struct TaskTracker {
    running: DashSet<TaskKey>,
}

impl TaskTracker {
    fn try_start(&self, scope: &ApplicationScope, meta: &DirectedEdgeMeta) -> Option<TaskGuard<'_>> {
        let key = (scope.clone(), meta.clone());
        self.running.insert(key.clone()).then_some(TaskGuard {
            tracker: self,
            key,
        })
    }
}

struct TaskGuard<'a> {
    tracker: &'a TaskTracker,
    key: TaskKey,
}

impl Drop for TaskGuard<'_> {
    fn drop(&mut self) {
        self.tracker.running.remove(&self.key);
    }
}

/// Moves edges out of older shards into the newest shard of a group.
///
/// Edges at or after the newest shard's pivot that still live in an older shard are copied to the
/// newest shard and then removed from the old one. An older shard from which a pass moves nothing
/// is marked compacted. Shards are never deleted.
pub struct ShardGroupCompaction {
    store: ColumnStoreRef,
    shards: EdgeShardSerialization,
    cache: Arc<NodeShardCache>,
    edges: ShardedEdgeSerialization,
    allocation: Arc<NodeShardAllocation>,
    counter: Arc<NodeShardApproximation>,
    clock: Arc<dyn TimeService>,
    config: GraphConfig,
    audits: TaskTracker,
    compactions: TaskTracker,
}

impl ShardGroupCompaction {
    pub fn new(
        store: ColumnStoreRef,
        cache: Arc<NodeShardCache>,
        allocation: Arc<NodeShardAllocation>,
        counter: Arc<NodeShardApproximation>,
        clock: Arc<dyn TimeService>,
        config: GraphConfig,
    ) -> Self {
        Self {
            shards: EdgeShardSerialization::new(store.clone()),
            edges: ShardedEdgeSerialization::new(store.clone(), config.scan_page_size),
            store,
            cache,
            allocation,
            counter,
            clock,
            config,
            audits: TaskTracker::default(),
            compactions: TaskTracker::default(),
        }
    }

    /// Compacts the pending group of `meta` into its newest shard.
    pub fn compact(
        &self,
        scope: &ApplicationScope,
        meta: &DirectedEdgeMeta,
    ) -> GraphResult<CompactionResult> {
        let shards = self.allocation.get_shards(scope, meta)?;
        let group = pending_group(&shards);
        let (target, sources) = match group.split_first() {
            Some((target, sources)) if !sources.is_empty() => (*target, sources.to_vec()),
            _ => return Err(GraphError::Compaction("no compaction is pending".to_owned())),
        };
        let now = self.clock.current_time_millis();
        if !target.should_compact(now, self.config.shard_min_delta) {
            return Err(GraphError::Compaction(format!(
                "target shard {} is younger than {} ms",
                target.shard_index, self.config.shard_min_delta
            )));
        }

        let mut result = CompactionResult {
            target_shard: Some(target),
            source_shards: sources.clone(),
            ..Default::default()
        };
        for source in sources {
            let moved = self.move_edges(scope, meta, &source, &target)?;
            result.copied_edges += moved;
            if moved == 0 {
                let compacted = Shard::new(source.shard_index, source.created_time, true);
                self.store
                    .execute(self.shards.write_shard_meta(scope, &compacted, meta)?)?;
                info!(
                    meta_type = %meta.meta_type(),
                    shard_index = source.shard_index,
                    target = target.shard_index,
                    "graph.compaction.shard_compacted"
                );
                result.compacted_shards.push(compacted);
            }
        }
        self.cache.invalidate(scope, meta);
        debug!(
            meta_type = %meta.meta_type(),
            copied = result.copied_edges,
            compacted = result.compacted_shards.len(),
            "graph.compaction.finished"
        );
        Ok(result)
    }

    /// Audits or compacts the group of `meta`, whichever it needs.
    ///
    /// A group with a single pending shard is audited once the shard holds `shard_size` edges. A
    /// group with several pending shards is compacted with probability `shard_repair_chance` once
    /// its newest shard is older than `shard_min_delta`.
    pub fn evaluate_shard_group(
        &self,
        scope: &ApplicationScope,
        meta: &DirectedEdgeMeta,
    ) -> GraphResult<AuditResult> {
        let shards = self.allocation.get_shards(scope, meta)?;
        let group = pending_group(&shards);

        if group.len() <= 1 {
            let write_shard = group.first().copied().unwrap_or(Shard::ROOT);
            if self.counter.get_count(scope, &write_shard, meta)? < self.config.shard_size as i64 {
                return Ok(AuditResult::NotChecked);
            }
            let Some(_guard) = self.audits.try_start(scope, meta) else {
                return Ok(AuditResult::CheckedNoOp);
            };
            return Ok(if self.allocation.audit_shard(scope, meta)? {
                AuditResult::CheckedCreated
            } else {
                AuditResult::CheckedNoOp
            });
        }

        if rand::rng().random::<f64>() > self.config.shard_repair_chance {
            return Ok(AuditResult::NotChecked);
        }
        let now = self.clock.current_time_millis();
        if !group[0].should_compact(now, self.config.shard_min_delta) {
            return Ok(AuditResult::NotChecked);
        }
        let Some(_guard) = self.compactions.try_start(scope, meta) else {
            trace!(meta_type = %meta.meta_type(), "graph.compaction.already_running");
            return Ok(AuditResult::Compacting);
        };
        self.compact(scope, meta)?;
        Ok(AuditResult::Compacted)
    }

    fn move_edges(
        &self,
        scope: &ApplicationScope,
        meta: &DirectedEdgeMeta,
        source: &Shard,
        target: &Shard,
    ) -> GraphResult<u64> {
        let edges = self
            .edges
            .load_edges(scope, meta, &[*source], None, Order::Descending);
        let mut moved = 0u64;
        let mut writes = MutationBatch::new();
        let mut deletes = MutationBatch::new();
        for edge in edges {
            let edge = edge?;
            if edge.timestamp() < target.shard_index {
                break;
            }
            writes.merge(self.edges.write_edge(scope, meta, target, &edge));
            deletes.merge(self.edges.delete_edge(scope, meta, source, &edge));
            moved += 1;
            if moved % self.config.scan_page_size as u64 == 0 {
                self.flush_moves(scope, meta, source, target, &mut writes, &mut deletes)?;
            }
        }
        self.flush_moves(scope, meta, source, target, &mut writes, &mut deletes)?;
        Ok(moved)
    }

    // New rows are written before old ones are removed; readers drop the transient duplicates.
    fn flush_moves(
        &self,
        scope: &ApplicationScope,
        meta: &DirectedEdgeMeta,
        source: &Shard,
        target: &Shard,
        writes: &mut MutationBatch,
        deletes: &mut MutationBatch,
    ) -> GraphResult<()> {
        if writes.is_empty() {
            return Ok(());
        }
        let count = writes.len() as i64;
        self.store.execute(std::mem::take(writes))?;
        self.store.execute(std::mem::take(deletes))?;
        self.counter.increment(scope, target, count, meta);
        self.counter.increment(scope, source, -count, meta);
        trace!(count, "graph.compaction.moved_batch");
        Ok(())
    }
}
