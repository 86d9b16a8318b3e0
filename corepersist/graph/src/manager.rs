use std::sync::Arc;

use bytes::Bytes;
use corepersist_common::id::Id;
use corepersist_common::scope::ApplicationScope;
use corepersist_common::time::TimeService;
use corepersist_common::version::Version;
use corepersist_storage::batch::MutationBatch;
use corepersist_storage::column::Order;
use corepersist_storage::migration::{Migration, MigrationManager};
use corepersist_storage::store::ColumnStoreRef;
use rayon::ThreadPool;
use smol_str::SmolStr;
use tracing::{debug, trace, warn};

use crate::config::GraphConfig;
use crate::edge::{MarkedEdge, SearchByEdge, SearchByEdgeType, SearchByIdType};
use crate::error::GraphResult;
use crate::filter::EdgeFilter;
use crate::meta::DirectedEdgeMeta;
use crate::serialization::{
    EdgeIterator, EdgeMetadataSerialization, NodeSerialization, ShardedEdgeSerialization,
};
use crate::shard::{
    AuditResult, EdgeShardSerialization, NodeShardAllocation, NodeShardApproximation,
    NodeShardCache, NodeShardCounterSerialization, Shard, ShardGroupCompaction,
};

/// Entry point of the graph layer.
///
/// Every edge is stored under each of its five directed metas. Writes go to the write shard of each
/// meta and feed the shard counters; reads fan out over every shard of the searched meta.
///
/// Deleting a node marks it with a version. Reads skip the node's edges at or below that version
/// until a background pass removes them.
pub struct GraphManager {
    store: ColumnStoreRef,
    counter: Arc<NodeShardApproximation>,
    allocation: Arc<NodeShardAllocation>,
    compaction: Arc<ShardGroupCompaction>,
    shards: EdgeShardSerialization,
    edges: ShardedEdgeSerialization,
    metadata: EdgeMetadataSerialization,
    nodes: NodeSerialization,
    pool: Option<Arc<ThreadPool>>,
}

impl GraphManager {
    /// Creates a manager that runs shard maintenance inline on the writing thread.
    pub fn new(
        store: ColumnStoreRef,
        clock: Arc<dyn TimeService>,
        config: GraphConfig,
    ) -> GraphResult<Self> {
        Self::build(store, clock, config, None)
    }

    /// Creates a manager that runs counter flushes and shard maintenance on `pool`.
    pub fn with_pool(
        store: ColumnStoreRef,
        clock: Arc<dyn TimeService>,
        config: GraphConfig,
        pool: Arc<ThreadPool>,
    ) -> GraphResult<Self> {
        Self::build(store, clock, config, Some(pool))
    }

    fn build(
        store: ColumnStoreRef,
        clock: Arc<dyn TimeService>,
        config: GraphConfig,
        pool: Option<Arc<ThreadPool>>,
    ) -> GraphResult<Self> {
        config.validate()?;
        let shards = EdgeShardSerialization::new(store.clone());
        let cache = Arc::new(NodeShardCache::new(
            shards.clone(),
            clock.clone(),
            config.shard_cache_size,
            config.shard_cache_timeout,
        ));
        let mut counter = NodeShardApproximation::new(
            NodeShardCounterSerialization::new(store.clone()),
            clock.clone(),
            &config,
        );
        if let Some(pool) = &pool {
            counter = counter.with_pool(pool.clone());
        }
        let counter = Arc::new(counter);
        let allocation = Arc::new(NodeShardAllocation::new(
            store.clone(),
            cache.clone(),
            counter.clone(),
            clock.clone(),
            &config,
        ));
        let compaction = Arc::new(ShardGroupCompaction::new(
            store.clone(),
            cache.clone(),
            allocation.clone(),
            counter.clone(),
            clock,
            config.clone(),
        ));
        Ok(Self {
            edges: ShardedEdgeSerialization::new(store.clone(), config.scan_page_size),
            metadata: EdgeMetadataSerialization::new(store.clone(), config.scan_page_size),
            nodes: NodeSerialization::new(store.clone()),
            store,
            counter,
            allocation,
            compaction,
            shards,
            pool,
        })
    }

    /// Creates the column families of the graph layer.
    pub fn migrate(&self, migrations: &MigrationManager) -> GraphResult<()> {
        migrations.migrate(&[
            &self.edges as &dyn Migration,
            &self.metadata,
            &self.shards,
            &self.nodes,
            self.counter.serialization(),
        ])?;
        Ok(())
    }

    pub fn counter(&self) -> &Arc<NodeShardApproximation> {
        &self.counter
    }

    pub fn allocation(&self) -> &Arc<NodeShardAllocation> {
        &self.allocation
    }

    pub fn compaction(&self) -> &Arc<ShardGroupCompaction> {
        &self.compaction
    }

    /// Writes `edge` under every directed meta, then evaluates the affected shard groups.
    pub fn write_edge(&self, scope: &ApplicationScope, edge: MarkedEdge) -> GraphResult<MarkedEdge> {
        let mut batch = self.metadata.write_edge(scope, &edge);
        let mut targets = Vec::with_capacity(5);
        for meta in DirectedEdgeMeta::all_for_edge(&edge) {
            let shard = self.allocation.get_write_shard(scope, &meta)?;
            batch.merge(self.edges.write_edge(scope, &meta, &shard, &edge));
            targets.push((meta, shard));
        }
        self.store.execute(batch)?;
        debug!(
            source = %edge.source,
            edge_type = %edge.edge_type,
            target = %edge.target,
            version = %edge.version,
            "graph.edge.written"
        );

        for (meta, shard) in &targets {
            self.counter.increment(scope, shard, 1, meta);
        }
        self.evaluate_shard_groups(scope, targets.into_iter().map(|(meta, _)| meta).collect());
        Ok(edge)
    }

    /// Marks `edge` deleted without removing it.
    ///
    /// The mark is written to every shard already holding the edge, or to the write shard when none
    /// does.
    pub fn mark_edge(&self, scope: &ApplicationScope, edge: MarkedEdge) -> GraphResult<MarkedEdge> {
        let edge = edge.marked();
        let mut batch = MutationBatch::new();
        let mut added = Vec::new();
        for meta in DirectedEdgeMeta::all_for_edge(&edge) {
            let mut holding = self.shards_holding(scope, &meta, &edge)?;
            if holding.is_empty() {
                let shard = self.allocation.get_write_shard(scope, &meta)?;
                added.push((meta.clone(), shard));
                holding.push(shard);
            }
            for shard in &holding {
                batch.merge(self.edges.write_edge(scope, &meta, shard, &edge));
            }
        }
        self.store.execute(batch)?;
        debug!(source = %edge.source, edge_type = %edge.edge_type, "graph.edge.marked");
        for (meta, shard) in &added {
            self.counter.increment(scope, shard, 1, meta);
        }
        Ok(edge)
    }

    /// Removes every copy of `edge`. Edge types left without any edge are removed from the nodes'
    /// metadata.
    pub fn delete_edge(&self, scope: &ApplicationScope, edge: &MarkedEdge) -> GraphResult<()> {
        let mut batch = MutationBatch::new();
        let mut removed = Vec::new();
        for meta in DirectedEdgeMeta::all_for_edge(edge) {
            for shard in self.shards_holding(scope, &meta, edge)? {
                batch.merge(self.edges.delete_edge(scope, &meta, &shard, edge));
                removed.push((meta.clone(), shard));
            }
        }
        self.store.execute(batch)?;
        for (meta, shard) in &removed {
            self.counter.increment(scope, shard, -1, meta);
        }

        let mut cleanup = MutationBatch::new();
        let from_source = SearchByEdgeType::new(edge.source.clone(), edge.edge_type.clone())
            .include_marked();
        if self.load_edges_from_source(scope, &from_source)?.next().is_none() {
            cleanup.merge(self.metadata.remove_edge_type_from_source(
                scope,
                &edge.source,
                &edge.edge_type,
            ));
        }
        let to_target = SearchByEdgeType::new(edge.target.clone(), edge.edge_type.clone())
            .include_marked();
        if self.load_edges_to_target(scope, &to_target)?.next().is_none() {
            cleanup.merge(self.metadata.remove_edge_type_to_target(
                scope,
                &edge.target,
                &edge.edge_type,
            ));
        }
        if !cleanup.is_empty() {
            self.store.execute(cleanup)?;
        }
        debug!(
            source = %edge.source,
            edge_type = %edge.edge_type,
            copies = removed.len(),
            "graph.edge.deleted"
        );
        Ok(())
    }

    /// Marks `node` deleted at `version`. Its edges at or below the mark are hidden from filtered
    /// reads.
    pub fn mark_node(&self, scope: &ApplicationScope, node: &Id, version: Version) -> GraphResult<()> {
        if self
            .nodes
            .get_max_version(scope, node)?
            .is_some_and(|mark| mark >= version)
        {
            return Ok(());
        }
        self.store.execute(self.nodes.mark(scope, node, version))?;
        debug!(%node, %version, "graph.node.marked");
        Ok(())
    }

    /// Marks `node` deleted at `version`, then removes its edges at or below the mark, on the
    /// background pool when one is configured and inline otherwise.
    pub fn delete_node(
        self: &Arc<Self>,
        scope: &ApplicationScope,
        node: &Id,
        version: Version,
    ) -> GraphResult<()> {
        self.mark_node(scope, node, version)?;
        let manager = self.clone();
        let scope = scope.clone();
        let node = node.clone();
        let compact = move || {
            if let Err(e) = manager.compact_node(&scope, &node) {
                warn!(%node, error = %e, "graph.node.compaction_failed");
            }
        };
        match &self.pool {
            Some(pool) => pool.spawn(compact),
            None => compact(),
        }
        Ok(())
    }

    /// Removes every edge of a marked node at or below its mark, then the mark itself unless it
    /// moved meanwhile. Returns the number of edges removed.
    pub fn compact_node(&self, scope: &ApplicationScope, node: &Id) -> GraphResult<usize> {
        let Some(mark) = self.nodes.get_max_version(scope, node)? else {
            return Ok(0);
        };
        let mut edges = Vec::new();
        for edge_type in self.get_edge_types_from_source(scope, node)? {
            let search = SearchByEdgeType::new(node.clone(), edge_type)
                .with_max_version(mark)
                .include_marked();
            for edge in self.load_edges_from_source(scope, &search)? {
                edges.push(edge?);
            }
        }
        for edge_type in self.get_edge_types_to_target(scope, node)? {
            let search = SearchByEdgeType::new(node.clone(), edge_type)
                .with_max_version(mark)
                .include_marked();
            for edge in self.load_edges_to_target(scope, &search)? {
                let edge = edge?;
                if edge.source != edge.target {
                    edges.push(edge);
                }
            }
        }
        for edge in &edges {
            self.delete_edge(scope, edge)?;
        }
        if self.nodes.get_max_version(scope, node)? == Some(mark) {
            self.store.execute(self.nodes.delete(scope, node))?;
        }
        debug!(%node, %mark, removed = edges.len(), "graph.node.compacted");
        Ok(edges.len())
    }

    /// Edges of one type leaving `search.node`.
    pub fn load_edges_from_source(
        &self,
        scope: &ApplicationScope,
        search: &SearchByEdgeType,
    ) -> GraphResult<EdgeIterator> {
        let meta =
            DirectedEdgeMeta::from_source_node(search.node.clone(), search.edge_type.clone());
        self.load(
            scope,
            &meta,
            search.max_version,
            search.order,
            search.last.as_ref(),
            search.filter_marked,
        )
    }

    /// Edges of one type leaving `search.node` whose target has the given id type.
    pub fn load_edges_from_source_by_type(
        &self,
        scope: &ApplicationScope,
        search: &SearchByIdType,
    ) -> GraphResult<EdgeIterator> {
        let inner = &search.search;
        let meta = DirectedEdgeMeta::from_source_node_target_type(
            inner.node.clone(),
            inner.edge_type.clone(),
            search.id_type.clone(),
        );
        self.load(
            scope,
            &meta,
            inner.max_version,
            inner.order,
            inner.last.as_ref(),
            inner.filter_marked,
        )
    }

    /// Edges of one type entering `search.node`.
    pub fn load_edges_to_target(
        &self,
        scope: &ApplicationScope,
        search: &SearchByEdgeType,
    ) -> GraphResult<EdgeIterator> {
        let meta =
            DirectedEdgeMeta::from_target_node(search.node.clone(), search.edge_type.clone());
        self.load(
            scope,
            &meta,
            search.max_version,
            search.order,
            search.last.as_ref(),
            search.filter_marked,
        )
    }

    pub fn load_edges_to_target_by_type(
        &self,
        scope: &ApplicationScope,
        search: &SearchByIdType,
    ) -> GraphResult<EdgeIterator> {
        let inner = &search.search;
        let meta = DirectedEdgeMeta::from_target_node_source_type(
            inner.node.clone(),
            inner.edge_type.clone(),
            search.id_type.clone(),
        );
        self.load(
            scope,
            &meta,
            inner.max_version,
            inner.order,
            inner.last.as_ref(),
            inner.filter_marked,
        )
    }

    /// Every version of the edge between `search.source` and `search.target`.
    pub fn load_edge_versions(
        &self,
        scope: &ApplicationScope,
        search: &SearchByEdge,
    ) -> GraphResult<EdgeIterator> {
        let meta = DirectedEdgeMeta::from_edge(
            search.source.clone(),
            search.edge_type.clone(),
            search.target.clone(),
        );
        self.load(
            scope,
            &meta,
            search.max_version,
            search.order,
            search.last.as_ref(),
            search.filter_marked,
        )
    }

    pub fn get_edge_types_from_source(
        &self,
        scope: &ApplicationScope,
        node: &Id,
    ) -> GraphResult<Vec<SmolStr>> {
        self.metadata.edge_types_from_source(scope, node)
    }

    pub fn get_edge_types_to_target(
        &self,
        scope: &ApplicationScope,
        node: &Id,
    ) -> GraphResult<Vec<SmolStr>> {
        self.metadata.edge_types_to_target(scope, node)
    }

    pub fn get_id_types_from_source(
        &self,
        scope: &ApplicationScope,
        node: &Id,
        edge_type: &str,
    ) -> GraphResult<Vec<SmolStr>> {
        self.metadata.id_types_from_source(scope, node, edge_type)
    }

    pub fn get_id_types_to_target(
        &self,
        scope: &ApplicationScope,
        node: &Id,
        edge_type: &str,
    ) -> GraphResult<Vec<SmolStr>> {
        self.metadata.id_types_to_target(scope, node, edge_type)
    }

    fn load(
        &self,
        scope: &ApplicationScope,
        meta: &DirectedEdgeMeta,
        max_version: Version,
        order: Order,
        last: Option<&MarkedEdge>,
        filter_marked: bool,
    ) -> GraphResult<EdgeIterator> {
        let shards = self.allocation.get_shards(scope, meta)?;
        let start: Option<Bytes> = match (last, order) {
            (Some(last), _) => Some(meta.column(last)),
            (None, Order::Descending) if max_version != Version::MAX => {
                Some(DirectedEdgeMeta::version_ceiling(max_version))
            }
            (None, _) => None,
        };
        trace!(meta_type = %meta.meta_type(), shards = shards.len(), "graph.edge.load");
        let mut marks =
            filter_marked.then(|| EdgeFilter::new(self.nodes.clone(), scope.clone()));
        let edges = self
            .edges
            .load_edges(scope, meta, &shards, start, order)
            .filter_map(move |edge| {
                let edge = match edge {
                    Ok(edge) => edge,
                    Err(e) => return Some(Err(e)),
                };
                if edge.version > max_version || (filter_marked && edge.deleted) {
                    return None;
                }
                match marks.as_mut().map(|marks| marks.hides(&edge)) {
                    Some(Ok(true)) => None,
                    Some(Err(e)) => Some(Err(e)),
                    _ => Some(Ok(edge)),
                }
            });
        Ok(Box::new(edges))
    }

    fn shards_holding(
        &self,
        scope: &ApplicationScope,
        meta: &DirectedEdgeMeta,
        edge: &MarkedEdge,
    ) -> GraphResult<Vec<Shard>> {
        let column = meta.column(edge);
        let mut holding = Vec::new();
        for shard in self.allocation.get_shards(scope, meta)?.iter() {
            let row = meta.row_key(scope, shard.shard_index);
            if self.store.get(meta.column_family(), &row, &column)?.is_some() {
                holding.push(*shard);
            }
        }
        Ok(holding)
    }

    fn evaluate_shard_groups(&self, scope: &ApplicationScope, metas: Vec<DirectedEdgeMeta>) {
        let compaction = self.compaction.clone();
        let scope = scope.clone();
        let evaluate = move || {
            for meta in &metas {
                match compaction.evaluate_shard_group(&scope, meta) {
                    Ok(AuditResult::NotChecked) => {}
                    Ok(result) => {
                        debug!(meta_type = %meta.meta_type(), %result, "graph.shard_group.evaluated")
                    }
                    Err(e) => {
                        warn!(meta_type = %meta.meta_type(), error = %e, "graph.shard_group.failed")
                    }
                }
            }
        };
        match &self.pool {
            Some(pool) => pool.spawn(evaluate),
            None => evaluate(),
        }
    }
}
