use std::sync::Arc;

use corepersist_collection::manager::EntityCollectionManager;
use corepersist_common::entity::Entity;
use corepersist_common::id::Id;
use corepersist_common::scope::ApplicationScope;
use corepersist_common::time::{SystemTimeService, TimeService};
use corepersist_common::version::VersionGenerator;
use corepersist_graph::manager::GraphManager;
use corepersist_pipeline::collect::{ResultsPageCollector, SearchCollector};
use corepersist_pipeline::context::PipelineContext;
use corepersist_pipeline::cursor::RequestCursor;
use corepersist_pipeline::index::{EntityIndex, MemoryEntityIndex, SearchEdge};
use corepersist_pipeline::result::ResultsPage;
use corepersist_pipeline::stage::{Direction, ReadStage, from_ids};
use corepersist_storage::memory::MemoryColumnStore;
use corepersist_storage::migration::MigrationManager;
use corepersist_storage::store::ColumnStoreRef;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::info;

use crate::config::CorePersistenceConfig;
use crate::error::Result;

pub struct CorePersistence {
    store: ColumnStoreRef,
    versions: Arc<VersionGenerator>,
    collections: Arc<EntityCollectionManager>,
    graph: Arc<GraphManager>,
    index: Arc<dyn EntityIndex>,
    pool: Arc<ThreadPool>,
    config: CorePersistenceConfig,
}

impl CorePersistence {
    pub fn open_in_memory(config: &CorePersistenceConfig) -> Result<Self> {
        Self::open(
            Arc::new(MemoryColumnStore::new()),
            Arc::new(SystemTimeService),
            Arc::new(MemoryEntityIndex::new()),
            config,
        )
    }

    /// Wires every component over `store` and creates the column families they need.
    ///
    /// Fails without a usable instance when any column family is missing and cannot be created.
    pub fn open(
        store: ColumnStoreRef,
        clock: Arc<dyn TimeService>,
        index: Arc<dyn EntityIndex>,
        config: &CorePersistenceConfig,
    ) -> Result<Self> {
        let pool = Arc::new(
            ThreadPoolBuilder::new()
                .num_threads(config.num_threads)
                .build()?,
        );
        let versions = Arc::new(VersionGenerator::new(clock.clone()));
        let collections = EntityCollectionManager::new(
            store.clone(),
            versions.clone(),
            config.serialization.clone(),
        )
        .with_pool(pool.clone());
        let graph =
            GraphManager::with_pool(store.clone(), clock, config.graph.clone(), pool.clone())?;

        let migrations = MigrationManager::new(store.clone());
        collections.migrate(&migrations)?;
        graph.migrate(&migrations)?;
        info!(num_threads = config.num_threads, "core.opened");

        Ok(Self {
            store,
            versions,
            collections: Arc::new(collections),
            graph: Arc::new(graph),
            index,
            pool,
            config: config.clone(),
        })
    }

    pub fn store(&self) -> &ColumnStoreRef {
        &self.store
    }

    pub fn versions(&self) -> &Arc<VersionGenerator> {
        &self.versions
    }

    pub fn collections(&self) -> &Arc<EntityCollectionManager> {
        &self.collections
    }

    pub fn graph(&self) -> &Arc<GraphManager> {
        &self.graph
    }

    pub fn index(&self) -> &Arc<dyn EntityIndex> {
        &self.index
    }

    pub fn pool(&self) -> &Arc<ThreadPool> {
        &self.pool
    }

    pub fn config(&self) -> &CorePersistenceConfig {
        &self.config
    }

    /// Starts a read pipeline. `cursor` is the value returned with a previous page, if any.
    pub fn pipeline(
        &self,
        scope: ApplicationScope,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<PipelineContext> {
        let cursor = RequestCursor::parse(cursor)?;
        Ok(PipelineContext::new(scope, limit, cursor))
    }

    /// One page of the entities connected to `node` by `edge_type` edges.
    pub fn connections(
        &self,
        ctx: &mut PipelineContext,
        node: &Id,
        edge_type: &str,
        direction: Direction,
    ) -> Result<ResultsPage<Entity>> {
        let stage = from_ids([node.clone()])
            .read_graph_connections(ctx, self.graph.clone(), edge_type, direction)
            .load_entities(ctx, self.collections.clone());
        Ok(ResultsPageCollector::for_context(ctx).collect(stage)?)
    }

    /// One page of the entities the search index holds under `edge`, skipping stale entries.
    pub fn search(
        &self,
        ctx: &mut PipelineContext,
        edge: &SearchEdge,
    ) -> Result<ResultsPage<Entity>> {
        let collector = SearchCollector::new(
            self.collections.clone(),
            self.index.clone(),
            self.config.pipeline.clone(),
        );
        Ok(collector.collect(ctx, edge)?)
    }

    /// Writes the pending shard counts to storage.
    pub fn flush(&self) -> Result<()> {
        self.graph.counter().flush()?;
        Ok(())
    }
}
