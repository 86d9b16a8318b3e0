use std::sync::Arc;

use corepersist_common::id::Id;
use corepersist_common::scope::ApplicationScope;
use corepersist_common::time::ManualTimeService;
use corepersist_common::version::Version;
use corepersist_graph::config::GraphConfig;
use corepersist_graph::edge::MarkedEdge;
use corepersist_graph::error::GraphResult;
use corepersist_graph::manager::GraphManager;
use corepersist_graph::serialization::EdgeIterator;
use corepersist_storage::memory::MemoryColumnStore;
use corepersist_storage::migration::MigrationManager;

pub const START_MILLIS: u64 = 1_000_000;

pub struct TestContext {
    pub store: Arc<MemoryColumnStore>,
    pub clock: Arc<ManualTimeService>,
    pub manager: Arc<GraphManager>,
    pub scope: ApplicationScope,
}

/// Shards split every ten edges and the cache never hides a fresh shard.
pub fn small_config() -> GraphConfig {
    GraphConfig {
        scan_page_size: 3,
        shard_size: 10,
        shard_cache_size: 100,
        shard_cache_timeout: 10,
        shard_min_delta: 100,
        counter_flush_count: 1_000_000,
        counter_flush_interval: u64::MAX,
        ..Default::default()
    }
}

pub fn create_context(config: GraphConfig) -> TestContext {
    let store = Arc::new(MemoryColumnStore::new());
    let clock = Arc::new(ManualTimeService::new(START_MILLIS));
    let manager = Arc::new(GraphManager::new(store.clone(), clock.clone(), config).unwrap());
    manager
        .migrate(&MigrationManager::new(store.clone()))
        .unwrap();
    TestContext {
        store,
        clock,
        manager,
        scope: ApplicationScope::new(Id::generate("application")),
    }
}

pub fn create_default_context() -> TestContext {
    create_context(small_config())
}

/// A `likes` edge whose version carries the timestamp `ts`.
pub fn edge(source: &Id, target: &Id, ts: u64) -> MarkedEdge {
    MarkedEdge::new(source.clone(), "likes", target.clone(), Version::from_parts(ts, 1))
}

pub fn collect(edges: EdgeIterator) -> GraphResult<Vec<MarkedEdge>> {
    edges.collect()
}

pub fn timestamps(edges: &[MarkedEdge]) -> Vec<u64> {
    edges.iter().map(MarkedEdge::timestamp).collect()
}
