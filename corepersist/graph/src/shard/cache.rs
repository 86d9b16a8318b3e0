use std::num::NonZeroUsize;
use std::sync::Arc;

use corepersist_common::scope::ApplicationScope;
use corepersist_common::time::TimeService;
use lru::LruCache;
use parking_lot::Mutex;
use tracing::trace;

use super::{EdgeShardSerialization, Shard};
use crate::error::GraphResult;
use crate::meta::DirectedEdgeMeta;

type CacheKey = (ApplicationScope, DirectedEdgeMeta);

struct CacheEntry {
    shards: Arc<[Shard]>,
    loaded_at: u64,
}

/// Bounded, time-limited cache of the shard lists of recently used metas.
pub struct NodeShardCache {
    serialization: EdgeShardSerialization,
    clock: Arc<dyn TimeService>,
    timeout: u64,
    entries: Mutex<LruCache<CacheKey, CacheEntry>>,
}

impl NodeShardCache {
    pub fn new(
        serialization: EdgeShardSerialization,
        clock: Arc<dyn TimeService>,
        capacity: usize,
        timeout: u64,
    ) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            serialization,
            clock,
            timeout,
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// All shards of a meta, newest first. The root shard is included until it is persisted.
    pub fn get_shards(
        &self,
        scope: &ApplicationScope,
        meta: &DirectedEdgeMeta,
    ) -> GraphResult<Arc<[Shard]>> {
        let now = self.clock.current_time_millis();
        let key = (scope.clone(), meta.clone());
        if let Some(entry) = self.entries.lock().get(&key) {
            if now.saturating_sub(entry.loaded_at) < self.timeout {
                return Ok(entry.shards.clone());
            }
        }

        let mut shards = self.serialization.load_shard_meta(scope, meta)?;
        if shards.last().is_none_or(|s| s.shard_index != Shard::ROOT.shard_index) {
            shards.push(Shard::ROOT);
        }
        trace!(meta_type = %meta.meta_type(), shards = shards.len(), "graph.shard_cache.load");
        let shards: Arc<[Shard]> = shards.into();
        self.entries.lock().put(key, CacheEntry {
            shards: shards.clone(),
            loaded_at: now,
        });
        Ok(shards)
    }

    pub fn invalidate(&self, scope: &ApplicationScope, meta: &DirectedEdgeMeta) {
        self.entries.lock().pop(&(scope.clone(), meta.clone()));
    }
}
