//! Approximate per-shard edge counts.
//!
//! Increments land in an in-memory [`Counter`] and are periodically added to durable counts. A
//! flush swaps the in-memory counter for an empty one while holding the write side of `current`,
//! so every increment is either in the swapped-out counter or in the new one.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};

use bytes::Bytes;
use corepersist_common::scope::ApplicationScope;
use corepersist_common::time::TimeService;
use corepersist_storage::batch::MutationBatch;
use corepersist_storage::column::ColumnFamilyDefinition;
use corepersist_storage::error::StorageError;
use corepersist_storage::migration::Migration;
use corepersist_storage::store::ColumnStoreRef;
use dashmap::DashMap;
use parking_lot::RwLock;
use rayon::ThreadPool;
use tracing::{debug, error};

use super::Shard;
use crate::config::GraphConfig;
use crate::error::GraphResult;
use crate::meta::DirectedEdgeMeta;

pub const EDGE_SHARD_COUNTS: &str = "Edge_Shard_Counts";
const COUNT_COLUMN: &[u8] = b"count";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShardKey {
    pub scope: ApplicationScope,
    pub shard_index: u64,
    pub meta: DirectedEdgeMeta,
}

impl ShardKey {
    pub fn new(scope: &ApplicationScope, shard: &Shard, meta: &DirectedEdgeMeta) -> Self {
        Self {
            scope: scope.clone(),
            shard_index: shard.shard_index,
            meta: meta.clone(),
        }
    }

    fn row_key(&self) -> Bytes {
        self.meta.row_key(&self.scope, self.shard_index)
    }
}

/// Deltas accumulated since the last flush.
#[derive(Debug)]
struct Counter {
    deltas: DashMap<ShardKey, AtomicI64>,
    invocations: AtomicU64,
    created_at: u64,
}

impl Counter {
    fn new(created_at: u64) -> Self {
        Self {
            deltas: DashMap::new(),
            invocations: AtomicU64::new(0),
            created_at,
        }
    }

    fn add(&self, key: &ShardKey, delta: i64) {
        match self.deltas.get(key) {
            Some(value) => {
                value.fetch_add(delta, Ordering::Relaxed);
            }
            None => {
                self.deltas
                    .entry(key.clone())
                    .or_default()
                    .fetch_add(delta, Ordering::Relaxed);
            }
        }
        self.invocations.fetch_add(1, Ordering::Relaxed);
    }

    fn get(&self, key: &ShardKey) -> i64 {
        self.deltas
            .get(key)
            .map(|v| v.load(Ordering::Relaxed))
            .unwrap_or_default()
    }
}

/// Durable counts, one row per shard.
#[derive(Clone)]
pub struct NodeShardCounterSerialization {
    store: ColumnStoreRef,
}

impl NodeShardCounterSerialization {
    pub fn new(store: ColumnStoreRef) -> Self {
        Self { store }
    }

    pub fn get_count(&self, key: &ShardKey) -> GraphResult<i64> {
        let value = self
            .store
            .get(EDGE_SHARD_COUNTS, &key.row_key(), COUNT_COLUMN)?;
        match value {
            Some(bytes) => {
                let raw: [u8; 8] = bytes.as_ref().try_into().map_err(|_| {
                    StorageError::Corrupted(format!("shard count of {} bytes", bytes.len()))
                })?;
                Ok(i64::from_be_bytes(raw))
            }
            None => Ok(0),
        }
    }

    /// Adds every delta of `counter` to the durable counts. Callers must not flush concurrently.
    fn flush(&self, counter: &Counter) -> GraphResult<()> {
        let mut batch = MutationBatch::new();
        for entry in counter.deltas.iter() {
            let delta = entry.value().load(Ordering::Relaxed);
            if delta == 0 {
                continue;
            }
            let total = self.get_count(entry.key())? + delta;
            batch.put(
                EDGE_SHARD_COUNTS,
                entry.key().row_key(),
                Bytes::from_static(COUNT_COLUMN),
                total.to_be_bytes().to_vec(),
            );
        }
        if !batch.is_empty() {
            self.store.execute(batch)?;
        }
        Ok(())
    }
}

impl Migration for NodeShardCounterSerialization {
    fn column_families(&self) -> Vec<ColumnFamilyDefinition> {
        vec![ColumnFamilyDefinition::new(EDGE_SHARD_COUNTS)]
    }
}

/// Counts edges per shard without a storage round trip on every write.
pub struct NodeShardApproximation {
    serialization: NodeShardCounterSerialization,
    clock: Arc<dyn TimeService>,
    flush_count: u64,
    flush_interval: u64,
    queue_size: usize,
    pool: Option<Arc<ThreadPool>>,
    current: RwLock<Arc<Counter>>,
    // Held for writing from the swap until the durable counts include the swapped-out deltas.
    flush_lock: RwLock<()>,
    // Set once a flush is requested and cleared by the swap, so a due counter requests one flush.
    flush_requested: AtomicBool,
    queued: AtomicUsize,
}

impl NodeShardApproximation {
    pub fn new(
        serialization: NodeShardCounterSerialization,
        clock: Arc<dyn TimeService>,
        config: &GraphConfig,
    ) -> Self {
        let now = clock.current_time_millis();
        Self {
            serialization,
            clock,
            flush_count: config.counter_flush_count,
            flush_interval: config.counter_flush_interval,
            queue_size: config.counter_flush_queue_size,
            pool: None,
            current: RwLock::new(Arc::new(Counter::new(now))),
            flush_lock: RwLock::new(()),
            flush_requested: AtomicBool::new(false),
            queued: AtomicUsize::new(0),
        }
    }

    pub fn with_pool(mut self, pool: Arc<ThreadPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn serialization(&self) -> &NodeShardCounterSerialization {
        &self.serialization
    }

    /// Adds `delta` to the count of `shard`. A flush is started once enough increments accumulated
    /// or the flush interval elapsed.
    pub fn increment(
        self: &Arc<Self>,
        scope: &ApplicationScope,
        shard: &Shard,
        delta: i64,
        meta: &DirectedEdgeMeta,
    ) {
        let key = ShardKey::new(scope, shard, meta);
        let should_flush = {
            let counter = self.current.read();
            counter.add(&key, delta);
            counter.invocations.load(Ordering::Relaxed) >= self.flush_count
                || self
                    .clock
                    .current_time_millis()
                    .saturating_sub(counter.created_at)
                    >= self.flush_interval
        };
        if should_flush && !self.flush_requested.swap(true, Ordering::AcqRel) {
            self.begin_flush();
        }
    }

    /// Durable count plus unflushed deltas.
    pub fn get_count(
        &self,
        scope: &ApplicationScope,
        shard: &Shard,
        meta: &DirectedEdgeMeta,
    ) -> GraphResult<i64> {
        let key = ShardKey::new(scope, shard, meta);
        let _flush = self.flush_lock.read();
        let pending = self.current.read().get(&key);
        Ok(self.serialization.get_count(&key)? + pending)
    }

    /// Starts a flush on the background pool, or runs it inline when the queue is full.
    pub fn begin_flush(self: &Arc<Self>) {
        let Some(pool) = &self.pool else {
            self.flush_logged();
            return;
        };
        if self.queued.fetch_add(1, Ordering::SeqCst) >= self.queue_size {
            self.queued.fetch_sub(1, Ordering::SeqCst);
            self.flush_logged();
            return;
        }
        let this = Arc::clone(self);
        pool.spawn(move || {
            this.flush_logged();
            this.queued.fetch_sub(1, Ordering::SeqCst);
        });
    }

    /// Whether a background flush is queued or running.
    pub fn flush_pending(&self) -> bool {
        self.queued.load(Ordering::SeqCst) > 0
    }

    /// Moves every accumulated delta into durable storage.
    ///
    /// On failure the swapped-out deltas are merged back so that a later flush retries them.
    pub fn flush(&self) -> GraphResult<()> {
        let _flush = self.flush_lock.write();
        let flushed = {
            let mut current = self.current.write();
            let flushed = std::mem::replace(
                &mut *current,
                Arc::new(Counter::new(self.clock.current_time_millis())),
            );
            self.flush_requested.store(false, Ordering::Release);
            flushed
        };
        if flushed.deltas.is_empty() {
            return Ok(());
        }
        let keys = flushed.deltas.len();
        if let Err(e) = self.serialization.flush(&flushed) {
            let current = self.current.read();
            for entry in flushed.deltas.iter() {
                current.add(entry.key(), entry.value().load(Ordering::Relaxed));
            }
            return Err(e);
        }
        debug!(keys, "graph.counter.flushed");
        Ok(())
    }

    fn flush_logged(&self) {
        if let Err(e) = self.flush() {
            error!(error = %e, "graph.counter.flush_failed");
        }
    }
}
