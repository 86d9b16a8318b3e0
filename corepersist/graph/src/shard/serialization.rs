use corepersist_common::scope::ApplicationScope;
use corepersist_storage::batch::MutationBatch;
use corepersist_storage::column::{ColumnFamilyDefinition, ColumnRange, Order};
use corepersist_storage::error::StorageError;
use corepersist_storage::iterator::ColumnIterator;
use corepersist_storage::migration::Migration;
use corepersist_storage::store::ColumnStoreRef;
use serde::{Deserialize, Serialize};

use super::Shard;
use crate::error::{GraphError, GraphResult};
use crate::meta::DirectedEdgeMeta;

pub const EDGE_SHARDS: &str = "Edge_Shards";

#[derive(Serialize, Deserialize)]
struct ShardRecord {
    created_time: u64,
    compacted: bool,
}

/// Persists the list of shards of each meta.
#[derive(Clone)]
pub struct EdgeShardSerialization {
    store: ColumnStoreRef,
}

impl EdgeShardSerialization {
    pub fn new(store: ColumnStoreRef) -> Self {
        Self { store }
    }

    pub fn write_shard_meta(
        &self,
        scope: &ApplicationScope,
        shard: &Shard,
        meta: &DirectedEdgeMeta,
    ) -> GraphResult<MutationBatch> {
        let value = postcard::to_allocvec(&ShardRecord {
            created_time: shard.created_time,
            compacted: shard.compacted,
        })?;
        let mut batch = MutationBatch::new();
        batch.put(
            EDGE_SHARDS,
            meta.key(scope),
            shard.shard_index.to_be_bytes().to_vec(),
            value,
        );
        Ok(batch)
    }

    /// Persisted shards of a meta, newest first.
    pub fn load_shard_meta(
        &self,
        scope: &ApplicationScope,
        meta: &DirectedEdgeMeta,
    ) -> GraphResult<Vec<Shard>> {
        ColumnIterator::new(
            self.store.clone(),
            EDGE_SHARDS,
            meta.key(scope),
            ColumnRange::all(Order::Descending),
            100,
        )
        .map(|column| {
            let column = column?;
            let index: [u8; 8] = column.name.as_ref().try_into().map_err(|_| {
                StorageError::Corrupted(format!("shard index of {} bytes", column.name.len()))
            })?;
            let record: ShardRecord = postcard::from_bytes(&column.value)?;
            Ok::<_, GraphError>(Shard::new(
                u64::from_be_bytes(index),
                record.created_time,
                record.compacted,
            ))
        })
        .collect()
    }
}

impl Migration for EdgeShardSerialization {
    fn column_families(&self) -> Vec<ColumnFamilyDefinition> {
        vec![ColumnFamilyDefinition::new(EDGE_SHARDS)]
    }
}
