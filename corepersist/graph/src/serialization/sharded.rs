use std::cmp::Ordering;

use bytes::Bytes;
use corepersist_common::scope::ApplicationScope;
use corepersist_storage::batch::MutationBatch;
use corepersist_storage::column::{ColumnFamilyDefinition, ColumnRange, Order};
use corepersist_storage::iterator::ColumnIterator;
use corepersist_storage::migration::Migration;
use corepersist_storage::store::ColumnStoreRef;
use itertools::Itertools;

use crate::edge::MarkedEdge;
use crate::error::{GraphError, GraphResult};
use crate::meta::{DirectedEdgeMeta, MetaType};
use crate::shard::Shard;

pub type EdgeIterator = Box<dyn Iterator<Item = GraphResult<MarkedEdge>> + Send>;

type ShardColumns = Box<dyn Iterator<Item = GraphResult<(Bytes, MarkedEdge)>> + Send>;

const LIVE: &[u8] = &[0];
const MARKED: &[u8] = &[1];

/// Reads and writes edge rows across the shards of a meta.
#[derive(Clone)]
pub struct ShardedEdgeSerialization {
    store: ColumnStoreRef,
    page_size: usize,
}

impl ShardedEdgeSerialization {
    pub fn new(store: ColumnStoreRef, page_size: usize) -> Self {
        Self { store, page_size }
    }

    /// Writes `edge` into `shard`; a marked edge is stored as a tombstone.
    pub fn write_edge(
        &self,
        scope: &ApplicationScope,
        meta: &DirectedEdgeMeta,
        shard: &Shard,
        edge: &MarkedEdge,
    ) -> MutationBatch {
        let mut batch = MutationBatch::new();
        batch.put(
            meta.column_family(),
            meta.row_key(scope, shard.shard_index),
            meta.column(edge),
            Bytes::from_static(if edge.deleted { MARKED } else { LIVE }),
        );
        batch
    }

    pub fn delete_edge(
        &self,
        scope: &ApplicationScope,
        meta: &DirectedEdgeMeta,
        shard: &Shard,
        edge: &MarkedEdge,
    ) -> MutationBatch {
        let mut batch = MutationBatch::new();
        batch.delete(
            meta.column_family(),
            meta.row_key(scope, shard.shard_index),
            meta.column(edge),
        );
        batch
    }

    /// Edges of `meta` in every given shard, merged into a single stream in `order`.
    ///
    /// `start` is the first column to return (inclusive). Edges present in more than one shard,
    /// which happens while compaction moves them, are returned once and marked if any copy is.
    /// Nothing is read until the iterator is first pulled.
    pub fn load_edges(
        &self,
        scope: &ApplicationScope,
        meta: &DirectedEdgeMeta,
        shards: &[Shard],
        start: Option<Bytes>,
        order: Order,
    ) -> EdgeIterator {
        let this = self.clone();
        let scope = scope.clone();
        let meta = meta.clone();
        let shards = shards.to_vec();
        Box::new(
            std::iter::once(())
                .flat_map(move |()| this.merge_shards(&scope, &meta, &shards, start.clone(), order)),
        )
    }

    fn merge_shards(
        &self,
        scope: &ApplicationScope,
        meta: &DirectedEdgeMeta,
        shards: &[Shard],
        start: Option<Bytes>,
        order: Order,
    ) -> EdgeIterator {
        let merged = shards
            .iter()
            .map(|shard| {
                let meta = meta.clone();
                let columns = ColumnIterator::new(
                    self.store.clone(),
                    meta.column_family(),
                    meta.row_key(scope, shard.shard_index),
                    ColumnRange::all(order).with_start(start.clone()),
                    self.page_size,
                )
                .map(move |column| {
                    let column = column?;
                    let deleted = column.value.as_ref() == MARKED;
                    let edge = meta.decode(&column.name, deleted)?;
                    Ok::<_, GraphError>((column.name, edge))
                });
                Box::new(columns) as ShardColumns
            })
            .kmerge_by(move |a, b| comes_first(a, b, order))
            .coalesce(|a, b| match (a, b) {
                // A mark written to one copy hides every copy.
                (Ok((column, mut edge)), Ok((other, duplicate))) if column == other => {
                    edge.deleted |= duplicate.deleted;
                    Ok(Ok((column, edge)))
                }
                (a, b) => Err((a, b)),
            })
            .map(|item| item.map(|(_, edge)| edge));
        Box::new(merged)
    }
}

// Errors sort first so they surface as soon as any shard fails.
fn comes_first(
    a: &GraphResult<(Bytes, MarkedEdge)>,
    b: &GraphResult<(Bytes, MarkedEdge)>,
    order: Order,
) -> bool {
    match (a, b) {
        (Err(_), _) => true,
        (_, Err(_)) => false,
        (Ok((a, _)), Ok((b, _))) => match order {
            Order::Ascending => a.cmp(b) == Ordering::Less,
            Order::Descending => a.cmp(b) == Ordering::Greater,
        },
    }
}

impl Migration for ShardedEdgeSerialization {
    fn column_families(&self) -> Vec<ColumnFamilyDefinition> {
        MetaType::all()
            .map(|t| ColumnFamilyDefinition::new(t.column_family()))
            .collect()
    }
}
