use bytes::Bytes;
use corepersist_common::id::Id;
use corepersist_common::scope::ApplicationScope;
use corepersist_storage::batch::MutationBatch;
use corepersist_storage::column::{ColumnFamilyDefinition, ColumnRange, Order};
use corepersist_storage::error::StorageError;
use corepersist_storage::iterator::ColumnIterator;
use corepersist_storage::keys::KeyBuilder;
use corepersist_storage::migration::Migration;
use corepersist_storage::store::ColumnStoreRef;
use smol_str::SmolStr;

use crate::edge::MarkedEdge;
use crate::error::{GraphError, GraphResult};
use crate::meta::NodeType;

pub const GRAPH_EDGE_TYPES: &str = "Graph_Edge_Types";
pub const GRAPH_ID_TYPES: &str = "Graph_Id_Types";

/// Records which edge types leave or enter a node, and which id types sit at the other end.
#[derive(Clone)]
pub struct EdgeMetadataSerialization {
    store: ColumnStoreRef,
    page_size: usize,
}

impl EdgeMetadataSerialization {
    pub fn new(store: ColumnStoreRef, page_size: usize) -> Self {
        Self { store, page_size }
    }

    pub fn write_edge(&self, scope: &ApplicationScope, edge: &MarkedEdge) -> MutationBatch {
        let mut batch = MutationBatch::new();
        let empty = Bytes::new();
        batch
            .put(
                GRAPH_EDGE_TYPES,
                types_row(scope, &edge.source, NodeType::Source),
                name(&edge.edge_type),
                empty.clone(),
            )
            .put(
                GRAPH_EDGE_TYPES,
                types_row(scope, &edge.target, NodeType::Target),
                name(&edge.edge_type),
                empty.clone(),
            )
            .put(
                GRAPH_ID_TYPES,
                id_types_row(scope, &edge.source, NodeType::Source, &edge.edge_type),
                name(edge.target.id_type()),
                empty.clone(),
            )
            .put(
                GRAPH_ID_TYPES,
                id_types_row(scope, &edge.target, NodeType::Target, &edge.edge_type),
                name(edge.source.id_type()),
                empty,
            );
        batch
    }

    pub fn remove_edge_type_from_source(
        &self,
        scope: &ApplicationScope,
        source: &Id,
        edge_type: &str,
    ) -> MutationBatch {
        let mut batch = MutationBatch::new();
        batch
            .delete(
                GRAPH_EDGE_TYPES,
                types_row(scope, source, NodeType::Source),
                name(edge_type),
            )
            .delete_row(
                GRAPH_ID_TYPES,
                id_types_row(scope, source, NodeType::Source, edge_type),
            );
        batch
    }

    pub fn remove_edge_type_to_target(
        &self,
        scope: &ApplicationScope,
        target: &Id,
        edge_type: &str,
    ) -> MutationBatch {
        let mut batch = MutationBatch::new();
        batch
            .delete(
                GRAPH_EDGE_TYPES,
                types_row(scope, target, NodeType::Target),
                name(edge_type),
            )
            .delete_row(
                GRAPH_ID_TYPES,
                id_types_row(scope, target, NodeType::Target, edge_type),
            );
        batch
    }

    /// Edge types leaving `node`, sorted by name.
    pub fn edge_types_from_source(
        &self,
        scope: &ApplicationScope,
        node: &Id,
    ) -> GraphResult<Vec<SmolStr>> {
        self.names(GRAPH_EDGE_TYPES, types_row(scope, node, NodeType::Source))
    }

    pub fn edge_types_to_target(
        &self,
        scope: &ApplicationScope,
        node: &Id,
    ) -> GraphResult<Vec<SmolStr>> {
        self.names(GRAPH_EDGE_TYPES, types_row(scope, node, NodeType::Target))
    }

    /// Id types of the targets of `edge_type` edges leaving `node`.
    pub fn id_types_from_source(
        &self,
        scope: &ApplicationScope,
        node: &Id,
        edge_type: &str,
    ) -> GraphResult<Vec<SmolStr>> {
        self.names(
            GRAPH_ID_TYPES,
            id_types_row(scope, node, NodeType::Source, edge_type),
        )
    }

    pub fn id_types_to_target(
        &self,
        scope: &ApplicationScope,
        node: &Id,
        edge_type: &str,
    ) -> GraphResult<Vec<SmolStr>> {
        self.names(
            GRAPH_ID_TYPES,
            id_types_row(scope, node, NodeType::Target, edge_type),
        )
    }

    fn names(&self, column_family: &'static str, row: Bytes) -> GraphResult<Vec<SmolStr>> {
        ColumnIterator::new(
            self.store.clone(),
            column_family,
            row,
            ColumnRange::all(Order::Ascending),
            self.page_size,
        )
        .map(|column| {
            let column = column?;
            let name = std::str::from_utf8(&column.name)
                .map_err(|e| StorageError::Corrupted(e.to_string()))?;
            Ok::<_, GraphError>(SmolStr::new(name))
        })
        .collect()
    }
}

impl Migration for EdgeMetadataSerialization {
    fn column_families(&self) -> Vec<ColumnFamilyDefinition> {
        vec![
            ColumnFamilyDefinition::new(GRAPH_EDGE_TYPES),
            ColumnFamilyDefinition::new(GRAPH_ID_TYPES),
        ]
    }
}

fn types_row(scope: &ApplicationScope, node: &Id, node_type: NodeType) -> Bytes {
    KeyBuilder::new()
        .scope(scope)
        .id(node)
        .u8(node_type as u8)
        .build()
}

fn id_types_row(scope: &ApplicationScope, node: &Id, node_type: NodeType, edge_type: &str) -> Bytes {
    KeyBuilder::new()
        .scope(scope)
        .id(node)
        .u8(node_type as u8)
        .str(edge_type)
        .build()
}

// Names are stored raw so that columns sort alphabetically.
fn name(value: &str) -> Bytes {
    Bytes::copy_from_slice(value.as_bytes())
}
