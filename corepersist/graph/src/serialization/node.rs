use bytes::Bytes;
use corepersist_common::id::Id;
use corepersist_common::scope::ApplicationScope;
use corepersist_common::version::Version;
use corepersist_storage::batch::MutationBatch;
use corepersist_storage::column::ColumnFamilyDefinition;
use corepersist_storage::keys::KeyBuilder;
use corepersist_storage::migration::Migration;
use corepersist_storage::store::ColumnStoreRef;

use crate::error::{GraphError, GraphResult};

pub const GRAPH_MARKED_NODES: &str = "Graph_Marked_Nodes";

/// Deletion marks of nodes. Edges of a marked node at or below its mark version are hidden from
/// reads until they are removed.
#[derive(Clone)]
pub struct NodeSerialization {
    store: ColumnStoreRef,
}

impl NodeSerialization {
    pub fn new(store: ColumnStoreRef) -> Self {
        Self { store }
    }

    pub fn mark(&self, scope: &ApplicationScope, node: &Id, version: Version) -> MutationBatch {
        let mut batch = MutationBatch::new();
        batch.put(
            GRAPH_MARKED_NODES,
            marks_row(scope),
            node_column(node),
            Bytes::copy_from_slice(&version.to_bytes()),
        );
        batch
    }

    pub fn delete(&self, scope: &ApplicationScope, node: &Id) -> MutationBatch {
        let mut batch = MutationBatch::new();
        batch.delete(GRAPH_MARKED_NODES, marks_row(scope), node_column(node));
        batch
    }

    pub fn get_max_version(
        &self,
        scope: &ApplicationScope,
        node: &Id,
    ) -> GraphResult<Option<Version>> {
        self.store
            .get(GRAPH_MARKED_NODES, &marks_row(scope), &node_column(node))?
            .map(|value| Version::from_slice(&value).map_err(GraphError::from))
            .transpose()
    }
}

impl Migration for NodeSerialization {
    fn column_families(&self) -> Vec<ColumnFamilyDefinition> {
        vec![ColumnFamilyDefinition::new(GRAPH_MARKED_NODES)]
    }
}

fn marks_row(scope: &ApplicationScope) -> Bytes {
    KeyBuilder::new().scope(scope).build()
}

fn node_column(node: &Id) -> Bytes {
    KeyBuilder::new().id(node).build()
}
