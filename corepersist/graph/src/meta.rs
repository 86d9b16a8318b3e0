//! The groupings edges are stored under.

use bytes::{BufMut, Bytes, BytesMut};
use corepersist_common::id::Id;
use corepersist_common::scope::ApplicationScope;
use corepersist_common::version::Version;
use corepersist_storage::keys::{KeyBuilder, KeyReader};
use smol_str::SmolStr;
use strum::{Display, EnumIter, IntoEnumIterator};

use crate::edge::MarkedEdge;
use crate::error::GraphResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
pub enum NodeType {
    Source,
    Target,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumIter)]
#[repr(u8)]
pub enum MetaType {
    /// Source node and edge type.
    Source = 0,
    /// Source node, edge type and target id type.
    SourceTarget = 1,
    /// Target node and edge type.
    Target = 2,
    /// Target node, edge type and source id type.
    TargetSource = 3,
    /// Source node, edge type and target node.
    Versions = 4,
}

impl MetaType {
    pub fn column_family(self) -> &'static str {
        match self {
            MetaType::Source => "Graph_Source_Node_Edges",
            MetaType::SourceTarget => "Graph_Source_Node_Target_Type",
            MetaType::Target => "Graph_Target_Node_Edges",
            MetaType::TargetSource => "Graph_Target_Node_Source_Type",
            MetaType::Versions => "Graph_Edge_Versions",
        }
    }

    pub fn all() -> impl Iterator<Item = MetaType> {
        MetaType::iter()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeMeta {
    pub id: Id,
    pub node_type: NodeType,
}

/// The unit of sharding: a node seen from one side, plus the edge type and optional sub type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DirectedEdgeMeta {
    nodes: Vec<NodeMeta>,
    types: Vec<SmolStr>,
    meta_type: MetaType,
}

impl DirectedEdgeMeta {
    pub fn from_source_node(source: Id, edge_type: impl Into<SmolStr>) -> Self {
        Self::new(
            vec![NodeMeta {
                id: source,
                node_type: NodeType::Source,
            }],
            vec![edge_type.into()],
            MetaType::Source,
        )
    }

    pub fn from_source_node_target_type(
        source: Id,
        edge_type: impl Into<SmolStr>,
        target_type: impl Into<SmolStr>,
    ) -> Self {
        Self::new(
            vec![NodeMeta {
                id: source,
                node_type: NodeType::Source,
            }],
            vec![edge_type.into(), target_type.into()],
            MetaType::SourceTarget,
        )
    }

    pub fn from_target_node(target: Id, edge_type: impl Into<SmolStr>) -> Self {
        Self::new(
            vec![NodeMeta {
                id: target,
                node_type: NodeType::Target,
            }],
            vec![edge_type.into()],
            MetaType::Target,
        )
    }

    pub fn from_target_node_source_type(
        target: Id,
        edge_type: impl Into<SmolStr>,
        source_type: impl Into<SmolStr>,
    ) -> Self {
        Self::new(
            vec![NodeMeta {
                id: target,
                node_type: NodeType::Target,
            }],
            vec![edge_type.into(), source_type.into()],
            MetaType::TargetSource,
        )
    }

    pub fn from_edge(source: Id, edge_type: impl Into<SmolStr>, target: Id) -> Self {
        Self::new(
            vec![
                NodeMeta {
                    id: source,
                    node_type: NodeType::Source,
                },
                NodeMeta {
                    id: target,
                    node_type: NodeType::Target,
                },
            ],
            vec![edge_type.into()],
            MetaType::Versions,
        )
    }

    /// Every meta an edge is stored under.
    pub fn all_for_edge(edge: &MarkedEdge) -> [DirectedEdgeMeta; 5] {
        [
            Self::from_source_node(edge.source.clone(), edge.edge_type.clone()),
            Self::from_source_node_target_type(
                edge.source.clone(),
                edge.edge_type.clone(),
                edge.target.id_type(),
            ),
            Self::from_target_node(edge.target.clone(), edge.edge_type.clone()),
            Self::from_target_node_source_type(
                edge.target.clone(),
                edge.edge_type.clone(),
                edge.source.id_type(),
            ),
            Self::from_edge(edge.source.clone(), edge.edge_type.clone(), edge.target.clone()),
        ]
    }

    fn new(nodes: Vec<NodeMeta>, types: Vec<SmolStr>, meta_type: MetaType) -> Self {
        Self {
            nodes,
            types,
            meta_type,
        }
    }

    #[inline]
    pub fn nodes(&self) -> &[NodeMeta] {
        &self.nodes
    }

    #[inline]
    pub fn types(&self) -> &[SmolStr] {
        &self.types
    }

    #[inline]
    pub fn meta_type(&self) -> MetaType {
        self.meta_type
    }

    pub fn column_family(&self) -> &'static str {
        self.meta_type.column_family()
    }

    /// Key of the meta itself, without any shard.
    pub fn key(&self, scope: &ApplicationScope) -> Bytes {
        let mut builder = KeyBuilder::new()
            .scope(scope)
            .u8(self.meta_type as u8);
        for node in &self.nodes {
            builder = builder.id(&node.id);
        }
        for edge_type in &self.types {
            builder = builder.str(edge_type);
        }
        builder.build()
    }

    /// Row holding the edges of this meta in the shard starting at `shard_index`.
    pub fn row_key(&self, scope: &ApplicationScope, shard_index: u64) -> Bytes {
        let mut buf = BytesMut::from(self.key(scope).as_ref());
        buf.put_u64(shard_index);
        buf.freeze()
    }

    /// Column of `edge` within a row of this meta. Columns sort by version first.
    pub fn column(&self, edge: &MarkedEdge) -> Bytes {
        let builder = KeyBuilder::new().version(edge.version);
        match self.meta_type {
            MetaType::Source | MetaType::SourceTarget => builder.id(&edge.target).build(),
            MetaType::Target | MetaType::TargetSource => builder.id(&edge.source).build(),
            MetaType::Versions => builder.build(),
        }
    }

    /// A column sorting after every column of `version`.
    pub fn version_ceiling(version: Version) -> Bytes {
        KeyBuilder::new()
            .version(version)
            .u8(u8::MAX)
            .u8(u8::MAX)
            .build()
    }

    pub fn decode(&self, column: &[u8], deleted: bool) -> GraphResult<MarkedEdge> {
        let mut reader = KeyReader::new(column);
        let version = reader.version()?;
        let node = &self.nodes[0].id;
        let edge_type = self.types[0].clone();
        let (source, target) = match self.meta_type {
            MetaType::Source | MetaType::SourceTarget => (node.clone(), reader.id()?),
            MetaType::Target | MetaType::TargetSource => (reader.id()?, node.clone()),
            MetaType::Versions => (node.clone(), self.nodes[1].id.clone()),
        };
        Ok(MarkedEdge {
            source,
            edge_type,
            target,
            version,
            deleted,
        })
    }
}
