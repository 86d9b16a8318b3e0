use corepersist_common::id::Id;
use corepersist_common::version::Version;
use corepersist_storage::column::Order;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// A directed, typed edge at one version. `deleted` marks a tombstone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarkedEdge {
    pub source: Id,
    pub edge_type: SmolStr,
    pub target: Id,
    pub version: Version,
    pub deleted: bool,
}

impl MarkedEdge {
    pub fn new(source: Id, edge_type: impl Into<SmolStr>, target: Id, version: Version) -> Self {
        Self {
            source,
            edge_type: edge_type.into(),
            target,
            version,
            deleted: false,
        }
    }

    pub fn marked(mut self) -> Self {
        self.deleted = true;
        self
    }

    /// Microsecond timestamp of the edge version. Shard pivots are expressed in the same unit.
    #[inline]
    pub fn timestamp(&self) -> u64 {
        self.version.timestamp()
    }
}

/// Edges of one type leaving (or entering) a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchByEdgeType {
    pub node: Id,
    pub edge_type: SmolStr,
    pub max_version: Version,
    pub order: Order,
    /// Resume from this edge; it is returned again if still present.
    pub last: Option<MarkedEdge>,
    pub filter_marked: bool,
}

impl SearchByEdgeType {
    pub fn new(node: Id, edge_type: impl Into<SmolStr>) -> Self {
        Self {
            node,
            edge_type: edge_type.into(),
            max_version: Version::MAX,
            order: Order::Descending,
            last: None,
            filter_marked: true,
        }
    }

    pub fn with_last(mut self, last: Option<MarkedEdge>) -> Self {
        self.last = last;
        self
    }

    pub fn with_order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    pub fn with_max_version(mut self, max_version: Version) -> Self {
        self.max_version = max_version;
        self
    }

    pub fn include_marked(mut self) -> Self {
        self.filter_marked = false;
        self
    }
}

/// Edges of one type whose opposite node has the given id type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchByIdType {
    pub search: SearchByEdgeType,
    pub id_type: SmolStr,
}

impl SearchByIdType {
    pub fn new(node: Id, edge_type: impl Into<SmolStr>, id_type: impl Into<SmolStr>) -> Self {
        Self {
            search: SearchByEdgeType::new(node, edge_type),
            id_type: id_type.into(),
        }
    }
}

/// Every version of the edge between two nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchByEdge {
    pub source: Id,
    pub edge_type: SmolStr,
    pub target: Id,
    pub max_version: Version,
    pub order: Order,
    pub last: Option<MarkedEdge>,
    pub filter_marked: bool,
}

impl SearchByEdge {
    pub fn new(source: Id, edge_type: impl Into<SmolStr>, target: Id) -> Self {
        Self {
            source,
            edge_type: edge_type.into(),
            target,
            max_version: Version::MAX,
            order: Order::Descending,
            last: None,
            filter_marked: false,
        }
    }
}
