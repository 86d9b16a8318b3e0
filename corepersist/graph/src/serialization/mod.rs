mod metadata;
mod node;
mod sharded;

pub use metadata::EdgeMetadataSerialization;
pub use node::{GRAPH_MARKED_NODES, NodeSerialization};
pub use sharded::{EdgeIterator, ShardedEdgeSerialization};
