//! Sharded storage of directed, typed edges.
//!
//! Edges are stored once per [`meta::DirectedEdgeMeta`] (by source, by target, by either with the
//! opposite node type, and by the exact source/type/target triple). The rows of each meta are split
//! into [`shard::Shard`]s whose boundaries are pivots on edge timestamps. Approximate per-shard
//! counters decide when a new shard is allocated, and compaction later moves edges into the newest
//! shard of a group.

pub mod config;
pub mod edge;
pub mod error;
mod filter;
pub mod manager;
pub mod meta;
pub mod serialization;
pub mod shard;
