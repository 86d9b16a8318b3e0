//! Multi-version entity storage.
//!
//! Every write of an entity produces a new [`Version`](corepersist_common::version::Version) row.
//! Rows may carry a complete snapshot or a partial set of fields; loading merges rows newest first
//! until a complete snapshot is reached.

pub mod changelog;
pub mod config;
pub mod error;
pub mod manager;
pub mod mvcc;
pub mod serialization;
mod stage;
