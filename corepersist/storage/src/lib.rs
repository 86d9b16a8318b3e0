//! Wide-column storage abstraction.
//!
//! Data is addressed by `(column family, row key)` and every row holds columns sorted by the raw
//! bytes of their names. Higher layers encode scopes, ids and versions into row and column keys
//! with [`keys`] and read rows lazily through [`iterator::ColumnIterator`].

pub mod batch;
pub mod column;
pub mod error;
pub mod iterator;
pub mod keys;
pub mod memory;
pub mod migration;
pub mod store;
