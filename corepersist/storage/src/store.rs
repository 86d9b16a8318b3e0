use std::sync::Arc;

use bytes::Bytes;

use crate::batch::MutationBatch;
use crate::column::{Column, ColumnFamilyDefinition, ColumnRange};
use crate::error::StorageResult;

/// A wide-column store: rows addressed by `(column family, row key)` holding byte-ordered columns.
pub trait ColumnStore: Send + Sync {
    fn create_column_family(&self, definition: &ColumnFamilyDefinition) -> StorageResult<()>;

    fn has_column_family(&self, name: &str) -> bool;

    fn get(&self, column_family: &str, row: &[u8], column: &[u8]) -> StorageResult<Option<Bytes>>;

    /// Reads at most `limit` columns of a row within `range`, in the range's order.
    fn scan(
        &self,
        column_family: &str,
        row: &[u8],
        range: &ColumnRange,
        limit: usize,
    ) -> StorageResult<Vec<Column>>;

    fn execute(&self, batch: MutationBatch) -> StorageResult<()>;
}

pub type ColumnStoreRef = Arc<dyn ColumnStore>;
