//! An in-process [`ColumnStore`] backed by concurrent skip lists.

use std::ops::Bound;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use crossbeam_skiplist::SkipMap;
use dashmap::{DashMap, DashSet};
use smol_str::SmolStr;
use tracing::debug;

use crate::batch::{MutationBatch, MutationKind};
use crate::column::{Column, ColumnFamilyDefinition, ColumnRange, Order};
use crate::error::{StorageError, StorageResult};
use crate::store::ColumnStore;

type RowKey = (SmolStr, Bytes);
type Row = Arc<SkipMap<Bytes, Bytes>>;

#[derive(Debug, Default)]
pub struct MemoryColumnStore {
    families: DashSet<SmolStr>,
    rows: DashMap<RowKey, Row>,
    schema_locked: bool,
    // Number of upcoming operations that fail with a timeout.
    pending_timeouts: AtomicUsize,
}

impl MemoryColumnStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose set of column families cannot change.
    pub fn with_locked_schema(families: impl IntoIterator<Item = ColumnFamilyDefinition>) -> Self {
        let store = Self {
            schema_locked: true,
            ..Self::default()
        };
        for definition in families {
            store.families.insert(definition.name);
        }
        store
    }

    /// Makes the next `count` reads or writes fail with [`StorageError::Timeout`].
    pub fn inject_timeouts(&self, count: usize) {
        self.pending_timeouts.store(count, Ordering::SeqCst);
    }

    /// Number of columns currently stored in a row.
    pub fn row_len(&self, column_family: &str, row: &[u8]) -> usize {
        self.rows
            .get(&(SmolStr::new(column_family), Bytes::copy_from_slice(row)))
            .map(|r| r.len())
            .unwrap_or_default()
    }

    fn check(&self, column_family: &str) -> StorageResult<()> {
        let pending = self.pending_timeouts.load(Ordering::SeqCst);
        if pending > 0
            && self
                .pending_timeouts
                .compare_exchange(pending, pending - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            return Err(StorageError::Timeout(format!(
                "operation on {column_family} timed out"
            )));
        }
        if !self.families.contains(column_family) {
            return Err(StorageError::ColumnFamilyMissing(column_family.to_owned()));
        }
        Ok(())
    }

    fn row(&self, column_family: &str, row: &[u8]) -> Option<Row> {
        self.rows
            .get(&(SmolStr::new(column_family), Bytes::copy_from_slice(row)))
            .map(|r| r.value().clone())
    }
}

impl ColumnStore for MemoryColumnStore {
    fn create_column_family(&self, definition: &ColumnFamilyDefinition) -> StorageResult<()> {
        if self.families.contains(&definition.name) {
            return Ok(());
        }
        if self.schema_locked {
            return Err(StorageError::SchemaLocked(definition.name.to_string()));
        }
        debug!(column_family = %definition.name, "storage.memory.create_column_family");
        self.families.insert(definition.name.clone());
        Ok(())
    }

    fn has_column_family(&self, name: &str) -> bool {
        self.families.contains(name)
    }

    fn get(&self, column_family: &str, row: &[u8], column: &[u8]) -> StorageResult<Option<Bytes>> {
        self.check(column_family)?;
        Ok(self
            .row(column_family, row)
            .and_then(|r| r.get(column).map(|e| e.value().clone())))
    }

    fn scan(
        &self,
        column_family: &str,
        row: &[u8],
        range: &ColumnRange,
        limit: usize,
    ) -> StorageResult<Vec<Column>> {
        self.check(column_family)?;
        let Some(row) = self.row(column_family, row) else {
            return Ok(Vec::new());
        };
        let (lower, upper) = range.bounds();
        let bounds: (Bound<&[u8]>, Bound<&[u8]>) = (
            lower.map_or(Bound::Unbounded, |b| Bound::Included(b.as_ref())),
            upper.map_or(Bound::Unbounded, |b| Bound::Included(b.as_ref())),
        );
        if let (Bound::Included(lo), Bound::Included(hi)) = bounds {
            if lo > hi {
                return Ok(Vec::new());
            }
        }
        let to_column = |e: crossbeam_skiplist::map::Entry<'_, Bytes, Bytes>| Column {
            name: e.key().clone(),
            value: e.value().clone(),
        };
        let columns = match range.order {
            Order::Ascending => row.range::<[u8], _>(bounds).take(limit).map(to_column).collect(),
            Order::Descending => row.range::<[u8], _>(bounds).rev().take(limit).map(to_column).collect(),
        };
        Ok(columns)
    }

    fn execute(&self, batch: MutationBatch) -> StorageResult<()> {
        for mutation in batch.iter() {
            self.check(&mutation.column_family)?;
        }
        for mutation in batch {
            let key = (mutation.column_family, mutation.row);
            match mutation.kind {
                MutationKind::Put { column, value } => {
                    let row = self.rows.entry(key).or_default().value().clone();
                    row.insert(column, value);
                }
                MutationKind::Delete { column } => {
                    if let Some(row) = self.rows.get(&key).map(|r| r.value().clone()) {
                        row.remove(&column);
                    }
                }
                MutationKind::DeleteRow => {
                    self.rows.remove(&key);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CF: &str = "test_cf";

    fn store() -> MemoryColumnStore {
        let store = MemoryColumnStore::new();
        store
            .create_column_family(&ColumnFamilyDefinition::new(CF))
            .unwrap();
        store
    }

    fn fill(store: &MemoryColumnStore, columns: &[u8]) {
        let mut batch = MutationBatch::new();
        for c in columns {
            batch.put(CF, &b"row"[..], vec![*c], vec![*c * 10]);
        }
        store.execute(batch).unwrap();
    }

    fn names(columns: &[Column]) -> Vec<u8> {
        columns.iter().map(|c| c.name[0]).collect()
    }

    #[test]
    fn test_scan_orders() {
        let store = store();
        fill(&store, &[3, 1, 2, 5, 4]);

        let asc = store
            .scan(CF, b"row", &ColumnRange::all(Order::Ascending), 10)
            .unwrap();
        assert_eq!(names(&asc), vec![1, 2, 3, 4, 5]);

        let desc = store
            .scan(CF, b"row", &ColumnRange::all(Order::Descending), 3)
            .unwrap();
        assert_eq!(names(&desc), vec![5, 4, 3]);
    }

    #[test]
    fn test_scan_bounds_are_inclusive() {
        let store = store();
        fill(&store, &[1, 2, 3, 4, 5]);

        let desc = ColumnRange::starting_at(vec![4u8], Order::Descending).with_finish(vec![2u8]);
        assert_eq!(names(&store.scan(CF, b"row", &desc, 10).unwrap()), vec![4, 3, 2]);

        let asc = ColumnRange::starting_at(vec![2u8], Order::Ascending).with_finish(vec![4u8]);
        assert_eq!(names(&store.scan(CF, b"row", &asc, 10).unwrap()), vec![2, 3, 4]);

        let empty = ColumnRange::starting_at(vec![4u8], Order::Ascending).with_finish(vec![2u8]);
        assert!(store.scan(CF, b"row", &empty, 10).unwrap().is_empty());
    }

    #[test]
    fn test_delete_column_and_row() {
        let store = store();
        fill(&store, &[1, 2, 3]);
        let mut batch = MutationBatch::new();
        batch.delete(CF, &b"row"[..], vec![2u8]);
        store.execute(batch).unwrap();
        assert_eq!(store.row_len(CF, b"row"), 2);
        assert!(store.get(CF, b"row", &[2]).unwrap().is_none());
        assert_eq!(store.get(CF, b"row", &[3]).unwrap().unwrap()[0], 30);

        let mut batch = MutationBatch::new();
        batch.delete_row(CF, &b"row"[..]);
        store.execute(batch).unwrap();
        assert_eq!(store.row_len(CF, b"row"), 0);
    }

    #[test]
    fn test_missing_column_family() {
        let store = MemoryColumnStore::new();
        let err = store.get("nope", b"row", b"c").unwrap_err();
        assert!(matches!(err, StorageError::ColumnFamilyMissing(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_injected_timeouts_are_retryable() {
        let store = store();
        store.inject_timeouts(1);
        let err = store
            .scan(CF, b"row", &ColumnRange::all(Order::Ascending), 1)
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(
            store
                .scan(CF, b"row", &ColumnRange::all(Order::Ascending), 1)
                .is_ok()
        );
    }

    #[test]
    fn test_locked_schema_rejects_new_families() {
        let store = MemoryColumnStore::with_locked_schema([ColumnFamilyDefinition::new(CF)]);
        assert!(
            store
                .create_column_family(&ColumnFamilyDefinition::new(CF))
                .is_ok()
        );
        assert!(matches!(
            store.create_column_family(&ColumnFamilyDefinition::new("other")),
            Err(StorageError::SchemaLocked(_))
        ));
    }
}
