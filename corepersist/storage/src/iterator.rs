use std::collections::VecDeque;

use bytes::Bytes;
use smol_str::SmolStr;

use crate::column::{Column, ColumnRange};
use crate::error::StorageResult;
use crate::store::ColumnStoreRef;

/// Lazily pages through the columns of one row.
///
/// Nothing is read from the store until the iterator is first pulled; each round trip fetches at
/// most `page_size` columns. After an error the iterator is fused.
pub struct ColumnIterator {
    store: ColumnStoreRef,
    column_family: SmolStr,
    row: Bytes,
    range: ColumnRange,
    page_size: usize,
    buffer: VecDeque<Column>,
    last: Option<Bytes>,
    done: bool,
}

impl ColumnIterator {
    pub fn new(
        store: ColumnStoreRef,
        column_family: impl Into<SmolStr>,
        row: Bytes,
        range: ColumnRange,
        page_size: usize,
    ) -> Self {
        Self {
            store,
            column_family: column_family.into(),
            row,
            range,
            page_size: page_size.max(1),
            buffer: VecDeque::new(),
            last: None,
            done: false,
        }
    }

    fn fetch(&mut self) -> StorageResult<()> {
        let (range, skip_first) = match &self.last {
            // Ranges are inclusive, so the previous page's last column comes back first.
            Some(last) => (self.range.clone().with_start(Some(last.clone())), true),
            None => (self.range.clone(), false),
        };
        let limit = self.page_size + usize::from(skip_first);
        let mut page =
            self.store
                .scan(&self.column_family, &self.row, &range, limit)?;
        if page.len() < limit {
            self.done = true;
        }
        if skip_first && page.first().map(|c| &c.name) == self.last.as_ref() {
            page.remove(0);
        }
        if let Some(column) = page.last() {
            self.last = Some(column.name.clone());
        }
        self.buffer.extend(page);
        Ok(())
    }
}

impl Iterator for ColumnIterator {
    type Item = StorageResult<Column>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.done {
            if let Err(e) = self.fetch() {
                self.done = true;
                return Some(Err(e));
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}
