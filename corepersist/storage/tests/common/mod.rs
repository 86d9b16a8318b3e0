use std::sync::Arc;

use bytes::Bytes;
use corepersist_storage::batch::MutationBatch;
use corepersist_storage::column::ColumnFamilyDefinition;
use corepersist_storage::memory::MemoryColumnStore;
use corepersist_storage::store::ColumnStore;

pub const CF: &str = "iterator_test";
pub const ROW: &[u8] = b"row";

pub fn create_store() -> Arc<MemoryColumnStore> {
    let store = Arc::new(MemoryColumnStore::new());
    store
        .create_column_family(&ColumnFamilyDefinition::new(CF))
        .unwrap();
    store
}

/// Writes columns `0..count` encoded as big-endian u32 names.
pub fn fill_row(store: &MemoryColumnStore, count: u32) {
    let mut batch = MutationBatch::new();
    for i in 0..count {
        batch.put(
            CF,
            Bytes::from_static(ROW),
            i.to_be_bytes().to_vec(),
            format!("value-{i}").into_bytes(),
        );
    }
    store.execute(batch).unwrap();
}

pub fn decode(name: &[u8]) -> u32 {
    u32::from_be_bytes([name[0], name[1], name[2], name[3]])
}
