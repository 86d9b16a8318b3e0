use bytes::Bytes;
use corepersist_common::id::Id;
use corepersist_common::scope::ApplicationScope;
use corepersist_common::version::Version;
use corepersist_storage::batch::MutationBatch;
use corepersist_storage::column::{ColumnFamilyDefinition, ColumnRange, Order};
use corepersist_storage::keys::KeyBuilder;
use corepersist_storage::migration::Migration;
use corepersist_storage::store::ColumnStoreRef;
use serde::{Deserialize, Serialize};

use crate::error::CollectionResult;
use crate::mvcc::{MvccLogEntry, Stage, State};

pub const ENTITY_LOG: &str = "Entity_Log";

#[derive(Serialize, Deserialize)]
struct LogRecord {
    stage: Stage,
    state: State,
}

/// The per-entity log of versions and how far each write progressed.
#[derive(Clone)]
pub struct MvccLogEntrySerialization {
    store: ColumnStoreRef,
}

impl MvccLogEntrySerialization {
    pub fn new(store: ColumnStoreRef) -> Self {
        Self { store }
    }

    pub fn write(
        &self,
        scope: &ApplicationScope,
        entry: &MvccLogEntry,
    ) -> CollectionResult<MutationBatch> {
        let value = postcard::to_allocvec(&LogRecord {
            stage: entry.stage,
            state: entry.state,
        })?;
        let mut batch = MutationBatch::new();
        batch.put(
            ENTITY_LOG,
            row_key(scope, &entry.id),
            column(entry.version),
            value,
        );
        Ok(batch)
    }

    pub fn delete(&self, scope: &ApplicationScope, id: &Id, version: Version) -> MutationBatch {
        let mut batch = MutationBatch::new();
        batch.delete(ENTITY_LOG, row_key(scope, id), column(version));
        batch
    }

    /// At most `limit` entries at or below `max_version`, newest first.
    pub fn load_versions(
        &self,
        scope: &ApplicationScope,
        id: &Id,
        max_version: Version,
        limit: usize,
    ) -> CollectionResult<Vec<MvccLogEntry>> {
        let range = ColumnRange::starting_at(column(max_version), Order::Descending);
        self.store
            .scan(ENTITY_LOG, &row_key(scope, id), &range, limit)?
            .into_iter()
            .map(|c| decode(id, Version::from_slice(&c.name)?, &c.value))
            .collect()
    }
}

impl Migration for MvccLogEntrySerialization {
    fn column_families(&self) -> Vec<ColumnFamilyDefinition> {
        vec![ColumnFamilyDefinition::new(ENTITY_LOG)]
    }
}

fn decode(id: &Id, version: Version, value: &[u8]) -> CollectionResult<MvccLogEntry> {
    let record: LogRecord = postcard::from_bytes(value)?;
    Ok(MvccLogEntry::new(
        id.clone(),
        version,
        record.stage,
        record.state,
    ))
}

fn row_key(scope: &ApplicationScope, id: &Id) -> Bytes {
    KeyBuilder::new().scope(scope).id(id).build()
}

fn column(version: Version) -> Bytes {
    Bytes::copy_from_slice(&version.to_bytes())
}
