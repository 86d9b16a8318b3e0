use corepersist_common::id::Id;
use corepersist_common::scope::ApplicationScope;
use corepersist_common::version::Version;
use corepersist_storage::batch::MutationBatch;
use corepersist_storage::store::ColumnStoreRef;
use tracing::debug;

use crate::error::CollectionResult;
use crate::serialization::{MvccEntitySerialization, MvccLogEntrySerialization};

const PAGE_SIZE: usize = 100;

/// Removes versions superseded by a complete version or a tombstone.
#[derive(Clone)]
pub(crate) struct VersionCleanup {
    store: ColumnStoreRef,
    entities: MvccEntitySerialization,
    logs: MvccLogEntrySerialization,
    retained: usize,
}

impl VersionCleanup {
    pub(crate) fn new(
        store: ColumnStoreRef,
        entities: MvccEntitySerialization,
        logs: MvccLogEntrySerialization,
        retained: usize,
    ) -> Self {
        Self {
            store,
            entities,
            logs,
            retained,
        }
    }

    /// Deletes every version older than `version` except the newest `retained` of them.
    pub(crate) fn run(
        &self,
        scope: &ApplicationScope,
        id: &Id,
        version: Version,
    ) -> CollectionResult<usize> {
        let mut older = Vec::new();
        let mut start = version;
        loop {
            let page = self.logs.load_versions(scope, id, start, PAGE_SIZE)?;
            let exhausted = page.len() < PAGE_SIZE;
            let Some(last) = page.last().map(|e| e.version) else {
                break;
            };
            for entry in page {
                // Pages overlap on their boundary column.
                if entry.version < version && older.last() != Some(&entry.version) {
                    older.push(entry.version);
                }
            }
            if exhausted {
                break;
            }
            start = last;
        }

        let mut batch = MutationBatch::new();
        let mut removed = 0;
        for old in older.into_iter().skip(self.retained) {
            batch.merge(self.entities.delete(scope, id, old));
            batch.merge(self.logs.delete(scope, id, old));
            removed += 1;
        }
        if removed > 0 {
            self.store.execute(batch)?;
            debug!(%id, %version, removed, "collection.cleanup.removed_versions");
        }
        Ok(removed)
    }
}
