use corepersist_common::id::Id;
use corepersist_common::scope::ApplicationScope;
use corepersist_common::version::Version;
use corepersist_storage::batch::MutationBatch;
use corepersist_storage::store::ColumnStoreRef;
use tracing::{debug, warn};

use crate::error::{CollectionError, CollectionResult};
use crate::mvcc::{MvccEntity, MvccLogEntry, Stage, State, Status};
use crate::serialization::{MvccEntitySerialization, MvccLogEntrySerialization};

/// The start, verify, commit and rollback steps shared by writes and marks.
#[derive(Clone)]
pub(crate) struct WriteStages {
    store: ColumnStoreRef,
    entities: MvccEntitySerialization,
    logs: MvccLogEntrySerialization,
}

impl WriteStages {
    pub(crate) fn new(
        store: ColumnStoreRef,
        entities: MvccEntitySerialization,
        logs: MvccLogEntrySerialization,
    ) -> Self {
        Self {
            store,
            entities,
            logs,
        }
    }

    /// Records that `version` is being written.
    pub(crate) fn start(
        &self,
        scope: &ApplicationScope,
        id: &Id,
        version: Version,
        state: State,
    ) -> CollectionResult<MvccLogEntry> {
        let entry = MvccLogEntry::new(id.clone(), version, Stage::Active, state);
        self.store.execute(self.logs.write(scope, &entry)?)?;
        debug!(%id, %version, %state, "collection.write.start");
        Ok(entry)
    }

    /// Fails when the newest committed version differs from the one the caller last saw.
    pub(crate) fn verify_optimistic(
        &self,
        scope: &ApplicationScope,
        entry: &MvccLogEntry,
        expected: Version,
    ) -> CollectionResult<()> {
        let actual = self.newest_committed_before(scope, entry)?;
        if actual == Some(expected) {
            return Ok(());
        }
        warn!(id = %entry.id, %expected, ?actual, "collection.write.conflict");
        self.rollback(scope, entry)?;
        Err(CollectionError::Conflict {
            id: entry.id.clone(),
            expected,
            actual,
        })
    }

    /// Writes the entity row and the committed log entry together.
    pub(crate) fn commit(
        &self,
        scope: &ApplicationScope,
        entry: &MvccLogEntry,
        entity: &MvccEntity,
    ) -> CollectionResult<()> {
        let committed = MvccLogEntry {
            stage: Stage::Committed,
            ..entry.clone()
        };
        let mut batch = self.entities.write(scope, entity)?;
        batch.merge(self.logs.write(scope, &committed)?);
        self.store.execute(batch)?;
        debug!(id = %entry.id, version = %entry.version, "collection.write.commit");
        Ok(())
    }

    pub(crate) fn execute(&self, batch: MutationBatch) -> CollectionResult<()> {
        self.store.execute(batch)?;
        Ok(())
    }

    pub(crate) fn rollback(&self, scope: &ApplicationScope, entry: &MvccLogEntry) -> CollectionResult<()> {
        self.store
            .execute(self.logs.delete(scope, &entry.id, entry.version))?;
        Ok(())
    }

    fn newest_committed_before(
        &self,
        scope: &ApplicationScope,
        entry: &MvccLogEntry,
    ) -> CollectionResult<Option<Version>> {
        let mut start = entry.version;
        loop {
            let page = self.logs.load_versions(scope, &entry.id, start, 32)?;
            let exhausted = page.len() < 32;
            for candidate in &page {
                if candidate.version < entry.version && candidate.stage == Stage::Committed {
                    return Ok(Some(candidate.version));
                }
            }
            match page.last() {
                Some(last) if !exhausted => start = last.version,
                _ => return Ok(None),
            }
        }
    }
}

pub(crate) fn state_of(entity: &MvccEntity) -> State {
    match (entity.is_tombstone(), entity.status()) {
        (true, _) => State::Deleted,
        (false, Status::Complete) => State::Complete,
        (false, Status::Partial) => State::Partial,
    }
}
