use std::collections::HashSet;
use std::sync::Arc;

use corepersist_common::entity::Entity;
use corepersist_common::field::Field;
use corepersist_common::id::Id;
use corepersist_common::scope::ApplicationScope;
use corepersist_common::version::{Version, VersionGenerator};
use corepersist_storage::error::StorageResult;
use corepersist_storage::migration::{Migration, MigrationManager};
use corepersist_storage::store::ColumnStoreRef;
use rayon::ThreadPool;
use smol_str::SmolStr;
use tracing::{debug, warn};

use crate::changelog::{ChangeLogEntry, ChangeLogGenerator};
use crate::config::SerializationConfig;
use crate::error::{CollectionError, CollectionResult};
use crate::mvcc::{
    EntityMutation, EntitySet, FieldSet, MvccEntity, MvccLogEntry, Stage, State, Status,
    VersionSet,
};
use crate::serialization::{
    MvccEntitySerialization, MvccLogEntrySerialization, UniqueValue, UniqueValueSerialization,
};
use crate::stage::cleanup::VersionCleanup;
use crate::stage::load::merge_versions;
use crate::stage::unique::UniqueVerify;
use crate::stage::write::{WriteStages, state_of};

/// Entry point for reading and writing versioned entities.
///
/// Writers never lock: concurrent writes to the same id each get their own version, and loads
/// resolve them field by field. Superseded versions are removed after commits, on the background
/// pool when one is configured and inline otherwise.
///
/// Unique fields are claimed before a version commits, and a value claimed by another entity of
/// the same type fails the write.
pub struct EntityCollectionManager {
    entities: MvccEntitySerialization,
    logs: MvccLogEntrySerialization,
    stages: WriteStages,
    unique: UniqueVerify,
    cleanup: VersionCleanup,
    versions: Arc<VersionGenerator>,
    config: SerializationConfig,
    pool: Option<Arc<ThreadPool>>,
}

impl EntityCollectionManager {
    pub fn new(
        store: ColumnStoreRef,
        versions: Arc<VersionGenerator>,
        config: SerializationConfig,
    ) -> Self {
        let entities = MvccEntitySerialization::new(store.clone());
        let logs = MvccLogEntrySerialization::new(store.clone());
        Self {
            stages: WriteStages::new(store.clone(), entities.clone(), logs.clone()),
            unique: UniqueVerify::new(store.clone(), UniqueValueSerialization::new(store.clone())),
            cleanup: VersionCleanup::new(
                store,
                entities.clone(),
                logs.clone(),
                config.retained_versions,
            ),
            entities,
            logs,
            versions,
            config,
            pool: None,
        }
    }

    pub fn with_pool(mut self, pool: Arc<ThreadPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Creates the column families this manager writes to.
    pub fn migrate(&self, migrations: &MigrationManager) -> StorageResult<()> {
        migrations.migrate(&[
            &self.entities as &dyn Migration,
            &self.logs,
            self.unique.values(),
        ])
    }

    pub fn entity_serialization(&self) -> &MvccEntitySerialization {
        &self.entities
    }

    /// Writes a new version of an entity and returns it.
    ///
    /// With `expected_prior`, the write fails with [`CollectionError::Conflict`] unless that is the
    /// newest committed version. A unique field whose value another entity holds fails the write
    /// with [`CollectionError::UniqueViolation`].
    pub fn write(
        &self,
        scope: &ApplicationScope,
        mutation: EntityMutation,
        expected_prior: Option<Version>,
    ) -> CollectionResult<Version> {
        let id = mutation.id().clone();
        let version = self.versions.next()?;
        let row = match mutation {
            EntityMutation::Replace(entity) => MvccEntity::complete(version, entity),
            EntityMutation::Merge { id, set, removed } => {
                if set.is_empty() && removed.is_empty() {
                    return Err(CollectionError::EmptyMutation(id));
                }
                let complete = removed.is_empty() && self.covers_known_fields(scope, &id, &set)?;
                let entity = set
                    .into_iter()
                    .fold(Entity::new(id), |e, f| e.with_field(f));
                if complete {
                    MvccEntity::complete(version, entity)
                } else {
                    MvccEntity::partial(version, entity, removed)
                }
            }
        };

        let claims: Vec<Field> = row
            .entity()
            .map(|e| e.unique_fields().cloned().collect())
            .unwrap_or_default();

        let entry = self.stages.start(scope, &id, version, state_of(&row))?;
        if !claims.is_empty() {
            if let Err(e) = self.unique.verify(scope, &id, version, &claims) {
                self.stages.rollback(scope, &entry)?;
                return Err(e);
            }
        }
        if let Some(expected) = expected_prior {
            if let Err(e) = self.stages.verify_optimistic(scope, &entry, expected) {
                self.unique
                    .release(scope, &id, |v| v.entity_version == version)?;
                return Err(e);
            }
        }
        self.stages.commit(scope, &entry, &row)?;
        self.release_superseded_claims(scope, &row);
        if entry.state == State::Complete {
            self.schedule_cleanup(scope, &id, version);
        }
        Ok(version)
    }

    /// The entity as of `max_version`, or `None` when it does not exist or was deleted.
    ///
    /// `field_count_hint` is the number of version rows fetched per storage round trip; zero uses
    /// the configured fetch size.
    pub fn load(
        &self,
        scope: &ApplicationScope,
        id: &Id,
        max_version: Version,
        field_count_hint: usize,
    ) -> CollectionResult<Option<MvccEntity>> {
        let fetch_size = match field_count_hint {
            0 => self.config.fetch_size,
            hint => hint,
        };
        merge_versions(
            self.entities
                .load_history(scope, id, max_version, fetch_size),
        )
    }

    pub fn load_latest(
        &self,
        scope: &ApplicationScope,
        id: &Id,
    ) -> CollectionResult<Option<MvccEntity>> {
        self.load(scope, id, Version::MAX, 0)
    }

    /// Loads several entities as of `max_version`. Missing and deleted ids are left out.
    pub fn load_many<'a>(
        &self,
        scope: &ApplicationScope,
        ids: impl IntoIterator<Item = &'a Id>,
        max_version: Version,
    ) -> CollectionResult<EntitySet> {
        let mut set = EntitySet::default();
        for id in ids {
            if let Some(entity) = self.load(scope, id, max_version, 0)? {
                set.insert(entity);
            }
        }
        Ok(set)
    }

    /// Marks `version` of the entity as deleted. Storage is reclaimed later by cleanup.
    pub fn delete(
        &self,
        scope: &ApplicationScope,
        id: &Id,
        version: Version,
    ) -> CollectionResult<()> {
        self.versions.update_if_greater(version);
        let entry = self.stages.start(scope, id, version, State::Deleted)?;
        let tombstone = MvccEntity::tombstone(id.clone(), version);
        self.stages.commit(scope, &entry, &tombstone)?;
        self.release_superseded_claims(scope, &tombstone);
        self.schedule_cleanup(scope, id, version);
        Ok(())
    }

    /// Deletes the entity at a freshly allocated version.
    pub fn delete_latest(&self, scope: &ApplicationScope, id: &Id) -> CollectionResult<Version> {
        let version = self.versions.next()?;
        self.delete(scope, id, version)?;
        Ok(version)
    }

    /// Log entries at or below `start`, newest first.
    pub fn get_versions(
        &self,
        scope: &ApplicationScope,
        id: &Id,
        start: Version,
        limit: usize,
    ) -> CollectionResult<Vec<MvccLogEntry>> {
        self.logs.load_versions(scope, id, start, limit)
    }

    /// The newest log entry of each id, whatever its stage. Ids without any entry are left out.
    pub fn get_latest_versions<'a>(
        &self,
        scope: &ApplicationScope,
        ids: impl IntoIterator<Item = &'a Id>,
    ) -> CollectionResult<VersionSet> {
        let mut set = VersionSet::default();
        for id in ids {
            if let Some(entry) = self.newest_log_entry(scope, id)? {
                set.insert(entry);
            }
        }
        Ok(set)
    }

    /// The entity of `entity_type` holding the unique value of `field`.
    pub fn get_id_field(
        &self,
        scope: &ApplicationScope,
        entity_type: &str,
        field: &Field,
    ) -> CollectionResult<Option<Id>> {
        let held = self.unique.values().load(scope, entity_type, field)?;
        Ok(held
            .into_iter()
            .min_by_key(|v| v.entity_version)
            .map(|v| v.entity_id))
    }

    /// Loads the entities holding each unique field value.
    ///
    /// A claim whose holder has since committed a version without that value is removed, and the
    /// field is left out of the result.
    pub fn get_entities_from_fields(
        &self,
        scope: &ApplicationScope,
        entity_type: &str,
        fields: &[Field],
    ) -> CollectionResult<FieldSet> {
        let mut set = FieldSet::default();
        for field in fields {
            let held = self.unique.values().load(scope, entity_type, field)?;
            let Some(holder) = held.iter().min_by_key(|v| v.entity_version) else {
                continue;
            };
            match self.load_latest(scope, &holder.entity_id)? {
                Some(entity) if holds_value(&entity, field) => set.insert(field.clone(), entity),
                _ => self.repair_claims(scope, &held)?,
            }
        }
        Ok(set)
    }

    /// Physically removes one version and its log entry.
    pub fn remove_version(
        &self,
        scope: &ApplicationScope,
        id: &Id,
        version: Version,
    ) -> CollectionResult<()> {
        let mut batch = self.entities.delete(scope, id, version);
        batch.merge(self.logs.delete(scope, id, version));
        self.stages.execute(batch)
    }

    /// Every stored row of the entity, oldest first.
    pub fn history(&self, scope: &ApplicationScope, id: &Id) -> CollectionResult<Vec<MvccEntity>> {
        let mut rows = self
            .entities
            .load_history(scope, id, Version::MAX, self.config.fetch_size)
            .collect::<CollectionResult<Vec<_>>>()?;
        rows.reverse();
        Ok(rows)
    }

    /// Field changes across the stored history relative to `min_version`.
    pub fn change_log(
        &self,
        scope: &ApplicationScope,
        id: &Id,
        min_version: Version,
    ) -> CollectionResult<Vec<ChangeLogEntry>> {
        let history = self.history(scope, id)?;
        Ok(ChangeLogGenerator.get_change_log(&history, min_version))
    }

    fn newest_log_entry(
        &self,
        scope: &ApplicationScope,
        id: &Id,
    ) -> CollectionResult<Option<MvccLogEntry>> {
        Ok(self
            .logs
            .load_versions(scope, id, Version::MAX, 1)?
            .into_iter()
            .next())
    }

    /// Removes claims older than the holder's newest committed version. Claims of writes still in
    /// flight are kept.
    fn repair_claims(&self, scope: &ApplicationScope, held: &[UniqueValue]) -> CollectionResult<()> {
        for claim in held {
            let stale = self
                .newest_log_entry(scope, &claim.entity_id)?
                .is_some_and(|e| e.stage == Stage::Committed && e.version >= claim.entity_version);
            if stale {
                let version = claim.entity_version;
                self.unique
                    .release(scope, &claim.entity_id, |v| {
                        v.entity_version == version && v.field.name() == claim.field.name()
                    })?;
                debug!(id = %claim.entity_id, field = claim.field.name(), "collection.unique.repaired");
            }
        }
        Ok(())
    }

    /// Releases the claims a committed row supersedes: every older claim for a complete row or a
    /// tombstone, and older claims on the fields it touches for a partial row.
    fn release_superseded_claims(&self, scope: &ApplicationScope, row: &MvccEntity) {
        let version = row.version();
        let result = match (row.entity(), row.status()) {
            (Some(entity), Status::Partial) => {
                let touched: HashSet<SmolStr> = entity
                    .field_names()
                    .map(SmolStr::new)
                    .chain(row.deleted_fields().iter().cloned())
                    .collect();
                self.unique.release(scope, row.id(), |v| {
                    v.entity_version < version && touched.contains(v.field.name())
                })
            }
            _ => self
                .unique
                .release(scope, row.id(), |v| v.entity_version < version),
        };
        if let Err(e) = result {
            warn!(id = %row.id(), %version, error = %e, "collection.unique.release_failed");
        }
    }

    fn covers_known_fields(
        &self,
        scope: &ApplicationScope,
        id: &Id,
        set: &[Field],
    ) -> CollectionResult<bool> {
        let Some(current) = self.load_latest(scope, id)? else {
            return Ok(false);
        };
        let Some(entity) = current.entity() else {
            return Ok(false);
        };
        let names: HashSet<&str> = set.iter().map(|f| f.name()).collect();
        Ok(!entity.is_empty() && entity.field_names().all(|n| names.contains(n)))
    }

    fn schedule_cleanup(&self, scope: &ApplicationScope, id: &Id, version: Version) {
        if !self.config.cleanup_enabled {
            return;
        }
        let cleanup = self.cleanup.clone();
        let scope = scope.clone();
        let id = id.clone();
        let task = move || {
            if let Err(e) = cleanup.run(&scope, &id, version) {
                warn!(%id, %version, error = %e, "collection.cleanup.failed");
            }
        };
        match &self.pool {
            Some(pool) => pool.spawn(task),
            None => task(),
        }
    }
}

fn holds_value(entity: &MvccEntity, field: &Field) -> bool {
    entity
        .entity()
        .and_then(|e| e.field(field.name()))
        .is_some_and(|f| f.value() == field.value())
}
