use bytes::Bytes;
use corepersist_common::id::Id;
use corepersist_common::scope::ApplicationScope;
use corepersist_common::version::Version;
use corepersist_storage::batch::MutationBatch;
use corepersist_storage::column::{ColumnFamilyDefinition, ColumnRange, Order};
use corepersist_storage::iterator::ColumnIterator;
use corepersist_storage::keys::KeyBuilder;
use corepersist_storage::migration::Migration;
use corepersist_storage::store::ColumnStoreRef;

use super::format::{self, EntityFormat};
use crate::error::CollectionResult;
use crate::mvcc::MvccEntity;

pub const ENTITY_VERSION_DATA: &str = "Entity_Version_Data";

/// Stores one row per entity with one column per version, newest version last in byte order.
#[derive(Clone)]
pub struct MvccEntitySerialization {
    store: ColumnStoreRef,
}

impl MvccEntitySerialization {
    pub fn new(store: ColumnStoreRef) -> Self {
        Self { store }
    }

    /// Builds the mutation that writes `entity` as its own version.
    pub fn write(
        &self,
        scope: &ApplicationScope,
        entity: &MvccEntity,
    ) -> CollectionResult<MutationBatch> {
        let mut batch = MutationBatch::new();
        batch.put(
            ENTITY_VERSION_DATA,
            row_key(scope, entity.id()),
            column(entity.version()),
            format::encode(entity, EntityFormat::CURRENT)?,
        );
        Ok(batch)
    }

    /// Removes the row of one version.
    pub fn delete(&self, scope: &ApplicationScope, id: &Id, version: Version) -> MutationBatch {
        let mut batch = MutationBatch::new();
        batch.delete(ENTITY_VERSION_DATA, row_key(scope, id), column(version));
        batch
    }

    /// Versions at or below `max_version`, newest first, fetched `fetch_size` rows at a time.
    pub fn load_history(
        &self,
        scope: &ApplicationScope,
        id: &Id,
        max_version: Version,
        fetch_size: usize,
    ) -> impl Iterator<Item = CollectionResult<MvccEntity>> + 'static {
        let id = id.clone();
        ColumnIterator::new(
            self.store.clone(),
            ENTITY_VERSION_DATA,
            row_key(scope, &id),
            ColumnRange::starting_at(column(max_version), Order::Descending),
            fetch_size,
        )
        .map(move |column| {
            let column = column?;
            let version = Version::from_slice(&column.name)?;
            format::decode(&id, version, &column.value).map(|(_, e)| e)
        })
    }

    pub(crate) fn load_raw(
        &self,
        scope: &ApplicationScope,
        id: &Id,
    ) -> CollectionResult<Vec<(EntityFormat, MvccEntity)>> {
        ColumnIterator::new(
            self.store.clone(),
            ENTITY_VERSION_DATA,
            row_key(scope, id),
            ColumnRange::all(Order::Descending),
            100,
        )
        .map(|column| {
            let column = column?;
            let version = Version::from_slice(&column.name)?;
            format::decode(id, version, &column.value)
        })
        .collect()
    }

    /// Writes a row in an explicit format, bypassing [`EntityFormat::CURRENT`].
    pub fn write_with_format(
        &self,
        scope: &ApplicationScope,
        entity: &MvccEntity,
        format: EntityFormat,
    ) -> CollectionResult<()> {
        let mut batch = MutationBatch::new();
        batch.put(
            ENTITY_VERSION_DATA,
            row_key(scope, entity.id()),
            column(entity.version()),
            format::encode(entity, format)?,
        );
        self.store.execute(batch)?;
        Ok(())
    }

    pub fn format_of(
        &self,
        scope: &ApplicationScope,
        id: &Id,
        version: Version,
    ) -> CollectionResult<Option<EntityFormat>> {
        let value = self
            .store
            .get(ENTITY_VERSION_DATA, &row_key(scope, id), &column(version))?;
        match value.as_ref().and_then(|v| v.first()) {
            Some(tag) => EntityFormat::from_tag(*tag).map(Some),
            None => Ok(None),
        }
    }
}

impl Migration for MvccEntitySerialization {
    fn column_families(&self) -> Vec<ColumnFamilyDefinition> {
        vec![ColumnFamilyDefinition::new(ENTITY_VERSION_DATA)]
    }
}

fn row_key(scope: &ApplicationScope, id: &Id) -> Bytes {
    KeyBuilder::new().scope(scope).id(id).build()
}

fn column(version: Version) -> Bytes {
    Bytes::copy_from_slice(&version.to_bytes())
}
