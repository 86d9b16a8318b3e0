use bytes::Bytes;
use corepersist_common::field::Field;
use corepersist_common::id::Id;
use corepersist_common::scope::ApplicationScope;
use corepersist_common::version::Version;
use corepersist_storage::batch::MutationBatch;
use corepersist_storage::column::{ColumnFamilyDefinition, ColumnRange, Order};
use corepersist_storage::iterator::ColumnIterator;
use corepersist_storage::keys::{KeyBuilder, KeyReader};
use corepersist_storage::migration::Migration;
use corepersist_storage::store::ColumnStoreRef;

use crate::error::{CollectionError, CollectionResult};

pub const UNIQUE_VALUES: &str = "Unique_Values";
pub const UNIQUE_VALUES_LOG: &str = "Unique_Values_Log";

const PAGE_SIZE: usize = 100;

/// A claim of one entity version on a unique field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueValue {
    pub field: Field,
    pub entity_id: Id,
    pub entity_version: Version,
}

impl UniqueValue {
    pub fn new(field: Field, entity_id: Id, entity_version: Version) -> Self {
        Self {
            field,
            entity_id,
            entity_version,
        }
    }
}

/// Stores claims twice: under the field value, to find its holders, and under the entity, to
/// find what it holds.
#[derive(Clone)]
pub struct UniqueValueSerialization {
    store: ColumnStoreRef,
}

impl UniqueValueSerialization {
    pub fn new(store: ColumnStoreRef) -> Self {
        Self { store }
    }

    pub fn write(
        &self,
        scope: &ApplicationScope,
        value: &UniqueValue,
    ) -> CollectionResult<MutationBatch> {
        let mut batch = MutationBatch::new();
        batch
            .put(
                UNIQUE_VALUES,
                value_row(scope, value.entity_id.id_type(), &value.field)?,
                holder_column(&value.entity_id, value.entity_version),
                Bytes::new(),
            )
            .put(
                UNIQUE_VALUES_LOG,
                entity_row(scope, &value.entity_id),
                claim_column(value.entity_version, value.field.name()),
                postcard::to_allocvec(&value.field)?,
            );
        Ok(batch)
    }

    pub fn delete(
        &self,
        scope: &ApplicationScope,
        value: &UniqueValue,
    ) -> CollectionResult<MutationBatch> {
        let mut batch = MutationBatch::new();
        batch
            .delete(
                UNIQUE_VALUES,
                value_row(scope, value.entity_id.id_type(), &value.field)?,
                holder_column(&value.entity_id, value.entity_version),
            )
            .delete(
                UNIQUE_VALUES_LOG,
                entity_row(scope, &value.entity_id),
                claim_column(value.entity_version, value.field.name()),
            );
        Ok(batch)
    }

    /// Every claim on `field` among entities of `entity_type`, ordered by holder.
    pub fn load(
        &self,
        scope: &ApplicationScope,
        entity_type: &str,
        field: &Field,
    ) -> CollectionResult<Vec<UniqueValue>> {
        ColumnIterator::new(
            self.store.clone(),
            UNIQUE_VALUES,
            value_row(scope, entity_type, field)?,
            ColumnRange::all(Order::Ascending),
            PAGE_SIZE,
        )
        .map(|column| {
            let column = column?;
            let mut reader = KeyReader::new(&column.name);
            let entity_id = reader.id()?;
            let entity_version = reader.version()?;
            Ok::<_, CollectionError>(UniqueValue::new(field.clone(), entity_id, entity_version))
        })
        .collect()
    }

    /// Every claim held by `id`, oldest version first.
    pub fn load_for_entity(
        &self,
        scope: &ApplicationScope,
        id: &Id,
    ) -> CollectionResult<Vec<UniqueValue>> {
        ColumnIterator::new(
            self.store.clone(),
            UNIQUE_VALUES_LOG,
            entity_row(scope, id),
            ColumnRange::all(Order::Ascending),
            PAGE_SIZE,
        )
        .map(|column| {
            let column = column?;
            let entity_version = KeyReader::new(&column.name).version()?;
            let field: Field = postcard::from_bytes(&column.value)?;
            Ok::<_, CollectionError>(UniqueValue::new(field, id.clone(), entity_version))
        })
        .collect()
    }
}

impl Migration for UniqueValueSerialization {
    fn column_families(&self) -> Vec<ColumnFamilyDefinition> {
        vec![
            ColumnFamilyDefinition::new(UNIQUE_VALUES),
            ColumnFamilyDefinition::new(UNIQUE_VALUES_LOG),
        ]
    }
}

fn value_row(scope: &ApplicationScope, entity_type: &str, field: &Field) -> CollectionResult<Bytes> {
    let value = postcard::to_allocvec(field.value())?;
    Ok(KeyBuilder::new()
        .scope(scope)
        .str(entity_type)
        .str(field.name())
        .bytes(&value)
        .build())
}

fn entity_row(scope: &ApplicationScope, id: &Id) -> Bytes {
    KeyBuilder::new().scope(scope).id(id).build()
}

fn holder_column(id: &Id, version: Version) -> Bytes {
    KeyBuilder::new().id(id).version(version).build()
}

fn claim_column(version: Version, name: &str) -> Bytes {
    KeyBuilder::new().version(version).str(name).build()
}
