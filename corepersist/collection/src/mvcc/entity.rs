use std::collections::{BTreeMap, BTreeSet, HashMap};

use corepersist_common::entity::Entity;
use corepersist_common::field::Field;
use corepersist_common::id::Id;
use corepersist_common::version::Version;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    /// The row holds the full entity for its version.
    Complete,
    /// The row holds only the fields written by its version.
    Partial,
}

/// One version row of an entity.
///
/// A row without an entity is a tombstone. `deleted_fields` lists the fields this version removed;
/// they hide values of the same name in older rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MvccEntity {
    id: Id,
    version: Version,
    status: Status,
    entity: Option<Entity>,
    deleted_fields: BTreeSet<SmolStr>,
}

impl MvccEntity {
    pub fn complete(version: Version, entity: Entity) -> Self {
        Self {
            id: entity.id().clone(),
            version,
            status: Status::Complete,
            entity: Some(entity),
            deleted_fields: BTreeSet::new(),
        }
    }

    pub fn partial(
        version: Version,
        entity: Entity,
        deleted_fields: impl IntoIterator<Item = SmolStr>,
    ) -> Self {
        Self {
            id: entity.id().clone(),
            version,
            status: Status::Partial,
            entity: Some(entity),
            deleted_fields: deleted_fields.into_iter().collect(),
        }
    }

    pub fn tombstone(id: Id, version: Version) -> Self {
        Self {
            id,
            version,
            status: Status::Complete,
            entity: None,
            deleted_fields: BTreeSet::new(),
        }
    }

    pub(crate) fn from_parts(
        id: Id,
        version: Version,
        status: Status,
        entity: Option<Entity>,
        deleted_fields: BTreeSet<SmolStr>,
    ) -> Self {
        Self {
            id,
            version,
            status,
            entity,
            deleted_fields,
        }
    }

    #[inline]
    pub fn id(&self) -> &Id {
        &self.id
    }

    #[inline]
    pub fn version(&self) -> Version {
        self.version
    }

    #[inline]
    pub fn status(&self) -> Status {
        self.status
    }

    #[inline]
    pub fn entity(&self) -> Option<&Entity> {
        self.entity.as_ref()
    }

    pub fn into_entity(self) -> Option<Entity> {
        self.entity
    }

    #[inline]
    pub fn deleted_fields(&self) -> &BTreeSet<SmolStr> {
        &self.deleted_fields
    }

    #[inline]
    pub fn is_tombstone(&self) -> bool {
        self.entity.is_none()
    }
}

/// Entities returned by a batch load, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct EntitySet {
    entities: HashMap<Id, MvccEntity>,
}

impl EntitySet {
    pub fn get(&self, id: &Id) -> Option<&MvccEntity> {
        self.entities.get(id)
    }

    pub fn contains(&self, id: &Id) -> bool {
        self.entities.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MvccEntity> {
        self.entities.values()
    }

    pub(crate) fn insert(&mut self, entity: MvccEntity) {
        self.entities.insert(entity.id().clone(), entity);
    }
}

/// Entities found through unique field values, keyed by field name.
#[derive(Debug, Clone, Default)]
pub struct FieldSet {
    entities: BTreeMap<SmolStr, (Field, MvccEntity)>,
}

impl FieldSet {
    /// The entity holding the value of the field named `name`.
    pub fn get(&self, name: &str) -> Option<&MvccEntity> {
        self.entities.get(name).map(|(_, entity)| entity)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Field, &MvccEntity)> {
        self.entities.values().map(|(field, entity)| (field, entity))
    }

    pub(crate) fn insert(&mut self, field: Field, entity: MvccEntity) {
        self.entities
            .insert(SmolStr::new(field.name()), (field, entity));
    }
}
