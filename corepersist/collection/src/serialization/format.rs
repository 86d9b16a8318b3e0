//! Versioned encodings of entity rows.
//!
//! Every stored row starts with an [`EntityFormat`] tag. Reads dispatch on the tag, writes always
//! use [`EntityFormat::CURRENT`], and [`MIGRATIONS`] says how an old format is carried forward.

use std::collections::BTreeSet;

use bytes::{BufMut, Bytes, BytesMut};
use corepersist_common::entity::Entity;
use corepersist_common::id::Id;
use corepersist_common::scope::ApplicationScope;
use corepersist_common::version::Version;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use strum::Display;
use tracing::info;

use crate::error::{CollectionError, CollectionResult};
use crate::mvcc::{MvccEntity, Status};
use crate::serialization::MvccEntitySerialization;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
#[repr(u8)]
pub enum EntityFormat {
    /// Status and entity only.
    V1 = 1,
    /// Adds the fields removed by the version.
    V2 = 2,
}

impl EntityFormat {
    pub const CURRENT: EntityFormat = EntityFormat::V2;

    pub fn from_tag(tag: u8) -> CollectionResult<Self> {
        match tag {
            1 => Ok(EntityFormat::V1),
            2 => Ok(EntityFormat::V2),
            other => Err(CollectionError::UnknownFormat(other)),
        }
    }

    /// The format rows of this format migrate to, if any.
    pub fn upgrade(self) -> Option<EntityFormat> {
        MIGRATIONS.iter().find(|m| m.from == self).map(|m| m.to)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationRelationship {
    pub from: EntityFormat,
    pub to: EntityFormat,
}

pub const MIGRATIONS: &[MigrationRelationship] = &[MigrationRelationship {
    from: EntityFormat::V1,
    to: EntityFormat::V2,
}];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum RowState {
    Complete,
    Deleted,
    Partial,
}

#[derive(Serialize, Deserialize)]
struct RecordV1 {
    state: RowState,
    entity: Option<Entity>,
}

#[derive(Serialize, Deserialize)]
struct RecordV2 {
    state: RowState,
    entity: Option<Entity>,
    deleted_fields: Vec<SmolStr>,
}

pub(crate) fn encode(entity: &MvccEntity, format: EntityFormat) -> CollectionResult<Bytes> {
    let state = match (entity.status(), entity.is_tombstone()) {
        (_, true) => RowState::Deleted,
        (Status::Complete, false) => RowState::Complete,
        (Status::Partial, false) => RowState::Partial,
    };
    let body = match format {
        EntityFormat::V1 => postcard::to_allocvec(&RecordV1 {
            state,
            entity: entity.entity().cloned(),
        })?,
        EntityFormat::V2 => postcard::to_allocvec(&RecordV2 {
            state,
            entity: entity.entity().cloned(),
            deleted_fields: entity.deleted_fields().iter().cloned().collect(),
        })?,
    };
    let mut buf = BytesMut::with_capacity(body.len() + 1);
    buf.put_u8(format as u8);
    buf.put_slice(&body);
    Ok(buf.freeze())
}

pub(crate) fn decode(
    id: &Id,
    version: Version,
    bytes: &[u8],
) -> CollectionResult<(EntityFormat, MvccEntity)> {
    let (&tag, body) = bytes
        .split_first()
        .ok_or(CollectionError::UnknownFormat(0))?;
    let format = EntityFormat::from_tag(tag)?;
    let (state, entity, deleted) = match format {
        EntityFormat::V1 => {
            let record: RecordV1 = postcard::from_bytes(body)?;
            (record.state, record.entity, BTreeSet::new())
        }
        EntityFormat::V2 => {
            let record: RecordV2 = postcard::from_bytes(body)?;
            (
                record.state,
                record.entity,
                record.deleted_fields.into_iter().collect(),
            )
        }
    };
    let entity = match state {
        RowState::Deleted => MvccEntity::tombstone(id.clone(), version),
        RowState::Complete => {
            MvccEntity::from_parts(id.clone(), version, Status::Complete, entity, deleted)
        }
        RowState::Partial => {
            MvccEntity::from_parts(id.clone(), version, Status::Partial, entity, deleted)
        }
    };
    Ok((format, entity))
}

/// Rewrites the rows of an entity that are stored in an outdated format.
pub struct MvccEntityDataMigration {
    serialization: MvccEntitySerialization,
}

impl MvccEntityDataMigration {
    pub fn new(serialization: MvccEntitySerialization) -> Self {
        Self { serialization }
    }

    /// Returns the number of rows rewritten.
    pub fn migrate(&self, scope: &ApplicationScope, id: &Id) -> CollectionResult<usize> {
        let mut migrated = 0;
        for row in self.serialization.load_raw(scope, id)? {
            let (mut format, entity) = row;
            let from = format;
            while let Some(next) = format.upgrade() {
                format = next;
            }
            if format == from {
                continue;
            }
            self.serialization.write_with_format(scope, &entity, format)?;
            migrated += 1;
        }
        if migrated > 0 {
            info!(%id, migrated, "collection.migration.rows_upgraded");
        }
        Ok(migrated)
    }
}

#[cfg(test)]
mod tests {
    use corepersist_common::field::Field;

    use super::*;

    #[test]
    fn test_upgrade_chain() {
        assert_eq!(EntityFormat::V1.upgrade(), Some(EntityFormat::V2));
        assert_eq!(EntityFormat::CURRENT.upgrade(), None);
        assert!(EntityFormat::from_tag(9).is_err());
    }

    #[test]
    fn test_v1_rows_drop_deletion_markers() {
        let id = Id::generate("user");
        let version = Version::from_parts(10, 1);
        let row = MvccEntity::partial(
            version,
            Entity::new(id.clone()).with_field(Field::new("a", 1i64)),
            [SmolStr::new("b")],
        );

        let (format, decoded) = decode(&id, version, &encode(&row, EntityFormat::V1).unwrap()).unwrap();
        assert_eq!(format, EntityFormat::V1);
        assert!(decoded.deleted_fields().is_empty());
        assert_eq!(decoded.entity(), row.entity());

        let (format, decoded) = decode(&id, version, &encode(&row, EntityFormat::V2).unwrap()).unwrap();
        assert_eq!(format, EntityFormat::V2);
        assert_eq!(decoded, row);
    }

    #[test]
    fn test_tombstone_round_trip() {
        let id = Id::generate("user");
        let version = Version::from_parts(10, 1);
        let bytes = encode(&MvccEntity::tombstone(id.clone(), version), EntityFormat::CURRENT).unwrap();
        let (_, decoded) = decode(&id, version, &bytes).unwrap();
        assert!(decoded.is_tombstone());
    }
}
