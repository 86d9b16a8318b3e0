use std::collections::HashSet;

use corepersist_common::entity::Entity;
use corepersist_common::version::Version;
use smol_str::SmolStr;

use crate::error::CollectionResult;
use crate::mvcc::{MvccEntity, Status};

/// Folds version rows, newest first, into the entity visible at the newest of them.
///
/// Merging stops after the first complete row. A tombstone ends the merge: it hides the entity when
/// nothing newer was merged, and otherwise bounds the partial rows written after it. Rows that run
/// out without a complete baseline still yield the union of their fields.
pub(crate) fn merge_versions(
    rows: impl IntoIterator<Item = CollectionResult<MvccEntity>>,
) -> CollectionResult<Option<MvccEntity>> {
    let mut merged: Option<(Version, Entity)> = None;
    // Field names decided by a newer row, either by value or by deletion.
    let mut decided: HashSet<SmolStr> = HashSet::new();
    let mut status = Status::Partial;

    for row in rows {
        let row = row?;
        let Some(entity) = row.entity() else {
            break;
        };
        let (_, accumulated) =
            merged.get_or_insert_with(|| (row.version(), Entity::new(row.id().clone())));
        for field in entity.fields() {
            if decided.insert(SmolStr::new(field.name())) {
                accumulated.set_field(field.clone());
            }
        }
        decided.extend(row.deleted_fields().iter().cloned());
        if row.status() == Status::Complete {
            status = Status::Complete;
            break;
        }
    }

    Ok(merged.map(|(newest, entity)| match status {
        Status::Complete => MvccEntity::complete(newest, entity),
        Status::Partial => MvccEntity::partial(newest, entity, []),
    }))
}

#[cfg(test)]
mod tests {
    use corepersist_common::field::{Field, FieldValue};
    use corepersist_common::id::Id;

    use super::*;

    fn v(ts: u64) -> Version {
        Version::from_parts(ts, 0)
    }

    fn entity(id: &Id, fields: &[(&str, i64)]) -> Entity {
        fields
            .iter()
            .fold(Entity::new(id.clone()), |e, (n, v)| e.with_field(Field::new(*n, *v)))
    }

    fn merge(rows: Vec<MvccEntity>) -> Option<MvccEntity> {
        merge_versions(rows.into_iter().map(Ok)).unwrap()
    }

    #[test]
    fn test_newer_partial_masks_complete() {
        let id = Id::generate("thing");
        let merged = merge(vec![
            MvccEntity::partial(v(3), entity(&id, &[("a", 3)]), []),
            MvccEntity::partial(v(2), entity(&id, &[("b", 2)]), [SmolStr::new("c")]),
            MvccEntity::complete(v(1), entity(&id, &[("a", 1), ("b", 1), ("c", 1), ("d", 1)])),
            MvccEntity::complete(v(0), entity(&id, &[("e", 0)])),
        ])
        .unwrap();

        assert_eq!(merged.version(), v(3));
        assert_eq!(merged.status(), Status::Complete);
        let merged = merged.into_entity().unwrap();
        let fields: Vec<_> = merged.fields().map(|f| (f.name(), f.value().clone())).collect();
        assert_eq!(fields, vec![
            ("a", FieldValue::Long(3)),
            ("b", FieldValue::Long(2)),
            ("d", FieldValue::Long(1)),
        ]);
    }

    #[test]
    fn test_all_partial_rows_union() {
        let id = Id::generate("thing");
        let merged = merge(vec![
            MvccEntity::partial(v(2), entity(&id, &[("b", 2)]), []),
            MvccEntity::partial(v(1), entity(&id, &[("a", 1), ("b", 1)]), []),
        ])
        .unwrap();
        assert_eq!(merged.status(), Status::Partial);
        assert_eq!(merged.entity().unwrap().len(), 2);
        assert_eq!(
            merged.entity().unwrap().field("b").unwrap().value(),
            &FieldValue::Long(2)
        );
    }

    #[test]
    fn test_tombstone_hides_older_rows() {
        let id = Id::generate("thing");
        assert!(
            merge(vec![
                MvccEntity::tombstone(id.clone(), v(2)),
                MvccEntity::complete(v(1), entity(&id, &[("a", 1)])),
            ])
            .is_none()
        );

        let recreated = merge(vec![
            MvccEntity::partial(v(3), entity(&id, &[("z", 3)]), []),
            MvccEntity::tombstone(id.clone(), v(2)),
            MvccEntity::complete(v(1), entity(&id, &[("a", 1)])),
        ])
        .unwrap();
        assert!(recreated.entity().unwrap().contains_field("z"));
        assert!(!recreated.entity().unwrap().contains_field("a"));
    }

    #[test]
    fn test_no_rows() {
        assert!(merge(vec![]).is_none());
    }
}
