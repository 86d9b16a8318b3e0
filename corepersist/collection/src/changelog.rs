//! Field-level diffs of an entity's version history.

use std::collections::HashMap;

use corepersist_common::field::Field;
use corepersist_common::id::Id;
use corepersist_common::version::Version;
use smol_str::SmolStr;
use strum::Display;

use crate::mvcc::MvccEntity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ChangeType {
    PropertyWrite,
    PropertyDelete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeLogEntry {
    pub entry_id: Id,
    /// Versions that wrote this field value, in discovery order. Empty for deletes.
    pub versions: Vec<Version>,
    pub change_type: ChangeType,
    pub field: Field,
}

impl ChangeLogEntry {
    /// The first version the change was seen in.
    pub fn version(&self) -> Option<Version> {
        self.versions.first().copied()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ChangeLogGenerator;

impl ChangeLogGenerator {
    /// Diffs `history` against `min_version`.
    ///
    /// Fields of versions older than `min_version` produce one delete per field name. Fields of
    /// newer versions produce one write per distinct name and value, collecting every version that
    /// wrote it. Each new entry is inserted at the head of the result, so entries discovered later
    /// come first. Tombstones contribute nothing.
    pub fn get_change_log<'a>(
        &self,
        history: impl IntoIterator<Item = &'a MvccEntity>,
        min_version: Version,
    ) -> Vec<ChangeLogEntry> {
        let mut entries: Vec<ChangeLogEntry> = Vec::new();
        let mut deletes: HashMap<SmolStr, usize> = HashMap::new();
        let mut writes: HashMap<Field, usize> = HashMap::new();

        for mvcc in history {
            let Some(entity) = mvcc.entity() else {
                continue;
            };
            for field in entity.fields() {
                if mvcc.version() < min_version {
                    if !deletes.contains_key(field.name()) {
                        deletes.insert(SmolStr::new(field.name()), entries.len());
                        entries.push(ChangeLogEntry {
                            entry_id: mvcc.id().clone(),
                            versions: Vec::new(),
                            change_type: ChangeType::PropertyDelete,
                            field: field.clone(),
                        });
                    }
                } else if let Some(&index) = writes.get(field) {
                    entries[index].versions.push(mvcc.version());
                } else {
                    writes.insert(field.clone(), entries.len());
                    entries.push(ChangeLogEntry {
                        entry_id: mvcc.id().clone(),
                        versions: vec![mvcc.version()],
                        change_type: ChangeType::PropertyWrite,
                        field: field.clone(),
                    });
                }
            }
        }

        // Built in discovery order; the result reads as if every entry was inserted at the head.
        entries.reverse();
        entries
    }
}
