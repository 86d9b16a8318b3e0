use std::collections::HashMap;

use corepersist_common::id::Id;
use corepersist_common::version::Version;
use serde::{Deserialize, Serialize};
use strum::Display;

/// How far a write of a version has progressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum Stage {
    /// The version was allocated but its data may not be written yet.
    Active,
    Committed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum State {
    Complete,
    Partial,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MvccLogEntry {
    pub id: Id,
    pub version: Version,
    pub stage: Stage,
    pub state: State,
}

impl MvccLogEntry {
    pub fn new(id: Id, version: Version, stage: Stage, state: State) -> Self {
        Self {
            id,
            version,
            stage,
            state,
        }
    }
}

/// The newest log entry of each entity in a batch lookup.
#[derive(Debug, Clone, Default)]
pub struct VersionSet {
    entries: HashMap<Id, MvccLogEntry>,
}

impl VersionSet {
    pub fn get_max_version(&self, id: &Id) -> Option<&MvccLogEntry> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MvccLogEntry> {
        self.entries.values()
    }

    pub(crate) fn insert(&mut self, entry: MvccLogEntry) {
        self.entries.insert(entry.id.clone(), entry);
    }
}
