use corepersist_common::entity::Entity;
use corepersist_common::field::Field;
use corepersist_common::id::Id;
use smol_str::SmolStr;

/// A change to an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityMutation {
    /// Replaces the entity with a full snapshot.
    Replace(Entity),
    /// Sets some fields and removes others, leaving every other field as it was.
    Merge {
        id: Id,
        set: Vec<Field>,
        removed: Vec<SmolStr>,
    },
}

impl EntityMutation {
    pub fn merge(id: Id, set: impl IntoIterator<Item = Field>) -> Self {
        Self::Merge {
            id,
            set: set.into_iter().collect(),
            removed: Vec::new(),
        }
    }

    pub fn remove(id: Id, removed: impl IntoIterator<Item = impl Into<SmolStr>>) -> Self {
        Self::Merge {
            id,
            set: Vec::new(),
            removed: removed.into_iter().map(Into::into).collect(),
        }
    }

    pub fn id(&self) -> &Id {
        match self {
            EntityMutation::Replace(entity) => entity.id(),
            EntityMutation::Merge { id, .. } => id,
        }
    }
}
