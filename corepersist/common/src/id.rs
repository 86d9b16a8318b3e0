use std::fmt;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use uuid::Uuid;

/// Identity of an entity or graph node, independent of its version.
///
/// Two ids are equal when both the type and the uuid are equal. Ordering is by type first and then
/// by uuid, which keeps ids of the same type adjacent in sorted storage.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Id {
    id_type: SmolStr,
    uuid: Uuid,
}

impl Id {
    pub fn new(id_type: impl Into<SmolStr>, uuid: Uuid) -> Self {
        Self {
            id_type: id_type.into(),
            uuid,
        }
    }

    /// Creates an id with a fresh time-ordered uuid.
    pub fn generate(id_type: impl Into<SmolStr>) -> Self {
        Self::new(id_type, Uuid::now_v7())
    }

    #[inline]
    pub fn id_type(&self) -> &str {
        &self.id_type
    }

    #[inline]
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.id_type, self.uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_uses_type_and_uuid() {
        let uuid = Uuid::now_v7();
        assert_eq!(Id::new("user", uuid), Id::new("user", uuid));
        assert_ne!(Id::new("user", uuid), Id::new("group", uuid));
    }

    #[test]
    fn test_ordering_groups_by_type() {
        let a = Id::generate("b");
        let b = Id::generate("a");
        assert!(b < a);
    }
}
