//! Startup schema creation.

use tracing::{error, info};

use crate::column::ColumnFamilyDefinition;
use crate::error::{StorageError, StorageResult};
use crate::store::ColumnStoreRef;

/// A component that owns column families.
pub trait Migration {
    fn column_families(&self) -> Vec<ColumnFamilyDefinition>;
}

pub struct MigrationManager {
    store: ColumnStoreRef,
}

impl MigrationManager {
    pub fn new(store: ColumnStoreRef) -> Self {
        Self { store }
    }

    /// Creates every column family the given components need.
    ///
    /// A family that is absent and cannot be created aborts the migration; there is no degraded
    /// mode.
    pub fn migrate(&self, migrations: &[&dyn Migration]) -> StorageResult<()> {
        for definition in migrations.iter().flat_map(|m| m.column_families()) {
            if self.store.has_column_family(&definition.name) {
                continue;
            }
            if let Err(e) = self.store.create_column_family(&definition) {
                error!(column_family = %definition.name, error = %e, "storage.migration.failed");
                return Err(StorageError::Migration {
                    column_family: definition.name.to_string(),
                    reason: e.to_string(),
                });
            }
            info!(column_family = %definition.name, "storage.migration.created");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::store::ColumnStore;
    use crate::memory::MemoryColumnStore;

    struct Families(Vec<&'static str>);

    impl Migration for Families {
        fn column_families(&self) -> Vec<ColumnFamilyDefinition> {
            self.0.iter().map(|n| ColumnFamilyDefinition::new(*n)).collect()
        }
    }

    #[test]
    fn test_migrate_creates_families() {
        let store = Arc::new(MemoryColumnStore::new());
        let manager = MigrationManager::new(store.clone());
        manager
            .migrate(&[&Families(vec!["a", "b"]), &Families(vec!["c"])])
            .unwrap();
        assert!(store.has_column_family("a"));
        assert!(store.has_column_family("c"));
        // Running again is a no-op.
        manager.migrate(&[&Families(vec!["a"])]).unwrap();
    }

    #[test]
    fn test_migrate_fails_when_family_cannot_be_created() {
        let store = Arc::new(MemoryColumnStore::with_locked_schema([
            ColumnFamilyDefinition::new("a"),
        ]));
        let err = MigrationManager::new(store)
            .migrate(&[&Families(vec!["a", "b"])])
            .unwrap_err();
        match err {
            StorageError::Migration { column_family, .. } => assert_eq!(column_family, "b"),
            other => panic!("unexpected error {other}"),
        }
    }
}
