use std::sync::Arc;

use corepersist_collection::config::SerializationConfig;
use corepersist_collection::manager::EntityCollectionManager;
use corepersist_common::entity::Entity;
use corepersist_common::field::Field;
use corepersist_common::id::Id;
use corepersist_common::scope::ApplicationScope;
use corepersist_common::time::SystemTimeService;
use corepersist_common::version::VersionGenerator;
use corepersist_storage::memory::MemoryColumnStore;
use corepersist_storage::migration::MigrationManager;

pub struct TestContext {
    pub store: Arc<MemoryColumnStore>,
    pub manager: EntityCollectionManager,
    pub scope: ApplicationScope,
}

pub fn create_context(config: SerializationConfig) -> TestContext {
    let store = Arc::new(MemoryColumnStore::new());
    let versions = Arc::new(VersionGenerator::new(Arc::new(SystemTimeService)));
    let manager = EntityCollectionManager::new(store.clone(), versions, config);
    manager
        .migrate(&MigrationManager::new(store.clone()))
        .unwrap();
    TestContext {
        store,
        manager,
        scope: ApplicationScope::new(Id::generate("application")),
    }
}

pub fn create_default_context() -> TestContext {
    create_context(SerializationConfig::default())
}

pub fn entity(id: &Id, fields: &[(&str, i64)]) -> Entity {
    fields
        .iter()
        .fold(Entity::new(id.clone()), |e, (n, v)| e.with_field(Field::new(*n, *v)))
}

pub fn fields(entity: &Entity) -> Vec<(String, i64)> {
    entity
        .fields()
        .map(|f| match f.value() {
            corepersist_common::field::FieldValue::Long(v) => (f.name().to_owned(), *v),
            other => panic!("unexpected value {other:?}"),
        })
        .collect()
}

pub fn account(id: &Id, email: &str, visits: i64) -> Entity {
    Entity::new(id.clone())
        .with_field(Field::new_unique("email", email))
        .with_field(Field::new("visits", visits))
}

pub fn email(value: &str) -> Field {
    Field::new_unique("email", value)
}
