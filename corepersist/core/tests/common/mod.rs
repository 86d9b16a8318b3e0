use corepersist::{CorePersistence, CorePersistenceConfig};
use corepersist_collection::mvcc::EntityMutation;
use corepersist_common::entity::Entity;
use corepersist_common::field::{Field, FieldValue};
use corepersist_common::id::Id;
use corepersist_common::scope::ApplicationScope;
use corepersist_common::version::Version;
use corepersist_graph::edge::MarkedEdge;

pub struct TestContext {
    pub core: CorePersistence,
    pub scope: ApplicationScope,
}

pub fn create_context() -> TestContext {
    let config = CorePersistenceConfig {
        num_threads: 2,
        ..Default::default()
    };
    TestContext {
        core: CorePersistence::open_in_memory(&config).unwrap(),
        scope: ApplicationScope::new(Id::generate("application")),
    }
}

impl TestContext {
    pub fn write_user(&self, id: &Id, n: i64) -> Version {
        let entity = Entity::new(id.clone()).with_field(Field::new("n", n));
        self.core
            .collections()
            .write(&self.scope, EntityMutation::Replace(entity), None)
            .unwrap()
    }

    /// Connects `count` new users to `owner`, numbered in edge order.
    pub fn connect_users(&self, owner: &Id, edge_type: &str, count: i64) -> Vec<Id> {
        (0..count)
            .map(|n| {
                let id = Id::generate("user");
                self.write_user(&id, n);
                let version = self.core.versions().next().unwrap();
                self.core
                    .graph()
                    .write_edge(
                        &self.scope,
                        MarkedEdge::new(owner.clone(), edge_type, id.clone(), version),
                    )
                    .unwrap();
                id
            })
            .collect()
    }
}

pub fn number(entity: &Entity) -> i64 {
    match entity.field("n").map(Field::value) {
        Some(FieldValue::Long(n)) => *n,
        other => panic!("unexpected field {other:?}"),
    }
}
