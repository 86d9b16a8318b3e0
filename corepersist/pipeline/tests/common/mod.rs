use std::sync::Arc;

use corepersist_collection::config::SerializationConfig;
use corepersist_collection::manager::EntityCollectionManager;
use corepersist_collection::mvcc::EntityMutation;
use corepersist_common::entity::Entity;
use corepersist_common::field::{Field, FieldValue};
use corepersist_common::id::Id;
use corepersist_common::scope::ApplicationScope;
use corepersist_common::time::SystemTimeService;
use corepersist_common::version::{Version, VersionGenerator};
use corepersist_graph::config::GraphConfig;
use corepersist_graph::edge::MarkedEdge;
use corepersist_graph::manager::GraphManager;
use corepersist_pipeline::collect::collect_ids;
use corepersist_pipeline::context::PipelineContext;
use corepersist_pipeline::cursor::RequestCursor;
use corepersist_pipeline::error::PipelineResult;
use corepersist_pipeline::index::{EntityIndex, MemoryEntityIndex, SearchEdge};
use corepersist_pipeline::stage::ReadStage;
use corepersist_storage::memory::MemoryColumnStore;
use corepersist_storage::migration::MigrationManager;

pub struct TestContext {
    pub manager: Arc<EntityCollectionManager>,
    pub graph: Arc<GraphManager>,
    pub index: Arc<MemoryEntityIndex>,
    pub scope: ApplicationScope,
}

pub fn create_context() -> TestContext {
    let store = Arc::new(MemoryColumnStore::new());
    let clock = Arc::new(SystemTimeService);
    let migrations = MigrationManager::new(store.clone());
    let manager = EntityCollectionManager::new(
        store.clone(),
        Arc::new(VersionGenerator::new(clock.clone())),
        SerializationConfig::default(),
    );
    manager.migrate(&migrations).unwrap();
    let graph = GraphManager::new(store, clock, GraphConfig::default()).unwrap();
    graph.migrate(&migrations).unwrap();
    TestContext {
        manager: Arc::new(manager),
        graph: Arc::new(graph),
        index: Arc::new(MemoryEntityIndex::new()),
        scope: ApplicationScope::new(Id::generate("application")),
    }
}

impl TestContext {
    pub fn pipeline(&self, limit: usize, cursor: Option<&str>) -> PipelineContext {
        PipelineContext::new(
            self.scope.clone(),
            limit,
            RequestCursor::parse(cursor).unwrap(),
        )
    }

    pub fn users_edge(&self) -> SearchEdge {
        SearchEdge::new(self.scope.application().clone(), "users")
    }

    /// Writes a user numbered `n` and returns its version.
    pub fn write_user(&self, id: &Id, n: i64) -> Version {
        let entity = Entity::new(id.clone()).with_field(Field::new("n", n));
        self.manager
            .write(&self.scope, EntityMutation::Replace(entity), None)
            .unwrap()
    }

    /// Writes `count` users and indexes them under the users edge, in index order.
    pub fn indexed_users(&self, count: i64) -> Vec<Id> {
        let mut ids: Vec<Id> = (0..count).map(|_| Id::generate("user")).collect();
        ids.sort();
        for (n, id) in ids.iter().enumerate() {
            let version = self.write_user(id, n as i64);
            self.index
                .index(&self.scope, &self.users_edge(), id, version)
                .unwrap();
        }
        ids
    }

    /// Writes `count` users connected from `owner` by `users` edges, newest edge last.
    pub fn connected_users(&self, owner: &Id, count: u64) -> Vec<Id> {
        (1..=count)
            .map(|ts| {
                let id = Id::generate("user");
                self.write_user(&id, ts as i64);
                self.graph
                    .write_edge(
                        &self.scope,
                        MarkedEdge::new(owner.clone(), "users", id.clone(), Version::from_parts(ts, 1)),
                    )
                    .unwrap();
                id
            })
            .collect()
    }

    /// Writes an edge whose version carries the timestamp `ts`.
    pub fn connect(&self, source: &Id, edge_type: &str, target: &Id, ts: u64) {
        self.graph
            .write_edge(
                &self.scope,
                MarkedEdge::new(source.clone(), edge_type, target.clone(), Version::from_parts(ts, 1)),
            )
            .unwrap();
    }

    /// Reads pages of at most `limit` ids until the cursor runs out, resuming each page from the
    /// cursor of the previous one.
    pub fn page_ids<S>(
        &self,
        limit: usize,
        build: impl Fn(&mut PipelineContext) -> S,
    ) -> PipelineResult<Vec<Vec<Id>>>
    where
        S: ReadStage<Item = Id>,
    {
        let mut pages = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut pipeline = self.pipeline(limit, cursor.as_deref());
            let stage = build(&mut pipeline);
            let page = collect_ids(&pipeline, stage)?;
            assert!(page.items.len() <= limit);
            pages.push(page.items);
            cursor = page.cursor;
            if cursor.is_none() {
                return Ok(pages);
            }
        }
    }
}

pub fn number(entity: &Entity) -> i64 {
    match entity.field("n").map(Field::value) {
        Some(FieldValue::Long(n)) => *n,
        other => panic!("unexpected field {other:?}"),
    }
}
