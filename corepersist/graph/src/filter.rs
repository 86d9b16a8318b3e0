use std::collections::HashMap;

use corepersist_common::id::Id;
use corepersist_common::scope::ApplicationScope;
use corepersist_common::version::Version;

use crate::edge::MarkedEdge;
use crate::error::GraphResult;
use crate::serialization::NodeSerialization;

/// Hides edges touching a deleted node.
///
/// An edge is hidden when its source or target carries a deletion mark at or above the edge
/// version. Marks are read once per node for the lifetime of the filter.
pub(crate) struct EdgeFilter {
    nodes: NodeSerialization,
    scope: ApplicationScope,
    marks: HashMap<Id, Option<Version>>,
}

impl EdgeFilter {
    pub(crate) fn new(nodes: NodeSerialization, scope: ApplicationScope) -> Self {
        Self {
            nodes,
            scope,
            marks: HashMap::new(),
        }
    }

    pub(crate) fn hides(&mut self, edge: &MarkedEdge) -> GraphResult<bool> {
        Ok(self.covers(&edge.source, edge.version)? || self.covers(&edge.target, edge.version)?)
    }

    fn covers(&mut self, node: &Id, version: Version) -> GraphResult<bool> {
        let mark = match self.marks.get(node) {
            Some(mark) => *mark,
            None => {
                let mark = self.nodes.get_max_version(&self.scope, node)?;
                self.marks.insert(node.clone(), mark);
                mark
            }
        };
        Ok(mark.is_some_and(|mark| version <= mark))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use corepersist_storage::memory::MemoryColumnStore;
    use corepersist_storage::migration::{Migration, MigrationManager};
    use corepersist_storage::store::ColumnStore;

    use super::*;

    #[test]
    fn test_mark_hides_edges_at_or_below_its_version() {
        let store = Arc::new(MemoryColumnStore::new());
        let nodes = NodeSerialization::new(store.clone());
        MigrationManager::new(store.clone())
            .migrate(&[&nodes as &dyn Migration])
            .unwrap();
        let scope = ApplicationScope::new(Id::generate("application"));
        let user = Id::generate("user");
        let post = Id::generate("post");
        store
            .execute(nodes.mark(&scope, &post, Version::from_parts(200, 1)))
            .unwrap();

        let mut filter = EdgeFilter::new(nodes.clone(), scope.clone());
        let at = |ts| MarkedEdge::new(user.clone(), "likes", post.clone(), Version::from_parts(ts, 1));
        assert!(filter.hides(&at(100)).unwrap());
        assert!(filter.hides(&at(200)).unwrap());
        assert!(!filter.hides(&at(300)).unwrap());

        // Marks are read once per filter.
        store.execute(nodes.delete(&scope, &post)).unwrap();
        assert!(filter.hides(&at(100)).unwrap());
        let mut fresh = EdgeFilter::new(nodes, scope);
        assert!(!fresh.hides(&at(100)).unwrap());
    }
}
