mod graph;
mod load;
mod search;

use std::sync::Arc;

use corepersist_collection::manager::EntityCollectionManager;
use corepersist_common::id::Id;
use corepersist_graph::edge::MarkedEdge;
use corepersist_graph::manager::GraphManager;
pub use graph::{Connections, Direction, ReadGraphEdges};
pub use load::LoadEntities;
pub use search::{SearchCandidates, VerifyCandidates, search_candidates};
use smol_str::SmolStr;

use crate::context::PipelineContext;
use crate::error::{PipelineError, PipelineResult};
use crate::index::{Candidate, EntityIndex};
use crate::result::FilterResult;

pub type StageOutput<T> = Option<PipelineResult<FilterResult<T>>>;

/// A trait for pull-based read stages.
///
/// This is generally equivalent to `Iterator<Item = PipelineResult<FilterResult<T>>>`; stages are
/// kept apart from iterators so that combinators such as `map` do not clash. Convert an iterator
/// with [`IntoReadStage::into_stage`] and a stage back with [`ReadStage::into_iter`].
///
/// Stages do nothing until pulled. After returning `None` or an error they stay exhausted.
pub trait ReadStage {
    type Item;

    fn next_result(&mut self) -> StageOutput<Self::Item>;

    #[inline]
    fn into_iter(self) -> Bridge<Self>
    where
        Self: Sized,
    {
        Bridge(self)
    }

    fn map<U, F>(self, f: F) -> Map<Self, F>
    where
        Self: Sized,
        F: FnMut(Self::Item) -> U,
    {
        Map { stage: self, f }
    }

    /// Edges of `edge_type` at each upstream node, newest first.
    fn read_graph_edges(
        self,
        ctx: &mut PipelineContext,
        graph: Arc<GraphManager>,
        edge_type: impl Into<SmolStr>,
        direction: Direction,
    ) -> ReadGraphEdges<Self>
    where
        Self: Sized + ReadStage<Item = Id>,
    {
        ReadGraphEdges::new(self, ctx, graph, edge_type.into(), direction)
    }

    /// Nodes at the far end of the `edge_type` edges of each upstream node.
    fn read_graph_connections(
        self,
        ctx: &mut PipelineContext,
        graph: Arc<GraphManager>,
        edge_type: impl Into<SmolStr>,
        direction: Direction,
    ) -> Connections<Self>
    where
        Self: Sized + ReadStage<Item = Id>,
    {
        Connections::new(self.read_graph_edges(ctx, graph, edge_type, direction), direction)
    }

    /// The latest version of each upstream entity. Missing and deleted entities are dropped.
    fn load_entities(
        self,
        ctx: &PipelineContext,
        manager: Arc<EntityCollectionManager>,
    ) -> LoadEntities<Self>
    where
        Self: Sized + ReadStage<Item = Id>,
    {
        LoadEntities::new(self, ctx, manager)
    }

    fn verify_candidates(
        self,
        ctx: &PipelineContext,
        manager: Arc<EntityCollectionManager>,
        index: Arc<dyn EntityIndex>,
    ) -> VerifyCandidates<Self>
    where
        Self: Sized + ReadStage<Item = Candidate>,
    {
        VerifyCandidates::new(self, ctx, manager, index)
    }
}

/// Conversion into a [`ReadStage`], typically from an iterator of results.
pub trait IntoReadStage {
    type Item;
    type IntoStage: ReadStage<Item = Self::Item>;

    fn into_stage(self) -> Self::IntoStage;
}

/// A bridge between `Iterator` and [`ReadStage`].
#[derive(Debug, Clone)]
#[repr(transparent)]
pub struct Bridge<T>(T);

impl<I, T> ReadStage for Bridge<I>
where
    I: Iterator<Item = PipelineResult<FilterResult<T>>>,
{
    type Item = T;

    fn next_result(&mut self) -> StageOutput<T> {
        self.0.next()
    }
}

impl<S: ReadStage> Iterator for Bridge<S> {
    type Item = PipelineResult<FilterResult<S::Item>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next_result()
    }
}

impl<I, T> IntoReadStage for I
where
    I: IntoIterator<Item = PipelineResult<FilterResult<T>>>,
{
    type IntoStage = Bridge<I::IntoIter>;
    type Item = T;

    fn into_stage(self) -> Self::IntoStage {
        Bridge(self.into_iter())
    }
}

impl<S> ReadStage for Box<S>
where
    S: ReadStage + ?Sized,
{
    type Item = S::Item;

    fn next_result(&mut self) -> StageOutput<S::Item> {
        (**self).next_result()
    }
}

/// Starts a pipeline at the given nodes.
pub fn from_ids(ids: impl IntoIterator<Item = Id>) -> impl ReadStage<Item = Id> {
    ids.into_iter()
        .map(|id| Ok::<_, PipelineError>(FilterResult::new(id, None)))
        .into_stage()
}

pub struct Map<S, F> {
    stage: S,
    f: F,
}

impl<S, F, U> ReadStage for Map<S, F>
where
    S: ReadStage,
    F: FnMut(S::Item) -> U,
{
    type Item = U;

    fn next_result(&mut self) -> StageOutput<U> {
        let result = self.stage.next_result()?;
        Some(result.map(|r| r.map(&mut self.f)))
    }
}

/// Edges are carried along as their far node when only connections matter.
pub(crate) fn far_node(edge: MarkedEdge, direction: Direction) -> Id {
    match direction {
        Direction::Outgoing => edge.target,
        Direction::Incoming => edge.source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_keeps_paths() {
        let id = Id::generate("user");
        let mut stage = from_ids([id.clone()]).map(|id| id.id_type().to_owned());
        let first = stage.next_result().unwrap().unwrap();
        assert_eq!(first.value, "user");
        assert!(first.path.is_none());
        assert!(stage.next_result().is_none());
    }

    #[test]
    fn test_bridge_round_trip() {
        let ids = vec![Id::generate("a"), Id::generate("b")];
        let collected = from_ids(ids.clone())
            .into_iter()
            .map(|r| r.map(|r| r.value))
            .collect::<PipelineResult<Vec<_>>>()
            .unwrap();
        assert_eq!(collected, ids);
    }
}
