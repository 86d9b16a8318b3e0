use std::sync::Arc;

use corepersist_common::id::Id;
use corepersist_common::scope::ApplicationScope;
use corepersist_graph::edge::{MarkedEdge, SearchByEdgeType};
use corepersist_graph::error::GraphResult;
use corepersist_graph::manager::GraphManager;
use corepersist_graph::serialization::EdgeIterator;
use smol_str::SmolStr;
use tracing::{trace, warn};

use super::{ReadStage, StageOutput, far_node};
use crate::context::PipelineContext;
use crate::cursor::{CursorValue, StageId};
use crate::result::{EdgePath, FilterResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Edges whose source is the upstream node.
    Outgoing,
    /// Edges whose target is the upstream node.
    Incoming,
}

impl Direction {
    fn near(self, edge: &MarkedEdge) -> &Id {
        match self {
            Direction::Outgoing => &edge.source,
            Direction::Incoming => &edge.target,
        }
    }
}

/// Reads edges of one type for every upstream node.
///
/// A cursor holds the last edge returned. Resuming seeks to that edge and skips it while it is
/// still the edge read, so an edge deleted in between does not cost the page an item. A stage
/// followed by another resuming stage emits its cursor edge again instead, because the later
/// stage has not finished the node that edge leads to.
///
/// When no earlier stage resumes, upstream nodes are passed over until the node the cursor edge
/// was read from.
pub struct ReadGraphEdges<S> {
    upstream: S,
    graph: Arc<GraphManager>,
    scope: ApplicationScope,
    edge_type: SmolStr,
    direction: Direction,
    stage: StageId,
    resume: Option<MarkedEdge>,
    skip_resumed: bool,
    seek_owner: bool,
    skipping: Option<MarkedEdge>,
    current: Option<(Option<EdgePath>, EdgeIterator)>,
    done: bool,
}

impl<S> ReadGraphEdges<S> {
    pub(crate) fn new(
        upstream: S,
        ctx: &mut PipelineContext,
        graph: Arc<GraphManager>,
        edge_type: SmolStr,
        direction: Direction,
    ) -> Self {
        let (stage, resume) = ctx.register_stage();
        let resume = match resume {
            Some(CursorValue::Edge(edge)) => Some(edge),
            Some(other) => {
                warn!(stage, value = ?other, "pipeline.graph.unexpected_cursor");
                None
            }
            None => None,
        };
        let skip_resumed = !ctx.cursor().has_after(stage);
        let seek_owner = !ctx.cursor().has_before(stage);
        Self {
            upstream,
            graph,
            scope: ctx.scope().clone(),
            edge_type,
            direction,
            stage,
            resume,
            skip_resumed,
            seek_owner,
            skipping: None,
            current: None,
            done: false,
        }
    }
}

impl<S> ReadGraphEdges<S>
where
    S: ReadStage<Item = Id>,
{
    fn open(&mut self, node: FilterResult<Id>) -> GraphResult<()> {
        // The cursor belongs to the node its edge was read from.
        let last = match self.resume.take() {
            Some(edge) if self.direction.near(&edge) == &node.value => Some(edge),
            Some(edge) if self.seek_owner => {
                trace!(stage = self.stage, node = %node.value, "pipeline.graph.passed_over");
                self.resume = Some(edge);
                return Ok(());
            }
            _ => None,
        };
        let search = SearchByEdgeType::new(node.value.clone(), self.edge_type.clone())
            .with_last(last.clone());
        let edges = match self.direction {
            Direction::Outgoing => self.graph.load_edges_from_source(&self.scope, &search)?,
            Direction::Incoming => self.graph.load_edges_to_target(&self.scope, &search)?,
        };
        trace!(
            stage = self.stage,
            node = %node.value,
            resumed = last.is_some(),
            "pipeline.graph.open"
        );
        self.skipping = if self.skip_resumed { last } else { None };
        self.current = Some((node.path, edges));
        Ok(())
    }
}

impl<S> ReadStage for ReadGraphEdges<S>
where
    S: ReadStage<Item = Id>,
{
    type Item = MarkedEdge;

    fn next_result(&mut self) -> StageOutput<MarkedEdge> {
        loop {
            if self.done {
                return None;
            }
            if let Some((parent, edges)) = &mut self.current {
                match edges.next() {
                    Some(Ok(edge)) => {
                        if self.skipping.as_ref() == Some(&edge) {
                            continue;
                        }
                        self.skipping = None;
                        let value = CursorValue::Edge(edge.clone());
                        let path = EdgePath::new(self.stage, value, parent.clone());
                        return Some(Ok(FilterResult::new(edge, Some(path))));
                    }
                    Some(Err(e)) => {
                        self.done = true;
                        return Some(Err(e.into()));
                    }
                    None => {
                        self.current = None;
                        continue;
                    }
                }
            }
            match self.upstream.next_result() {
                Some(Ok(node)) => {
                    if let Err(e) = self.open(node) {
                        self.done = true;
                        return Some(Err(e.into()));
                    }
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => {
                    self.done = true;
                    return None;
                }
            }
        }
    }
}

/// The far node of each edge read by a [`ReadGraphEdges`].
pub struct Connections<S> {
    edges: ReadGraphEdges<S>,
    direction: Direction,
}

impl<S> Connections<S> {
    pub(crate) fn new(edges: ReadGraphEdges<S>, direction: Direction) -> Self {
        Self { edges, direction }
    }
}

impl<S> ReadStage for Connections<S>
where
    S: ReadStage<Item = Id>,
{
    type Item = Id;

    fn next_result(&mut self) -> StageOutput<Id> {
        let direction = self.direction;
        let result = self.edges.next_result()?;
        Some(result.map(|r| r.map(|edge| far_node(edge, direction))))
    }
}
