//! Terminal stages.

use std::sync::Arc;

use corepersist_collection::manager::EntityCollectionManager;
use corepersist_common::entity::Entity;
use corepersist_common::id::Id;
use tracing::debug;

use crate::config::PipelineConfig;
use crate::context::PipelineContext;
use crate::cursor::{CursorValue, RequestCursor};
use crate::error::{PipelineError, PipelineResult};
use crate::index::{EntityIndex, IndexCursor, SearchEdge};
use crate::result::{EdgePath, FilterResult, ResultsPage};
use crate::stage::{IntoReadStage, ReadStage};

/// Collects one page of results.
///
/// A full page carries the cursor of its last item, since more results may follow. A page cut
/// short by the end of the stream has no cursor.
#[derive(Debug, Clone, Copy)]
pub struct ResultsPageCollector {
    limit: usize,
}

impl ResultsPageCollector {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
        }
    }

    pub fn for_context(ctx: &PipelineContext) -> Self {
        Self::new(ctx.limit())
    }

    pub fn collect<S: ReadStage>(&self, stage: S) -> PipelineResult<ResultsPage<S::Item>> {
        let mut items = Vec::with_capacity(self.limit);
        let mut last_path = None;
        for result in stage.into_iter().take(self.limit) {
            let result = result?;
            last_path = result.path;
            items.push(result.value);
        }
        let cursor = if items.len() == self.limit {
            last_path.map(|p| p.to_cursor().encode()).transpose()?
        } else {
            None
        };
        Ok(ResultsPage { items, cursor })
    }
}

/// A page of ids, such as the members of a connection.
pub fn collect_ids(
    ctx: &PipelineContext,
    stage: impl ReadStage<Item = Id>,
) -> PipelineResult<ResultsPage<Id>> {
    ResultsPageCollector::for_context(ctx).collect(stage)
}

/// Fills a page from the search index, re-querying when stale candidates shorten it.
///
/// Each query asks for the number of results still missing, so the page never exceeds the limit.
/// After `max_requery_attempts` extra queries the page is returned short. The page has a cursor
/// whenever the index reported more candidates after the last one examined.
pub struct SearchCollector {
    manager: Arc<EntityCollectionManager>,
    index: Arc<dyn EntityIndex>,
    config: PipelineConfig,
}

impl SearchCollector {
    pub fn new(
        manager: Arc<EntityCollectionManager>,
        index: Arc<dyn EntityIndex>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            manager,
            index,
            config,
        }
    }

    pub fn collect(
        &self,
        ctx: &mut PipelineContext,
        edge: &SearchEdge,
    ) -> PipelineResult<ResultsPage<Entity>> {
        let (stage, resume) = ctx.register_stage();
        let mut after: Option<IndexCursor> = match resume {
            Some(CursorValue::Index(position)) => Some(position),
            Some(other) => {
                return Err(PipelineError::InvalidCursor(format!(
                    "stage {stage} expects an index position, got {other:?}"
                )));
            }
            None => None,
        };

        let limit = ctx.limit();
        let mut items = Vec::with_capacity(limit);
        let mut has_more = true;
        let mut queries = 0;
        while items.len() < limit && has_more && queries <= self.config.max_requery_attempts {
            if queries > 0 {
                debug!(
                    attempt = queries,
                    missing = limit - items.len(),
                    edge = %edge.name,
                    "pipeline.search.requery"
                );
            }
            queries += 1;

            let results = self
                .index
                .search(ctx.scope(), edge, limit - items.len(), after.as_ref())?;
            has_more = results.has_more;
            if let Some(last) = results.candidates.last() {
                after = Some(last.position.clone());
            }
            let verified = results
                .candidates
                .into_iter()
                .map(|candidate| {
                    let value = CursorValue::Index(candidate.position.clone());
                    let path = EdgePath::new(stage, value, None);
                    Ok::<_, PipelineError>(FilterResult::new(candidate, Some(path)))
                })
                .into_stage()
                .verify_candidates(ctx, self.manager.clone(), self.index.clone());
            for result in verified.into_iter() {
                items.push(result?.value);
            }
        }

        let cursor = match after {
            Some(position) if has_more => {
                let mut cursor = RequestCursor::default();
                cursor.set(stage, CursorValue::Index(position));
                Some(cursor.encode()?)
            }
            _ => None,
        };
        Ok(ResultsPage { items, cursor })
    }
}
