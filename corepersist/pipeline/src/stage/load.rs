use std::collections::VecDeque;
use std::sync::Arc;

use corepersist_collection::manager::EntityCollectionManager;
use corepersist_common::entity::Entity;
use corepersist_common::id::Id;
use corepersist_common::scope::ApplicationScope;
use corepersist_common::version::Version;
use tracing::debug;

use super::{ReadStage, StageOutput};
use crate::context::PipelineContext;
use crate::error::PipelineResult;
use crate::result::FilterResult;

/// Loads upstream ids a page at a time.
pub struct LoadEntities<S> {
    upstream: S,
    manager: Arc<EntityCollectionManager>,
    scope: ApplicationScope,
    batch_size: usize,
    buffer: VecDeque<FilterResult<Entity>>,
    done: bool,
}

impl<S> LoadEntities<S> {
    pub(crate) fn new(
        upstream: S,
        ctx: &PipelineContext,
        manager: Arc<EntityCollectionManager>,
    ) -> Self {
        Self {
            upstream,
            manager,
            scope: ctx.scope().clone(),
            batch_size: ctx.limit(),
            buffer: VecDeque::new(),
            done: false,
        }
    }
}

impl<S> LoadEntities<S>
where
    S: ReadStage<Item = Id>,
{
    fn fill(&mut self) -> PipelineResult<()> {
        let mut batch = Vec::with_capacity(self.batch_size);
        while batch.len() < self.batch_size {
            match self.upstream.next_result() {
                Some(result) => batch.push(result?),
                None => {
                    self.done = true;
                    break;
                }
            }
        }
        let entities =
            self.manager
                .load_many(&self.scope, batch.iter().map(|r| &r.value), Version::MAX)?;
        for result in batch {
            match entities.get(&result.value).and_then(|e| e.entity()) {
                Some(entity) => self
                    .buffer
                    .push_back(FilterResult::new(entity.clone(), result.path)),
                None => debug!(id = %result.value, "pipeline.load.missing"),
            }
        }
        Ok(())
    }
}

impl<S> ReadStage for LoadEntities<S>
where
    S: ReadStage<Item = Id>,
{
    type Item = Entity;

    fn next_result(&mut self) -> StageOutput<Entity> {
        loop {
            if let Some(result) = self.buffer.pop_front() {
                return Some(Ok(result));
            }
            if self.done {
                return None;
            }
            if let Err(e) = self.fill() {
                self.done = true;
                self.buffer.clear();
                return Some(Err(e));
            }
        }
    }
}
