use std::collections::VecDeque;
use std::sync::Arc;

use corepersist_collection::manager::EntityCollectionManager;
use corepersist_common::entity::Entity;
use corepersist_common::scope::ApplicationScope;
use corepersist_common::version::Version;
use tracing::{debug, warn};

use super::{ReadStage, StageOutput};
use crate::context::PipelineContext;
use crate::cursor::{CursorValue, StageId};
use crate::error::{PipelineError, PipelineResult};
use crate::index::{Candidate, EntityIndex, IndexCursor, SearchEdge};
use crate::result::{EdgePath, FilterResult};

/// Pages through the candidates of `edge`, resuming after the position held by the cursor.
pub fn search_candidates(
    ctx: &mut PipelineContext,
    index: Arc<dyn EntityIndex>,
    edge: SearchEdge,
) -> PipelineResult<SearchCandidates> {
    let (stage, resume) = ctx.register_stage();
    let after = match resume {
        Some(CursorValue::Index(position)) => Some(position),
        Some(other) => {
            return Err(PipelineError::InvalidCursor(format!(
                "stage {stage} expects an index position, got {other:?}"
            )));
        }
        None => None,
    };
    Ok(SearchCandidates {
        index,
        scope: ctx.scope().clone(),
        edge,
        stage,
        page_size: ctx.limit(),
        after,
        buffer: VecDeque::new(),
        exhausted: false,
        done: false,
    })
}

pub struct SearchCandidates {
    index: Arc<dyn EntityIndex>,
    scope: ApplicationScope,
    edge: SearchEdge,
    stage: StageId,
    page_size: usize,
    after: Option<IndexCursor>,
    buffer: VecDeque<Candidate>,
    exhausted: bool,
    done: bool,
}

impl SearchCandidates {
    fn fetch(&mut self) -> PipelineResult<()> {
        let results =
            self.index
                .search(&self.scope, &self.edge, self.page_size, self.after.as_ref())?;
        self.exhausted = !results.has_more;
        if let Some(last) = results.candidates.last() {
            self.after = Some(last.position.clone());
        } else {
            self.exhausted = true;
        }
        self.buffer.extend(results.candidates);
        Ok(())
    }
}

impl ReadStage for SearchCandidates {
    type Item = Candidate;

    fn next_result(&mut self) -> StageOutput<Candidate> {
        loop {
            if self.done {
                return None;
            }
            if let Some(candidate) = self.buffer.pop_front() {
                let value = CursorValue::Index(candidate.position.clone());
                let path = EdgePath::new(self.stage, value, None);
                return Some(Ok(FilterResult::new(candidate, Some(path))));
            }
            if self.exhausted {
                self.done = true;
                return None;
            }
            if let Err(e) = self.fetch() {
                self.done = true;
                return Some(Err(e));
            }
        }
    }
}

/// Keeps the candidates whose version is the entity's current version.
///
/// Candidates of entities that were since updated or deleted are removed from the index. A
/// candidate newer than the stored entity is dropped but left in the index for repair.
pub struct VerifyCandidates<S> {
    upstream: S,
    manager: Arc<EntityCollectionManager>,
    index: Arc<dyn EntityIndex>,
    scope: ApplicationScope,
    batch_size: usize,
    buffer: VecDeque<FilterResult<Entity>>,
    done: bool,
}

impl<S> VerifyCandidates<S> {
    pub(crate) fn new(
        upstream: S,
        ctx: &PipelineContext,
        manager: Arc<EntityCollectionManager>,
        index: Arc<dyn EntityIndex>,
    ) -> Self {
        Self {
            upstream,
            manager,
            index,
            scope: ctx.scope().clone(),
            batch_size: ctx.limit(),
            buffer: VecDeque::new(),
            done: false,
        }
    }
}

impl<S> VerifyCandidates<S>
where
    S: ReadStage<Item = Candidate>,
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
                .load_many(&self.scope, batch.iter().map(|r| &r.value.id), Version::MAX)?;
        for result in batch {
            let candidate = &result.value;
            let current = entities
                .get(&candidate.id)
                .and_then(|e| e.entity().map(|entity| (e.version(), entity)));
            match current {
                Some((version, entity)) if version == candidate.version => {
                    self.buffer
                        .push_back(FilterResult::new(entity.clone(), result.path));
                }
                Some((version, _)) if version > candidate.version => {
                    self.deindex(candidate, version)?;
                }
                Some((version, _)) => {
                    warn!(
                        id = %candidate.id,
                        candidate = %candidate.version,
                        stored = %version,
                        "pipeline.verify.index_ahead_of_store"
                    );
                }
                None => self.verify_missing(candidate)?,
            }
        }
        Ok(())
    }

    // Loads skip deleted entities, so the log tells deleted apart from never written.
    fn verify_missing(&self, candidate: &Candidate) -> PipelineResult<()> {
        let latest = self
            .manager
            .get_versions(&self.scope, &candidate.id, Version::MAX, 1)?;
        match latest.first() {
            Some(entry) if entry.version >= candidate.version => {
                self.deindex(candidate, entry.version)
            }
            _ => {
                warn!(
                    id = %candidate.id,
                    version = %candidate.version,
                    "pipeline.verify.not_found"
                );
                Ok(())
            }
        }
    }

    fn deindex(&self, candidate: &Candidate, current: Version) -> PipelineResult<()> {
        debug!(
            id = %candidate.id,
            candidate = %candidate.version,
            current = %current,
            edge = %candidate.edge.name,
            "pipeline.verify.deindex_stale"
        );
        self.index
            .deindex(&self.scope, &candidate.edge, &candidate.id, candidate.version)
    }
}

impl<S> ReadStage for VerifyCandidates<S>
where
    S: ReadStage<Item = Candidate>,
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
