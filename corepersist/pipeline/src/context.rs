use corepersist_common::scope::ApplicationScope;

use crate::cursor::{CursorValue, RequestCursor, StageId};

/// Per-request state shared by the stages of one pipeline.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    scope: ApplicationScope,
    limit: usize,
    cursor: RequestCursor,
    next_stage: StageId,
}

impl PipelineContext {
    pub fn new(scope: ApplicationScope, limit: usize, cursor: RequestCursor) -> Self {
        Self {
            scope,
            limit: limit.max(1),
            cursor,
            next_stage: 0,
        }
    }

    #[inline]
    pub fn scope(&self) -> &ApplicationScope {
        &self.scope
    }

    /// Results per page.
    #[inline]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Registers a stage and returns its id with the value it resumes from.
    ///
    /// The same pipeline built for the next page gets the same ids, which is what lets a cursor
    /// be replayed.
    pub fn register_stage(&mut self) -> (StageId, Option<CursorValue>) {
        let stage = self.next_stage;
        self.next_stage += 1;
        (stage, self.cursor.get(stage).cloned())
    }

    /// The cursor this request resumes from.
    #[inline]
    pub fn cursor(&self) -> &RequestCursor {
        &self.cursor
    }
}
