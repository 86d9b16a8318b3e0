//! The search index seen from the read path.
//!
//! The index only supplies candidate `(id, version)` pairs; every candidate is verified against
//! the entity store before it is returned to a caller.

use std::collections::BTreeSet;
use std::ops::Bound;

use corepersist_common::id::Id;
use corepersist_common::scope::ApplicationScope;
use corepersist_common::version::Version;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use tracing::trace;

use crate::error::{PipelineError, PipelineResult};

/// The indexed relation a candidate was found through, such as the `users` collection of an
/// application.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SearchEdge {
    pub node: Id,
    pub name: SmolStr,
}

impl SearchEdge {
    pub fn new(node: Id, name: impl Into<SmolStr>) -> Self {
        Self {
            node,
            name: name.into(),
        }
    }
}

/// Opaque position in a result list; searching after it returns the candidates that follow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexCursor(String);

impl IndexCursor {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub id: Id,
    pub version: Version,
    pub edge: SearchEdge,
    /// Where a search resuming after this candidate starts.
    pub position: IndexCursor,
}

#[derive(Debug, Clone, Default)]
pub struct CandidateResults {
    pub candidates: Vec<Candidate>,
    /// Whether candidates remain after the last one returned.
    pub has_more: bool,
}

pub trait EntityIndex: Send + Sync {
    /// At most `limit` candidates of `edge`, starting after `after`.
    fn search(
        &self,
        scope: &ApplicationScope,
        edge: &SearchEdge,
        limit: usize,
        after: Option<&IndexCursor>,
    ) -> PipelineResult<CandidateResults>;

    fn index(
        &self,
        scope: &ApplicationScope,
        edge: &SearchEdge,
        id: &Id,
        version: Version,
    ) -> PipelineResult<()>;

    fn deindex(
        &self,
        scope: &ApplicationScope,
        edge: &SearchEdge,
        id: &Id,
        version: Version,
    ) -> PipelineResult<()>;
}

type Entry = (Id, Version);

/// An in-process index ordered by id, then version.
#[derive(Default)]
pub struct MemoryEntityIndex {
    entries: DashMap<(ApplicationScope, SearchEdge), BTreeSet<Entry>>,
}

impl MemoryEntityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries indexed under `edge`.
    pub fn len(&self, scope: &ApplicationScope, edge: &SearchEdge) -> usize {
        self.entries
            .get(&(scope.clone(), edge.clone()))
            .map_or(0, |e| e.len())
    }
}

fn encode_position(entry: &Entry) -> PipelineResult<IndexCursor> {
    serde_json::to_string(entry)
        .map(IndexCursor)
        .map_err(|e| PipelineError::Index(e.to_string()))
}

fn decode_position(cursor: &IndexCursor) -> PipelineResult<Entry> {
    serde_json::from_str(cursor.as_str()).map_err(|e| PipelineError::InvalidCursor(e.to_string()))
}

impl EntityIndex for MemoryEntityIndex {
    fn search(
        &self,
        scope: &ApplicationScope,
        edge: &SearchEdge,
        limit: usize,
        after: Option<&IndexCursor>,
    ) -> PipelineResult<CandidateResults> {
        let lower = match after {
            Some(cursor) => Bound::Excluded(decode_position(cursor)?),
            None => Bound::Unbounded,
        };
        let Some(entries) = self.entries.get(&(scope.clone(), edge.clone())) else {
            return Ok(CandidateResults::default());
        };
        let mut found = entries.range((lower, Bound::Unbounded));
        let mut candidates = Vec::with_capacity(limit);
        for entry in found.by_ref().take(limit) {
            candidates.push(Candidate {
                id: entry.0.clone(),
                version: entry.1,
                edge: edge.clone(),
                position: encode_position(entry)?,
            });
        }
        let has_more = found.next().is_some();
        trace!(edge = %edge.name, found = candidates.len(), has_more, "pipeline.index.search");
        Ok(CandidateResults {
            candidates,
            has_more,
        })
    }

    fn index(
        &self,
        scope: &ApplicationScope,
        edge: &SearchEdge,
        id: &Id,
        version: Version,
    ) -> PipelineResult<()> {
        self.entries
            .entry((scope.clone(), edge.clone()))
            .or_default()
            .insert((id.clone(), version));
        Ok(())
    }

    fn deindex(
        &self,
        scope: &ApplicationScope,
        edge: &SearchEdge,
        id: &Id,
        version: Version,
    ) -> PipelineResult<()> {
        if let Some(mut entries) = self.entries.get_mut(&(scope.clone(), edge.clone())) {
            entries.remove(&(id.clone(), version));
        }
        Ok(())
    }
}
