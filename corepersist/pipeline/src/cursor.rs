//! Opaque request cursors.
//!
//! A cursor maps the id of each cursor-aware stage to the value that stage resumes from. On the
//! wire it is URL-safe base64 over JSON, and callers must treat it as opaque.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use corepersist_common::id::Id;
use corepersist_graph::edge::MarkedEdge;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};
use crate::index::IndexCursor;

/// Identifies a stage. Ids are assigned in pipeline construction order.
pub type StageId = u32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CursorValue {
    /// The last edge emitted by a graph read.
    Edge(MarkedEdge),
    Id(Id),
    /// A search index continuation.
    Index(IndexCursor),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestCursor {
    values: BTreeMap<StageId, CursorValue>,
}

impl RequestCursor {
    /// Decodes a cursor returned by a previous page. `None` or an empty string starts from the
    /// beginning.
    pub fn parse(encoded: Option<&str>) -> PipelineResult<Self> {
        let Some(encoded) = encoded.filter(|s| !s.is_empty()) else {
            return Ok(Self::default());
        };
        let json = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|e| PipelineError::InvalidCursor(e.to_string()))?;
        serde_json::from_slice(&json).map_err(|e| PipelineError::InvalidCursor(e.to_string()))
    }

    pub fn encode(&self) -> PipelineResult<String> {
        let json =
            serde_json::to_vec(self).map_err(|e| PipelineError::InvalidCursor(e.to_string()))?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    pub fn get(&self, stage: StageId) -> Option<&CursorValue> {
        self.values.get(&stage)
    }

    pub fn set(&mut self, stage: StageId, value: CursorValue) {
        self.values.insert(stage, value);
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether a stage built before `stage` resumes from a value.
    pub fn has_before(&self, stage: StageId) -> bool {
        self.values.range(..stage).next().is_some()
    }

    /// Whether a stage built after `stage` resumes from a value.
    pub fn has_after(&self, stage: StageId) -> bool {
        self.values.range(stage.saturating_add(1)..).next().is_some()
    }
}

#[cfg(test)]
mod tests {
    use corepersist_common::version::Version;

    use super::*;

    #[test]
    fn test_cursor_survives_the_wire() {
        let edge = MarkedEdge::new(
            Id::generate("user"),
            "likes",
            Id::generate("post"),
            Version::from_parts(42, 7),
        );
        let mut cursor = RequestCursor::default();
        cursor.set(0, CursorValue::Edge(edge.clone()));
        cursor.set(3, CursorValue::Id(edge.target.clone()));

        let encoded = cursor.encode().unwrap();
        assert!(encoded.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        let decoded = RequestCursor::parse(Some(&encoded)).unwrap();
        assert_eq!(decoded, cursor);
        assert_eq!(decoded.get(0), Some(&CursorValue::Edge(edge)));
        assert_eq!(decoded.get(1), None);
        assert!(decoded.has_after(0));
        assert!(!decoded.has_before(0));
        assert!(decoded.has_before(3));
        assert!(!decoded.has_after(3));
    }

    #[test]
    fn test_missing_cursor_starts_fresh() {
        assert!(RequestCursor::parse(None).unwrap().is_empty());
        assert!(RequestCursor::parse(Some("")).unwrap().is_empty());
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(matches!(
            RequestCursor::parse(Some("not a cursor!")),
            Err(PipelineError::InvalidCursor(_))
        ));
        let not_json = URL_SAFE_NO_PAD.encode(b"[1, 2");
        assert!(RequestCursor::parse(Some(&not_json)).is_err());
    }
}
