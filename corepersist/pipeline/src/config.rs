use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Extra index queries a search may issue to fill a page shortened by stale candidates.
    pub max_requery_attempts: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_requery_attempts: 10,
        }
    }
}
