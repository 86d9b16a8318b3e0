use corepersist_collection::config::SerializationConfig;
use corepersist_graph::config::GraphConfig;
use corepersist_pipeline::config::PipelineConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorePersistenceConfig {
    /// Threads of the pool running version cleanup, counter flushes and shard maintenance.
    pub num_threads: usize,
    pub graph: GraphConfig,
    pub serialization: SerializationConfig,
    pub pipeline: PipelineConfig,
}

impl Default for CorePersistenceConfig {
    fn default() -> Self {
        Self {
            num_threads: 1,
            graph: GraphConfig::default(),
            serialization: SerializationConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}
