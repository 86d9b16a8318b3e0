use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerializationConfig {
    /// Version rows fetched per storage round trip when no hint is given.
    pub fetch_size: usize,
    /// Superseded versions kept behind the newest complete version before cleanup removes them.
    pub retained_versions: usize,
    /// Whether commits schedule the cleanup of superseded versions.
    pub cleanup_enabled: bool,
}

impl Default for SerializationConfig {
    fn default() -> Self {
        Self {
            fetch_size: 100,
            retained_versions: 2,
            cleanup_enabled: true,
        }
    }
}
