use corepersist_storage::error::StorageError;
use thiserror::Error;

pub type GraphResult<T> = Result<T, GraphError>;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] postcard::Error),
    #[error("Invalid version: {0}")]
    Version(#[from] corepersist_common::error::VersionError),
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Compaction precondition failed: {0}")]
    Compaction(String),
}

impl GraphError {
    pub fn is_retryable(&self) -> bool {
        match self {
            GraphError::Storage(e) => e.is_retryable(),
            _ => false,
        }
    }
}
