use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Error, Debug, Clone)]
pub enum StorageError {
    #[error("Timeout: {0}")]
    Timeout(String),
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
    #[error("Column family {0} does not exist")]
    ColumnFamilyMissing(String),
    #[error("Column family {0} cannot be created: schema is locked")]
    SchemaLocked(String),
    #[error("Corrupted data: {0}")]
    Corrupted(String),
    #[error("Migration of column family {column_family} failed: {reason}")]
    Migration {
        column_family: String,
        reason: String,
    },
}

impl StorageError {
    /// Whether the caller may retry the failed operation as is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Timeout(_) | StorageError::Unavailable(_))
    }
}
