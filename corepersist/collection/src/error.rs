use corepersist_common::error::VersionError;
use corepersist_common::id::Id;
use corepersist_common::version::Version;
use corepersist_storage::error::StorageError;
use smol_str::SmolStr;
use thiserror::Error;

pub type CollectionResult<T> = Result<T, CollectionError>;

#[derive(Error, Debug)]
pub enum CollectionError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Version error: {0}")]
    Version(#[from] VersionError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] postcard::Error),
    #[error("Unknown entity format tag {0}")]
    UnknownFormat(u8),
    #[error("Write conflict on {id}: expected version {expected}, found {actual:?}")]
    Conflict {
        id: Id,
        expected: Version,
        actual: Option<Version>,
    },
    #[error("Entity {0} has an empty mutation")]
    EmptyMutation(Id),
    #[error("Unique values of {id} are held by another entity: {fields:?}")]
    UniqueViolation { id: Id, fields: Vec<SmolStr> },
}

impl CollectionError {
    /// Whether the operation may succeed if retried unchanged.
    pub fn is_retryable(&self) -> bool {
        match self {
            CollectionError::Storage(e) => e.is_retryable(),
            _ => false,
        }
    }
}
