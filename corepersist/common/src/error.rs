use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("version clock overflow, reached {0}")]
    ClockOverflow(u64),

    #[error("invalid version bytes: expected 16, got {0}")]
    InvalidLength(usize),
}

pub type VersionResult<T> = Result<T, VersionError>;
