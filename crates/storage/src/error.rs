use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error(
        "Storage quota exceeded: {requested} bytes requested, {used} of {max} bytes already used"
    )]
    QuotaExceeded { requested: u64, used: u64, max: u64 },
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;
