#[cfg(feature = "storage")]
use crate::storage::StorageError;
use thiserror::Error;

pub type MetaResult<T> = Result<T, MetaError>;

#[derive(Error, Debug)]
pub enum MetaError {
    #[error("Failed to find the document")]
    NotFound,
    #[error("A document with the same key already exists: {0}")]
    DuplicateKey(String),
    #[error("Encountered uncategorized error")]
    ServiceError(#[from] anyhow::Error),
}

#[cfg(feature = "storage")]
impl From<StorageError> for MetaError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound => Self::NotFound,
            other @ StorageError::SizeMismatch { .. } => Self::ServiceError(other.into()),
            StorageError::ServiceError(e) => Self::ServiceError(e),
        }
    }
}
