use super::PackageId;
use thiserror::Error;

pub type ResourceResult<T> = Result<T, ResourceError>;

#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("Package {package} does not declare a resource named {name:?}")]
    UnknownResource { package: PackageId, name: String },
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),
    #[error("Package {0} not found")]
    PackageNotFound(PackageId),
    #[error("Uploaded content does not match its declaration: {0}")]
    IntegrityMismatch(String),
    #[error("Upload body could not be read to the end: {0}")]
    IncompleteUpload(String),
    #[error("Could not allocate a resource revision: {0}")]
    AllocationConflict(String),
    #[error("Package {0} has already been declared")]
    DuplicatePackage(PackageId),
    #[error("Invalid package declaration: {0}")]
    InvalidDeclaration(String),
    #[error("Cannot publish to channel {0:?}")]
    BadChannel(String),
    #[error("Storage backend is unavailable")]
    StorageUnavailable(#[from] anyhow::Error),
}

impl ResourceError {
    /// `true` for the failures that mean "nothing to show" rather than "something broke".
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::UnknownResource { .. } | Self::ResourceNotFound(_) | Self::PackageNotFound(_)
        )
    }
}

/// A name or identifier that failed validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {kind} {value:?}")]
pub struct InvalidIdentifier {
    kind: &'static str,
    value: String,
}

impl InvalidIdentifier {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.chars().take(200).collect(),
        }
    }
}
