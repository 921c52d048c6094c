use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use stowage_api_types::params::{Error, ErrorCode};
use stowage_api_types::resource::ResourceError;
use stowage_auth::{error_id, AuthError};
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

/// Everything a handler can fail with. Each variant maps to one wire code.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("Method not allowed on this resource")]
    MethodNotAllowed,
    #[error("Upload of {size} bytes exceeds the limit of {limit} bytes")]
    PayloadTooLarge { size: u64, limit: u64 },
    #[error("Registration is disabled")]
    RegistrationDisabled,
    #[error("{0}")]
    NotImplemented(String),
    #[error("No such endpoint")]
    UnknownEndpoint,
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Resource(#[from] ResourceError),
    /// A resource failure on the `meta/` endpoints, where not-found has its own code.
    #[error(transparent)]
    Metadata(ResourceError),
    #[error("Internal error")]
    Internal(anyhow::Error),
}

impl ApiError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::BadRequest(_) => ErrorCode::BadRequest,
            Self::MethodNotAllowed => ErrorCode::MethodNotAllowed,
            Self::PayloadTooLarge { .. } => ErrorCode::PayloadTooLarge,
            Self::RegistrationDisabled => ErrorCode::Unauthorized,
            Self::NotImplemented(_) => ErrorCode::NotImplemented,
            Self::UnknownEndpoint => ErrorCode::NotFound,
            Self::Auth(e) => match e {
                AuthError::Unauthorized | AuthError::InvalidCredentials => ErrorCode::Unauthorized,
                AuthError::Forbidden => ErrorCode::Forbidden,
                AuthError::Unimplemented => ErrorCode::NotImplemented,
                AuthError::PackageNotFound => ErrorCode::NotFound,
                AuthError::ServiceError(_) => ErrorCode::InternalError,
            },
            Self::Resource(e) => resource_code(e),
            Self::Metadata(e) if e.is_not_found() => ErrorCode::MetadataNotFound,
            Self::Metadata(e) => resource_code(e),
            Self::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Backend causes are logged here and replaced by an opaque id on the wire.
    fn message(&self) -> String {
        let cause = match self {
            Self::Resource(ResourceError::StorageUnavailable(e))
            | Self::Metadata(ResourceError::StorageUnavailable(e))
            | Self::Auth(AuthError::ServiceError(e))
            | Self::Internal(e) => e,
            other => return other.to_string(),
        };
        let id = error_id(cause);
        for e in cause.chain() {
            tracing::error!(error_id = %id, "{e}");
        }
        match self.code() {
            ErrorCode::StorageUnavailable => format!("Storage backend is unavailable ({id})"),
            _ => format!("Internal error ({id})"),
        }
    }
}

fn resource_code(e: &ResourceError) -> ErrorCode {
    match e {
        ResourceError::UnknownResource { .. }
        | ResourceError::ResourceNotFound(_)
        | ResourceError::PackageNotFound(_) => ErrorCode::NotFound,
        ResourceError::IntegrityMismatch(_) => ErrorCode::IntegrityMismatch,
        ResourceError::AllocationConflict(_) => ErrorCode::AllocationConflict,
        ResourceError::DuplicatePackage(_) => ErrorCode::DuplicateUpload,
        ResourceError::InvalidDeclaration(_)
        | ResourceError::BadChannel(_)
        | ResourceError::IncompleteUpload(_) => ErrorCode::BadRequest,
        ResourceError::StorageUnavailable(_) => ErrorCode::StorageUnavailable,
    }
}

fn status(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::BadRequest | ErrorCode::IntegrityMismatch => StatusCode::BAD_REQUEST,
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::Forbidden => StatusCode::FORBIDDEN,
        ErrorCode::NotFound | ErrorCode::MetadataNotFound => StatusCode::NOT_FOUND,
        ErrorCode::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
        ErrorCode::DuplicateUpload | ErrorCode::AllocationConflict => StatusCode::CONFLICT,
        ErrorCode::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        ErrorCode::StorageUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCode::NotImplemented => StatusCode::NOT_IMPLEMENTED,
        ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.code();
        let body = Error {
            message: self.message(),
            code,
        };
        (status(code), Json(body)).into_response()
    }
}
