//! Resource content: uploading new revisions and downloading them again.

use crate::path::{self, ResourcePath};
use crate::{ApiError, ApiResult, ServiceState};
use axum::body::Body;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::response::Response;
use axum::Json;
use futures_util::{StreamExt, TryStreamExt};
use metrics::counter;
use std::io;
use std::sync::Arc;
use stowage_api_types::meta::MetadataStore;
use stowage_api_types::params::{ChannelQuery, UploadQuery, UploadedResource};
use stowage_api_types::resource::{Fingerprint, PackageDocument, ResourceError, ResourceRecord};
use stowage_api_types::storage::BlobStore;
use stowage_auth::{AuthError, AuthProvider};

pub const CONTENT_SHA384: HeaderName = HeaderName::from_static("content-sha384");
pub const ENTITY_ID: HeaderName = HeaderName::from_static("entity-id");
pub const RESOURCE_ID: HeaderName = HeaderName::from_static("resource-id");

/// `POST /{package}/resources/{name}?hash=<sha384 hex>`
pub async fn upload<M, B, A>(
    headers: HeaderMap,
    State(state): State<Arc<ServiceState<M, B, A>>>,
    Path((package, tail)): Path<(String, String)>,
    query: Result<Query<UploadQuery>, QueryRejection>,
    body: Body,
) -> ApiResult<Json<UploadedResource>>
where
    M: MetadataStore + Send + Sync,
    B: BlobStore + Send + Sync,
    A: AuthProvider + Sync,
{
    let id = path::package_id(&package)?;
    let resource = ResourcePath::parse(&tail)?;
    if resource.revision.is_some() {
        return Err(ApiError::BadRequest("revisions are assigned on upload".into()));
    }

    let Query(query) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let fingerprint: Fingerprint = query
        .hash
        .parse()
        .map_err(|_| ApiError::BadRequest("hash must be a hex SHA-384 digest".into()))?;

    let size = headers
        .get(CONTENT_LENGTH)
        .ok_or_else(|| ApiError::BadRequest("Content-Length is required".into()))?
        .to_str()
        .ok()
        .and_then(|len| len.parse::<u64>().ok())
        .ok_or_else(|| ApiError::BadRequest("invalid Content-Length".into()))?;
    let limit = state.config.upload_size_limit;
    if size > limit {
        return Err(ApiError::PayloadTooLarge { size, limit });
    }

    let token = state.require_token(&headers)?;
    let auth_result = state.auth.auth_upload(token, &id).await;
    if let Err(e) = &auth_result {
        let error_label = match e {
            AuthError::Unauthorized => "unauthorized",
            AuthError::Forbidden => "forbidden",
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::Unimplemented => "unimplemented",
            AuthError::PackageNotFound => "package_not_found",
            AuthError::ServiceError(_) => "service_error",
        };

        counter!("stowage_upload_auth_errors_total", "error" => error_label).increment(1);
    }
    auth_result?;

    let package = state.catalog.package(&id).await?;
    let content = body.into_data_stream().map_err(io::Error::other).boxed();

    let res = state
        .catalog
        .upload(&package, &resource.name, content, &fingerprint, size)
        .await;

    match res {
        Ok(record) => Ok(Json(UploadedResource {
            revision: record.revision,
        })),
        Err(e) => {
            let error_label = match &e {
                ResourceError::UnknownResource { .. } => "unknown_resource",
                ResourceError::ResourceNotFound(_) | ResourceError::PackageNotFound(_) => "not_found",
                ResourceError::IntegrityMismatch(_) => "integrity_mismatch",
                ResourceError::IncompleteUpload(_) => "incomplete_upload",
                ResourceError::AllocationConflict(_) => "allocation_conflict",
                ResourceError::StorageUnavailable(_) => "storage_unavailable",
                ResourceError::DuplicatePackage(_)
                | ResourceError::InvalidDeclaration(_)
                | ResourceError::BadChannel(_) => "other",
            };

            counter!("stowage_upload_errors_total", "error" => error_label).increment(1);

            Err(e.into())
        }
    }
}

/// `GET /{package}/resources/{name}[/{revision}]?channel=`
pub async fn download<M, B, A>(
    headers: HeaderMap,
    State(state): State<Arc<ServiceState<M, B, A>>>,
    Path((package, tail)): Path<(String, String)>,
    query: Result<Query<ChannelQuery>, QueryRejection>,
) -> ApiResult<Response>
where
    M: MetadataStore + Send + Sync,
    B: BlobStore + Send + Sync,
    A: AuthProvider + Sync,
{
    let id = path::package_id(&package)?;
    let resource = ResourcePath::parse(&tail)?;
    let Query(query) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let channel = path::channel(query.channel.as_deref())?;

    let package = state.catalog.package(&id).await?;
    state.authorize_read(&headers, &package).await?;

    let record = match resource.revision {
        Some(revision) => state.catalog.get(&package, &resource.name, revision).await?,
        None => {
            state
                .catalog
                .resolve_for_channel(&package, &channel, &resource.name)
                .await?
        }
    };
    let reader = state.catalog.open(&record).await?;

    let mut res = Response::new(Body::from_stream(reader.stream));
    let headers = res.headers_mut();
    for (name, value) in download_headers(&package, &record, state.config.public_cache_max_age) {
        if let Ok(value) = value {
            headers.insert(name, value);
        }
    }
    headers.insert(CONTENT_LENGTH, HeaderValue::from(reader.size));
    Ok(res)
}

fn download_headers(
    package: &PackageDocument,
    record: &ResourceRecord,
    public_max_age: u32,
) -> [(HeaderName, Result<HeaderValue, axum::http::header::InvalidHeaderValue>); 5] {
    let cache_control = if package.public {
        format!("public, max-age={public_max_age}")
    } else {
        "private, no-cache, must-revalidate".to_owned()
    };
    [
        (CONTENT_TYPE, Ok(HeaderValue::from_static("application/octet-stream"))),
        (CONTENT_SHA384, HeaderValue::try_from(record.fingerprint.to_string())),
        (ENTITY_ID, HeaderValue::try_from(package.id.as_str())),
        (
            RESOURCE_ID,
            HeaderValue::try_from(format!("{}/{}", record.name, record.revision)),
        ),
        (CACHE_CONTROL, HeaderValue::try_from(cache_control)),
    ]
}

pub async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}
