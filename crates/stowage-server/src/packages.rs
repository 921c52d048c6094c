use crate::path;
use crate::{ApiError, ApiResult, ServiceState};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use std::sync::Arc;
use stowage_api_types::meta::MetadataStore;
use stowage_api_types::params::PublishRequest;
use stowage_api_types::resource::{PackageDeclaration, PackageDocument};
use stowage_api_types::storage::BlobStore;
use stowage_auth::AuthProvider;

/// `PUT /{package}`
pub async fn declare<M, B, A>(
    headers: HeaderMap,
    State(state): State<Arc<ServiceState<M, B, A>>>,
    Path(package): Path<String>,
    declaration: Result<Json<PackageDeclaration>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<PackageDocument>)>
where
    M: MetadataStore + Send + Sync,
    B: BlobStore + Send + Sync,
    A: AuthProvider + Sync,
{
    let id = path::package_id(&package)?;
    let Json(declaration) = declaration.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let token = state.require_token(&headers)?;
    state.auth.auth_declare(token, &id).await?;

    let document = state.catalog.declare(id, declaration).await?;
    Ok((StatusCode::CREATED, Json(document)))
}

/// `PUT /{package}/publish`
///
/// Pointers are moved one at a time, so a failure part way leaves the earlier ones moved.
pub async fn publish<M, B, A>(
    headers: HeaderMap,
    State(state): State<Arc<ServiceState<M, B, A>>>,
    Path(package): Path<String>,
    request: Result<Json<PublishRequest>, JsonRejection>,
) -> ApiResult<StatusCode>
where
    M: MetadataStore + Send + Sync,
    B: BlobStore + Send + Sync,
    A: AuthProvider + Sync,
{
    let id = path::package_id(&package)?;
    let Json(request) = request.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    if request.channels.is_empty() {
        return Err(ApiError::BadRequest("no channels to publish to".into()));
    }

    let token = state.require_token(&headers)?;
    state.auth.auth_publish(token, &id).await?;

    let package = state.catalog.package(&id).await?;
    for channel in &request.channels {
        for (name, &revision) in &request.resources {
            state.catalog.publish(&package, channel, name, revision).await?;
        }
    }

    Ok(StatusCode::NO_CONTENT)
}
