//! Resource metadata: what a package declares, and what has been uploaded for it.

use crate::path::{self, ResourcePath};
use crate::{ApiError, ApiResult, ServiceState};
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::sync::Arc;
use stowage_api_types::meta::MetadataStore;
use stowage_api_types::params::{ChannelQuery, Resource};
use stowage_api_types::resource::{Channel, PackageDocument, ResourceView};
use stowage_api_types::storage::BlobStore;
use stowage_auth::AuthProvider;
use stowage_catalog::Selector;

/// `GET /{package}/meta/resource/{name}[/{revision}]`
///
/// Without a revision this is the latest upload, or a placeholder before the first one. An
/// explicit revision must exist.
pub async fn resource<M, B, A>(
    headers: HeaderMap,
    State(state): State<Arc<ServiceState<M, B, A>>>,
    Path((package, tail)): Path<(String, String)>,
) -> ApiResult<Response>
where
    M: MetadataStore + Send + Sync,
    B: BlobStore + Send + Sync,
    A: AuthProvider + Sync,
{
    let resource = ResourcePath::parse(&tail)?;
    let package = readable_package(&state, &headers, &package).await?;

    if !package.supports_resources() {
        return Ok(Json(serde_json::json!({})).into_response());
    }

    let view = match resource.revision {
        Some(revision) => {
            let slot = package.slot(&resource.name).map_err(ApiError::Metadata)?.clone();
            let record = state
                .catalog
                .get(&package, &resource.name, revision)
                .await
                .map_err(ApiError::Metadata)?;
            ResourceView::Uploaded { slot, record }
        }
        None => state
            .catalog
            .resolver()
            .resolve_one(&package, &Selector::Channel(Channel::Unpublished), &resource.name)
            .await
            .map_err(ApiError::Metadata)?,
    };

    Ok(Json(Resource::from(&view)).into_response())
}

/// `GET /{package}/meta/resources?channel=`
pub async fn resources<M, B, A>(
    headers: HeaderMap,
    State(state): State<Arc<ServiceState<M, B, A>>>,
    Path(package): Path<String>,
    query: Result<Query<ChannelQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<Resource>>>
where
    M: MetadataStore + Send + Sync,
    B: BlobStore + Send + Sync,
    A: AuthProvider + Sync,
{
    let Query(query) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let channel = path::channel(query.channel.as_deref())?;
    let package = readable_package(&state, &headers, &package).await?;

    let views = state
        .catalog
        .resolver()
        .resolve_all(&package, &channel)
        .await
        .map_err(ApiError::Metadata)?;

    Ok(Json(views.iter().map(Resource::from).collect()))
}

async fn readable_package<M, B, A>(
    state: &ServiceState<M, B, A>,
    headers: &HeaderMap,
    package: &str,
) -> ApiResult<PackageDocument>
where
    M: MetadataStore + Send + Sync,
    B: BlobStore + Send + Sync,
    A: AuthProvider + Sync,
{
    let id = path::package_id(package)?;
    let package = state.catalog.package(&id).await.map_err(ApiError::Metadata)?;
    state.authorize_read(headers, &package).await?;
    Ok(package)
}
