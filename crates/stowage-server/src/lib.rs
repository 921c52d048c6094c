use axum::body::Body;
use axum::extract::rejection::FormRejection;
use axum::extract::{MatchedPath, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{from_fn, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Form, Json, Router};
use metrics::{counter, histogram};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use stowage_api_types::meta::MetadataStore;
use stowage_api_types::params::{AuthForm, AuthResponse};
use stowage_api_types::resource::PackageDocument;
use stowage_api_types::storage::BlobStore;
use stowage_auth::{AuthError, AuthProvider};
use stowage_catalog::Catalog;
use tokio::time::timeout;
use tokio::try_join;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::classify::StatusInRangeAsFailures;
use tower_http::trace::{DefaultOnFailure, TraceLayer};

pub mod error;
pub mod meta;
pub mod packages;
pub mod path;
pub mod resources;

pub use error::{ApiError, ApiResult};

#[derive(Clone, Deserialize)]
pub struct ServiceConfig {
    pub address: SocketAddr,
    pub metrics_address: SocketAddr,
    #[serde(default = "default_true")]
    pub allow_registration: bool,

    /// Require a token for every read, including reads of public packages.
    #[serde(default = "default_true")]
    pub auth_required: bool,

    /// `max-age` of downloads from public packages, in seconds.
    #[serde(default = "default_public_cache_max_age")]
    pub public_cache_max_age: u32,

    /// Largest accepted upload, in bytes.
    #[serde(default = "default_upload_size_limit")]
    pub upload_size_limit: u64,
}

pub struct ServiceState<M, B, A> {
    pub config: ServiceConfig,
    pub catalog: Catalog<M, B>,
    pub auth: A,
}

impl<M, B, A> ServiceState<M, B, A> {
    pub fn new(config: ServiceConfig, meta: M, blobs: B, auth: A) -> Self {
        Self {
            config,
            catalog: Catalog::new(meta, blobs),
            auth,
        }
    }
}

impl<M, B, A> ServiceState<M, B, A>
where
    A: AuthProvider + Sync,
{
    pub(crate) fn require_token<'h>(&self, headers: &'h HeaderMap) -> ApiResult<&'h str> {
        self.auth
            .token_from_headers(headers)?
            .ok_or(ApiError::Auth(AuthError::Unauthorized))
    }

    /// Public packages can be read anonymously unless the service says otherwise.
    pub(crate) async fn authorize_read(
        &self,
        headers: &HeaderMap,
        package: &PackageDocument,
    ) -> ApiResult<()> {
        if package.public && !self.config.auth_required {
            return Ok(());
        }
        let token = self.require_token(headers)?;
        self.auth.auth_read(token, &package.id).await?;
        Ok(())
    }
}

pub fn router<M, B, A>(config: ServiceConfig, meta: M, blobs: B, auth: A) -> Router
where
    M: MetadataStore + Send + Sync + 'static,
    B: BlobStore + Send + Sync + 'static,
    A: AuthProvider + Send + Sync + 'static,
{
    let state = Arc::new(ServiceState::new(config, meta, blobs, auth));

    Router::new()
        .route("/account", post(register::<M, B, A>))
        .route("/healthcheck", get(healthcheck::<M, B, A>))
        .route("/:package", put(packages::declare::<M, B, A>))
        .route("/:package/publish", put(packages::publish::<M, B, A>))
        .route("/:package/meta/resource/*path", get(meta::resource::<M, B, A>))
        .route("/:package/meta/resources", get(meta::resources::<M, B, A>))
        .route(
            "/:package/resources/*path",
            get(resources::download::<M, B, A>)
                .post(resources::upload::<M, B, A>)
                .fallback(resources::method_not_allowed),
        )
        .with_state(state)
        .fallback(handle_global_fallback)
        .layer(CatchPanicLayer::custom(|_| {
            counter!("panics_total").increment(1);

            ApiError::Internal(anyhow::anyhow!("handler panicked")).into_response()
        }))
        .layer(
            TraceLayer::new(StatusInRangeAsFailures::new(400..=599).into_make_classifier())
                .make_span_with(|request: &Request<Body>| {
                    let method = request.method();
                    let uri = request.uri();

                    tracing::info_span!("http-request", ?method, ?uri)
                })
                .on_failure(DefaultOnFailure::new()),
        )
        .layer(from_fn(metrics_layer))
}

async fn metrics_layer(request: Request, next: Next) -> Response {
    let timer = Instant::now();

    let path = if let Some(path) = request.extensions().get::<MatchedPath>() {
        path.as_str().to_string()
    } else {
        request.uri().path().to_string()
    };

    let response = next.run(request).await;

    let elapsed = timer.elapsed();

    let code = response.status().as_u16().to_string();

    histogram!("request_duration_seconds", "code" => code, "endpoint" => path).record(elapsed);

    response
}

async fn register<M, B, A>(
    State(state): State<Arc<ServiceState<M, B, A>>>,
    form: Result<Form<AuthForm>, FormRejection>,
) -> ApiResult<Json<AuthResponse>>
where
    A: AuthProvider + Sync,
{
    if !state.config.allow_registration {
        return Err(ApiError::RegistrationDisabled);
    }
    state
        .auth
        .register_supported()
        .map_err(|reason| ApiError::NotImplemented(reason.into()))?;

    let Form(form) = form.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let token = state.auth.register(&form.username).await?;
    Ok(Json(AuthResponse { token }))
}

async fn healthcheck<M, B, A>(
    State(state): State<Arc<ServiceState<M, B, A>>>,
) -> Result<String, (StatusCode, String)>
where
    M: MetadataStore + Send + Sync,
    B: BlobStore + Send + Sync,
    A: AuthProvider + Sync,
{
    let check_time = Duration::from_secs(4);
    let label = |label, res: Result<Result<(), anyhow::Error>, _>| match res {
        // healthcheck is unauthenticated and shouldn't leak internals via errors
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            for e in e.chain() {
                tracing::error!("{label} healthcheck: {e}");
            }
            Err(format!("{label} failed"))
        }
        Err(_) => Err(format!("{label} timed out")),
    };

    try_join! {
        async { label("auth", timeout(check_time, state.auth.healthcheck()).await) },
        async { label("metadata", timeout(check_time, state.catalog.meta().healthcheck()).await) },
        async { label("blobs", timeout(check_time, state.catalog.blobs().healthcheck()).await) },
    }
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e))?;

    Ok("OK".into())
}

pub async fn handle_global_fallback() -> ApiError {
    ApiError::UnknownEndpoint
}

#[inline(always)]
fn default_true() -> bool {
    true
}

fn default_public_cache_max_age() -> u32 {
    3600
}

fn default_upload_size_limit() -> u64 {
    1 << 30
}
