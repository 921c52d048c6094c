#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{Request, Response};
use axum::Router;
use stowage_api_types::params::{Error, ErrorCode};
use stowage_api_types::resource::{Fingerprint, PackageId};
use stowage_auth::{AuthError, AuthProvider, AuthResult};
use stowage_fs_meta::FsMetadataStore;
use stowage_server::ServiceConfig;
use stowage_storage::fs::FsBlobStore;
use tempfile::TempDir;
use tower::ServiceExt;

pub const OWNER: &str = "owner-token";
pub const READER: &str = "reader-token";

/// Owners may do anything, readers may only read, and every other token is invalid.
pub struct MockAuthProvider;

impl MockAuthProvider {
    fn check(token: &str, write: bool) -> AuthResult<()> {
        match token {
            OWNER => Ok(()),
            READER if !write => Ok(()),
            READER => Err(AuthError::Forbidden),
            _ => Err(AuthError::InvalidCredentials),
        }
    }
}

#[async_trait]
impl AuthProvider for MockAuthProvider {
    type Config = ();

    async fn healthcheck(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn register(&self, username: &str) -> AuthResult<String> {
        Ok(format!("token-for-{username}"))
    }

    async fn auth_declare(&self, token: &str, _package: &PackageId) -> AuthResult<()> {
        Self::check(token, true)
    }

    async fn auth_upload(&self, token: &str, _package: &PackageId) -> AuthResult<()> {
        Self::check(token, true)
    }

    async fn auth_publish(&self, token: &str, _package: &PackageId) -> AuthResult<()> {
        Self::check(token, true)
    }

    async fn auth_read(&self, token: &str, _package: &PackageId) -> AuthResult<()> {
        Self::check(token, false)
    }
}

pub struct ServiceStateBuilder {
    config: ServiceConfig,
}

impl Default for ServiceStateBuilder {
    fn default() -> Self {
        Self {
            config: ServiceConfig {
                address: "127.0.0.1:3000".parse().unwrap(),
                metrics_address: "127.0.0.1:3001".parse().unwrap(),
                allow_registration: true,
                auth_required: false,
                public_cache_max_age: 600,
                upload_size_limit: 1024,
            },
        }
    }
}

impl ServiceStateBuilder {
    pub fn auth_required(mut self, auth_required: bool) -> Self {
        self.config.auth_required = auth_required;
        self
    }

    pub fn allow_registration(mut self, allow_registration: bool) -> Self {
        self.config.allow_registration = allow_registration;
        self
    }

    /// Filesystem metadata and blobs in a fresh temporary directory.
    pub fn build(self) -> TestService {
        let _ = tracing_subscriber::fmt::fmt().with_test_writer().try_init();

        let dir = tempfile::tempdir().unwrap();
        let meta =
            FsMetadataStore::new(stowage_fs_meta::Config::Path(dir.path().join("meta"))).unwrap();
        let blobs = FsBlobStore::new(dir.path().join("blobs")).unwrap();

        TestService {
            router: stowage_server::router(self.config, meta, blobs, MockAuthProvider),
            _dir: dir,
        }
    }
}

pub struct TestService {
    pub router: Router,
    _dir: TempDir,
}

impl TestService {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> Response<Body> {
        let mut request = Request::builder().uri(uri);
        if let Some(token) = token {
            request = request.header(AUTHORIZATION, token);
        }
        self.send(request.body(Body::empty()).unwrap()).await
    }

    /// Declares a charm with the given slots, as the owner.
    pub async fn declare(&self, package: &str, public: bool, slots: &[&str]) -> Response<Body> {
        let resources: Vec<_> = slots
            .iter()
            .map(|name| {
                serde_json::json!({
                    "name": name,
                    "type": "file",
                    "path": format!("{name}.zip"),
                    "description": format!("{name} for testing"),
                })
            })
            .collect();
        let body = serde_json::json!({ "kind": "charm", "public": public, "resources": resources });
        self.send(
            Request::builder()
                .method("PUT")
                .uri(format!("/{package}"))
                .header(AUTHORIZATION, OWNER)
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn upload(&self, package: &str, name: &str, content: &'static [u8]) -> Response<Body> {
        let hash = Fingerprint::of(content);
        self.send(
            Request::builder()
                .method("POST")
                .uri(format!("/{package}/resources/{name}?hash={hash}"))
                .header(AUTHORIZATION, OWNER)
                .header(CONTENT_LENGTH, content.len())
                .body(Body::from(content))
                .unwrap(),
        )
        .await
    }

    pub async fn publish(&self, package: &str, body: serde_json::Value) -> Response<Body> {
        self.send(
            Request::builder()
                .method("PUT")
                .uri(format!("/{package}/publish"))
                .header(AUTHORIZATION, OWNER)
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let body = to_bytes(response.into_body(), 100_000).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

pub async fn error_code(response: Response<Body>) -> ErrorCode {
    let body = to_bytes(response.into_body(), 100_000).await.unwrap();
    let error: Error = serde_json::from_slice(&body).unwrap();
    error.code
}
