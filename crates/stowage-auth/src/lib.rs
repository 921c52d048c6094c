#![cfg_attr(docsrs, feature(doc_cfg))]

use async_trait::async_trait;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use stowage_api_types::resource::PackageId;

#[cfg(feature = "yes-backend")]
#[cfg_attr(docsrs, doc(cfg(feature = "yes-backend")))]
pub mod yes_backend;

pub mod no_backend;

#[cfg(feature = "fs-backend")]
#[cfg_attr(docsrs, doc(cfg(feature = "fs-backend")))]
pub mod fs_backend;

#[cfg(feature = "fs-backend")]
mod base64_serde;

mod error;

pub use error::*;

/// Decides who may change or read which package.
///
/// Every check is made against a package id that the caller has already resolved. Reads of
/// public packages may skip the check entirely when the service doesn't require authentication.
#[async_trait]
pub trait AuthProvider {
    type Config;

    async fn healthcheck(&self) -> anyhow::Result<()>;

    /// Register a new user, returning a token if successful.
    async fn register(&self, username: &str) -> AuthResult<String>;

    /// If not, returns a message why
    fn register_supported(&self) -> Result<(), &'static str> {
        Ok(())
    }

    /// Verify that a user may declare a package.
    ///
    /// If nobody owns the package yet, the user should be given ownership of it.
    async fn auth_declare(&self, token: &str, package: &PackageId) -> AuthResult<()>;

    /// Verify that a user may upload new resource revisions to a package.
    async fn auth_upload(&self, token: &str, package: &PackageId) -> AuthResult<()>;

    /// Verify that a user may move the channel pointers of a package.
    async fn auth_publish(&self, token: &str, package: &PackageId) -> AuthResult<()>;

    /// Verify that a user may read resource metadata and content of a package.
    async fn auth_read(&self, token: &str, package: &PackageId) -> AuthResult<()> {
        let _ = (token, package);
        Err(AuthError::Unimplemented)
    }

    fn token_from_headers<'h>(&self, headers: &'h HeaderMap) -> AuthResult<Option<&'h str>> {
        default_token_from_headers(headers)
    }
}

pub(crate) fn default_token_from_headers(headers: &HeaderMap) -> AuthResult<Option<&str>> {
    match headers.get(AUTHORIZATION) {
        Some(auth) => auth
            .to_str()
            .map_err(|_| AuthError::InvalidCredentials)
            .map(Some),
        None => Ok(None),
    }
}
