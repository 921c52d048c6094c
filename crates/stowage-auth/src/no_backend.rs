//! Useless (but safe) placeholder for a backend
use crate::{AuthError, AuthProvider, AuthResult};
use async_trait::async_trait;
use stowage_api_types::resource::PackageId;

/// Denies everything that needs a decision, so only anonymous reads of public packages work.
pub struct NoAuthProvider;

fn nope<T>() -> AuthResult<T> {
    Err(AuthError::Unimplemented)
}

impl NoAuthProvider {
    pub fn new(_no_config: ()) -> AuthResult<Self> {
        Ok(Self)
    }
}

/// Used as fallback to avoid compile error when no backend is configured
#[async_trait]
impl AuthProvider for NoAuthProvider {
    type Config = ();

    async fn healthcheck(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn register(&self, _username: &str) -> AuthResult<String> {
        nope()
    }

    fn register_supported(&self) -> Result<(), &'static str> {
        Err("This is a 'no' backend")
    }

    async fn auth_declare(&self, _token: &str, _package: &PackageId) -> AuthResult<()> {
        nope()
    }

    async fn auth_upload(&self, _token: &str, _package: &PackageId) -> AuthResult<()> {
        nope()
    }

    async fn auth_publish(&self, _token: &str, _package: &PackageId) -> AuthResult<()> {
        nope()
    }
}

#[cfg(test)]
#[tokio::test]
async fn test_no_auth() {
    let auth = NoAuthProvider::new(()).unwrap();
    let package = "wordpress".parse().unwrap();
    assert!(matches!(auth.auth_upload("token", &package).await, Err(AuthError::Unimplemented)));
    assert!(matches!(auth.auth_read("token", &package).await, Err(AuthError::Unimplemented)));
    assert!(auth.register_supported().is_err());
}
