//! A backend that says "yes" to every request for authorization.
//!
//! This is exactly as insecure as it sounds, and is meant primarily for testing purposes.

use crate::{AuthProvider, AuthResult};
use async_trait::async_trait;
use rand::distr::{Alphanumeric, SampleString};
use stowage_api_types::resource::PackageId;

/// In the config specify `auth_allow_full_access_without_any_checks: true` to give full access to
/// every package, including uploads and publishing, to anyone who can connect to the service.
pub struct YesAuthProvider(());

impl YesAuthProvider {
    #[track_caller]
    #[allow(clippy::needless_pass_by_value)]
    pub fn new(yes_config: Config) -> AuthResult<Self> {
        if !yes_config.auth_allow_full_access_without_any_checks {
            return Err(anyhow::anyhow!("enabled 'yes' auth without explicit opt-in").into());
        }
        Ok(Self(()))
    }
}

#[derive(serde::Deserialize, Clone)]
pub struct Config {
    pub auth_allow_full_access_without_any_checks: bool,
}

#[async_trait]
impl AuthProvider for YesAuthProvider {
    type Config = Config;

    async fn healthcheck(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn register(&self, _username: &str) -> AuthResult<String> {
        let token = Alphanumeric.sample_string(&mut rand::rng(), 32);

        Ok(token)
    }

    async fn auth_declare(&self, _token: &str, _package: &PackageId) -> AuthResult<()> {
        Ok(())
    }

    async fn auth_upload(&self, _token: &str, _package: &PackageId) -> AuthResult<()> {
        Ok(())
    }

    async fn auth_publish(&self, _token: &str, _package: &PackageId) -> AuthResult<()> {
        Ok(())
    }

    async fn auth_read(&self, _token: &str, _package: &PackageId) -> AuthResult<()> {
        Ok(())
    }
}

#[cfg(test)]
#[tokio::test]
async fn test_yes_needs_opt_in() {
    assert!(YesAuthProvider::new(Config { auth_allow_full_access_without_any_checks: false }).is_err());

    let auth = YesAuthProvider::new(Config { auth_allow_full_access_without_any_checks: true }).unwrap();
    let package = "wordpress".parse().unwrap();
    auth.auth_publish("anything", &package).await.unwrap();
    assert_eq!(auth.register("someone").await.unwrap().len(), 32);
}
