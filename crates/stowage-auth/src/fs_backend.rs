use crate::base64_serde;
use crate::{AuthError, AuthProvider, AuthResult};
use anyhow::Context;
use async_trait::async_trait;
use parking_lot::MappedRwLockWriteGuard;
use parking_lot::RwLockWriteGuard;
use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};
use serde::{Deserialize, Serialize};
use sha2::Sha224; // FIPS 180-4
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::io::BufReader;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use stowage_api_types::resource::PackageId;
use tempfile::NamedTempFile;

/// 28 base64 chars
pub type BareToken = [u8; 21];
const TOKEN_PREFIX: &str = "st1_";

/// Users, their hashed tokens and the owners of each package, in one `owners.json` file.
pub struct FsAuthProvider {
    owners_file_path: PathBuf,
    owners: RwLock<Option<Owners>>,
    /// 24 base64 chars in config
    pepper: [u8; 18],
}

impl FsAuthProvider {
    pub fn new(config: Config) -> AuthResult<Self> {
        std::fs::create_dir_all(&config.auth_path)
            .with_context(|| format!("Auth root at {}", config.auth_path.display()))
            .map_err(AuthError::ServiceError)?;
        let owners_file_path = config.auth_path.join("owners.json");
        Ok(Self {
            pepper: config.auth_tokens_pepper,
            owners_file_path,
            owners: RwLock::default(),
        })
    }

    #[allow(clippy::unused_self)]
    fn random_token(&self) -> BareToken {
        use rand::Rng;
        let mut token = [0; 21];
        rand::rng().fill(&mut token);
        token
    }

    fn token_to_str(&self, bare_token: &BareToken) -> String {
        let mut out = String::with_capacity(4 + bare_token.len() * 8 / 6);
        out.push_str(TOKEN_PREFIX);
        base64_serde::encode(bare_token, &mut out);
        out
    }

    fn token_from_str(&self, token_str: &str) -> AuthResult<HashedToken> {
        let rest = token_str.strip_prefix(TOKEN_PREFIX).ok_or(AuthError::InvalidCredentials)?;
        self.hash_token(&base64_serde::decode(rest).ok_or(AuthError::InvalidCredentials)?)
    }

    fn hash_token(&self, bare_token: &BareToken) -> AuthResult<HashedToken> {
        use hmac::{Hmac, Mac};
        let mut mac = Hmac::<Sha224>::new_from_slice(&self.pepper)
            .map_err(|_| AuthError::ServiceError(anyhow::anyhow!("unusable token pepper")))?;
        mac.update(bare_token);
        let hashed = mac.finalize().into_bytes();
        Ok(HashedToken(hashed.into()))
    }

    fn load_owners_file(&self) -> AuthResult<Owners> {
        if self.owners_file_path.try_exists().context("access to owners dir").map_err(AuthError::ServiceError)? {
            std::fs::File::open(&self.owners_file_path)
                .map(BufReader::new).context("read owners")
                .and_then(|r| serde_json::from_reader(r).context("parse owners"))
                .map_err(AuthError::ServiceError)
        } else {
            Ok(Owners::default())
        }
    }

    fn owners(&self) -> AuthResult<MappedRwLockReadGuard<'_, Owners>> {
        let mut read_lock = self.owners.read();
        loop {
            if let Ok(loaded) = RwLockReadGuard::try_map(read_lock, |x| x.as_ref()) {
                return Ok(loaded);
            }
            let mut locked = self.owners.write();
            if locked.is_none() {
                *locked = Some(self.load_owners_file()?);
            }
            read_lock = RwLockWriteGuard::downgrade(locked);
        }
    }

    fn owners_mut(&self) -> AuthResult<MappedRwLockWriteGuard<'_, Owners>> {
        let mut locked = self.owners.write();
        if locked.is_none() {
            *locked = Some(self.load_owners_file()?);
        }
        RwLockWriteGuard::try_map(locked, |x| x.as_mut())
            .map_err(|_| AuthError::ServiceError(anyhow::anyhow!("owners not loaded")))
    }

    fn sync_owners(&self, owners: &Owners) -> AuthResult<()> {
        fn inner(path: &Path, owners: &Owners) -> io::Result<()> {
            let parent = path.parent().ok_or(io::ErrorKind::InvalidInput)?;
            let mut tmp = NamedTempFile::new_in(parent)?;
            serde_json::to_writer(io::BufWriter::new(tmp.by_ref()), owners)?;
            tmp.persist(path)?;
            Ok(())
        }
        inner(&self.owners_file_path, owners)
            .context("saving owners").map_err(AuthError::ServiceError)
    }

    fn ensure_valid_token(&self, token_str: &str) -> AuthResult<()> {
        let hashed_token = self.token_from_str(token_str)?;
        self.owners()?.login_for_token(&hashed_token)?;
        Ok(())
    }

    fn ensure_owner(&self, token_str: &str, package: &PackageId) -> AuthResult<()> {
        let hashed_token = self.token_from_str(token_str)?;
        self.owners()?.ensure_authorized_for_package(&hashed_token, package.as_str())
    }
}

#[derive(Deserialize, Clone)]
pub struct Config {
    pub auth_path: PathBuf,
    #[serde(with = "base64_serde")]
    pub auth_tokens_pepper: [u8; 18],
}

#[async_trait]
impl AuthProvider for FsAuthProvider {
    type Config = Config;

    async fn healthcheck(&self) -> anyhow::Result<()> {
        let _ = self.owners()?;
        Ok(())
    }

    async fn register(&self, username: &str) -> AuthResult<String> {
        let owners = &mut *self.owners_mut()?;
        let bare_token = self.random_token();
        let hashed_token = self.hash_token(&bare_token)?;
        let token_str = self.token_to_str(&bare_token);
        owners.register(username, &hashed_token)?;
        self.sync_owners(owners)?;
        tracing::info!("Registered {username}");
        Ok(token_str)
    }

    async fn auth_declare(&self, token_str: &str, package: &PackageId) -> AuthResult<()> {
        let hashed_token = self.token_from_str(token_str)?;
        let owners = &mut *self.owners_mut()?;

        // nobody owns it yet, so the declarer takes it
        if !owners.package_owners.contains_key(package.as_str()) {
            let login = owners.login_for_token(&hashed_token)?.into();
            owners.package_owners.insert(package.as_str().into(), [login].into_iter().collect());
            self.sync_owners(owners)?;
            tracing::info!(%package, "New package owner");
            return Ok(());
        }

        owners.ensure_authorized_for_package(&hashed_token, package.as_str())
    }

    async fn auth_upload(&self, token_str: &str, package: &PackageId) -> AuthResult<()> {
        self.ensure_owner(token_str, package)
    }

    async fn auth_publish(&self, token_str: &str, package: &PackageId) -> AuthResult<()> {
        self.ensure_owner(token_str, package)
    }

    /// Any registered user may read any package.
    async fn auth_read(&self, token_str: &str, _package: &PackageId) -> AuthResult<()> {
        self.ensure_valid_token(token_str)
    }
}

#[derive(Serialize, Deserialize, Default)]
struct Owners {
    token_owners: HashMap<HashedToken, Box<str>>,
    package_owners: HashMap<Box<str>, BTreeSet<Box<str>>>,

    /// Reverse lookup index
    #[serde(skip, default)]
    owner_tokens: HashMap<Box<str>, HashedToken>,
}

impl Owners {
    pub fn register(&mut self, login: &str, token: &HashedToken) -> AuthResult<()> {
        if self.owner_tokens.is_empty() {
            self.owner_tokens = self.token_owners.iter().map(|(k, v)| (v.clone(), k.clone())).collect();
        }

        if self.owner_tokens.contains_key(login) {
            return Err(AuthError::Forbidden)
        }
        self.owner_tokens.insert(login.into(), token.clone());
        self.token_owners.insert(token.clone(), login.into());
        Ok(())
    }

    pub fn login_for_token(&self, token: &HashedToken) -> AuthResult<&str> {
        self.token_owners.get(token).map(|x| &**x).ok_or(AuthError::InvalidCredentials)
    }

    pub fn ensure_authorized_for_package(&self, hashed_token: &HashedToken, package: &str) -> AuthResult<()> {
        let login = self.login_for_token(hashed_token)?;
        let owners = self.package_owners.get(package).ok_or(AuthError::PackageNotFound)?;
        if owners.contains(login) {
            Ok(())
        } else {
            Err(AuthError::Forbidden)
        }
    }
}

/// Because it's hashed, it can have Eq without constant-time comparisons,
/// because attackers control only unhashed token, and won't be able to reliably
/// choose more than a few bytes for an oracle.
/// Additionally we have pepper, and hashtables using randomized siphash.
#[derive(Serialize, Deserialize, Clone, Eq, PartialEq, Hash)]
struct HashedToken(#[serde(with = "base64_serde")] [u8; 28]);

impl fmt::Debug for HashedToken {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("HashedToken")
    }
}

#[cfg(test)]
#[tokio::test]
async fn test_fs_tokens() {
    let dir = tempfile::tempdir().unwrap();
    let config = |pepper| Config { auth_path: dir.path().to_path_buf(), auth_tokens_pepper: [pepper; 18] };

    let wordpress: PackageId = "wordpress".parse().unwrap();
    let mysql: PackageId = "mysql".parse().unwrap();

    let auth = FsAuthProvider::new(config(123)).unwrap();
    let user1 = auth.register("user1").await.unwrap();
    let user2 = auth.register("user2").await.unwrap();
    assert_ne!(user1, user2);
    assert!(user1.starts_with("st1_"), "{user1}");
    assert!(matches!(auth.register("user1").await, Err(AuthError::Forbidden)));

    assert!(matches!(auth.auth_upload(&user1, &wordpress).await, Err(AuthError::PackageNotFound)));
    assert!(matches!(auth.auth_declare("badtoken", &wordpress).await, Err(AuthError::InvalidCredentials)));
    auth.auth_declare(&user1, &wordpress).await.unwrap();
    assert!(matches!(auth.auth_declare(&user2, &wordpress).await, Err(AuthError::Forbidden)));
    auth.auth_upload(&user1, &wordpress).await.unwrap();
    auth.auth_publish(&user1, &wordpress).await.unwrap();
    assert!(matches!(auth.auth_upload(&user2, &wordpress).await, Err(AuthError::Forbidden)));
    assert!(matches!(auth.auth_publish(&user2, &wordpress).await, Err(AuthError::Forbidden)));

    // anyone registered can read, even packages nobody owns
    auth.auth_read(&user2, &wordpress).await.unwrap();
    auth.auth_read(&user2, &mysql).await.unwrap();
    assert!(matches!(auth.auth_read("st1_nope", &wordpress).await, Err(AuthError::InvalidCredentials)));

    // reload
    let auth = FsAuthProvider::new(config(123)).unwrap();
    auth.auth_upload(&user1, &wordpress).await.unwrap();
    auth.auth_declare(&user2, &mysql).await.unwrap();
    auth.auth_publish(&user2, &mysql).await.unwrap();
    assert!(matches!(auth.auth_publish(&user1, &mysql).await, Err(AuthError::Forbidden)));

    // change pepper to invalidate all tokens
    let auth = FsAuthProvider::new(config(99)).unwrap();
    assert!(matches!(auth.auth_upload(&user1, &wordpress).await, Err(AuthError::InvalidCredentials)));
    assert!(matches!(auth.auth_read(&user2, &mysql).await, Err(AuthError::InvalidCredentials)));
}
