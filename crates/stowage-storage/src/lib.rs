#![cfg_attr(docsrs, feature(doc_cfg))]

use anyhow::Context;
use serde::Deserialize;
use std::path::PathBuf;
use stowage_api_types::storage::BlobStore;

pub use stowage_api_types::storage::{StorageError, StorageResult};

pub mod fs;

pub mod s3_client;

/// Location and credentials of an S3-compatible bucket.
#[derive(Deserialize)]
pub struct BucketConfig {
    pub name: String,
    pub endpoint_url: String,
    pub region: String,
    pub access_key_id: Option<String>,
    pub access_key_secret: Option<String>,
}

impl BucketConfig {
    /// Missing credentials are read from `{env_prefix}_KEY_ID` and `{env_prefix}_KEY_SECRET`.
    pub fn connect(self, env_prefix: &str) -> anyhow::Result<s3_client::S3StorageProvider> {
        let key_id = match self.access_key_id {
            Some(id) => id,
            None => std::env::var(format!("{env_prefix}_KEY_ID")).with_context(|| {
                format!("Failed to find {env_prefix}_KEY_ID in environment variable or config")
            })?,
        };
        let key_secret = match self.access_key_secret {
            Some(secret) => secret,
            None => std::env::var(format!("{env_prefix}_KEY_SECRET")).with_context(|| {
                format!("Failed to find {env_prefix}_KEY_SECRET in environment variable or config")
            })?,
        };

        Ok(s3_client::S3StorageProvider::new(
            &self.name,
            &self.endpoint_url,
            &self.region,
            &key_id,
            &key_secret,
        ))
    }
}

#[derive(Deserialize)]
pub enum BlobStoreConfig {
    #[serde(rename = "blob_path")]
    Path(PathBuf),
    #[serde(rename = "blob_s3")]
    S3(BucketConfig),
}

impl BlobStoreConfig {
    pub fn build(self) -> anyhow::Result<Box<dyn BlobStore + Send + Sync>> {
        Ok(match self {
            Self::Path(root) => Box::new(
                fs::FsBlobStore::new(root).context("Failed to create the blob directory")?,
            ) as Box<dyn BlobStore + Send + Sync>,
            Self::S3(bucket) => Box::new(bucket.connect("STOWAGE_BLOB_BUCKET")?),
        })
    }
}
