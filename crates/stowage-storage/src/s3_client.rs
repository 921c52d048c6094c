//! Storage backend implementation for working with bucketing solutions compatible with the S3 API.
//!
//! This is currently built on the [`aws_sdk_s3`] crate.
//!
//! This client should do connection pooling, however the HTTP connection pool parameters are not
//! well tuned at the moment.
//!
//! Downloads are streamed from the bucket chunk by chunk. Uploads are not: the put API used here
//! wants the whole body up front, so [`BlobStore::put_blob`] collects the incoming stream into
//! memory before sending it. The stream is still consumed incrementally, so hashing and the size
//! limit apply while the body arrives, and an oversized body fails before it is fully buffered.

use anyhow::{bail, Context};
use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{AppName, BehaviorVersion, Config, Region};
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use bytes::BytesMut;
use futures_util::stream::{self, StreamExt, TryStreamExt};
use std::io;
use stowage_api_types::storage::{
    BlobReader, BlobStore, BlobStream, Bytes, Metadata, MetadataStorageProvider, StorageError,
    StorageResult,
};

/// Storage client for working with S3-compatible APIs.
///
/// See [the module-level docs](super::s3_client) for more information.
#[derive(Clone)]
pub struct S3StorageProvider {
    client: aws_sdk_s3::Client,
    bucket_name: String,
}

impl S3StorageProvider {
    #[must_use]
    pub fn new(
        bucket_name: &str,
        endpoint_url: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
    ) -> Self {
        let mut config = Config::builder()
            .behavior_version(BehaviorVersion::v2025_01_17())
            .region(Region::new(region.to_string()))
            .endpoint_url(endpoint_url)
            .credentials_provider(Credentials::from_keys(access_key, secret_key, None));
        if let Ok(app_name) = AppName::new("stowage") {
            config = config.app_name(app_name);
        }

        Self {
            client: aws_sdk_s3::Client::from_conf(config.build()),
            bucket_name: bucket_name.to_string(),
        }
    }

    async fn get_object(
        &self,
        path: String,
    ) -> StorageResult<aws_sdk_s3::operation::get_object::GetObjectOutput> {
        let resp = self
            .client
            .get_object()
            .bucket(self.bucket_name.clone())
            .key(path)
            .send()
            .await;

        // on 404, we return a different error variant
        if let Err(SdkError::ServiceError(e)) = &resp
            && e.err().is_no_such_key()
        {
            return Err(StorageError::NotFound);
        }

        Ok(resp.context("Storage response error")?)
    }

    async fn pull_object(&self, path: String) -> StorageResult<Bytes> {
        let resp = self.get_object(path).await?;
        let bytes = resp
            .body
            .collect()
            .await
            .context("Error while retrieving body")?
            .into_bytes();
        Ok(bytes)
    }

    async fn put_object(
        &self,
        path: String,
        file_bytes: ByteStream,
        meta: Metadata,
    ) -> StorageResult<()> {
        let mut obj = self
            .client
            .put_object()
            .bucket(self.bucket_name.clone())
            .key(path)
            .body(file_bytes);
        if let Some(len) = meta.content_length {
            obj = obj.content_length(len as _);
        }
        if let Some(ty) = meta.content_type {
            obj = obj.content_type(ty);
        }
        if let Some(cc) = meta.cache_control {
            obj = obj.cache_control(cc);
        }
        for (k, v) in meta.kv {
            obj = obj.metadata(k, v);
        }

        obj.send().await.context("Failed to put file")?;
        Ok(())
    }

    async fn delete_object(&self, path: String) -> StorageResult<()> {
        self.client
            .delete_object()
            .bucket(self.bucket_name.clone())
            .key(path)
            .send()
            .await
            .context("Failed to delete file")?;
        Ok(())
    }

    // check that we can actually contact the bucket
    async fn check_health_object(&self, path: &str) -> anyhow::Result<()> {
        for _ in 0..3 {
            match self.pull_object(path.into()).await {
                Ok(data) => {
                    if data.as_ref() == b"ok" {
                        return Ok(());
                    }

                    // not repaired: if corruption is occurring healthchecks should keep failing
                    // until manual intervention occurs
                    bail!("wrong data");
                }
                Err(StorageError::NotFound) => {
                    // fresh bucket, put the object there and retry the loop
                    self.put_object(
                        path.into(),
                        Bytes::from_static(b"ok").into(),
                        Metadata {
                            content_type: Some("text/plain"),
                            ..Metadata::default()
                        },
                    )
                    .await?;
                }
                Err(e) => bail!(e),
            }
        }

        // only plausible for eventually consistent stores right after they're stood up
        bail!("successfully put object but saw NotFound on pull 3 times");
    }
}

#[async_trait]
impl MetadataStorageProvider for S3StorageProvider {
    async fn pull_file(&self, path: &str) -> StorageResult<Bytes> {
        self.pull_object(path.into()).await
    }

    async fn put_file(&self, path: &str, file_bytes: Bytes, meta: Metadata) -> StorageResult<()> {
        self.put_object(path.into(), file_bytes.into(), meta).await
    }

    async fn delete_file(&self, path: &str) -> StorageResult<()> {
        self.delete_object(path.into()).await
    }

    async fn healthcheck(&self) -> anyhow::Result<()> {
        self.check_health_object(".healthcheck-meta").await
    }
}

#[async_trait]
impl BlobStore for S3StorageProvider {
    async fn put_blob(&self, name: &str, content: BlobStream, expected_size: u64) -> StorageResult<()> {
        let capacity = usize::try_from(expected_size).unwrap_or(usize::MAX).min(1 << 24);
        let body = content
            .map_err(StorageError::from)
            .try_fold(BytesMut::with_capacity(capacity), |mut acc, chunk| async move {
                let actual = (acc.len() + chunk.len()) as u64;
                if actual > expected_size {
                    return Err(StorageError::SizeMismatch {
                        expected: expected_size,
                        actual,
                    });
                }
                acc.extend_from_slice(&chunk);
                Ok(acc)
            })
            .await?;

        if body.len() as u64 != expected_size {
            return Err(StorageError::SizeMismatch {
                expected: expected_size,
                actual: body.len() as u64,
            });
        }

        let len = body.len();
        self.put_object(
            blob_key(name),
            body.freeze().into(),
            Metadata {
                content_type: Some("application/octet-stream"),
                content_length: Some(len),
                cache_control: Some("public,immutable".into()),
                ..Metadata::default()
            },
        )
        .await
    }

    async fn open_blob(&self, name: &str) -> StorageResult<BlobReader> {
        let resp = self.get_object(blob_key(name)).await?;
        let size = resp
            .content_length()
            .and_then(|len| u64::try_from(len).ok())
            .context("Bucket didn't report the object length")?;

        let stream = stream::unfold(resp.body, |mut body| async move {
            let chunk = body.next().await?;
            Some((chunk.map_err(io::Error::other), body))
        });

        Ok(BlobReader {
            stream: stream.boxed(),
            size,
        })
    }

    async fn remove_blob(&self, name: &str) -> StorageResult<()> {
        self.delete_object(blob_key(name)).await
    }

    async fn healthcheck(&self) -> anyhow::Result<()> {
        self.check_health_object(".healthcheck-data").await
    }
}

#[inline(always)]
fn blob_key(name: &str) -> String {
    format!("resources/{name}")
}
