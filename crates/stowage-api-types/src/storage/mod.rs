pub use bytes::Bytes;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use std::collections::HashMap;
use std::io;

pub use error::{StorageError, StorageResult};

mod error;

/// Blob content as it flows between the HTTP layer and a blob store.
pub type BlobStream = BoxStream<'static, io::Result<Bytes>>;

pub struct BlobReader {
    pub stream: BlobStream,
    pub size: u64,
}

/// Opaque-name object storage for resource content.
///
/// Names are always chosen by the caller. Implementations store bytes verbatim and don't
/// interpret or validate the content.
#[async_trait]
pub trait BlobStore {
    /// Stores `content` under `name`.
    ///
    /// Fails with [`StorageError::SizeMismatch`] if the stream doesn't yield exactly
    /// `expected_size` bytes, in which case nothing is left behind under `name`.
    async fn put_blob(&self, name: &str, content: BlobStream, expected_size: u64) -> StorageResult<()>;

    async fn open_blob(&self, name: &str) -> StorageResult<BlobReader>;

    /// Called to undo a put when its content is rejected or its record fails to commit.
    async fn remove_blob(&self, name: &str) -> StorageResult<()>;

    async fn healthcheck(&self) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct Metadata {
    pub content_type: Option<&'static str>,
    pub content_length: Option<usize>,
    pub cache_control: Option<String>,
    pub kv: HashMap<String, String>,
}

/// Small whole-file storage used by document-oriented metadata backends.
#[async_trait]
pub trait MetadataStorageProvider {
    async fn pull_file(&self, path: &str) -> StorageResult<Bytes>;
    async fn put_file(&self, path: &str, file_bytes: Bytes, meta: Metadata) -> StorageResult<()>;
    async fn delete_file(&self, path: &str) -> StorageResult<()>;

    async fn healthcheck(&self) -> anyhow::Result<()>;
}

#[async_trait]
impl<T: BlobStore + Send + Sync + ?Sized> BlobStore for Box<T> {
    async fn put_blob(&self, name: &str, content: BlobStream, expected_size: u64) -> StorageResult<()> {
        (**self).put_blob(name, content, expected_size).await
    }

    async fn open_blob(&self, name: &str) -> StorageResult<BlobReader> {
        (**self).open_blob(name).await
    }

    async fn remove_blob(&self, name: &str) -> StorageResult<()> {
        (**self).remove_blob(name).await
    }

    async fn healthcheck(&self) -> anyhow::Result<()> {
        (**self).healthcheck().await
    }
}
