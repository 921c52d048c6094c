use async_trait::async_trait;
use bytes::BytesMut;
use futures_util::stream::{self, StreamExt, TryStreamExt};
use std::io;
use std::io::Write;
use std::path::{Path, PathBuf};
use stowage_api_types::storage::{
    BlobReader, BlobStore, BlobStream, Bytes, Metadata, MetadataStorageProvider, StorageError,
    StorageResult,
};
use tempfile::NamedTempFile;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

const READ_CHUNK: usize = 64 * 1024;

/// Whole-file storage in a local directory, for small documents.
pub struct FsStorageProvider {
    root: PathBuf,
}

impl FsStorageProvider {
    pub fn new(root: PathBuf) -> StorageResult<Self> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }
}

#[async_trait]
impl MetadataStorageProvider for FsStorageProvider {
    async fn pull_file(&self, path: &str) -> StorageResult<Bytes> {
        let data = tokio::fs::read(abs_path(&self.root, path)?).await?;
        Ok(data.into())
    }

    async fn put_file(&self, path: &str, file_bytes: Bytes, _meta: Metadata) -> StorageResult<()> {
        let path = abs_path(&self.root, path)?;
        let parent = parent_dir(&path)?;
        tokio::fs::create_dir_all(parent).await?;
        let mut tmp = NamedTempFile::new_in(parent)?;
        tmp.write_all(&file_bytes)?;
        tmp.persist(path)
            .map_err(|e| StorageError::ServiceError(e.into()))?;
        Ok(())
    }

    async fn delete_file(&self, path: &str) -> StorageResult<()> {
        tokio::fs::remove_file(abs_path(&self.root, path)?).await?;
        Ok(())
    }

    async fn healthcheck(&self) -> anyhow::Result<()> {
        check_dir(&self.root)
    }
}

/// Resource content in a local directory, fanned out by the first two characters of the name.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: PathBuf) -> StorageResult<Self> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn blob_path(&self, name: &str) -> StorageResult<PathBuf> {
        if name.len() < 3 || !name.bytes().all(|c| c.is_ascii_alphanumeric()) {
            return Err(StorageError::ServiceError(
                io::Error::new(io::ErrorKind::InvalidInput, format!("bad blob name {name:?}")).into(),
            ));
        }
        Ok(self.root.join(&name[..2]).join(name))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put_blob(&self, name: &str, mut content: BlobStream, expected_size: u64) -> StorageResult<()> {
        let path = self.blob_path(name)?;
        let parent = parent_dir(&path)?;
        tokio::fs::create_dir_all(parent).await?;

        // the temp path is removed on drop, so early returns leave nothing behind
        let (file, tmp_path) = NamedTempFile::new_in(parent)?.into_parts();
        let mut file = tokio::fs::File::from_std(file);

        let mut written = 0u64;
        while let Some(chunk) = content.try_next().await? {
            written += chunk.len() as u64;
            if written > expected_size {
                return Err(StorageError::SizeMismatch {
                    expected: expected_size,
                    actual: written,
                });
            }
            file.write_all(&chunk).await?;
        }
        if written != expected_size {
            return Err(StorageError::SizeMismatch {
                expected: expected_size,
                actual: written,
            });
        }
        file.sync_all().await?;
        drop(file);

        tmp_path
            .persist(&path)
            .map_err(|e| StorageError::ServiceError(e.into()))?;
        Ok(())
    }

    async fn open_blob(&self, name: &str) -> StorageResult<BlobReader> {
        let file = tokio::fs::File::open(self.blob_path(name)?).await?;
        let size = file.metadata().await?.len();

        let stream = stream::unfold(Some(file), |file| async move {
            let mut file = file?;
            let mut buf = BytesMut::with_capacity(READ_CHUNK);
            match file.read_buf(&mut buf).await {
                Ok(0) => None,
                Ok(_) => Some((Ok(buf.freeze()), Some(file))),
                Err(e) => Some((Err(e), None)),
            }
        });

        Ok(BlobReader {
            stream: stream.boxed(),
            size,
        })
    }

    async fn remove_blob(&self, name: &str) -> StorageResult<()> {
        tokio::fs::remove_file(self.blob_path(name)?).await?;
        Ok(())
    }

    async fn healthcheck(&self) -> anyhow::Result<()> {
        check_dir(&self.root)
    }
}

fn abs_path(root: &Path, path: &str) -> StorageResult<PathBuf> {
    let path = root.join(path);
    if !path.starts_with(root) || path.components().any(|c| c == std::path::Component::ParentDir) {
        return Err(StorageError::ServiceError(
            io::Error::from(io::ErrorKind::InvalidInput).into(),
        ));
    }
    Ok(path)
}

fn parent_dir(path: &Path) -> StorageResult<&Path> {
    path.parent().ok_or_else(|| {
        StorageError::ServiceError(io::Error::from(io::ErrorKind::InvalidInput).into())
    })
}

fn check_dir(root: &Path) -> anyhow::Result<()> {
    if root.is_dir() {
        Ok(())
    } else {
        anyhow::bail!("root not a dir")
    }
}
