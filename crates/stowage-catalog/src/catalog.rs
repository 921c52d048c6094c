use crate::allocator::next_revision;
use crate::blob_writer::{self, discard_blob};
use anyhow::anyhow;
use chrono::Utc;
use stowage_api_types::meta::{MetaError, MetadataStore};
use stowage_api_types::resource::{
    Channel, Fingerprint, PackageDeclaration, PackageDocument, PackageId, ResourceError,
    ResourceRecord, ResourceResult, Revision,
};
use stowage_api_types::storage::{BlobReader, BlobStore, BlobStream, StorageError};

/// The only place that creates resource records or moves publication pointers.
pub struct Catalog<M, B> {
    meta: M,
    blobs: B,
}

impl<M, B> Catalog<M, B> {
    pub fn new(meta: M, blobs: B) -> Self {
        Self { meta, blobs }
    }

    pub fn meta(&self) -> &M {
        &self.meta
    }

    pub fn blobs(&self) -> &B {
        &self.blobs
    }
}

impl<M, B> Catalog<M, B>
where
    M: MetadataStore + Send + Sync,
    B: BlobStore + Send + Sync,
{
    /// Creates the package document. Its kind and slots never change afterwards.
    pub async fn declare(
        &self,
        id: PackageId,
        declaration: PackageDeclaration,
    ) -> ResourceResult<PackageDocument> {
        let document = PackageDocument::from_declaration(id, declaration, Utc::now())?;
        match self.meta.insert_package(&document).await {
            Ok(()) => {}
            Err(MetaError::DuplicateKey(_)) => {
                return Err(ResourceError::DuplicatePackage(document.id));
            }
            Err(e) => return Err(unavailable(e)),
        }
        tracing::info!(package = %document.id, kind = ?document.kind, "Declared package");
        Ok(document)
    }

    pub async fn package(&self, id: &PackageId) -> ResourceResult<PackageDocument> {
        self.meta.find_package(id).await.map_err(|e| match e {
            MetaError::NotFound => ResourceError::PackageNotFound(id.clone()),
            other => unavailable(other),
        })
    }

    /// Stores a new revision of a declared resource.
    ///
    /// The blob is written and verified before any metadata is touched. If the record then
    /// fails to commit, the blob is removed again before the error is returned.
    pub async fn upload(
        &self,
        package: &PackageDocument,
        name: &str,
        content: BlobStream,
        declared_fingerprint: &Fingerprint,
        declared_size: u64,
    ) -> ResourceResult<ResourceRecord> {
        package.slot(name)?;
        let revision = next_revision(&self.meta, &package.id, name).await?;

        let blob_name =
            blob_writer::store(&self.blobs, content, declared_fingerprint, declared_size).await?;

        let record = ResourceRecord {
            package: package.id.clone(),
            name: name.to_owned(),
            revision,
            fingerprint: *declared_fingerprint,
            size: declared_size,
            blob_name,
            uploaded_at: Utc::now(),
        };

        if let Err(e) = self.meta.insert_resource(&record).await {
            discard_blob(&self.blobs, &record.blob_name).await;
            return Err(match e {
                MetaError::DuplicateKey(key) => {
                    ResourceError::AllocationConflict(format!("record {key} already exists"))
                }
                other => unavailable(other),
            });
        }

        tracing::info!(
            package = %record.package,
            resource = name,
            revision,
            blob = %record.blob_name,
            "Uploaded resource revision"
        );
        Ok(record)
    }

    pub async fn get(
        &self,
        package: &PackageDocument,
        name: &str,
        revision: Revision,
    ) -> ResourceResult<ResourceRecord> {
        package.slot(name)?;
        self.meta
            .find_resource(&package.id, name, revision)
            .await
            .map_err(|e| match e {
                MetaError::NotFound => {
                    ResourceError::ResourceNotFound(format!("{}/{name}/{revision}", package.id))
                }
                other => unavailable(other),
            })
    }

    /// The most recent upload, whether or not it was ever published.
    pub async fn latest(&self, package: &PackageDocument, name: &str) -> ResourceResult<ResourceRecord> {
        package.slot(name)?;
        self.meta
            .find_latest_resource(&package.id, name)
            .await
            .map_err(|e| match e {
                MetaError::NotFound => {
                    ResourceError::ResourceNotFound(format!("{}/{name} has no uploads", package.id))
                }
                other => unavailable(other),
            })
    }

    /// Makes `revision` the one visible for `name` on `channel`.
    ///
    /// The record must exist. The pointer itself is replaced with a single-document update, so
    /// concurrent publishes to the same pointer are last-writer-wins.
    pub async fn publish(
        &self,
        package: &PackageDocument,
        channel: &Channel,
        name: &str,
        revision: Revision,
    ) -> ResourceResult<()> {
        package.slot(name)?;
        if channel.is_unpublished() {
            return Err(ResourceError::BadChannel(channel.to_string()));
        }
        self.get(package, name, revision).await?;

        self.meta
            .set_published_revision(&package.id, channel.as_str(), name, revision)
            .await
            .map_err(|e| match e {
                MetaError::NotFound => ResourceError::PackageNotFound(package.id.clone()),
                other => unavailable(other),
            })?;

        tracing::info!(package = %package.id, resource = name, revision, %channel, "Published");
        Ok(())
    }

    /// What `channel` shows for `name`. A channel without a pointer for it has nothing to show,
    /// even if revisions have been uploaded.
    pub async fn resolve_for_channel(
        &self,
        package: &PackageDocument,
        channel: &Channel,
        name: &str,
    ) -> ResourceResult<ResourceRecord> {
        if channel.is_unpublished() {
            return self.latest(package, name).await;
        }
        package.slot(name)?;
        let revision = package
            .published_revision(channel.as_str(), name)
            .ok_or_else(|| {
                ResourceError::ResourceNotFound(format!(
                    "{}/{name} is not published to {channel}",
                    package.id
                ))
            })?;
        self.get(package, name, revision).await
    }

    /// Opens the content of a record for download.
    pub async fn open(&self, record: &ResourceRecord) -> ResourceResult<BlobReader> {
        let reader = self
            .blobs
            .open_blob(record.blob_name.as_str())
            .await
            .map_err(|e| match e {
                StorageError::ServiceError(e) => ResourceError::StorageUnavailable(e),
                other => {
                    tracing::error!(
                        package = %record.package,
                        resource = record.name,
                        revision = record.revision,
                        blob = %record.blob_name,
                        error = %other,
                        "Blob of a committed record can't be opened"
                    );
                    ResourceError::StorageUnavailable(other.into())
                }
            })?;

        if reader.size != record.size {
            tracing::error!(
                blob = %record.blob_name,
                expected = record.size,
                actual = reader.size,
                "Blob size differs from its record"
            );
            return Err(ResourceError::StorageUnavailable(anyhow!(
                "blob {} has {} bytes, its record says {}",
                record.blob_name,
                reader.size,
                record.size
            )));
        }
        Ok(reader)
    }
}

fn unavailable(e: MetaError) -> ResourceError {
    ResourceError::StorageUnavailable(e.into())
}
