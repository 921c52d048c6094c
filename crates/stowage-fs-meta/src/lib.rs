//! Metadata store keeping one JSON document per package and one JSON-lines file of records per
//! resource name, on a local directory or an S3 bucket.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use stowage_api_types::meta::{MetaError, MetaResult, MetadataStore};
use stowage_api_types::resource::{PackageDocument, PackageId, ResourceRecord, Revision};
use stowage_api_types::storage::MetadataStorageProvider;
use stowage_storage::fs::FsStorageProvider;
use stowage_storage::BucketConfig;

mod file_locks;
use file_locks::{AccessLocks, DocumentPath};

pub struct FsMetadataStore {
    document_locks: AccessLocks<String>,
    fs: Box<dyn MetadataStorageProvider + Send + Sync>,
}

#[derive(Deserialize)]
pub enum Config {
    #[serde(rename = "meta_path")]
    Path(PathBuf),
    #[serde(rename = "meta_s3")]
    S3(BucketConfig),
}

impl FsMetadataStore {
    pub fn new(config: Config) -> MetaResult<Self> {
        let fs = match config {
            Config::Path(root) => Box::new(FsStorageProvider::new(root)?)
                as Box<dyn MetadataStorageProvider + Send + Sync>,
            Config::S3(bucket) => Box::new(bucket.connect("STOWAGE_META_BUCKET")?),
        };
        Ok(Self {
            fs,
            document_locks: AccessLocks::new(),
        })
    }

    fn package_document(&self, id: &PackageId) -> DocumentPath<'_> {
        DocumentPath::new(
            &*self.fs,
            &self.document_locks,
            format!("packages/{id}.json"),
        )
    }

    /// Resource names are validated when the package is declared, but records may be asked
    /// for under any name.
    fn resource_records(&self, id: &PackageId, name: &str) -> MetaResult<DocumentPath<'_>> {
        if !stowage_api_types::resource::is_valid_resource_name(name) {
            return Err(MetaError::NotFound);
        }
        Ok(DocumentPath::new(
            &*self.fs,
            &self.document_locks,
            format!("resources/{id}/{name}.jsonl"),
        ))
    }

    /// Read-modify-write of a package document under its exclusive lock. Nothing is stored if
    /// `update` fails.
    async fn update_package<T>(
        &self,
        id: &PackageId,
        update: impl FnOnce(&mut PackageDocument) -> MetaResult<T> + Send,
    ) -> MetaResult<T> {
        let path = self.package_document(id);
        let doc = path.exclusive().await;

        let mut package: PackageDocument = doc.load().await?;
        let updated = update(&mut package)?;
        doc.store(&package).await?;
        Ok(updated)
    }
}

#[async_trait]
impl MetadataStore for FsMetadataStore {
    type Config = Config;

    async fn healthcheck(&self) -> anyhow::Result<()> {
        self.fs.healthcheck().await?;
        Ok(())
    }

    async fn find_package(&self, id: &PackageId) -> MetaResult<PackageDocument> {
        self.package_document(id).shared().await.load().await
    }

    async fn insert_package(&self, package: &PackageDocument) -> MetaResult<()> {
        let path = self.package_document(&package.id);
        let doc = path.exclusive().await;

        match doc.load::<PackageDocument>().await {
            Ok(_) => return Err(MetaError::DuplicateKey(package.id.to_string())),
            Err(MetaError::NotFound) => {}
            Err(other) => return Err(other),
        }
        doc.store(package).await
    }

    async fn increment_revision_counter(&self, id: &PackageId, name: &str) -> MetaResult<Revision> {
        self.update_package(id, |package| {
            package.take_revision(name).ok_or_else(|| {
                MetaError::ServiceError(anyhow::anyhow!("revision counter of {id}/{name} is exhausted"))
            })
        })
        .await
    }

    async fn set_published_revision(
        &self,
        id: &PackageId,
        channel: &str,
        name: &str,
        revision: Revision,
    ) -> MetaResult<()> {
        self.update_package(id, |package| {
            package
                .published
                .entry(channel.to_owned())
                .or_default()
                .insert(name.to_owned(), revision);
            Ok(())
        })
        .await
    }

    async fn find_resource(
        &self,
        id: &PackageId,
        name: &str,
        revision: Revision,
    ) -> MetaResult<ResourceRecord> {
        self.resource_records(id, name)?
            .shared()
            .await
            .load_lines::<ResourceRecord>()
            .await?
            .into_iter()
            .rfind(|r| r.revision == revision)
            .ok_or(MetaError::NotFound)
    }

    async fn find_latest_resource(&self, id: &PackageId, name: &str) -> MetaResult<ResourceRecord> {
        self.resource_records(id, name)?
            .shared()
            .await
            .load_lines::<ResourceRecord>()
            .await?
            .into_iter()
            .max_by_key(|r| r.revision)
            .ok_or(MetaError::NotFound)
    }

    async fn insert_resource(&self, record: &ResourceRecord) -> MetaResult<()> {
        let path = self.resource_records(&record.package, &record.name)?;
        let doc = path.exclusive().await;

        let mut records: Vec<ResourceRecord> = doc.load_lines().await?;
        if records.iter().any(|r| r.revision == record.revision) {
            return Err(MetaError::DuplicateKey(format!(
                "{}/{}/{}",
                record.package, record.name, record.revision
            )));
        }
        records.push(record.clone());
        doc.store_lines(&records).await
    }
}
