#![allow(dead_code)]

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::stream::{self, StreamExt, TryStreamExt};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use stowage_api_types::meta::{MetaError, MetaResult, MetadataStore};
use stowage_api_types::resource::{
    PackageDeclaration, PackageDocument, PackageId, PackageKind, ResourceRecord, ResourceSlot,
    ResourceType, Revision,
};
use stowage_api_types::storage::{BlobReader, BlobStore, BlobStream, StorageError, StorageResult};
use stowage_catalog::Catalog;

pub type TestCatalog = Catalog<MemoryMetadataStore, MemoryBlobStore>;

#[derive(Default)]
pub struct MemoryMetadataStore {
    pub packages: Mutex<BTreeMap<PackageId, PackageDocument>>,
    pub records: Mutex<BTreeMap<(PackageId, String, Revision), ResourceRecord>>,
    /// Makes every record insert fail as if the database went away.
    pub fail_record_inserts: AtomicBool,
    pub allocations: AtomicUsize,
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    type Config = ();

    async fn healthcheck(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn find_package(&self, id: &PackageId) -> MetaResult<PackageDocument> {
        tokio::task::yield_now().await;
        self.packages.lock().get(id).cloned().ok_or(MetaError::NotFound)
    }

    async fn insert_package(&self, package: &PackageDocument) -> MetaResult<()> {
        let mut packages = self.packages.lock();
        if packages.contains_key(&package.id) {
            return Err(MetaError::DuplicateKey(package.id.to_string()));
        }
        packages.insert(package.id.clone(), package.clone());
        Ok(())
    }

    async fn increment_revision_counter(&self, id: &PackageId, name: &str) -> MetaResult<Revision> {
        self.allocations.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        let mut packages = self.packages.lock();
        let package = packages.get_mut(id).ok_or(MetaError::NotFound)?;
        package
            .take_revision(name)
            .ok_or_else(|| MetaError::ServiceError(anyhow::anyhow!("counter exhausted")))
    }

    async fn set_published_revision(
        &self,
        id: &PackageId,
        channel: &str,
        name: &str,
        revision: Revision,
    ) -> MetaResult<()> {
        let mut packages = self.packages.lock();
        let package = packages.get_mut(id).ok_or(MetaError::NotFound)?;
        package
            .published
            .entry(channel.to_owned())
            .or_default()
            .insert(name.to_owned(), revision);
        Ok(())
    }

    async fn find_resource(
        &self,
        id: &PackageId,
        name: &str,
        revision: Revision,
    ) -> MetaResult<ResourceRecord> {
        self.records
            .lock()
            .get(&(id.clone(), name.to_owned(), revision))
            .cloned()
            .ok_or(MetaError::NotFound)
    }

    async fn find_latest_resource(&self, id: &PackageId, name: &str) -> MetaResult<ResourceRecord> {
        self.records
            .lock()
            .values()
            .filter(|r| &r.package == id && r.name == name)
            .max_by_key(|r| r.revision)
            .cloned()
            .ok_or(MetaError::NotFound)
    }

    async fn insert_resource(&self, record: &ResourceRecord) -> MetaResult<()> {
        if self.fail_record_inserts.load(Ordering::SeqCst) {
            return Err(MetaError::ServiceError(anyhow::anyhow!("injected failure")));
        }
        let key = (record.package.clone(), record.name.clone(), record.revision);
        let mut records = self.records.lock();
        if records.contains_key(&key) {
            return Err(MetaError::DuplicateKey(format!("{key:?}")));
        }
        records.insert(key, record.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryBlobStore {
    pub blobs: Mutex<HashMap<String, Bytes>>,
    pub fail_puts: AtomicBool,
    pub fail_removes: AtomicBool,
}

impl MemoryBlobStore {
    pub fn len(&self) -> usize {
        self.blobs.lock().len()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put_blob(&self, name: &str, content: BlobStream, expected_size: u64) -> StorageResult<()> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StorageError::ServiceError(anyhow::anyhow!("injected failure")));
        }
        let data = content
            .try_fold(BytesMut::new(), |mut acc, chunk| async move {
                acc.extend_from_slice(&chunk);
                Ok(acc)
            })
            .await?;
        if data.len() as u64 != expected_size {
            return Err(StorageError::SizeMismatch {
                expected: expected_size,
                actual: data.len() as u64,
            });
        }
        self.blobs.lock().insert(name.to_owned(), data.freeze());
        Ok(())
    }

    async fn open_blob(&self, name: &str) -> StorageResult<BlobReader> {
        let data = self.blobs.lock().get(name).cloned().ok_or(StorageError::NotFound)?;
        Ok(BlobReader {
            size: data.len() as u64,
            stream: stream::iter([Ok(data)]).boxed(),
        })
    }

    async fn remove_blob(&self, name: &str) -> StorageResult<()> {
        if self.fail_removes.load(Ordering::SeqCst) {
            return Err(StorageError::ServiceError(anyhow::anyhow!("injected failure")));
        }
        self.blobs.lock().remove(name).map(drop).ok_or(StorageError::NotFound)
    }

    async fn healthcheck(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

pub fn catalog() -> TestCatalog {
    let _ = tracing_subscriber::fmt::fmt().with_test_writer().try_init();
    Catalog::new(MemoryMetadataStore::default(), MemoryBlobStore::default())
}

pub fn slot(name: &str) -> ResourceSlot {
    ResourceSlot {
        name: name.to_owned(),
        kind: ResourceType::File,
        path: format!("{name}.tgz"),
        description: format!("the {name} resource"),
    }
}

pub async fn declare(catalog: &TestCatalog, id: &str, slots: &[&str]) -> PackageDocument {
    catalog
        .declare(
            id.parse().unwrap(),
            PackageDeclaration {
                kind: PackageKind::Charm,
                public: true,
                resources: slots.iter().map(|name| slot(name)).collect(),
            },
        )
        .await
        .unwrap()
}

/// Content split into a few chunks, like a request body would be.
pub fn content(data: &'static [u8]) -> BlobStream {
    let chunks: Vec<io::Result<Bytes>> = data
        .chunks(3)
        .map(|c| Ok(Bytes::from_static(c)))
        .collect();
    stream::iter(chunks).boxed()
}

/// A body whose sender goes away after the first chunk.
pub fn interrupted(data: &'static [u8]) -> BlobStream {
    let chunks: Vec<io::Result<Bytes>> = vec![
        Ok(Bytes::from_static(&data[..data.len() / 2])),
        Err(io::Error::new(io::ErrorKind::ConnectionReset, "client went away")),
    ];
    stream::iter(chunks).boxed()
}

pub async fn read_all(reader: BlobReader) -> Vec<u8> {
    reader
        .stream
        .try_fold(Vec::new(), |mut acc, chunk| async move {
            acc.extend_from_slice(&chunk);
            Ok(acc)
        })
        .await
        .unwrap()
}
