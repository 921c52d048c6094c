//! The document metadata store the catalog keeps package documents and resource records in.
//!
//! The store is only expected to offer single-document atomicity: an insert that fails on
//! duplicate keys, and atomic read-modify-write updates of one package document. The catalog
//! never relies on transactions spanning more than one document.

use crate::resource::{PackageDocument, PackageId, ResourceRecord, Revision};
use async_trait::async_trait;

pub use error::{MetaError, MetaResult};

mod error;

#[async_trait]
pub trait MetadataStore {
    type Config;

    async fn healthcheck(&self) -> anyhow::Result<()>;

    async fn find_package(&self, id: &PackageId) -> MetaResult<PackageDocument>;

    /// Insert a new package document, failing with [`MetaError::DuplicateKey`] if the id is taken.
    async fn insert_package(&self, package: &PackageDocument) -> MetaResult<()>;

    /// Atomically increment the revision counter for `name` and return its previous value (a
    /// missing counter reads as zero).
    ///
    /// Concurrent callers, including other processes sharing the store, never get the same value.
    async fn increment_revision_counter(&self, id: &PackageId, name: &str) -> MetaResult<Revision>;

    /// Point `channel`/`name` of the package at `revision`, overwriting any previous pointer.
    async fn set_published_revision(
        &self,
        id: &PackageId,
        channel: &str,
        name: &str,
        revision: Revision,
    ) -> MetaResult<()>;

    async fn find_resource(
        &self,
        id: &PackageId,
        name: &str,
        revision: Revision,
    ) -> MetaResult<ResourceRecord>;

    /// The record with the highest revision for `name`.
    async fn find_latest_resource(&self, id: &PackageId, name: &str) -> MetaResult<ResourceRecord>;

    /// Insert a record, failing with [`MetaError::DuplicateKey`] if the
    /// (package, name, revision) triple already exists.
    async fn insert_resource(&self, record: &ResourceRecord) -> MetaResult<()>;
}
