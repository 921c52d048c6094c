//! Hands out revision numbers from the counter kept in the package document.

use stowage_api_types::meta::{MetaError, MetadataStore};
use stowage_api_types::resource::{PackageId, ResourceError, ResourceResult, Revision};

/// Returns a revision greater than every revision previously allocated for `name`, even when
/// other processes allocate concurrently.
///
/// The counter is incremented atomically by the metadata store, so there is nothing to retry and
/// no lock is held by the catalog. A revision handed out here is consumed even if the upload that
/// asked for it fails later.
pub async fn next_revision<M>(meta: &M, package: &PackageId, name: &str) -> ResourceResult<Revision>
where
    M: MetadataStore + Send + Sync + ?Sized,
{
    let revision = meta
        .increment_revision_counter(package, name)
        .await
        .map_err(|e| match e {
            MetaError::NotFound => ResourceError::PackageNotFound(package.clone()),
            other => ResourceError::StorageUnavailable(other.into()),
        })?;

    tracing::debug!(%package, resource = name, revision, "Allocated revision");
    Ok(revision)
}
