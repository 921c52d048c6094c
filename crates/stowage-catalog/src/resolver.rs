//! Read-side views of declared resources, with placeholders for the ones never uploaded.

use crate::Catalog;
use futures_util::future::try_join_all;
use stowage_api_types::meta::MetadataStore;
use stowage_api_types::resource::{
    Channel, PackageDocument, ResourceError, ResourceResult, ResourceView, Revision,
};
use stowage_api_types::storage::BlobStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Channel(Channel),
    Revision(Revision),
}

pub struct Resolver<'c, M, B> {
    catalog: &'c Catalog<M, B>,
}

impl<M, B> Catalog<M, B> {
    pub fn resolver(&self) -> Resolver<'_, M, B> {
        Resolver { catalog: self }
    }
}

impl<M, B> Resolver<'_, M, B>
where
    M: MetadataStore + Send + Sync,
    B: BlobStore + Send + Sync,
{
    /// An undeclared name is still [`ResourceError::UnknownResource`], but a declared resource
    /// without a matching record becomes a placeholder.
    pub async fn resolve_one(
        &self,
        package: &PackageDocument,
        selector: &Selector,
        name: &str,
    ) -> ResourceResult<ResourceView> {
        let slot = package.slot(name)?.clone();
        let found = match selector {
            Selector::Channel(channel) => {
                self.catalog.resolve_for_channel(package, channel, name).await
            }
            Selector::Revision(revision) => self.catalog.get(package, name, *revision).await,
        };
        match found {
            Ok(record) => Ok(ResourceView::Uploaded { slot, record }),
            Err(ResourceError::ResourceNotFound(_)) => Ok(ResourceView::Placeholder { slot }),
            Err(e) => Err(e),
        }
    }

    /// One view per declared slot, ordered by name. Bundles have none.
    pub async fn resolve_all(
        &self,
        package: &PackageDocument,
        channel: &Channel,
    ) -> ResourceResult<Vec<ResourceView>> {
        if !package.supports_resources() {
            return Ok(Vec::new());
        }
        let selector = Selector::Channel(channel.clone());
        try_join_all(
            package
                .resources
                .keys()
                .map(|name| self.resolve_one(package, &selector, name)),
        )
        .await
    }
}
