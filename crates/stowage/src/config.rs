use serde::Deserialize;
use stowage_api_types::meta::MetadataStore;
use stowage_auth::AuthProvider;
use stowage_server::ServiceConfig;
use stowage_storage::BlobStoreConfig;

#[derive(Deserialize)]
pub struct Config<M: MetadataStore, A: AuthProvider> {
    pub service: ServiceConfig,
    #[serde(flatten)]
    pub meta_config: M::Config,
    #[serde(flatten)]
    pub auth_config: A::Config,
    pub blob_store: BlobStoreConfig,
}
