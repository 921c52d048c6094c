//! Metadata store backed by PostgreSQL.
//!
//! Every operation is a single statement on a single row, so several service instances may share
//! one database. The tables are described in `sql/schema.sql`.

use anyhow::Context;
use async_trait::async_trait;
use deadpool_postgres::tokio_postgres::{NoTls, Row};
use deadpool_postgres::{GenericClient, Object, Pool, Runtime};
use postgres_types::Json;
use serde::Deserialize;
use stowage_api_types::meta::{MetaError, MetaResult, MetadataStore};
use stowage_api_types::resource::{
    BlobName, PackageDocument, PackageId, ResourceRecord, Revision,
};

#[derive(Deserialize)]
pub struct Config {
    pub meta_db: deadpool_postgres::Config,
}

pub struct PgMetadataStore {
    pool: Pool,
}

impl PgMetadataStore {
    pub fn new(config: Config) -> MetaResult<Self> {
        let pool = config
            .meta_db
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .context("Failed to create metadata db pool")?;

        Ok(Self { pool })
    }

    async fn client(&self) -> MetaResult<Object> {
        Ok(self
            .pool
            .get()
            .await
            .context("Failed to get metadata db client from pool")?)
    }

    async fn query_resource(
        &self,
        sql: &str,
        params: &[&(dyn postgres_types::ToSql + Sync)],
    ) -> MetaResult<ResourceRecord> {
        let client = self.client().await?;

        let statement = client
            .prepare_cached(sql)
            .await
            .context("Failed to prepare resource lookup statement")?;

        let row = client
            .query_opt(&statement, params)
            .await
            .context("Failed to look up resource")?
            .ok_or(MetaError::NotFound)?;

        record_from_row(&row)
    }
}

#[async_trait]
impl MetadataStore for PgMetadataStore {
    type Config = Config;

    async fn healthcheck(&self) -> anyhow::Result<()> {
        let client = self.client().await?;
        client
            .query_one("SELECT 1", &[])
            .await
            .context("Failed to query metadata db")?;
        Ok(())
    }

    async fn find_package(&self, id: &PackageId) -> MetaResult<PackageDocument> {
        let client = self.client().await?;

        let statement = client
            .prepare_cached(include_str!("../sql/get-package.sql"))
            .await
            .context("Failed to prepare package lookup statement")?;

        let row = client
            .query_opt(&statement, &[&id.as_str()])
            .await
            .context("Failed to look up package")?
            .ok_or(MetaError::NotFound)?;

        package_from_row(&row)
    }

    async fn insert_package(&self, package: &PackageDocument) -> MetaResult<()> {
        let client = self.client().await?;

        let statement = client
            .prepare_cached(include_str!("../sql/insert-package.sql"))
            .await
            .context("Failed to prepare package insert statement")?;

        let inserted = client
            .execute(
                &statement,
                &[
                    &package.id.as_str(),
                    &package.kind,
                    &package.public,
                    &Json(&package.resources),
                    &Json(&package.published),
                    &Json(&package.revision_counters),
                    &package.created_at,
                ],
            )
            .await
            .context("Failed to insert package")?;

        if inserted == 0 {
            return Err(MetaError::DuplicateKey(package.id.to_string()));
        }
        Ok(())
    }

    async fn increment_revision_counter(&self, id: &PackageId, name: &str) -> MetaResult<Revision> {
        let client = self.client().await?;

        let statement = client
            .prepare_cached(include_str!("../sql/increment-revision-counter.sql"))
            .await
            .context("Failed to prepare revision counter statement")?;

        // the row lock taken by the update serializes concurrent increments
        let row = client
            .query_opt(&statement, &[&id.as_str(), &name])
            .await
            .context("Failed to increment revision counter")?
            .ok_or(MetaError::NotFound)?;

        from_db(row.try_get("revision").context("Bad revision counter")?)
    }

    async fn set_published_revision(
        &self,
        id: &PackageId,
        channel: &str,
        name: &str,
        revision: Revision,
    ) -> MetaResult<()> {
        let client = self.client().await?;

        let statement = client
            .prepare_cached(include_str!("../sql/set-published-revision.sql"))
            .await
            .context("Failed to prepare publish statement")?;

        let updated = client
            .execute(&statement, &[&id.as_str(), &channel, &name, &to_db(revision)?])
            .await
            .context("Failed to set published revision")?;

        if updated == 0 {
            return Err(MetaError::NotFound);
        }
        Ok(())
    }

    async fn find_resource(
        &self,
        id: &PackageId,
        name: &str,
        revision: Revision,
    ) -> MetaResult<ResourceRecord> {
        self.query_resource(
            include_str!("../sql/get-resource.sql"),
            &[&id.as_str(), &name, &to_db(revision)?],
        )
        .await
    }

    async fn find_latest_resource(&self, id: &PackageId, name: &str) -> MetaResult<ResourceRecord> {
        self.query_resource(
            include_str!("../sql/get-latest-resource.sql"),
            &[&id.as_str(), &name],
        )
        .await
    }

    async fn insert_resource(&self, record: &ResourceRecord) -> MetaResult<()> {
        let client = self.client().await?;

        let statement = client
            .prepare_cached(include_str!("../sql/insert-resource.sql"))
            .await
            .context("Failed to prepare resource insert statement")?;

        let inserted = client
            .execute(
                &statement,
                &[
                    &record.package.as_str(),
                    &record.name,
                    &to_db(record.revision)?,
                    &record.fingerprint.to_string(),
                    &to_db(record.size)?,
                    &record.blob_name.as_str(),
                    &record.uploaded_at,
                ],
            )
            .await
            .context("Failed to insert resource")?;

        if inserted == 0 {
            return Err(MetaError::DuplicateKey(format!(
                "{}/{}/{}",
                record.package, record.name, record.revision
            )));
        }
        Ok(())
    }
}

fn to_db(n: u64) -> MetaResult<i64> {
    Ok(i64::try_from(n).context("Number out of range for the database")?)
}

fn from_db(n: i64) -> MetaResult<u64> {
    Ok(u64::try_from(n).context("Negative number in the database")?)
}

fn package_from_row(row: &Row) -> MetaResult<PackageDocument> {
    let id: String = row.try_get("id").context("Bad package row")?;
    let Json(resources) = row.try_get("resources").context("Bad package resources")?;
    let Json(published) = row.try_get("published").context("Bad package pointers")?;
    let Json(revision_counters) = row
        .try_get("revision_counters")
        .context("Bad package revision counters")?;

    Ok(PackageDocument {
        id: id.parse().context("Bad package id in the database")?,
        kind: row.try_get("kind").context("Bad package kind")?,
        public: row.try_get("public").context("Bad package row")?,
        resources,
        published,
        revision_counters,
        created_at: row.try_get("created_at").context("Bad package row")?,
    })
}

fn record_from_row(row: &Row) -> MetaResult<ResourceRecord> {
    let package: String = row.try_get("package_id").context("Bad resource row")?;
    let fingerprint: String = row.try_get("fingerprint").context("Bad resource row")?;
    let blob_name: String = row.try_get("blob_name").context("Bad resource row")?;

    Ok(ResourceRecord {
        package: package.parse().context("Bad package id in the database")?,
        name: row.try_get("name").context("Bad resource row")?,
        revision: from_db(row.try_get("revision").context("Bad resource row")?)?,
        fingerprint: fingerprint
            .parse()
            .context("Bad fingerprint in the database")?,
        size: from_db(row.try_get("size").context("Bad resource row")?)?,
        blob_name: BlobName::new(blob_name),
        uploaded_at: row.try_get("uploaded_at").context("Bad resource row")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_numbers_stay_in_range() {
        assert_eq!(to_db(5).unwrap(), 5);
        assert!(to_db(u64::MAX).is_err());
        assert_eq!(from_db(0).unwrap(), 0);
        assert!(from_db(-1).is_err());
    }

    #[test]
    fn config_reads_meta_db() {
        let config: Config = serde_yaml::from_str(
            "meta_db:\n  host: localhost\n  dbname: stowage\n  user: stowage\n",
        )
        .unwrap();
        assert_eq!(config.meta_db.dbname.as_deref(), Some("stowage"));
    }
}
