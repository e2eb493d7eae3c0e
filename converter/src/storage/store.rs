use async_trait::async_trait;
use common::{Error, Result};
use futures::TryStreamExt;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use std::sync::Arc;
use tracing::debug;

use crate::storage::S3Manager;
use crate::storage::cache::ListingCache;
use crate::storage::s3::ObjectStorage;

/// [`ObjectStorage`] over any `object_store` backend.
pub struct ObjectStoreStorage {
    bucket: String,
    store: Arc<dyn ObjectStore>,
    listings: ListingCache,
}

impl ObjectStoreStorage {
    pub fn new(bucket: &str, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            bucket: bucket.to_string(),
            store,
            listings: ListingCache::new(),
        }
    }

    pub fn from_manager(s3_manager: &S3Manager, bucket: &str) -> Result<Self> {
        let store: Arc<dyn ObjectStore> = s3_manager.get_object_store(bucket)?;
        Ok(Self::new(bucket, store))
    }
}

// Keys are already escaped by the caller; `Path::from` would encode them again.
fn object_path(key: &str) -> Result<Path> {
    Path::parse(key).map_err(|e| Error::InvalidInput(format!("Invalid object key '{}': {}", key, e)))
}

#[async_trait]
impl ObjectStorage for ObjectStoreStorage {
    async fn put_object(&self, key: &str, data: &[u8]) -> Result<()> {
        let payload = PutPayload::from(data.to_vec());
        self.store.put(&object_path(key)?, payload).await?;
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        let result = self.store.get(&object_path(key)?).await?;
        Ok(result.bytes().await?.to_vec())
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>> {
        if let Some(keys) = self.listings.get(prefix) {
            debug!(bucket = %self.bucket, prefix, "Serving listing from cache");
            return Ok(keys);
        }

        let prefix_path = object_path(prefix)?;
        let keys: Vec<String> = self
            .store
            .list(Some(&prefix_path))
            .map_ok(|meta| meta.location.to_string())
            .try_collect()
            .await?;

        self.listings.insert(prefix, keys.clone());
        Ok(keys)
    }

    async fn check_file_exists(&self, key: &str) -> Result<bool> {
        match self.store.head(&object_path(key)?).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn invalidate_listing_cache(&self, prefix: &str) {
        self.listings.invalidate(prefix);
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }
}
