pub mod cache;
pub mod s3;
pub mod store;

use aws_sdk_s3::Client as S3Client;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use common::Result;
use common::config::{MinioConfig, StorageBackend};
use object_store::aws::AmazonS3Builder;
use std::sync::Arc;
use tracing::info;
use url::Url;

use self::s3::{ObjectStorage, S3Storage};
use self::store::ObjectStoreStorage;

#[derive(Clone)]
pub struct S3Config {
    pub endpoint: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
}

impl From<&MinioConfig> for S3Config {
    fn from(config: &MinioConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            region: config.region.clone(),
            access_key: config.access_key.clone(),
            secret_key: config.secret_key.clone(),
        }
    }
}

/// Builds and caches per-bucket clients for both the AWS SDK and the
/// `object_store` backends.
#[derive(Clone)]
pub struct S3Manager {
    pub config: S3Config,
    client_cache: Arc<dashmap::DashMap<String, Arc<S3Client>>>,
    object_store_cache: Arc<dashmap::DashMap<String, Arc<object_store::aws::AmazonS3>>>,
}

impl S3Manager {
    pub fn new(config: S3Config) -> Result<Self> {
        // Fail at startup on an endpoint the SDK would only reject per request.
        Url::parse(&config.endpoint)?;

        Ok(Self {
            config,
            client_cache: Arc::new(dashmap::DashMap::new()),
            object_store_cache: Arc::new(dashmap::DashMap::new()),
        })
    }

    pub fn get_client(&self, bucket: &str) -> Arc<S3Client> {
        if let Some(client) = self.client_cache.get(bucket) {
            return client.clone();
        }

        let credentials = Credentials::new(
            &self.config.access_key,
            &self.config.secret_key,
            None,
            None,
            "static",
        );

        let s3_config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&self.config.endpoint)
            .region(Region::new(self.config.region.clone()))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        let client = Arc::new(aws_sdk_s3::Client::from_conf(s3_config));
        self.client_cache.insert(bucket.to_string(), client.clone());
        client
    }

    pub fn get_object_store(&self, bucket: &str) -> Result<Arc<object_store::aws::AmazonS3>> {
        if let Some(store) = self.object_store_cache.get(bucket) {
            return Ok(store.clone());
        }

        let s3 = AmazonS3Builder::new()
            .with_bucket_name(bucket)
            .with_region(&self.config.region)
            .with_access_key_id(&self.config.access_key)
            .with_secret_access_key(&self.config.secret_key)
            .with_endpoint(&self.config.endpoint)
            .with_allow_http(true)
            .build()?;

        let store = Arc::new(s3);
        self.object_store_cache
            .insert(bucket.to_string(), store.clone());
        Ok(store)
    }

    /// Verifies that a bucket exists and is accessible
    pub async fn verify_bucket_exists(&self, bucket: &str) -> Result<()> {
        let client = self.get_client(bucket);

        match client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(()),
            Err(e) => Err(common::Error::Storage(format!(
                "Cannot access bucket '{}': {}",
                bucket, e
            ))),
        }
    }
}

/// Opens the watched bucket with the configured backend.
pub async fn open_bucket(config: &MinioConfig) -> Result<Arc<dyn ObjectStorage>> {
    let s3_manager = Arc::new(S3Manager::new(S3Config::from(config))?);
    s3_manager.verify_bucket_exists(&config.bucket).await?;

    info!(
        bucket = %config.bucket,
        endpoint = %config.endpoint,
        backend = ?config.backend,
        "Opened object storage"
    );

    let storage: Arc<dyn ObjectStorage> = match config.backend {
        StorageBackend::AwsSdk => Arc::new(S3Storage::new(s3_manager, &config.bucket)),
        StorageBackend::ObjectStore => {
            Arc::new(ObjectStoreStorage::from_manager(&s3_manager, &config.bucket)?)
        }
    };
    Ok(storage)
}
