use aws_config::BehaviorVersion;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_s3::config::{Credentials, Region};
use common::config::StorageSettings;
use common::{Error, Result};
use dashmap::DashMap;
use datafusion::execution::context::SessionContext;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

use crate::utils::paths::s3_bucket;

/// Builds S3 clients and object stores from explicit storage settings and
/// caches them per bucket.
#[derive(Clone)]
pub struct S3Manager {
    pub config: StorageSettings,
    client_cache: Arc<DashMap<String, Arc<S3Client>>>,
    object_store_cache: Arc<DashMap<String, Arc<AmazonS3>>>,
}

impl S3Manager {
    pub fn new(config: StorageSettings) -> Self {
        Self {
            config,
            client_cache: Arc::new(DashMap::new()),
            object_store_cache: Arc::new(DashMap::new()),
        }
    }

    fn static_credentials(&self) -> Option<(&str, &str)> {
        match (&self.config.access_key, &self.config.secret_key) {
            (Some(access_key), Some(secret_key)) => Some((access_key.as_str(), secret_key.as_str())),
            _ => None,
        }
    }

    pub async fn get_client(&self, bucket: &str) -> Result<Arc<S3Client>> {
        if let Some(client) = self.client_cache.get(bucket) {
            return Ok(client.clone());
        }

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(self.config.region.clone()));

        if let Some((access_key, secret_key)) = self.static_credentials() {
            loader = loader.credentials_provider(Credentials::new(
                access_key, secret_key, None, None, "static",
            ));
        }
        if let Some(endpoint) = &self.config.endpoint {
            loader = loader.endpoint_url(endpoint.clone());
        }

        let sdk_config = loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(self.config.endpoint.is_some())
            .build();

        let client = Arc::new(S3Client::from_conf(s3_config));
        self.client_cache.insert(bucket.to_string(), client.clone());
        Ok(client)
    }

    pub fn get_object_store(&self, bucket: &str) -> Result<Arc<AmazonS3>> {
        if let Some(store) = self.object_store_cache.get(bucket) {
            return Ok(store.clone());
        }

        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(bucket)
            .with_region(&self.config.region)
            .with_allow_http(self.config.allow_http);

        if let Some((access_key, secret_key)) = self.static_credentials() {
            builder = builder
                .with_access_key_id(access_key)
                .with_secret_access_key(secret_key);
        }
        if let Some(endpoint) = &self.config.endpoint {
            builder = builder.with_endpoint(endpoint);
        }

        let store = Arc::new(builder.build()?);
        self.object_store_cache
            .insert(bucket.to_string(), store.clone());
        Ok(store)
    }

    pub fn register_object_store(&self, ctx: &SessionContext, bucket: &str) -> Result<()> {
        let store = self.get_object_store(bucket)?;
        let url = Url::parse(&format!("s3://{}", bucket))?;
        ctx.runtime_env().register_object_store(&url, store);
        debug!(bucket, "Registered S3 object store");
        Ok(())
    }

    /// Verifies that a bucket exists and is accessible
    pub async fn verify_bucket_exists(&self, bucket: &str) -> Result<()> {
        let client = self.get_client(bucket).await?;

        match client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(()),
            Err(e) => Err(Error::Storage(format!(
                "Cannot access bucket '{}': {}",
                bucket, e
            ))),
        }
    }

    /// Makes a dataset root reachable from the session. Local roots need no
    /// registration; S3 roots get a store for their bucket and, when enabled,
    /// a `HeadBucket` preflight.
    pub async fn register_location(&self, ctx: &SessionContext, location: &str) -> Result<()> {
        let Some(bucket) = s3_bucket(location)? else {
            return Ok(());
        };

        self.register_object_store(ctx, &bucket)?;
        if self.config.verify_buckets {
            self.verify_bucket_exists(&bucket).await?;
            info!(bucket = %bucket, "Bucket is accessible");
        }
        Ok(())
    }
}
