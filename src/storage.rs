use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    presigning::PresigningConfig,
    Client,
};
use aws_smithy_types::byte_stream::ByteStream;
use bytes::Bytes;
use tracing::{debug, info};

use crate::config::MinioConfig;

/// Object storage for profile photos and post images.
#[async_trait]
pub trait StorageClient: Send + Sync {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()>;
    async fn delete_object(&self, key: &str) -> anyhow::Result<()>;
    async fn presign_get(&self, key: &str, seconds: u64) -> anyhow::Result<String>;
}

/// S3-compatible bucket (MinIO in development).
#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
}

impl S3Storage {
    pub async fn connect(cfg: &MinioConfig) -> anyhow::Result<Self> {
        let credentials =
            Credentials::new(&cfg.access_key, &cfg.secret_key, None, None, "minio-env");
        let shared = defaults(BehaviorVersion::latest())
            .region(Region::new(cfg.region.clone()))
            .credentials_provider(credentials)
            .load()
            .await;
        let client = Client::from_conf(
            S3ConfigBuilder::from(&shared)
                .endpoint_url(&cfg.endpoint)
                .force_path_style(true)
                .build(),
        );
        let storage = Self {
            client,
            bucket: cfg.bucket.clone(),
        };
        storage.ensure_bucket().await?;
        info!(endpoint = %cfg.endpoint, bucket = %cfg.bucket, "object storage ready");
        Ok(storage)
    }

    /// Creates the bucket on first start against an empty MinIO.
    async fn ensure_bucket(&self) -> anyhow::Result<()> {
        if self.client.head_bucket().bucket(&self.bucket).send().await.is_ok() {
            return Ok(());
        }
        self.client
            .create_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .with_context(|| format!("create bucket {}", self.bucket))?;
        info!(bucket = %self.bucket, "bucket created");
        Ok(())
    }
}

#[async_trait]
impl StorageClient for S3Storage {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()> {
        let size = body.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .content_length(size as i64)
            .body(ByteStream::from(body))
            .send()
            .await
            .with_context(|| format!("upload {}/{}", self.bucket, key))?;
        debug!(key, size, "object stored");
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("delete {}/{}", self.bucket, key))?;
        debug!(key, "object deleted");
        Ok(())
    }

    async fn presign_get(&self, key: &str, seconds: u64) -> anyhow::Result<String> {
        let ttl = PresigningConfig::expires_in(Duration::from_secs(seconds))?;
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(ttl)
            .await
            .with_context(|| format!("presign {}/{}", self.bucket, key))?;
        Ok(request.uri().to_string())
    }
}

/// Keeps objects in process; used without a configured bucket and in tests.
#[derive(Default)]
pub struct MemoryStorage {
    objects: Mutex<HashMap<String, (Bytes, String)>>,
}

impl MemoryStorage {
    pub fn contains(&self, key: &str) -> bool {
        self.objects
            .lock()
            .map(|m| m.contains_key(key))
            .unwrap_or(false)
    }

    pub fn is_empty(&self) -> bool {
        self.objects.lock().map(|m| m.is_empty()).unwrap_or(true)
    }
}

#[async_trait]
impl StorageClient for MemoryStorage {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()> {
        self.objects
            .lock()
            .map_err(|_| anyhow::anyhow!("memory storage poisoned"))?
            .insert(key.to_string(), (body, content_type.to_string()));
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        self.objects
            .lock()
            .map_err(|_| anyhow::anyhow!("memory storage poisoned"))?
            .remove(key);
        Ok(())
    }

    async fn presign_get(&self, key: &str, seconds: u64) -> anyhow::Result<String> {
        Ok(format!("memory://{}?expires={}", key, seconds))
    }
}
