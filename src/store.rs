//! Remote object store access
//!
//! The sync core talks to storage through the `RemoteStore` trait so it can
//! be exercised against an in-memory fake; `S3Store` is the real adapter
//! over the AWS SDK.
//!
//! S3's own transport checksum is not persisted in a usable form, so the
//! content digest is carried in user metadata under `DIGEST_METADATA_KEY`.
//! That entry is the only cross-run equality check this tool relies on.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use std::path::Path;

use crate::digest::ContentDigest;

/// User-metadata key holding the hex MD5 of the stored bytes. Must stay
/// stable across versions or every object looks stale.
pub const DIGEST_METADATA_KEY: &str = "content-hash";

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Whether the configured bucket exists. An error here is a
    /// connectivity failure, fatal at startup.
    async fn bucket_exists(&self) -> Result<bool>;

    /// Whether an object exists at `key`. NotFound is `false`, not an error.
    async fn object_exists(&self, key: &str) -> Result<bool>;

    /// The stored content digest for `key`, or `None` if the object has no
    /// digest metadata (e.g. it was written by some other process).
    async fn read_digest(&self, key: &str) -> Result<Option<ContentDigest>>;

    /// Stream a local file to `key`, persisting `digest` as user metadata.
    /// After success, `read_digest(key)` returns this digest.
    async fn write_file(
        &self,
        key: &str,
        local_path: &Path,
        content_type: &str,
        digest: &ContentDigest,
    ) -> Result<()>;
}

/// S3-backed store for one bucket.
///
/// The SDK client is internally connection-pooled and safe for concurrent
/// use, so a single instance is shared by every worker.
pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    /// Build the client once from the ambient AWS configuration
    /// (environment credentials / config files), with optional region and
    /// endpoint overrides. Custom endpoints (MinIO and friends) use
    /// path-style addressing.
    pub async fn connect(
        bucket: impl Into<String>,
        region: Option<String>,
        endpoint_url: Option<String>,
    ) -> Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(aws_config::Region::new(region));
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = endpoint_url {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: bucket.into(),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl RemoteStore for S3Store {
    async fn bucket_exists(&self) -> Result<bool> {
        match self
            .client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) => {
                let err = err.into_service_error();
                if err.is_not_found() {
                    Ok(false)
                } else {
                    Err(anyhow!("cannot reach bucket {}: {err}", self.bucket))
                }
            }
        }
    }

    async fn object_exists(&self, key: &str) -> Result<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) => {
                let err = err.into_service_error();
                if err.is_not_found() {
                    Ok(false)
                } else {
                    Err(anyhow!("HEAD {key}: {err}"))
                }
            }
        }
    }

    async fn read_digest(&self, key: &str) -> Result<Option<ContentDigest>> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => Ok(output
                .metadata()
                .and_then(|m| m.get(DIGEST_METADATA_KEY))
                .map(ContentDigest::from_hex)),
            Err(err) => {
                let err = err.into_service_error();
                if err.is_not_found() {
                    Ok(None)
                } else {
                    Err(anyhow!("HEAD {key}: {err}"))
                }
            }
        }
    }

    async fn write_file(
        &self,
        key: &str,
        local_path: &Path,
        content_type: &str,
        digest: &ContentDigest,
    ) -> Result<()> {
        let length = tokio::fs::metadata(local_path)
            .await
            .with_context(|| format!("cannot stat {}", local_path.display()))?
            .len();
        let body = ByteStream::from_path(local_path)
            .await
            .with_context(|| format!("cannot open {}", local_path.display()))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_length(length as i64)
            .content_type(content_type)
            .metadata(DIGEST_METADATA_KEY, digest.as_str())
            .send()
            .await
            .map_err(|err| anyhow!("PUT {key}: {}", err.into_service_error()))?;
        Ok(())
    }
}
