//! S3-based media storage for beer photos and the club cover
mod error;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::{
    error::SdkError, operation::head_object::HeadObjectError, presigning::PresigningConfig,
    primitives::ByteStream, Client as S3Client,
};
use chrono::{DateTime, Utc};
use tracing::debug;

pub use error::{BucketError, BucketResult};

/// File extension of every stored image
pub const IMAGE_EXTENSION: &str = "jpg";

/// Presigned URL with expiration information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresignedUrl {
    /// The presigned URL for GET operations
    pub url: String,
    /// ISO-8601 UTC timestamp when the URL expires
    pub expires_at: DateTime<Utc>,
}

/// Key of a beer photo: `<club>/<user>/<photo_id>.jpg`
#[must_use]
pub fn photo_key(club_id: &str, user_id: &str, photo_id: &str) -> String {
    format!("{club_id}/{user_id}/{photo_id}.{IMAGE_EXTENSION}")
}

/// Deterministic key of the club cover: `covers/<club>.jpg`
#[must_use]
pub fn cover_key(club_id: &str) -> String {
    format!("covers/{club_id}.{IMAGE_EXTENSION}")
}

/// Blob storage collaborator
#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Uploads `bytes` under `key`
    ///
    /// Fails with `BucketError::ObjectExists` if the key is occupied and
    /// `overwrite` is false.
    async fn upload(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
        overwrite: bool,
    ) -> BucketResult<()>;

    /// Deletes the object at `key`. Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> BucketResult<()>;

    /// Checks if an object exists at `key`
    async fn exists(&self, key: &str) -> BucketResult<bool>;

    /// Issues a time-limited URL to read the object at `key`
    async fn signed_url(&self, key: &str, ttl: Duration) -> BucketResult<PresignedUrl>;
}

/// Media storage client for S3 operations
pub struct MediaStorage {
    s3_client: Arc<S3Client>,
    bucket_name: String,
}

impl MediaStorage {
    /// Creates a new media storage client
    ///
    /// # Arguments
    ///
    /// * `s3_client` - Pre-configured S3 client
    /// * `bucket_name` - S3 bucket name for photos and covers
    #[must_use]
    pub const fn new(s3_client: Arc<S3Client>, bucket_name: String) -> Self {
        Self {
            s3_client,
            bucket_name,
        }
    }
}

#[async_trait]
impl BlobStorage for MediaStorage {
    async fn upload(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
        overwrite: bool,
    ) -> BucketResult<()> {
        if key.is_empty() {
            return Err(BucketError::InvalidInput("empty object key".to_string()));
        }

        let content_length = i64::try_from(bytes.len())
            .map_err(|_| BucketError::InvalidInput(format!("object too large: {key}")))?;

        let mut request = self
            .s3_client
            .put_object()
            .bucket(&self.bucket_name)
            .key(key)
            .content_length(content_length)
            .content_type(content_type)
            .body(ByteStream::from(bytes));

        if !overwrite {
            request = request.if_none_match("*");
        }

        match request.send().await {
            Ok(_) => {
                debug!("Uploaded object: {key} ({content_length} bytes)");
                Ok(())
            }
            // 412 is S3's answer to `If-None-Match: *` on an occupied key
            Err(SdkError::ServiceError(service_err))
                if service_err.raw().status().as_u16() == 412 =>
            {
                Err(BucketError::ObjectExists(key.to_string()))
            }
            Err(e) => Err(BucketError::from(e)),
        }
    }

    async fn delete(&self, key: &str) -> BucketResult<()> {
        self.s3_client
            .delete_object()
            .bucket(&self.bucket_name)
            .key(key)
            .send()
            .await?;

        debug!("Deleted object: {key}");
        Ok(())
    }

    async fn exists(&self, key: &str) -> BucketResult<bool> {
        let result = self
            .s3_client
            .head_object()
            .bucket(&self.bucket_name)
            .key(key)
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(SdkError::ServiceError(service_err))
                if matches!(service_err.err(), HeadObjectError::NotFound(_)) =>
            {
                Ok(false)
            }
            Err(SdkError::ServiceError(service_err))
                if service_err.raw().status().as_u16() >= 500 =>
            {
                Err(BucketError::UpstreamError(format!("{service_err:?}")))
            }
            Err(e) => Err(BucketError::from(e)),
        }
    }

    async fn signed_url(&self, key: &str, ttl: Duration) -> BucketResult<PresignedUrl> {
        let presigned_config = PresigningConfig::expires_in(ttl).map_err(|e| {
            BucketError::ConfigError(format!("Failed to create presigning config: {e}"))
        })?;

        let presigned_url = self
            .s3_client
            .get_object()
            .bucket(&self.bucket_name)
            .key(key)
            .presigned(presigned_config)
            .await
            .map_err(|e| BucketError::S3Error(format!("Failed to generate presigned URL: {e}")))?;

        let expires_at: DateTime<Utc> = Utc::now() + ttl;

        Ok(PresignedUrl {
            url: presigned_url.uri().to_string(),
            expires_at,
        })
    }
}
