//! The club cover image and its displayed URL

use std::sync::Arc;
use std::time::Duration;

use club_storage::media::{cover_key, BlobStorage, PresignedUrl};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::crop::EncodedImage;
use crate::types::ClubResult;

/// Cover operations over the blob collaborator
pub struct CoverService {
    blobs: Arc<dyn BlobStorage>,
    key: String,
    url_ttl: Duration,
    displayed: RwLock<Option<PresignedUrl>>,
}

impl CoverService {
    #[must_use]
    pub fn new(blobs: Arc<dyn BlobStorage>, club_id: &str, url_ttl: Duration) -> Self {
        Self {
            blobs,
            key: cover_key(club_id),
            url_ttl,
            displayed: RwLock::new(None),
        }
    }

    /// Storage key of the cover
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// URL of the cover currently shown, if any
    pub async fn displayed(&self) -> Option<PresignedUrl> {
        self.displayed.read().await.clone()
    }

    /// Signs a fresh URL for the stored cover and shows it
    ///
    /// # Errors
    ///
    /// Returns the blob storage error if the cover cannot be checked or signed
    pub async fn load(&self) -> ClubResult<Option<PresignedUrl>> {
        if !self.blobs.exists(&self.key).await? {
            debug!("No cover stored at {}", self.key);
            *self.displayed.write().await = None;
            return Ok(None);
        }

        let url = self.blobs.signed_url(&self.key, self.url_ttl).await?;
        *self.displayed.write().await = Some(url.clone());
        Ok(Some(url))
    }

    /// Replaces the stored cover with `image`
    ///
    /// The previous cover is deleted first; a failed delete is only logged.
    /// The displayed URL changes only once the upload has succeeded. If no
    /// fresh URL can be signed after that, the displayed one is kept, since it
    /// addresses the same key and so already serves the new cover.
    ///
    /// # Errors
    ///
    /// Returns the blob storage error if the upload fails
    #[instrument(skip_all, fields(key = %self.key))]
    pub async fn replace(&self, image: EncodedImage) -> ClubResult<Option<PresignedUrl>> {
        if let Err(e) = self.blobs.delete(&self.key).await {
            warn!("Failed to delete previous cover: {e}");
        }

        let content_type = image.content_type();
        self.blobs
            .upload(&self.key, image.bytes, &content_type, true)
            .await?;

        info!("Cover replaced");
        match self.blobs.signed_url(&self.key, self.url_ttl).await {
            Ok(url) => {
                *self.displayed.write().await = Some(url.clone());
                Ok(Some(url))
            }
            Err(e) => {
                warn!("Failed to sign URL for the new cover: {e}");
                Ok(self.displayed.read().await.clone())
            }
        }
    }
}
