//! The club client handle

use std::sync::Arc;
use std::time::Duration;

use aws_sdk_dynamodb::Client as DynamoDbClient;
use aws_sdk_s3::Client as S3Client;
use club_storage::beer::{Beer, BeerSort, BeerStorage, BeerStorageError, DynamoBeerStorage};
use club_storage::media::{BlobStorage, MediaStorage, PresignedUrl};
use tokio::sync::watch;
use tracing::info;

use crate::auth::{AuthApi, GoTrueAuthClient, Session, SessionStore};
use crate::beers::{BeerEditor, BeerListing, BeerService};
use crate::cover::CoverService;
use crate::pipeline::{CropOutcome, CropSession, CropTarget};
use crate::types::{ClubError, ClubResult, Environment};

/// Club-wide settings of a [`ClubClient`]
#[derive(Debug, Clone)]
pub struct ClubSettings {
    /// Tenant every row and key belongs to
    pub club_id: String,
    /// Lifetime of signed image URLs
    pub url_ttl: Duration,
    /// Base delay between list attempts
    pub list_retry_delay: Duration,
}

impl ClubSettings {
    #[must_use]
    pub fn from_environment(environment: &Environment) -> Self {
        Self {
            club_id: environment.club_id(),
            url_ttl: Duration::from_secs(environment.presigned_url_expiry_secs()),
            list_retry_delay: environment.list_retry_delay(),
        }
    }
}

/// Handle owning the auth, row and blob collaborators of one club
///
/// Built once at startup and passed to whatever needs it.
pub struct ClubClient {
    auth: Arc<dyn AuthApi>,
    beers: BeerService,
    cover: CoverService,
    club_id: String,
}

impl ClubClient {
    #[must_use]
    pub fn new(
        auth: Arc<dyn AuthApi>,
        rows: Arc<dyn BeerStorage>,
        blobs: Arc<dyn BlobStorage>,
        settings: ClubSettings,
    ) -> Self {
        let beers = BeerService::new(
            rows,
            blobs.clone(),
            settings.club_id.clone(),
            settings.url_ttl,
            settings.list_retry_delay,
        );
        let cover = CoverService::new(blobs, &settings.club_id, settings.url_ttl);

        Self {
            auth,
            beers,
            cover,
            club_id: settings.club_id,
        }
    }

    /// Connects to AWS and the auth server and restores the cached session
    ///
    /// # Errors
    ///
    /// Returns `ClubError::Auth` if the auth client cannot be created or the
    /// session cache cannot be read
    pub async fn from_environment(environment: &Environment) -> ClubResult<Self> {
        let s3_client = Arc::new(S3Client::from_conf(environment.s3_client_config().await));
        let dynamodb_client = Arc::new(DynamoDbClient::from_conf(
            environment.dynamodb_client_config().await,
        ));

        let rows = Arc::new(DynamoBeerStorage::new(
            dynamodb_client,
            environment.beers_table_name(),
            environment.beers_club_index_name(),
        ));
        let blobs = Arc::new(MediaStorage::new(s3_client, environment.s3_bucket()));

        let auth = GoTrueAuthClient::new(
            &environment.auth_url(),
            environment.auth_api_key(),
            SessionStore::new(environment.session_file()),
        )?;
        auth.restore().await?;

        let settings = ClubSettings::from_environment(environment);
        info!("Club client ready for {} ({environment:?})", settings.club_id);

        Ok(Self::new(Arc::new(auth), rows, blobs, settings))
    }

    #[must_use]
    pub fn club_id(&self) -> &str {
        &self.club_id
    }

    /// Current session, or `ClubError::NotSignedIn`
    ///
    /// # Errors
    ///
    /// Returns `ClubError::NotSignedIn` without a session and `ClubError::Auth`
    /// if refreshing an expired session fails
    pub async fn require_session(&self) -> ClubResult<Session> {
        self.auth
            .current_session()
            .await?
            .ok_or(ClubError::NotSignedIn)
    }

    /// Current session, if any
    ///
    /// # Errors
    ///
    /// Returns `ClubError::Auth` if refreshing an expired session fails
    pub async fn current_session(&self) -> ClubResult<Option<Session>> {
        Ok(self.auth.current_session().await?)
    }

    /// Receiver that observes sign-in and sign-out
    #[must_use]
    pub fn on_session_change(&self) -> watch::Receiver<Option<Session>> {
        self.auth.subscribe()
    }

    /// Emails a passcode to `email`
    ///
    /// # Errors
    ///
    /// Returns `ClubError::Auth` for a malformed email or a failed request
    pub async fn request_code(&self, email: &str) -> ClubResult<()> {
        Ok(self.auth.request_code(email).await?)
    }

    /// Signs in with an emailed passcode
    ///
    /// # Errors
    ///
    /// Returns `ClubError::Auth` for a malformed code or a rejected sign-in
    pub async fn verify_code(&self, email: &str, code: &str) -> ClubResult<Session> {
        Ok(self.auth.verify_code(email, code).await?)
    }

    /// Signs out
    ///
    /// # Errors
    ///
    /// Returns `ClubError::Auth` if the session cache cannot be cleared
    pub async fn sign_out(&self) -> ClubResult<()> {
        Ok(self.auth.sign_out().await?)
    }

    /// Saves a new beer from `editor`
    ///
    /// # Errors
    ///
    /// See [`BeerService::create`]; also `ClubError::NotSignedIn`
    pub async fn create_beer(&self, editor: &mut BeerEditor) -> ClubResult<Beer> {
        // Refreshing an expired session talks to the auth server
        editor.check()?;
        let session = self.require_session().await?;
        self.beers.create(&session, editor).await
    }

    /// Saves the beer `editor` was opened for
    ///
    /// # Errors
    ///
    /// See [`BeerService::update`]; also `ClubError::NotSignedIn`
    pub async fn update_beer(&self, editor: &mut BeerEditor) -> ClubResult<Beer> {
        editor.check_edit()?;
        let session = self.require_session().await?;
        self.beers.update(&session, editor).await
    }

    /// Deletes `beer` and its photo
    ///
    /// # Errors
    ///
    /// See [`BeerService::delete`]; also `ClubError::NotSignedIn`
    pub async fn delete_beer(&self, beer: &Beer) -> ClubResult<()> {
        self.require_session().await?;
        self.beers.delete(beer).await
    }

    /// Lists the beers of the club
    ///
    /// # Errors
    ///
    /// Returns `ClubError::NotSignedIn` without a session. Storage failures are
    /// reported through [`BeerListing::load_failed`].
    pub async fn list_beers(&self, search: Option<&str>, sort: BeerSort) -> ClubResult<BeerListing> {
        self.require_session().await?;
        Ok(self.beers.list(search, sort).await)
    }

    /// Looks up a beer by id
    ///
    /// # Errors
    ///
    /// Returns `ClubError::NotSignedIn` without a session and
    /// `ClubError::Storage` if the beer does not exist or the lookup fails
    pub async fn get_beer(&self, id: &str) -> ClubResult<Beer> {
        self.require_session().await?;
        self.beers
            .get(id)
            .await?
            .ok_or_else(|| BeerStorageError::NotFound(id.to_string()).into())
    }

    /// Signed URL of the photo of `beer`, if it has one
    ///
    /// # Errors
    ///
    /// Returns the blob storage error if the URL cannot be signed
    pub async fn photo_url(&self, beer: &Beer) -> ClubResult<Option<PresignedUrl>> {
        self.beers.photo_url(beer).await
    }

    /// Loads the stored cover and shows it
    ///
    /// # Errors
    ///
    /// Returns the blob storage error if the cover cannot be checked or signed
    pub async fn load_cover(&self) -> ClubResult<Option<PresignedUrl>> {
        self.cover.load().await
    }

    /// URL of the cover currently shown
    pub async fn cover_url(&self) -> Option<PresignedUrl> {
        self.cover.displayed().await
    }

    /// Confirms a crop and routes it to `target`
    ///
    /// # Errors
    ///
    /// See [`CropSession::confirm`]; a cover crop also needs a session
    pub async fn confirm_crop(
        &self,
        crop: CropSession,
        target: CropTarget<'_>,
    ) -> ClubResult<CropOutcome> {
        if matches!(target, CropTarget::ClubCover) {
            self.require_session().await?;
        }
        crop.confirm(target, &self.cover).await
    }
}
