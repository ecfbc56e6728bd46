//! Saving, deleting and listing beers
//!
//! A pending photo is always uploaded to a fresh key before the row that
//! references it is written. Photo deletes are cleanup and never fail the
//! enclosing operation.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use club_storage::beer::{Beer, BeerFields, BeerPatch, BeerQuery, BeerSort, BeerStorage, NewBeer};
use club_storage::media::{photo_key, BlobStorage, PresignedUrl};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::auth::Session;
use crate::crop::EncodedImage;
use crate::types::{ClubError, ClubResult};

/// Attempts made by [`BeerService::list`] before giving up
pub const LIST_ATTEMPTS: u32 = 3;

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank").with_message(Cow::Borrowed("Name is required")));
    }
    Ok(())
}

/// Form state of the beer being created or edited
#[derive(Debug, Clone, Default, Validate)]
pub struct BeerEditor {
    #[validate(custom(function = "not_blank"))]
    pub name: String,
    pub brewery: String,
    pub style: String,
    pub color: String,
    pub price: String,
    #[validate(range(max = 5, message = "Rating must be between 0 and 5"))]
    pub rating: u8,
    pending_photo: Option<EncodedImage>,
    editing: Option<Beer>,
}

impl BeerEditor {
    /// Empty editor for a new beer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Editor prefilled with an existing beer
    #[must_use]
    pub fn for_beer(beer: &Beer) -> Self {
        Self {
            name: beer.name.clone(),
            brewery: beer.brewery.clone(),
            style: beer.style.clone(),
            color: beer.color.clone(),
            price: beer.price.clone(),
            rating: beer.rating,
            pending_photo: None,
            editing: Some(beer.clone()),
        }
    }

    /// Holds a cropped photo until the beer is saved
    pub fn set_pending_photo(&mut self, photo: EncodedImage) {
        self.pending_photo = Some(photo);
    }

    #[must_use]
    pub const fn pending_photo(&self) -> Option<&EncodedImage> {
        self.pending_photo.as_ref()
    }

    /// Beer being edited, if any
    #[must_use]
    pub const fn editing(&self) -> Option<&Beer> {
        self.editing.as_ref()
    }

    /// Discards every change, including the pending photo
    pub fn cancel(&mut self) {
        *self = Self::default();
    }

    /// Validates the form for saving
    ///
    /// # Errors
    ///
    /// Returns `ClubError::Validation` naming every invalid field
    pub fn check(&self) -> ClubResult<()> {
        self.validate()?;
        Ok(())
    }

    /// Validates the form and returns the beer it was opened for
    ///
    /// # Errors
    ///
    /// Returns `ClubError::Validation` if the form is invalid or no beer is
    /// being edited
    pub fn check_edit(&self) -> ClubResult<&Beer> {
        self.check()?;
        self.editing()
            .ok_or_else(|| ClubError::Validation("No beer is being edited".to_string()))
    }

    /// Trimmed field values
    #[must_use]
    pub fn fields(&self) -> BeerFields {
        BeerFields {
            name: self.name.trim().to_string(),
            brewery: self.brewery.trim().to_string(),
            style: self.style.trim().to_string(),
            color: self.color.trim().to_string(),
            price: self.price.trim().to_string(),
            rating: self.rating,
        }
    }
}

/// Result of listing beers
///
/// An empty list with `load_failed` set means the beers could not be loaded,
/// not that there are none.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BeerListing {
    pub beers: Vec<Beer>,
    pub load_failed: bool,
}

/// Beer operations over the row and blob collaborators
#[derive(Clone)]
pub struct BeerService {
    rows: Arc<dyn BeerStorage>,
    blobs: Arc<dyn BlobStorage>,
    club_id: String,
    url_ttl: Duration,
    retry_delay: Duration,
}

impl BeerService {
    #[must_use]
    pub fn new(
        rows: Arc<dyn BeerStorage>,
        blobs: Arc<dyn BlobStorage>,
        club_id: String,
        url_ttl: Duration,
        retry_delay: Duration,
    ) -> Self {
        Self {
            rows,
            blobs,
            club_id,
            url_ttl,
            retry_delay,
        }
    }

    /// Uploads the pending photo of `editor` to a fresh key and returns the key
    async fn upload_pending(
        &self,
        session: &Session,
        editor: &BeerEditor,
    ) -> ClubResult<Option<String>> {
        let Some(photo) = editor.pending_photo() else {
            return Ok(None);
        };

        let key = photo_key(&self.club_id, &session.user.id, &Uuid::new_v4().to_string());
        self.blobs
            .upload(&key, photo.bytes.clone(), &photo.content_type(), false)
            .await?;

        debug!("Uploaded photo {key}");
        Ok(Some(key))
    }

    /// Deletes a photo blob, logging instead of failing
    async fn discard_photo(&self, key: &str) {
        match self.blobs.delete(key).await {
            Ok(()) => debug!("Deleted photo {key}"),
            Err(e) => warn!("Failed to delete photo {key}: {e}"),
        }
    }

    /// Creates a beer from `editor` and resets it
    ///
    /// # Errors
    ///
    /// Returns `ClubError::Validation` before any network call if the form is
    /// invalid, and the collaborator error if the photo upload or row insert
    /// fails. On failure the editor is left as is.
    #[instrument(skip_all, fields(user_id = %session.user.id))]
    pub async fn create(&self, session: &Session, editor: &mut BeerEditor) -> ClubResult<Beer> {
        editor.check()?;

        let photo_path = self.upload_pending(session, editor).await?;
        let beer = self
            .rows
            .insert(NewBeer {
                club_id: self.club_id.clone(),
                user_id: session.user.id.clone(),
                fields: editor.fields(),
                photo_path,
            })
            .await?;

        editor.cancel();
        info!("Created beer {}", beer.id);
        Ok(beer)
    }

    /// Saves the beer `editor` was opened for and resets the editor
    ///
    /// A replaced photo is deleted after the new one is stored.
    ///
    /// # Errors
    ///
    /// Returns `ClubError::Validation` before any network call if the form is
    /// invalid or not editing a beer, and the collaborator error if the
    /// photo upload or row update fails
    #[instrument(skip_all, fields(user_id = %session.user.id))]
    pub async fn update(&self, session: &Session, editor: &mut BeerEditor) -> ClubResult<Beer> {
        let original = editor.check_edit()?.clone();

        let photo_path = self.upload_pending(session, editor).await?;
        let replaced = photo_path.as_ref().and(original.photo_path.as_deref());

        let beer = self
            .rows
            .update(
                &original.id,
                BeerPatch {
                    fields: editor.fields(),
                    photo_path,
                },
            )
            .await?;

        if let Some(old) = replaced {
            self.discard_photo(old).await;
        }

        editor.cancel();
        info!("Updated beer {}", beer.id);
        Ok(beer)
    }

    /// Deletes `beer` and then its photo
    ///
    /// # Errors
    ///
    /// Returns the row storage error if the row cannot be deleted
    #[instrument(skip_all, fields(beer_id = %beer.id))]
    pub async fn delete(&self, beer: &Beer) -> ClubResult<()> {
        self.rows.delete(&beer.id).await?;

        if let Some(key) = &beer.photo_path {
            self.discard_photo(key).await;
        }

        info!("Deleted beer {}", beer.id);
        Ok(())
    }

    /// Lists the beers of the club, retrying failed queries
    ///
    /// After [`LIST_ATTEMPTS`] failures an empty listing with `load_failed`
    /// is returned instead of an error.
    #[instrument(skip(self))]
    pub async fn list(&self, search: Option<&str>, sort: BeerSort) -> BeerListing {
        let mut query = BeerQuery::club(&self.club_id).with_sort(sort);
        if let Some(term) = search {
            query = query.with_search(term);
        }

        for attempt in 1..=LIST_ATTEMPTS {
            match self.rows.query(&query).await {
                Ok(beers) => {
                    debug!("Listed {} beers on attempt {attempt}", beers.len());
                    return BeerListing {
                        beers,
                        load_failed: false,
                    };
                }
                Err(e) if attempt < LIST_ATTEMPTS => {
                    let delay = self.retry_delay * attempt;
                    warn!("Listing beers failed on attempt {attempt}, retrying in {delay:?}: {e}");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => warn!("Listing beers failed after {attempt} attempts: {e}"),
            }
        }

        BeerListing {
            beers: Vec::new(),
            load_failed: true,
        }
    }

    /// Looks up a single beer of the club
    ///
    /// # Errors
    ///
    /// Returns the row storage error if the lookup fails
    pub async fn get(&self, id: &str) -> ClubResult<Option<Beer>> {
        let beer = self.rows.get(id).await?;
        Ok(beer.filter(|beer| beer.club_id == self.club_id))
    }

    /// Signed URL of the photo of `beer`, if it has one
    ///
    /// # Errors
    ///
    /// Returns the blob storage error if the URL cannot be signed
    pub async fn photo_url(&self, beer: &Beer) -> ClubResult<Option<PresignedUrl>> {
        let Some(key) = &beer.photo_path else {
            return Ok(None);
        };
        Ok(Some(self.blobs.signed_url(key, self.url_ttl).await?))
    }
}
