//! Crop-and-upload pipeline: from selected bytes to a stored image
//!
//! A [`CropSession`] lives for one crop interaction. Confirming it rasterizes
//! the last observed rectangle and routes the JPEG to the entry point that
//! opened it. Dropping it cancels without side effects.

use club_storage::media::PresignedUrl;
use tracing::{debug, info};

use crate::beers::BeerEditor;
use crate::cover::CoverService;
use crate::crop::{CropFrame, CropPurpose, EncodedImage, SourceImage};
use crate::types::{ClubError, ClubResult};

/// Entry point that opened the crop
#[derive(Debug)]
pub enum CropTarget<'a> {
    /// Photo for a beer that is being created
    NewBeer(&'a mut BeerEditor),
    /// Replacement photo for an existing beer
    EditBeer(&'a mut BeerEditor),
    /// The club cover
    ClubCover,
}

impl CropTarget<'_> {
    const fn purpose(&self) -> CropPurpose {
        match self {
            Self::NewBeer(_) | Self::EditBeer(_) => CropPurpose::BeerPhoto,
            Self::ClubCover => CropPurpose::ClubCover,
        }
    }
}

/// What confirming a crop did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CropOutcome {
    /// Nothing had been observed, so nothing happened
    Cancelled,
    /// The JPEG waits on the beer editor until the beer is saved
    PhotoPending,
    /// The cover was uploaded; the URL showing it, unless none could be signed
    CoverReplaced(Option<PresignedUrl>),
}

/// One crop interaction over a decoded image
#[derive(Debug)]
pub struct CropSession {
    source: SourceImage,
    frame: CropFrame,
    purpose: CropPurpose,
}

impl CropSession {
    /// Decodes `bytes` and opens a frame with the aspect ratio of `purpose`
    ///
    /// # Errors
    ///
    /// Returns `ClubError::Crop` if the bytes are not a readable image
    pub fn open(bytes: &[u8], purpose: CropPurpose) -> ClubResult<Self> {
        let source = SourceImage::decode(bytes)?;
        let frame = source.frame(purpose)?;

        Ok(Self {
            source,
            frame,
            purpose,
        })
    }

    #[must_use]
    pub const fn purpose(&self) -> CropPurpose {
        self.purpose
    }

    #[must_use]
    pub const fn source(&self) -> &SourceImage {
        &self.source
    }

    #[must_use]
    pub const fn frame(&self) -> &CropFrame {
        &self.frame
    }

    /// Frame to drag and zoom
    pub fn frame_mut(&mut self) -> &mut CropFrame {
        &mut self.frame
    }

    /// JPEG of the last observed rectangle, or `None` before any interaction
    ///
    /// # Errors
    ///
    /// Returns `ClubError::Crop` if the rectangle cannot be rasterized
    pub fn rasterize(&self) -> ClubResult<Option<EncodedImage>> {
        let Some(rect) = self.frame.observed() else {
            return Ok(None);
        };
        Ok(Some(self.source.rasterize(rect)?))
    }

    /// Rasterizes the crop and hands it to `target`
    ///
    /// Beer photos are only held on the editor. A cover is uploaded right away.
    ///
    /// # Errors
    ///
    /// Returns `ClubError::Validation` if `target` expects another kind of
    /// image, `ClubError::Crop` if rasterizing fails and the blob storage
    /// error if the cover upload fails
    pub async fn confirm(
        self,
        target: CropTarget<'_>,
        cover: &CoverService,
    ) -> ClubResult<CropOutcome> {
        if target.purpose() != self.purpose {
            return Err(ClubError::Validation(format!(
                "A {} crop cannot be used as a {}",
                self.purpose,
                target.purpose()
            )));
        }

        let Some(image) = self.rasterize()? else {
            debug!("Crop confirmed before any interaction, cancelling");
            return Ok(CropOutcome::Cancelled);
        };

        match target {
            CropTarget::NewBeer(editor) | CropTarget::EditBeer(editor) => {
                debug!("Holding {}x{} photo until save", image.width, image.height);
                editor.set_pending_photo(image);
                Ok(CropOutcome::PhotoPending)
            }
            CropTarget::ClubCover => {
                let url = cover.replace(image).await?;
                info!("Cover crop committed");
                Ok(CropOutcome::CoverReplaced(url))
            }
        }
    }
}
