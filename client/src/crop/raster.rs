//! Rasterizing a crop rectangle into a JPEG

use image::{codecs::jpeg::JpegEncoder, DynamicImage};
use tracing::debug;

use super::{CropError, CropFrame, CropPurpose, CropRect, CropResult};

/// Fixed JPEG quality of every stored image
pub const JPEG_QUALITY: u8 = 90;

/// Decoded source image selected by the user
#[derive(Debug, Clone)]
pub struct SourceImage {
    image: DynamicImage,
}

impl SourceImage {
    /// Decodes raw file bytes, guessing the format from their content
    ///
    /// # Errors
    ///
    /// Returns `CropError::Decode` if the bytes are not a supported raster image
    /// and `CropError::EmptyImage` if it has no pixels
    pub fn decode(bytes: &[u8]) -> CropResult<Self> {
        let image = image::load_from_memory(bytes).map_err(CropError::Decode)?;
        if image.width() == 0 || image.height() == 0 {
            return Err(CropError::EmptyImage);
        }

        debug!("Decoded source image: {}x{}", image.width(), image.height());
        Ok(Self { image })
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Opens a crop frame over this image with the aspect ratio of `purpose`
    ///
    /// # Errors
    ///
    /// Returns `CropError::EmptyImage` if the image has no pixels
    pub fn frame(&self, purpose: CropPurpose) -> CropResult<CropFrame> {
        CropFrame::new(self.width(), self.height(), purpose.aspect())
    }

    /// Crops `rect` out of the image and encodes it as JPEG
    ///
    /// The output is exactly `round(width)` by `round(height)` pixels taken
    /// from `[x, x+width) x [y, y+height)` of the source.
    ///
    /// # Errors
    ///
    /// Returns `CropError::InvalidRect` or `CropError::OutOfBounds` if the
    /// rounded rectangle is not inside the image, and `CropError::Encode` if
    /// JPEG encoding fails
    pub fn rasterize(&self, rect: CropRect) -> CropResult<EncodedImage> {
        let pixels = rect.round()?;

        if !pixels.fits_within(self.width(), self.height()) {
            return Err(CropError::OutOfBounds {
                x: pixels.x,
                y: pixels.y,
                width: pixels.width,
                height: pixels.height,
                image_width: self.width(),
                image_height: self.height(),
            });
        }

        // JPEG has no alpha channel
        let cropped = self
            .image
            .crop_imm(pixels.x, pixels.y, pixels.width, pixels.height)
            .to_rgb8();

        let mut bytes = Vec::new();
        JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY)
            .encode_image(&cropped)
            .map_err(CropError::Encode)?;

        debug!(
            "Rasterized crop {}x{} at {},{} into {} bytes",
            pixels.width,
            pixels.height,
            pixels.x,
            pixels.y,
            bytes.len()
        );

        Ok(EncodedImage {
            bytes,
            width: pixels.width,
            height: pixels.height,
        })
    }
}

/// JPEG bytes produced by a confirmed crop
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl EncodedImage {
    /// MIME type of the encoded bytes
    #[must_use]
    pub fn content_type(&self) -> String {
        mime::IMAGE_JPEG.to_string()
    }
}

impl std::fmt::Debug for EncodedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodedImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Decodes `source` and rasterizes `rect` out of it
///
/// # Errors
///
/// Returns every error of [`SourceImage::decode`] and [`SourceImage::rasterize`]
pub fn rasterize(source: &[u8], rect: CropRect) -> CropResult<EncodedImage> {
    SourceImage::decode(source)?.rasterize(rect)
}
