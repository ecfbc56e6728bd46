//! Error types for the crop pipeline

use thiserror::Error;

/// Result type for crop operations
pub type CropResult<T> = Result<T, CropError>;

/// Errors that can occur while selecting, cropping or encoding an image
#[derive(Debug, Error)]
pub enum CropError {
    /// The source bytes are not a decodable raster image
    #[error("Failed to decode image: {0}")]
    Decode(#[source] image::ImageError),

    /// The cropped pixels could not be encoded
    #[error("Failed to encode image: {0}")]
    Encode(#[source] image::ImageError),

    /// The source image has no pixels
    #[error("Image has no pixels")]
    EmptyImage,

    /// The rectangle is negative, empty or not a number
    #[error("Invalid crop rectangle: {0}")]
    InvalidRect(String),

    /// The rounded rectangle reaches outside the source image
    #[error("Crop rectangle {x},{y} {width}x{height} exceeds image {image_width}x{image_height}")]
    OutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        image_width: u32,
        image_height: u32,
    },
}
