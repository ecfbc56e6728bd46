//! Interactive crop region selection
//!
//! A [`CropFrame`] models the movable, zoomable frame drawn over a decoded
//! source image. Every interaction step clamps the frame inside the image and
//! publishes the resulting rectangle in source pixels; the last published
//! rectangle is what gets rasterized on confirm.

mod error;
mod raster;

use serde::{Deserialize, Serialize};
use strum::Display;

pub use error::{CropError, CropResult};
pub use raster::{rasterize, EncodedImage, SourceImage, JPEG_QUALITY};

/// Smallest zoom factor (frame as large as the aspect ratio allows)
pub const MIN_ZOOM: f64 = 1.0;
/// Largest zoom factor
pub const MAX_ZOOM: f64 = 3.0;

/// Target width:height ratio of a crop frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AspectRatio {
    pub width: u32,
    pub height: u32,
}

impl AspectRatio {
    /// Tall frame used for beer photos
    pub const PORTRAIT: Self = Self {
        width: 3,
        height: 4,
    };
    /// Wide frame used for the club cover
    pub const WIDE: Self = Self {
        width: 16,
        height: 9,
    };

    #[must_use]
    pub fn as_f64(self) -> f64 {
        f64::from(self.width) / f64::from(self.height)
    }
}

/// What a crop interaction produces an image for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum CropPurpose {
    /// Photo attached to a beer
    #[strum(serialize = "beer photo")]
    BeerPhoto,
    /// The club cover image
    #[strum(serialize = "club cover")]
    ClubCover,
}

impl CropPurpose {
    #[must_use]
    pub const fn aspect(self) -> AspectRatio {
        match self {
            Self::BeerPhoto => AspectRatio::PORTRAIT,
            Self::ClubCover => AspectRatio::WIDE,
        }
    }
}

/// Crop rectangle in source-pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Crop rectangle rounded to whole pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    /// Rounds every component to the nearest whole pixel
    ///
    /// # Errors
    ///
    /// Returns `CropError::InvalidRect` for non-finite values, negative offsets
    /// or a rectangle that rounds to zero pixels
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn round(&self) -> CropResult<PixelRect> {
        let values = [self.x, self.y, self.width, self.height].map(f64::round);

        if values.iter().any(|v| !v.is_finite() || *v > f64::from(u32::MAX)) {
            return Err(CropError::InvalidRect(format!("{self:?}")));
        }
        let [x, y, width, height] = values;
        if x < 0.0 || y < 0.0 {
            return Err(CropError::InvalidRect(format!("negative offset {x},{y}")));
        }
        if width < 1.0 || height < 1.0 {
            return Err(CropError::InvalidRect(format!("empty size {width}x{height}")));
        }

        Ok(PixelRect {
            x: x as u32,
            y: y as u32,
            width: width as u32,
            height: height as u32,
        })
    }
}

impl PixelRect {
    /// Whether `[x, x+width) x [y, y+height)` lies inside an image of the given size
    #[must_use]
    pub fn fits_within(&self, image_width: u32, image_height: u32) -> bool {
        u64::from(self.x) + u64::from(self.width) <= u64::from(image_width)
            && u64::from(self.y) + u64::from(self.height) <= u64::from(image_height)
    }
}

/// Movable, zoomable crop frame locked to an aspect ratio
#[derive(Debug, Clone)]
pub struct CropFrame {
    image_width: f64,
    image_height: f64,
    base_width: f64,
    base_height: f64,
    zoom: f64,
    x: f64,
    y: f64,
    observed: Option<CropRect>,
}

impl CropFrame {
    /// Creates a centered frame at zoom 1 over an image of the given size
    ///
    /// No rectangle is observed until the first interaction.
    ///
    /// # Errors
    ///
    /// Returns `CropError::EmptyImage` for an image without pixels and
    /// `CropError::InvalidRect` for a degenerate aspect ratio
    pub fn new(image_width: u32, image_height: u32, aspect: AspectRatio) -> CropResult<Self> {
        if image_width == 0 || image_height == 0 {
            return Err(CropError::EmptyImage);
        }
        if aspect.width == 0 || aspect.height == 0 {
            return Err(CropError::InvalidRect(format!("aspect ratio {aspect:?}")));
        }

        let (iw, ih) = (f64::from(image_width), f64::from(image_height));
        let ratio = aspect.as_f64();
        let (base_width, base_height) = if iw / ih > ratio {
            (ih * ratio, ih)
        } else {
            (iw, iw / ratio)
        };
        let (base_width, base_height) = (base_width.min(iw), base_height.min(ih));

        Ok(Self {
            image_width: iw,
            image_height: ih,
            base_width,
            base_height,
            zoom: MIN_ZOOM,
            x: (iw - base_width) / 2.0,
            y: (ih - base_height) / 2.0,
            observed: None,
        })
    }

    fn width(&self) -> f64 {
        self.base_width / self.zoom
    }

    fn height(&self) -> f64 {
        self.base_height / self.zoom
    }

    /// Moves the frame by `dx`, `dy` source pixels
    pub fn drag(&mut self, dx: f64, dy: f64) -> CropRect {
        if dx.is_finite() && dy.is_finite() {
            self.x += dx;
            self.y += dy;
        }
        self.publish()
    }

    /// Places the top-left corner of the frame at `x`, `y`
    pub fn move_to(&mut self, x: f64, y: f64) -> CropRect {
        if x.is_finite() && y.is_finite() {
            self.x = x;
            self.y = y;
        }
        self.publish()
    }

    /// Sets the zoom factor, keeping the frame centered on the same point
    pub fn set_zoom(&mut self, zoom: f64) -> CropRect {
        let zoom = if zoom.is_nan() {
            MIN_ZOOM
        } else {
            zoom.clamp(MIN_ZOOM, MAX_ZOOM)
        };

        let center_x = self.x + self.width() / 2.0;
        let center_y = self.y + self.height() / 2.0;
        self.zoom = zoom;
        self.x = center_x - self.width() / 2.0;
        self.y = center_y - self.height() / 2.0;

        self.publish()
    }

    /// Current zoom factor
    #[must_use]
    pub const fn zoom(&self) -> f64 {
        self.zoom
    }

    /// Last rectangle published by an interaction, if any
    #[must_use]
    pub const fn observed(&self) -> Option<CropRect> {
        self.observed
    }

    fn restrict_position(&mut self) {
        let max_x = (self.image_width - self.width()).max(0.0);
        let max_y = (self.image_height - self.height()).max(0.0);
        self.x = self.x.clamp(0.0, max_x);
        self.y = self.y.clamp(0.0, max_y);
    }

    /// Whole-pixel rectangle that always lies inside the image
    fn snapped(&self) -> CropRect {
        let width = self.width().round().clamp(1.0, self.image_width);
        let height = self.height().round().clamp(1.0, self.image_height);

        CropRect {
            x: self.x.round().clamp(0.0, self.image_width - width),
            y: self.y.round().clamp(0.0, self.image_height - height),
            width,
            height,
        }
    }

    fn publish(&mut self) -> CropRect {
        self.restrict_position();
        let rect = self.snapped();
        self.observed = Some(rect);
        rect
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_inside(rect: CropRect, width: u32, height: u32) {
        let pixels = rect.round().expect("published rectangles are valid");
        assert!(
            pixels.fits_within(width, height),
            "{pixels:?} outside {width}x{height}"
        );
    }

    #[test]
    fn test_new_frame_is_centered_and_unobserved() {
        let frame = CropFrame::new(400, 300, AspectRatio::PORTRAIT).unwrap();

        assert!(frame.observed().is_none());
        assert!((frame.zoom() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_portrait_frame_fills_image_height() {
        let mut frame = CropFrame::new(400, 300, AspectRatio::PORTRAIT).unwrap();
        let rect = frame.drag(0.0, 0.0);

        assert_eq!(
            rect,
            CropRect {
                x: 88.0,
                y: 0.0,
                width: 225.0,
                height: 300.0
            }
        );
    }

    #[test]
    fn test_wide_frame_fills_image_width() {
        let mut frame = CropFrame::new(320, 400, AspectRatio::WIDE).unwrap();
        let rect = frame.drag(0.0, 0.0);

        assert!((rect.width - 320.0).abs() < f64::EPSILON);
        assert!((rect.height - 180.0).abs() < f64::EPSILON);
        assert!((rect.y - 110.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_drag_is_clamped_to_image() {
        let mut frame = CropFrame::new(400, 300, AspectRatio::PORTRAIT).unwrap();

        let rect = frame.drag(10_000.0, -10_000.0);
        assert!((rect.x - 175.0).abs() < f64::EPSILON);
        assert!(rect.y.abs() < f64::EPSILON);

        let rect = frame.move_to(-50.0, 50.0);
        assert!(rect.x.abs() < f64::EPSILON);
        assert!(rect.y.abs() < f64::EPSILON);
    }

    #[test]
    fn test_zoom_is_bounded_and_keeps_center() {
        let mut frame = CropFrame::new(400, 300, AspectRatio::PORTRAIT).unwrap();

        let rect = frame.set_zoom(2.0);
        assert!((rect.height - 150.0).abs() < f64::EPSILON);
        assert!((rect.y - 75.0).abs() < f64::EPSILON);

        frame.set_zoom(10.0);
        assert!((frame.zoom() - MAX_ZOOM).abs() < f64::EPSILON);

        frame.set_zoom(0.2);
        assert!((frame.zoom() - MIN_ZOOM).abs() < f64::EPSILON);

        frame.set_zoom(f64::NAN);
        assert!((frame.zoom() - MIN_ZOOM).abs() < f64::EPSILON);
    }

    #[test]
    fn test_non_finite_drag_is_ignored() {
        let mut frame = CropFrame::new(400, 300, AspectRatio::PORTRAIT).unwrap();
        let before = frame.drag(0.0, 0.0);

        assert_eq!(frame.drag(f64::INFINITY, f64::NAN), before);
    }

    #[test]
    fn test_every_interaction_step_stays_inside_image() {
        // Deterministic pseudo-random walk over drags, moves and zooms
        let mut seed: u64 = 0x5eed;
        let mut next = move || {
            seed = seed
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            #[allow(clippy::cast_precision_loss)]
            let unit = (seed >> 11) as f64 / (1u64 << 53) as f64;
            unit
        };

        for (width, height, aspect) in [
            (400, 300, AspectRatio::PORTRAIT),
            (301, 977, AspectRatio::PORTRAIT),
            (1920, 1080, AspectRatio::WIDE),
            (7, 5, AspectRatio::WIDE),
            (1, 1, AspectRatio::PORTRAIT),
        ] {
            let mut frame = CropFrame::new(width, height, aspect).unwrap();

            for _ in 0..500 {
                let rect = match (next() * 3.0) as u32 {
                    0 => frame.drag((next() - 0.5) * 800.0, (next() - 0.5) * 800.0),
                    1 => frame.set_zoom(next() * 4.0),
                    _ => frame.move_to((next() - 0.2) * 2000.0, (next() - 0.2) * 2000.0),
                };
                assert_inside(rect, width, height);
                assert_eq!(frame.observed(), Some(rect));
            }
        }
    }

    #[test]
    fn test_empty_image_is_rejected() {
        assert!(matches!(
            CropFrame::new(0, 10, AspectRatio::WIDE),
            Err(CropError::EmptyImage)
        ));
    }

    #[test]
    fn test_round_rejects_invalid_rectangles() {
        let rect = |x, y, width, height| CropRect {
            x,
            y,
            width,
            height,
        };

        assert!(rect(-1.0, 0.0, 10.0, 10.0).round().is_err());
        assert!(rect(0.0, 0.0, 0.4, 10.0).round().is_err());
        assert!(rect(f64::NAN, 0.0, 10.0, 10.0).round().is_err());
        assert_eq!(
            rect(1.4, 2.6, 99.5, 10.2).round().unwrap(),
            PixelRect {
                x: 1,
                y: 3,
                width: 100,
                height: 10
            }
        );
    }
}
