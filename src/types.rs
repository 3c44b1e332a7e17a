// src/types.rs
//
// Data model shared by the planner, the model clients and the orchestrator.

use image::RgbImage;
use serde::{Deserialize, Serialize};

/// Upper bound of the normalized coordinate space the model reports boxes in.
pub const BOX_SCALE: f64 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

impl std::fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6}, {:.6}", self.latitude, self.longitude)
    }
}

// ============================================================================
// BOUNDING BOX
// ============================================================================

/// Why a model-reported box was refused.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BoxError {
    #[error("expected 4 coordinates, got {0}")]
    Arity(usize),
    #[error("coordinate {0} is not a finite number")]
    NotFinite(f64),
    #[error("coordinate {0} outside [0, 1000]")]
    OutOfRange(f64),
    #[error("inverted box: min {min} > max {max}")]
    Inverted { min: f64, max: f64 },
}

/// Axis-aligned box in normalized image space (0..=1000 on both axes).
///
/// Only constructible through [`BoundingBox::new`] or
/// [`BoundingBox::from_model_array`], so every instance satisfies
/// `ymin <= ymax` and `xmin <= xmax` with all values inside the range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    ymin: f64,
    xmin: f64,
    ymax: f64,
    xmax: f64,
}

impl BoundingBox {
    pub fn new(ymin: f64, xmin: f64, ymax: f64, xmax: f64) -> Result<Self, BoxError> {
        for v in [ymin, xmin, ymax, xmax] {
            if !v.is_finite() {
                return Err(BoxError::NotFinite(v));
            }
            if !(0.0..=BOX_SCALE).contains(&v) {
                return Err(BoxError::OutOfRange(v));
            }
        }
        if ymin > ymax {
            return Err(BoxError::Inverted {
                min: ymin,
                max: ymax,
            });
        }
        if xmin > xmax {
            return Err(BoxError::Inverted {
                min: xmin,
                max: xmax,
            });
        }
        Ok(Self {
            ymin,
            xmin,
            ymax,
            xmax,
        })
    }

    /// Build from the model's `[ymin, xmin, ymax, xmax]` ordering.
    pub fn from_model_array(values: &[f64]) -> Result<Self, BoxError> {
        match values {
            [ymin, xmin, ymax, xmax] => Self::new(*ymin, *xmin, *ymax, *xmax),
            other => Err(BoxError::Arity(other.len())),
        }
    }

    pub fn ymin(&self) -> f64 {
        self.ymin
    }

    pub fn xmin(&self) -> f64 {
        self.xmin
    }

    pub fn ymax(&self) -> f64 {
        self.ymax
    }

    pub fn xmax(&self) -> f64 {
        self.xmax
    }

    /// Center as `(cx, cy)` in normalized space.
    pub fn center(&self) -> (f64, f64) {
        (
            (self.xmin + self.xmax) / 2.0,
            (self.ymin + self.ymax) / 2.0,
        )
    }

    /// The box scaled onto a `width x height` image.
    pub fn to_pixels(&self, width: u32, height: u32) -> PixelRect {
        let w = f64::from(width);
        let h = f64::from(height);
        PixelRect {
            left: self.xmin / BOX_SCALE * w,
            top: self.ymin / BOX_SCALE * h,
            right: self.xmax / BOX_SCALE * w,
            bottom: self.ymax / BOX_SCALE * h,
        }
    }
}

// ============================================================================
// PIXEL RECTANGLE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PixelRect {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl PixelRect {
    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    /// Grow by `ratio` of the rectangle's own extent on every side, then clamp
    /// to `[0, width] x [0, height]`.
    pub fn padded(&self, ratio: f64, width: u32, height: u32) -> PixelRect {
        let pad_w = self.width() * ratio;
        let pad_h = self.height() * ratio;
        PixelRect {
            left: (self.left - pad_w).max(0.0),
            top: (self.top - pad_h).max(0.0),
            right: (self.right + pad_w).min(f64::from(width)),
            bottom: (self.bottom + pad_h).min(f64::from(height)),
        }
    }

    /// Integer crop bounds `(x, y, w, h)` covering this rectangle.
    ///
    /// Returns `None` when nothing is left inside the image.
    pub fn crop_bounds(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let x0 = self.left.floor().clamp(0.0, f64::from(width)) as u32;
        let y0 = self.top.floor().clamp(0.0, f64::from(height)) as u32;
        let x1 = self.right.ceil().clamp(0.0, f64::from(width)) as u32;
        let y1 = self.bottom.ceil().clamp(0.0, f64::from(height)) as u32;
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some((x0, y0, x1 - x0, y1 - y0))
    }
}

// ============================================================================
// TILES, CANDIDATES, RESULTS
// ============================================================================

/// One cell of the planned grid, before imagery is fetched.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TileSpec {
    /// Position in the planner's row-major order.
    pub index: usize,
    /// North-south offset in tiles from the query point (north positive).
    pub row: i32,
    /// East-west offset in tiles from the query point (east positive).
    pub col: i32,
    pub center: GeoPoint,
    pub meters_per_pixel: f64,
    pub zoom: u8,
}

/// A fetched satellite image plus its real-world placement.
#[derive(Debug, Clone)]
pub struct Tile {
    pub spec: TileSpec,
    pub scale: u8,
    pub image: RgbImage,
}

impl Tile {
    /// Ground resolution of the fetched raster. A higher scale packs more
    /// pixels into the same footprint.
    pub fn effective_meters_per_pixel(&self) -> f64 {
        self.spec.meters_per_pixel / f64::from(self.scale.max(1))
    }
}

/// A Pass-1 detection waiting for verification.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub tile_index: usize,
    pub location: GeoPoint,
    pub bbox: BoundingBox,
    pub label: Option<String>,
    pub crop: RgbImage,
}

/// A candidate confirmed by Pass 2. The crop is gone by this point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerifiedPool {
    pub tile_index: usize,
    pub location: GeoPoint,
    pub bbox: BoundingBox,
    pub label: Option<String>,
}

impl From<Candidate> for VerifiedPool {
    fn from(c: Candidate) -> Self {
        Self {
            tile_index: c.tile_index,
            location: c.location,
            bbox: c.bbox,
            label: c.label,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_rejects_inverted_and_out_of_range() {
        assert!(matches!(
            BoundingBox::new(600.0, 400.0, 400.0, 600.0),
            Err(BoxError::Inverted { .. })
        ));
        assert!(matches!(
            BoundingBox::new(0.0, 0.0, 1000.5, 10.0),
            Err(BoxError::OutOfRange(_))
        ));
        assert!(matches!(
            BoundingBox::new(f64::NAN, 0.0, 10.0, 10.0),
            Err(BoxError::NotFinite(_))
        ));
        assert_eq!(
            BoundingBox::from_model_array(&[1.0, 2.0, 3.0]),
            Err(BoxError::Arity(3))
        );
    }

    #[test]
    fn test_box_center_and_pixels() {
        let b = BoundingBox::from_model_array(&[400.0, 400.0, 600.0, 600.0]).unwrap();
        assert_eq!(b.center(), (500.0, 500.0));

        let px = b.to_pixels(1280, 1280);
        assert_eq!(px.left, 512.0);
        assert_eq!(px.right, 768.0);
    }

    #[test]
    fn test_padded_crop_is_clamped() {
        let b = BoundingBox::new(0.0, 900.0, 100.0, 1000.0).unwrap();
        let padded = b.to_pixels(1000, 1000).padded(0.5, 1000, 1000);
        assert_eq!(padded.left, 850.0);
        assert_eq!(padded.top, 0.0);
        assert_eq!(padded.right, 1000.0);
        assert_eq!(padded.bottom, 150.0);
        assert_eq!(padded.crop_bounds(1000, 1000), Some((850, 0, 150, 150)));
    }

    #[test]
    fn test_zero_area_rect_has_no_crop() {
        let r = PixelRect {
            left: 10.0,
            top: 10.0,
            right: 10.0,
            bottom: 20.0,
        };
        assert_eq!(r.crop_bounds(100, 100), None);
    }
}
