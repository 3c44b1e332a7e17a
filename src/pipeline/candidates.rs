// src/pipeline/candidates.rs
//
// Pass-1 geometry: turn a detected box on a tile into a ground location
// and a padded crop for the verifier.

use crate::detector::DetectedBox;
use crate::geodesy::pixel_to_geo_point;
use crate::types::{BoundingBox, Candidate, GeoPoint, PixelRect, Tile, BOX_SCALE};
use image::imageops;

/// Pixel position of the box center on a `width x height` image.
pub fn box_center_pixels(bbox: &BoundingBox, width: u32, height: u32) -> (f64, f64) {
    let (cx, cy) = bbox.center();
    (
        cx / BOX_SCALE * f64::from(width),
        cy / BOX_SCALE * f64::from(height),
    )
}

/// Ground location of the box center.
pub fn locate_box(tile: &Tile, bbox: &BoundingBox) -> GeoPoint {
    let (w, h) = tile.image.dimensions();
    let (px, py) = box_center_pixels(bbox, w, h);
    pixel_to_geo_point(
        px,
        py,
        tile.spec.center,
        tile.effective_meters_per_pixel(),
        w,
        h,
    )
}

/// Box in pixels, grown by `padding_ratio` per side and clamped to the image.
pub fn crop_rect(bbox: &BoundingBox, width: u32, height: u32, padding_ratio: f64) -> PixelRect {
    bbox.to_pixels(width, height)
        .padded(padding_ratio, width, height)
}

/// Build a candidate, or `None` when the padded crop is empty.
pub fn build_candidate(tile: &Tile, detected: DetectedBox, padding_ratio: f64) -> Option<Candidate> {
    let (w, h) = tile.image.dimensions();
    let rect = crop_rect(&detected.bbox, w, h, padding_ratio);
    let (x, y, cw, ch) = rect.crop_bounds(w, h)?;
    let crop = imageops::crop_imm(&tile.image, x, y, cw, ch).to_image();

    Some(Candidate {
        tile_index: tile.spec.index,
        location: locate_box(tile, &detected.bbox),
        bbox: detected.bbox,
        label: detected.label,
        crop,
    })
}

/// Candidates for every box on a tile, plus how many produced no crop.
pub fn candidates_from_tile(
    tile: &Tile,
    boxes: Vec<DetectedBox>,
    padding_ratio: f64,
) -> (Vec<Candidate>, usize) {
    let mut out = Vec::with_capacity(boxes.len());
    let mut skipped = 0;
    for detected in boxes {
        match build_candidate(tile, detected, padding_ratio) {
            Some(c) => out.push(c),
            None => skipped += 1,
        }
    }
    (out, skipped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geodesy::meters_per_pixel;
    use crate::types::TileSpec;
    use image::RgbImage;

    fn la_tile() -> Tile {
        let center = GeoPoint::new(34.0, -118.4);
        Tile {
            spec: TileSpec {
                index: 4,
                row: 0,
                col: 0,
                center,
                meters_per_pixel: meters_per_pixel(center.latitude, 20),
                zoom: 20,
            },
            scale: 2,
            image: RgbImage::new(1280, 1280),
        }
    }

    fn center_box() -> BoundingBox {
        BoundingBox::new(400.0, 400.0, 600.0, 600.0).unwrap()
    }

    #[test]
    fn test_centered_box_maps_to_image_center() {
        assert_eq!(box_center_pixels(&center_box(), 1280, 1280), (640.0, 640.0));
    }

    #[test]
    fn test_centered_box_is_located_at_tile_center() {
        let tile = la_tile();
        assert_eq!(locate_box(&tile, &center_box()), tile.spec.center);
    }

    #[test]
    fn test_padded_crop_rect() {
        let rect = crop_rect(&center_box(), 1280, 1280, 0.5);
        assert_eq!(
            rect,
            PixelRect {
                left: 384.0,
                top: 384.0,
                right: 896.0,
                bottom: 896.0,
            }
        );
    }

    #[test]
    fn test_narrow_padding_crop_bounds() {
        // box spans 512..768 px, so 0.25 pads 64 px and 0.125 pads 32 px
        let quarter = crop_rect(&center_box(), 1280, 1280, 0.25);
        assert_eq!(quarter.crop_bounds(1280, 1280), Some((448, 448, 384, 384)));
        let eighth = crop_rect(&center_box(), 1280, 1280, 0.125);
        assert_eq!(eighth.crop_bounds(1280, 1280), Some((480, 480, 320, 320)));
    }

    #[test]
    fn test_candidate_crop_dimensions() {
        let tile = la_tile();
        let detected = DetectedBox {
            bbox: center_box(),
            label: Some("potential_pool".to_string()),
        };
        let c = build_candidate(&tile, detected, 0.5).unwrap();
        assert_eq!(c.tile_index, 4);
        assert_eq!(c.crop.dimensions(), (512, 512));
        assert_eq!(c.location, tile.spec.center);
    }

    #[test]
    fn test_scale_halves_ground_offset() {
        let tile = la_tile();
        // box center sits at x=1248, 608 px east of center
        let bbox = BoundingBox::new(450.0, 950.0, 550.0, 1000.0).unwrap();
        let loc = locate_box(&tile, &bbox);
        let (px, _) = box_center_pixels(&bbox, 1280, 1280);
        let dx_m = (px - 640.0) * tile.spec.meters_per_pixel / 2.0;
        let expected = dx_m / (111_111.0 * 34f64.to_radians().cos());
        assert!((loc.longitude - (-118.4 + expected)).abs() < 1e-12);
        assert_eq!(loc.latitude, 34.0);
    }

    #[test]
    fn test_degenerate_box_is_skipped() {
        let tile = la_tile();
        let flat = DetectedBox {
            bbox: BoundingBox::new(500.0, 100.0, 500.0, 200.0).unwrap(),
            label: None,
        };
        let ok = DetectedBox {
            bbox: center_box(),
            label: None,
        };
        let (cands, skipped) = candidates_from_tile(&tile, vec![flat, ok], 0.5);
        assert_eq!(cands.len(), 1);
        assert_eq!(skipped, 1);
    }
}
