// src/geodesy.rs
//
// Ground resolution and planar offset math for Web-Mercator imagery.
//
// Offsets use the equirectangular small-distance approximation: one degree
// of latitude is taken as 111 111 m and a degree of longitude shrinks with
// cos(latitude). Error stays well under a meter for offsets of a few hundred
// meters away from the poles, which is the only range tiles and crops use.

use crate::types::GeoPoint;

/// Web-Mercator ground resolution at zoom 0 on the equator, in m/px.
pub const EQUATOR_METERS_PER_PIXEL: f64 = 156_543.033_92;

/// Meters per degree of latitude in the small-offset approximation.
pub const METERS_PER_DEGREE: f64 = 111_111.0;

/// Ground distance covered by one pixel at `latitude` (degrees) and `zoom`.
pub fn meters_per_pixel(latitude: f64, zoom: u8) -> f64 {
    EQUATOR_METERS_PER_PIXEL * latitude.to_radians().cos() / 2f64.powi(i32::from(zoom))
}

/// Move `origin` by `dx_meters` east and `dy_meters` north.
///
/// Valid for offsets of tens to low hundreds of meters. The approximation
/// ignores Earth's curvature, so larger offsets drift and the longitude term
/// blows up near the poles.
pub fn offset_to_geo_point(origin: GeoPoint, dx_meters: f64, dy_meters: f64) -> GeoPoint {
    debug_assert!(dx_meters.is_finite() && dy_meters.is_finite());
    let d_lat = dy_meters / METERS_PER_DEGREE;
    let d_lng = dx_meters / (METERS_PER_DEGREE * origin.latitude.to_radians().cos());
    GeoPoint::new(origin.latitude + d_lat, origin.longitude + d_lng)
}

/// Map a pixel of a tile image to the ground.
///
/// Image rows grow downward while latitude grows upward, hence the flipped
/// vertical offset.
pub fn pixel_to_geo_point(
    px: f64,
    py: f64,
    tile_center: GeoPoint,
    meters_per_pixel: f64,
    img_width: u32,
    img_height: u32,
) -> GeoPoint {
    debug_assert!(meters_per_pixel > 0.0);
    let dx_px = px - f64::from(img_width) / 2.0;
    let dy_px = f64::from(img_height) / 2.0 - py;
    offset_to_geo_point(
        tile_center,
        dx_px * meters_per_pixel,
        dy_px * meters_per_pixel,
    )
}

/// Inverse of [`pixel_to_geo_point`] under the same conventions.
pub fn geo_point_to_pixel(
    point: GeoPoint,
    tile_center: GeoPoint,
    meters_per_pixel: f64,
    img_width: u32,
    img_height: u32,
) -> (f64, f64) {
    debug_assert!(meters_per_pixel > 0.0);
    let dy_m = (point.latitude - tile_center.latitude) * METERS_PER_DEGREE;
    let dx_m = (point.longitude - tile_center.longitude)
        * METERS_PER_DEGREE
        * tile_center.latitude.to_radians().cos();
    let px = f64::from(img_width) / 2.0 + dx_m / meters_per_pixel;
    let py = f64::from(img_height) / 2.0 - dy_m / meters_per_pixel;
    (px, py)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equator_zoom_zero_matches_constant() {
        assert_eq!(meters_per_pixel(0.0, 0), EQUATOR_METERS_PER_PIXEL);
        assert_eq!(meters_per_pixel(0.0, 1), EQUATOR_METERS_PER_PIXEL / 2.0);
    }

    #[test]
    fn test_meters_per_pixel_decreases_with_zoom() {
        for lat in [-60.0, -12.5, 0.0, 34.0, 71.0] {
            let mut prev = meters_per_pixel(lat, 0);
            for zoom in 1..=21 {
                let cur = meters_per_pixel(lat, zoom);
                assert!(cur < prev, "lat={} zoom={}", lat, zoom);
                prev = cur;
            }
        }
    }

    #[test]
    fn test_meters_per_pixel_symmetric_in_latitude() {
        for lat in [1.0, 20.0, 34.0, 45.5, 80.0] {
            for zoom in [0, 10, 20] {
                assert_eq!(meters_per_pixel(lat, zoom), meters_per_pixel(-lat, zoom));
            }
        }
    }

    #[test]
    fn test_zero_offset_is_identity() {
        let origin = GeoPoint::new(34.0, -118.4);
        assert_eq!(offset_to_geo_point(origin, 0.0, 0.0), origin);
    }

    #[test]
    fn test_offset_directions() {
        let origin = GeoPoint::new(34.0, -118.4);
        let north_east = offset_to_geo_point(origin, 50.0, 50.0);
        assert!(north_east.latitude > origin.latitude);
        assert!(north_east.longitude > origin.longitude);

        let p = offset_to_geo_point(origin, 0.0, 111_111.0);
        assert!((p.latitude - 35.0).abs() < 1e-12);
    }

    #[test]
    fn test_image_center_maps_to_tile_center() {
        let center = GeoPoint::new(34.0, -118.4);
        let p = pixel_to_geo_point(640.0, 640.0, center, 0.06, 1280, 1280);
        assert_eq!(p, center);
    }

    #[test]
    fn test_top_of_image_is_north() {
        let center = GeoPoint::new(34.0, -118.4);
        let top = pixel_to_geo_point(640.0, 0.0, center, 0.06, 1280, 1280);
        assert!(top.latitude > center.latitude);
        assert!((top.longitude - center.longitude).abs() < 1e-15);
    }

    #[test]
    fn test_pixel_round_trip() {
        let center = GeoPoint::new(34.0, -118.4);
        let mpp = meters_per_pixel(center.latitude, 20) / 2.0;
        for (px, py) in [(0.0, 0.0), (100.5, 900.25), (1280.0, 1280.0), (640.0, 12.0)] {
            let geo = pixel_to_geo_point(px, py, center, mpp, 1280, 1280);
            let (rx, ry) = geo_point_to_pixel(geo, center, mpp, 1280, 1280);
            assert!((rx - px).abs() < 1e-6, "x: {} vs {}", rx, px);
            assert!((ry - py).abs() < 1e-6, "y: {} vs {}", ry, py);
        }
    }
}
