// src/tile_grid.rs
//
// Tile Grid Planner: center + radius -> odd NxN grid of imagery tiles.
//
// The grid is a dense square, not a circular mask, so corner tiles at large
// radii fall outside the disc. That over-fetch is accepted for simplicity.

use crate::error::GridError;
use crate::geodesy::{meters_per_pixel, offset_to_geo_point};
use crate::types::{GeoPoint, TileSpec};
use serde::Serialize;

/// Web-Mercator imagery stops here; ground resolution collapses past it.
pub const MAX_LATITUDE: f64 = 85.051_128_78;

/// Largest grid the planner will build (41 x 41 = 1681 tiles).
pub const MAX_TILES_PER_SIDE: usize = 41;

#[derive(Debug, Clone, Serialize)]
pub struct TileGridPlan {
    pub center: GeoPoint,
    pub radius_meters: f64,
    pub zoom: u8,
    pub tile_pixel_size: u32,
    pub scale: u8,
    /// Base ground resolution at the center latitude (scale 1).
    pub meters_per_pixel: f64,
    /// Ground footprint of one tile edge.
    pub tile_size_meters: f64,
    /// Always odd, at least 1.
    pub tiles_per_side: usize,
    /// Row-major, southernmost row first, westernmost column first.
    pub tiles: Vec<TileSpec>,
}

impl TileGridPlan {
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// The tile sitting exactly on the query point.
    pub fn center_tile(&self) -> Option<&TileSpec> {
        self.tiles.iter().find(|t| t.row == 0 && t.col == 0)
    }
}

/// Smallest odd tile count per side whose span covers `2 * radius`.
///
/// Returns `None` when that count exceeds `MAX_TILES_PER_SIDE`.
pub fn tiles_per_side(radius_meters: f64, tile_size_meters: f64) -> Option<usize> {
    let radius = if radius_meters.is_finite() {
        radius_meters.max(0.0)
    } else {
        0.0
    };
    let needed = ((radius * 2.0) / tile_size_meters).ceil().max(1.0);
    if !needed.is_finite() || needed > MAX_TILES_PER_SIDE as f64 {
        return None;
    }
    let mut needed = needed as usize;
    if needed % 2 == 0 {
        needed += 1;
    }
    // MAX_TILES_PER_SIDE is odd, so bumping never crosses it
    Some(needed)
}

pub fn plan_tile_grid(
    center: GeoPoint,
    radius_meters: f64,
    zoom: u8,
    tile_pixel_size: u32,
    scale: u8,
) -> Result<TileGridPlan, GridError> {
    if !center.latitude.is_finite() || center.latitude.abs() > MAX_LATITUDE {
        return Err(GridError::LatitudeOutOfRange {
            latitude: center.latitude,
            max: MAX_LATITUDE,
        });
    }

    let mpp = meters_per_pixel(center.latitude, zoom);
    // scale raises resolution, footprint stays the same
    let tile_size_meters = f64::from(tile_pixel_size) * mpp;
    let per_side =
        tiles_per_side(radius_meters, tile_size_meters).ok_or(GridError::TooManyTiles {
            radius_meters,
            zoom,
            max: MAX_TILES_PER_SIDE,
        })?;
    let half = (per_side / 2) as i32;

    let mut tiles = Vec::with_capacity(per_side * per_side);
    for i in -half..=half {
        for j in -half..=half {
            let tile_center = offset_to_geo_point(
                center,
                f64::from(j) * tile_size_meters,
                f64::from(i) * tile_size_meters,
            );
            tiles.push(TileSpec {
                index: tiles.len(),
                row: i,
                col: j,
                center: tile_center,
                meters_per_pixel: mpp,
                zoom,
            });
        }
    }

    Ok(TileGridPlan {
        center,
        radius_meters,
        zoom,
        tile_pixel_size,
        scale,
        meters_per_pixel: mpp,
        tile_size_meters,
        tiles_per_side: per_side,
        tiles,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_la_scenario_small_odd_grid_centered() {
        let center = GeoPoint::new(34.0, -118.4);
        let plan = plan_tile_grid(center, 100.0, 20, 640, 2).unwrap();

        // ~0.124 m/px at zoom 20 -> ~79 m tiles -> ceil(200/79) = 3
        assert_eq!(plan.tiles_per_side, 3);
        assert_eq!(plan.len(), 9);
        assert_eq!(plan.center_tile().unwrap().center, center);
        assert_eq!(plan.tiles[4].center, center);
    }

    #[test]
    fn test_zero_radius_yields_single_tile() {
        let center = GeoPoint::new(-33.86, 151.2);
        let plan = plan_tile_grid(center, 0.0, 19, 640, 2).unwrap();
        assert_eq!(plan.tiles_per_side, 1);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.tiles[0].center, center);
    }

    #[test]
    fn test_grid_is_always_odd_and_square() {
        let center = GeoPoint::new(51.5, -0.12);
        for radius in [0.0, 1.0, 39.0, 50.0, 150.0, 200.0, 333.0, 500.0, 1000.0] {
            for zoom in [17, 18, 19, 20] {
                let plan = plan_tile_grid(center, radius, zoom, 640, 2).unwrap();
                assert_eq!(plan.tiles_per_side % 2, 1, "r={} z={}", radius, zoom);
                assert_eq!(plan.len(), plan.tiles_per_side * plan.tiles_per_side);
                assert_eq!(plan.center_tile().unwrap().center, center);
                // the grid must span the requested diameter
                assert!(plan.tiles_per_side as f64 * plan.tile_size_meters >= radius * 2.0);
            }
        }
    }

    #[test]
    fn test_even_count_is_bumped() {
        // exactly two tiles would cover it, bump to three
        assert_eq!(tiles_per_side(100.0, 100.0), Some(3));
        assert_eq!(tiles_per_side(50.0, 100.0), Some(1));
        assert_eq!(tiles_per_side(-5.0, 100.0), Some(1));
        assert_eq!(tiles_per_side(f64::NAN, 100.0), Some(1));
    }

    #[test]
    fn test_tile_count_is_capped() {
        // 40 tiles would do, bumped to the 41 cap
        assert_eq!(tiles_per_side(2000.0, 100.0), Some(41));
        assert_eq!(tiles_per_side(2050.1, 100.0), None);
        assert_eq!(tiles_per_side(f64::INFINITY, 100.0), Some(1));
        assert_eq!(tiles_per_side(10.0, 0.0), None);
    }

    #[test]
    fn test_huge_radius_is_rejected_without_allocating() {
        let err = plan_tile_grid(GeoPoint::new(34.0, -118.4), 1.0e6, 20, 640, 2).unwrap_err();
        assert_eq!(
            err,
            GridError::TooManyTiles {
                radius_meters: 1.0e6,
                zoom: 20,
                max: MAX_TILES_PER_SIDE,
            }
        );
    }

    #[test]
    fn test_polar_latitude_is_rejected() {
        for lat in [89.9, -90.0, f64::NAN] {
            let err = plan_tile_grid(GeoPoint::new(lat, 0.0), 100.0, 20, 640, 2).unwrap_err();
            assert!(matches!(err, GridError::LatitudeOutOfRange { .. }), "lat={}", lat);
        }
        assert!(plan_tile_grid(GeoPoint::new(85.0, 0.0), 0.0, 20, 640, 2).is_ok());
    }

    #[test]
    fn test_tile_order_and_directions() {
        let center = GeoPoint::new(34.0, -118.4);
        let plan = plan_tile_grid(center, 100.0, 20, 640, 2).unwrap();

        let first = &plan.tiles[0];
        assert_eq!((first.row, first.col), (-1, -1));
        assert!(first.center.latitude < center.latitude);
        assert!(first.center.longitude < center.longitude);

        let last = plan.tiles.last().unwrap();
        assert_eq!((last.row, last.col), (1, 1));
        assert!(last.center.latitude > center.latitude);
        assert!(last.center.longitude > center.longitude);

        for (idx, t) in plan.tiles.iter().enumerate() {
            assert_eq!(t.index, idx);
            assert!(t.meters_per_pixel > 0.0);
        }
    }
}
