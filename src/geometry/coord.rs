//! Tile grid math for the spherical mercator (EPSG:3857) XYZ scheme.
//!
//! Row 0 is the northernmost row, column 0 the westernmost column. The grid
//! covers the square `[-ORIGIN_SHIFT, ORIGIN_SHIFT]` in both axes.

use std::f64::consts::PI;

use geo_types::{coord, Rect};

use crate::error::TileError;

/// Earth radius used by spherical mercator, in meters.
pub const EARTH_RADIUS: f64 = 6_378_137.0;

/// Half the width of the mercator square, in meters.
pub const ORIGIN_SHIFT: f64 = PI * EARTH_RADIUS;

/// Highest zoom level accepted by [`TileCoordinate::new`].
pub const MAX_ZOOM: u8 = 30;

/// Latitude limit of the mercator square.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

// =============================================================================
// TileCoordinate
// =============================================================================

/// A tile address: zoom level, column and row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoordinate {
    /// Zoom level (0 = whole world in one tile)
    pub zoom: u8,

    /// Column, counted from the west edge
    pub column: u32,

    /// Row, counted from the north edge
    pub row: u32,
}

impl TileCoordinate {
    /// Create a coordinate, rejecting positions outside the grid at `zoom`.
    pub fn new(zoom: u32, column: u32, row: u32) -> Result<Self, TileError> {
        let invalid = TileError::InvalidCoordinate { zoom, column, row };

        if zoom > MAX_ZOOM as u32 {
            return Err(invalid);
        }

        let size = 1u64 << zoom;
        if column as u64 >= size || row as u64 >= size {
            return Err(invalid);
        }

        Ok(Self {
            zoom: zoom as u8,
            column,
            row,
        })
    }

    /// Number of tiles along one axis at this zoom.
    pub fn grid_size(&self) -> u64 {
        1u64 << self.zoom
    }

    /// Projected bounding box covered by this tile.
    pub fn bbox(&self) -> BoundingBox {
        let span = 2.0 * ORIGIN_SHIFT / self.grid_size() as f64;

        let min_x = -ORIGIN_SHIFT + self.column as f64 * span;
        let max_y = ORIGIN_SHIFT - self.row as f64 * span;

        BoundingBox {
            min_x,
            min_y: max_y - span,
            max_x: min_x + span,
            max_y,
        }
    }

    /// Quadkey string for this tile (empty at zoom 0).
    pub fn quadkey(&self) -> String {
        let mut key = String::with_capacity(self.zoom as usize);
        for i in (1..=self.zoom).rev() {
            let mask = 1u32 << (i - 1);
            let mut digit = b'0';
            if self.column & mask != 0 {
                digit += 1;
            }
            if self.row & mask != 0 {
                digit += 2;
            }
            key.push(digit as char);
        }
        key
    }
}

impl std::fmt::Display for TileCoordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.column, self.row)
    }
}

// =============================================================================
// BoundingBox
// =============================================================================

/// Axis-aligned rectangle in EPSG:3857 meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Whether the point lies inside or on the boundary.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// The four coordinates in `min_x, min_y, max_x, max_y` order.
    pub fn to_array(&self) -> [f64; 4] {
        [self.min_x, self.min_y, self.max_x, self.max_y]
    }

    pub fn to_rect(&self) -> Rect<f64> {
        Rect::new(
            coord! { x: self.min_x, y: self.min_y },
            coord! { x: self.max_x, y: self.max_y },
        )
    }
}

// =============================================================================
// Projection helpers
// =============================================================================

/// Project WGS84 longitude/latitude degrees to spherical mercator meters.
///
/// Latitudes are clamped to the mercator limit so poles stay finite.
pub fn lonlat_to_mercator(lon: f64, lat: f64) -> (f64, f64) {
    let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE);
    let x = lon.to_radians() * EARTH_RADIUS;
    let y = (PI / 4.0 + lat.to_radians() / 2.0).tan().ln() * EARTH_RADIUS;
    (x, y)
}

/// Inverse of [`lonlat_to_mercator`].
pub fn mercator_to_lonlat(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / EARTH_RADIUS).to_degrees();
    let lat = (2.0 * (y / EARTH_RADIUS).exp().atan() - PI / 2.0).to_degrees();
    (lon, lat)
}

/// Decimal places for lon/lat output at `zoom`, good to roughly a quarter pixel.
pub fn precision_for_zoom(zoom: u8) -> u32 {
    let digits = ((zoom as f64 + 10.0) * 2f64.log10()).ceil() as i64 - 2;
    digits.max(0) as u32
}
