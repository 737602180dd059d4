//! Geometry primitives shared by providers and encoders.
//!
//! - [`TileCoordinate`] / [`BoundingBox`]: XYZ tile grid in spherical mercator
//! - [`decode_wkb`]: (E)WKB decoding into `geo_types`
//! - [`GeometryRecord`]: one typed feature as returned by a provider
//! - [`reproject`] / [`clip_to_bbox`]: CRS normalisation and tile clipping

mod clip;
mod coord;
mod record;
mod wkb;

pub use clip::{clip_to_bbox, reproject, WORKING_SRID};
pub use coord::{
    lonlat_to_mercator, mercator_to_lonlat, precision_for_zoom, BoundingBox, TileCoordinate,
    EARTH_RADIUS, MAX_LATITUDE, MAX_ZOOM, ORIGIN_SHIFT,
};
pub use record::{AttributeValue, FeatureId, GeometryKind, GeometryRecord, GeometryTypeFilter};
pub use wkb::decode_wkb;

#[cfg(test)]
pub(crate) use wkb::tests as wkb_fixtures;
