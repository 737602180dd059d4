//! Well-Known Binary decoding.
//!
//! OGC and ISO WKB (what `ST_AsBinary` emits) are read first; PostGIS EWKB
//! is accepted as a fallback. Extra ordinates are discarded and geometries
//! are always returned as 2D.

use geo_types::Geometry;
use geozero::wkb::{Ewkb, Wkb};
use geozero::ToGeo;

use crate::error::GeometryError;

/// Decode a complete WKB or EWKB buffer.
pub fn decode_wkb(bytes: &[u8]) -> Result<Geometry<f64>, GeometryError> {
    if bytes.is_empty() {
        return Err(GeometryError::Wkb("empty buffer".to_string()));
    }

    match Wkb(bytes.to_vec()).to_geo() {
        Ok(geometry) => Ok(geometry),
        Err(wkb_err) => Ewkb(bytes.to_vec())
            .to_geo()
            .map_err(|_| GeometryError::Wkb(wkb_err.to_string())),
    }
}
