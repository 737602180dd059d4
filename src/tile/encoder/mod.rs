//! Tile payload encoders.
//!
//! Every layer is encoded on its own, so the output for a layer is the same
//! whether it is served alone or as a member of a composite. Merging member
//! outputs is then a byte-level splice:
//!
//! - GeoJSON: an object keyed by member name, each value a member's
//!   `FeatureCollection`
//! - MVT: concatenated tiles, since a tile is a repeated `layers` field

mod geojson;
mod vector;

use std::fmt;

use bytes::{Bytes, BytesMut};

use crate::error::TileError;
use crate::geometry::{GeometryRecord, TileCoordinate};

pub use geojson::encode_geojson;
pub use vector::{encode_mvt, MVT_EXTENT};

/// Content type of GeoJSON payloads.
pub const GEOJSON_CONTENT_TYPE: &str = "application/json";

/// Content type of Mapbox vector tiles.
pub const MVT_CONTENT_TYPE: &str = "application/vnd.mapbox-vector-tile";

// =============================================================================
// TileFormat
// =============================================================================

/// Output format, chosen by the request's file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileFormat {
    GeoJson,
    Mvt,
}

impl TileFormat {
    /// Map an extension (case-insensitive) to a format.
    pub fn from_extension(extension: &str) -> Result<Self, TileError> {
        match extension.to_ascii_lowercase().as_str() {
            "json" | "geojson" => Ok(TileFormat::GeoJson),
            "mvt" | "pbf" => Ok(TileFormat::Mvt),
            _ => Err(TileError::UnsupportedFormat {
                extension: extension.to_string(),
            }),
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            TileFormat::GeoJson => GEOJSON_CONTENT_TYPE,
            TileFormat::Mvt => MVT_CONTENT_TYPE,
        }
    }

    /// Encode one layer's records.
    ///
    /// `clipped` marks GeoJSON features as cut to the tile boundary.
    pub fn encode_layer(
        &self,
        name: &str,
        records: &[GeometryRecord],
        coord: TileCoordinate,
        clipped: bool,
    ) -> Result<Bytes, TileError> {
        match self {
            TileFormat::GeoJson => encode_geojson(records, coord, clipped),
            TileFormat::Mvt => encode_mvt(name, records, coord),
        }
    }

    /// Combine encoded member layers, in order, into one payload.
    pub fn merge(&self, parts: &[(String, Bytes)]) -> Result<Bytes, TileError> {
        match self {
            TileFormat::GeoJson => {
                let capacity = parts.iter().map(|(n, b)| n.len() + b.len() + 4).sum::<usize>() + 2;
                let mut out = BytesMut::with_capacity(capacity);
                out.extend_from_slice(b"{");
                for (index, (name, bytes)) in parts.iter().enumerate() {
                    if index > 0 {
                        out.extend_from_slice(b",");
                    }
                    let key = serde_json::to_string(name).map_err(|e| TileError::Encode {
                        message: e.to_string(),
                    })?;
                    out.extend_from_slice(key.as_bytes());
                    out.extend_from_slice(b":");
                    out.extend_from_slice(bytes);
                }
                out.extend_from_slice(b"}");
                Ok(out.freeze())
            }
            TileFormat::Mvt => {
                let mut out = BytesMut::with_capacity(parts.iter().map(|(_, b)| b.len()).sum());
                for (_, bytes) in parts {
                    out.extend_from_slice(bytes);
                }
                Ok(out.freeze())
            }
        }
    }
}

impl fmt::Display for TileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TileFormat::GeoJson => f.write_str("geojson"),
            TileFormat::Mvt => f.write_str("mvt"),
        }
    }
}
