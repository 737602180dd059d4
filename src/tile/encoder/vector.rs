//! Mapbox vector tile output.

use bytes::Bytes;
use geo::orient::{Direction, Orient};
use geo_types::{Coord, Geometry, LineString, Polygon};
use mvt::{GeomEncoder, GeomType, Tile};
use tracing::debug;

use crate::error::TileError;
use crate::geometry::{AttributeValue, BoundingBox, FeatureId, GeometryRecord, TileCoordinate};

/// Tile-space resolution of every encoded layer.
pub const MVT_EXTENT: u32 = 4096;

/// Encode records as a one-layer vector tile named `layer_name`.
///
/// Features get sequential ids; the record id travels as the `uid` tag.
pub fn encode_mvt(
    layer_name: &str,
    records: &[GeometryRecord],
    coord: TileCoordinate,
) -> Result<Bytes, TileError> {
    let bbox = coord.bbox();
    let mut tile = Tile::new(MVT_EXTENT);
    let mut layer = tile.create_layer(layer_name);
    let mut next_id = 1u64;

    for record in records {
        let geom_data = match encode_geometry(&record.geometry, &bbox) {
            Ok(Some(data)) => data,
            Ok(None) => continue,
            Err(e) => {
                debug!(layer = layer_name, id = %record.id, error = %e, "Skipping unencodable feature");
                continue;
            }
        };

        let mut feature = layer.into_feature(geom_data);
        feature.set_id(next_id);
        next_id += 1;

        for (name, value) in &record.attributes {
            match value {
                AttributeValue::String(s) => feature.add_tag_string(name, s),
                AttributeValue::Int(i) => feature.add_tag_sint(name, *i),
                AttributeValue::Float(f) => feature.add_tag_double(name, *f),
                AttributeValue::Bool(b) => feature.add_tag_bool(name, *b),
            }
        }

        match &record.id {
            FeatureId::Int(i) => feature.add_tag_sint("uid", *i),
            FeatureId::String(s) => feature.add_tag_string("uid", s),
        }

        layer = feature.into_layer();
    }

    tile.add_layer(layer).map_err(encode_error)?;
    tile.to_bytes().map(Bytes::from).map_err(encode_error)
}

fn encode_error(e: mvt::Error) -> TileError {
    TileError::Encode {
        message: e.to_string(),
    }
}

/// Web mercator to tile space, y pointing down.
fn to_tile(c: &Coord<f64>, bbox: &BoundingBox) -> (f64, f64) {
    let extent = MVT_EXTENT as f64;
    let x = (c.x - bbox.min_x) / bbox.width() * extent;
    let y = (bbox.max_y - c.y) / bbox.height() * extent;
    (x.round(), y.round())
}

fn encode_geometry(
    geometry: &Geometry<f64>,
    bbox: &BoundingBox,
) -> Result<Option<mvt::GeomData>, mvt::Error> {
    let encoder = match geometry {
        Geometry::Point(p) => {
            let (x, y) = to_tile(&p.0, bbox);
            GeomEncoder::new(GeomType::Point).point(x, y)?
        }
        Geometry::MultiPoint(points) => {
            let mut encoder = GeomEncoder::new(GeomType::Point);
            for p in points {
                let (x, y) = to_tile(&p.0, bbox);
                encoder = encoder.point(x, y)?;
            }
            encoder
        }
        Geometry::LineString(line) => add_line(GeomEncoder::new(GeomType::Linestring), line, bbox)?,
        Geometry::MultiLineString(lines) => {
            let mut encoder = GeomEncoder::new(GeomType::Linestring);
            for line in lines {
                encoder = add_line(encoder, line, bbox)?;
            }
            encoder
        }
        Geometry::Polygon(polygon) => add_polygon(GeomEncoder::new(GeomType::Polygon), polygon, bbox)?,
        Geometry::MultiPolygon(polygons) => {
            let mut encoder = GeomEncoder::new(GeomType::Polygon);
            for polygon in polygons {
                encoder = add_polygon(encoder, polygon, bbox)?;
            }
            encoder
        }
        _ => return Ok(None),
    };

    encoder.encode().map(Some)
}

fn add_line(
    mut encoder: GeomEncoder<f64>,
    line: &LineString<f64>,
    bbox: &BoundingBox,
) -> Result<GeomEncoder<f64>, mvt::Error> {
    for c in line.coords() {
        let (x, y) = to_tile(c, bbox);
        encoder = encoder.point(x, y)?;
    }
    encoder.complete()
}

fn add_polygon(
    mut encoder: GeomEncoder<f64>,
    polygon: &Polygon<f64>,
    bbox: &BoundingBox,
) -> Result<GeomEncoder<f64>, mvt::Error> {
    // Exterior counter-clockwise in mercator becomes clockwise once y flips
    let polygon = polygon.orient(Direction::Default);

    for ring in std::iter::once(polygon.exterior()).chain(polygon.interiors()) {
        // ClosePath closes the ring; skip the repeated first position
        let open = &ring.0[..ring.0.len().saturating_sub(1)];
        for c in open {
            let (x, y) = to_tile(c, bbox);
            encoder = encoder.point(x, y)?;
        }
        encoder = encoder.complete()?;
    }

    Ok(encoder)
}
