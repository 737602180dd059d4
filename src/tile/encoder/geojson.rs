//! GeoJSON `FeatureCollection` output in WGS84 lon/lat.

use bytes::Bytes;
use geo_types::{Coord, Geometry, LineString, Polygon};
use serde_json::{json, Map, Value};

use crate::error::TileError;
use crate::geometry::{mercator_to_lonlat, precision_for_zoom, GeometryRecord, TileCoordinate};

/// Encode records as a GeoJSON feature collection.
///
/// Coordinates are unprojected to lon/lat and rounded to the precision
/// that resolves a quarter pixel at the tile's zoom.
pub fn encode_geojson(
    records: &[GeometryRecord],
    coord: TileCoordinate,
    clipped: bool,
) -> Result<Bytes, TileError> {
    let scale = 10f64.powi(precision_for_zoom(coord.zoom) as i32);

    let features: Vec<Value> = records
        .iter()
        .map(|record| {
            let properties: Map<String, Value> = record
                .attributes
                .iter()
                .map(|(name, value)| (name.clone(), value.to_json()))
                .collect();

            let mut feature = json!({
                "type": "Feature",
                "id": record.id.to_json(),
                "geometry": geometry_to_json(&record.geometry, scale),
                "properties": properties,
            });

            if clipped {
                feature["clipped"] = Value::Bool(true);
            }

            feature
        })
        .collect();

    let collection = json!({
        "type": "FeatureCollection",
        "features": features,
    });

    serde_json::to_vec(&collection)
        .map(Bytes::from)
        .map_err(|e| TileError::Encode {
            message: e.to_string(),
        })
}

fn position(c: &Coord<f64>, scale: f64) -> Value {
    let (lon, lat) = mercator_to_lonlat(c.x, c.y);
    json!([(lon * scale).round() / scale, (lat * scale).round() / scale])
}

fn line(line: &LineString<f64>, scale: f64) -> Value {
    Value::Array(line.0.iter().map(|c| position(c, scale)).collect())
}

fn rings(polygon: &Polygon<f64>, scale: f64) -> Value {
    let mut rings = vec![line(polygon.exterior(), scale)];
    rings.extend(polygon.interiors().iter().map(|r| line(r, scale)));
    Value::Array(rings)
}

fn geometry_to_json(geometry: &Geometry<f64>, scale: f64) -> Value {
    match geometry {
        Geometry::Point(p) => json!({"type": "Point", "coordinates": position(&p.0, scale)}),
        Geometry::MultiPoint(points) => json!({
            "type": "MultiPoint",
            "coordinates": points.iter().map(|p| position(&p.0, scale)).collect::<Vec<_>>(),
        }),
        Geometry::LineString(l) => json!({"type": "LineString", "coordinates": line(l, scale)}),
        Geometry::MultiLineString(lines) => json!({
            "type": "MultiLineString",
            "coordinates": lines.iter().map(|l| line(l, scale)).collect::<Vec<_>>(),
        }),
        Geometry::Polygon(p) => json!({"type": "Polygon", "coordinates": rings(p, scale)}),
        Geometry::MultiPolygon(polygons) => json!({
            "type": "MultiPolygon",
            "coordinates": polygons.iter().map(|p| rings(p, scale)).collect::<Vec<_>>(),
        }),
        // Providers only emit the six simple-feature kinds
        _ => Value::Null,
    }
}
