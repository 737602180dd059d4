//! Reprojection to the working CRS and clipping against a tile bbox.

use std::panic::{catch_unwind, AssertUnwindSafe};

use geo::{BooleanOps, BoundingRect, CoordsIter, MapCoords};
use geo_types::{Coord, Geometry, LineString, MultiLineString, MultiPoint, MultiPolygon, Polygon};

use crate::error::GeometryError;

use super::coord::{lonlat_to_mercator, BoundingBox};

/// SRID of the working CRS all records are delivered in.
pub const WORKING_SRID: i32 = 3857;

/// SRIDs that are spherical mercator under another name.
const MERCATOR_ALIASES: [i32; 4] = [3857, 900913, 102100, 102113];

/// Geographic SRIDs treated as plain lon/lat degrees.
const LONLAT_SRIDS: [i32; 3] = [4326, 4269, 4258];

/// Reproject a geometry from `srid` into EPSG:3857.
pub fn reproject(geometry: Geometry<f64>, srid: i32) -> Result<Geometry<f64>, GeometryError> {
    if MERCATOR_ALIASES.contains(&srid) {
        return Ok(geometry);
    }

    if LONLAT_SRIDS.contains(&srid) {
        return Ok(geometry.map_coords(|Coord { x, y }| {
            let (x, y) = lonlat_to_mercator(x, y);
            Coord { x, y }
        }));
    }

    Err(GeometryError::UnsupportedSrid(srid))
}

/// Intersect a geometry with the tile bbox.
///
/// Returns `Ok(None)` when nothing of the geometry remains inside the box.
/// Lines may come back as a `MultiLineString` when the box cuts them into
/// several pieces.
pub fn clip_to_bbox(
    geometry: &Geometry<f64>,
    bbox: &BoundingBox,
) -> Result<Option<Geometry<f64>>, GeometryError> {
    validate(geometry)?;

    let Some(bounds) = geometry.bounding_rect() else {
        return Ok(None);
    };

    // Entirely inside: nothing to cut
    if bbox.contains(bounds.min().x, bounds.min().y) && bbox.contains(bounds.max().x, bounds.max().y) {
        return Ok(Some(geometry.clone()));
    }

    // Entirely outside
    if bounds.max().x < bbox.min_x
        || bounds.min().x > bbox.max_x
        || bounds.max().y < bbox.min_y
        || bounds.min().y > bbox.max_y
    {
        return Ok(None);
    }

    let clip_area = MultiPolygon(vec![bbox.to_rect().to_polygon()]);

    match geometry {
        Geometry::Point(point) => Ok(bbox.contains(point.x(), point.y()).then(|| geometry.clone())),
        Geometry::MultiPoint(points) => {
            let kept: Vec<_> = points
                .iter()
                .filter(|p| bbox.contains(p.x(), p.y()))
                .copied()
                .collect();
            Ok((!kept.is_empty()).then(|| Geometry::MultiPoint(MultiPoint(kept))))
        }
        Geometry::LineString(line) => {
            clip_lines(&clip_area, MultiLineString(vec![line.clone()]), true)
        }
        Geometry::MultiLineString(lines) => clip_lines(&clip_area, lines.clone(), false),
        Geometry::Polygon(polygon) => {
            clip_polygons(&clip_area, MultiPolygon(vec![polygon.clone()]), true)
        }
        Geometry::MultiPolygon(polygons) => clip_polygons(&clip_area, polygons.clone(), false),
        other => Err(GeometryError::Degenerate(format!(
            "cannot clip {:?}",
            std::mem::discriminant(other)
        ))),
    }
}

fn clip_lines(
    clip_area: &MultiPolygon<f64>,
    lines: MultiLineString<f64>,
    collapse: bool,
) -> Result<Option<Geometry<f64>>, GeometryError> {
    // boolean ops can panic on pathological input
    let clipped = catch_unwind(AssertUnwindSafe(|| clip_area.clip(&lines, false)))
        .map_err(|_| GeometryError::Degenerate("line clipping failed".to_string()))?;

    let mut parts: Vec<LineString<f64>> = clipped
        .0
        .into_iter()
        .filter(|line| line.0.len() >= 2)
        .collect();

    Ok(match parts.len() {
        0 => None,
        1 if collapse => parts.pop().map(Geometry::LineString),
        _ => Some(Geometry::MultiLineString(MultiLineString(parts))),
    })
}

fn clip_polygons(
    clip_area: &MultiPolygon<f64>,
    polygons: MultiPolygon<f64>,
    collapse: bool,
) -> Result<Option<Geometry<f64>>, GeometryError> {
    let clipped = catch_unwind(AssertUnwindSafe(|| clip_area.intersection(&polygons)))
        .map_err(|_| GeometryError::Degenerate("polygon intersection failed".to_string()))?;

    let mut parts: Vec<Polygon<f64>> = clipped
        .0
        .into_iter()
        .filter(|polygon| polygon.exterior().0.len() >= 4)
        .collect();

    Ok(match parts.len() {
        0 => None,
        1 if collapse => parts.pop().map(Geometry::Polygon),
        _ => Some(Geometry::MultiPolygon(MultiPolygon(parts))),
    })
}

/// Reject geometry the boolean operations cannot handle.
fn validate(geometry: &Geometry<f64>) -> Result<(), GeometryError> {
    if geometry
        .coords_iter()
        .any(|c| !c.x.is_finite() || !c.y.is_finite())
    {
        return Err(GeometryError::Degenerate("non-finite coordinate".to_string()));
    }

    let bad_line = |line: &LineString<f64>| line.0.len() < 2;
    let bad_polygon = |polygon: &Polygon<f64>| {
        polygon.exterior().0.len() < 4 || polygon.interiors().iter().any(|r| r.0.len() < 4)
    };

    let degenerate = match geometry {
        Geometry::LineString(line) => bad_line(line),
        Geometry::MultiLineString(lines) => lines.0.iter().any(bad_line),
        Geometry::Polygon(polygon) => bad_polygon(polygon),
        Geometry::MultiPolygon(polygons) => polygons.0.iter().any(bad_polygon),
        _ => false,
    };

    if degenerate {
        return Err(GeometryError::Degenerate(
            "ring or line with too few positions".to_string(),
        ));
    }

    Ok(())
}
