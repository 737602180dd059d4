//! Typed geometry records produced by layer providers.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use geo_types::Geometry;
use serde::{Deserialize, Serialize};

// =============================================================================
// GeometryKind
// =============================================================================

/// The six simple-feature geometry types a layer can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GeometryKind {
    Point,
    MultiPoint,
    LineString,
    MultiLineString,
    Polygon,
    MultiPolygon,
}

impl GeometryKind {
    pub const ALL: [GeometryKind; 6] = [
        GeometryKind::Point,
        GeometryKind::MultiPoint,
        GeometryKind::LineString,
        GeometryKind::MultiLineString,
        GeometryKind::Polygon,
        GeometryKind::MultiPolygon,
    ];

    /// Kind of a decoded geometry, or `None` for collections and the
    /// non-simple-feature variants of `geo_types::Geometry`.
    pub fn of(geometry: &Geometry<f64>) -> Option<Self> {
        match geometry {
            Geometry::Point(_) => Some(GeometryKind::Point),
            Geometry::MultiPoint(_) => Some(GeometryKind::MultiPoint),
            Geometry::LineString(_) => Some(GeometryKind::LineString),
            Geometry::MultiLineString(_) => Some(GeometryKind::MultiLineString),
            Geometry::Polygon(_) => Some(GeometryKind::Polygon),
            Geometry::MultiPolygon(_) => Some(GeometryKind::MultiPolygon),
            _ => None,
        }
    }

    /// GeoJSON / OGC type name.
    pub fn as_str(&self) -> &'static str {
        match self {
            GeometryKind::Point => "Point",
            GeometryKind::MultiPoint => "MultiPoint",
            GeometryKind::LineString => "LineString",
            GeometryKind::MultiLineString => "MultiLineString",
            GeometryKind::Polygon => "Polygon",
            GeometryKind::MultiPolygon => "MultiPolygon",
        }
    }
}

impl fmt::Display for GeometryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GeometryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GeometryKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown geometry type '{}'", s))
    }
}

/// Set of geometry kinds a provider accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeometryTypeFilter {
    allowed: BTreeSet<GeometryKind>,
}

impl GeometryTypeFilter {
    /// Accept every kind.
    pub fn all() -> Self {
        Self {
            allowed: GeometryKind::ALL.into_iter().collect(),
        }
    }

    pub fn new(kinds: impl IntoIterator<Item = GeometryKind>) -> Self {
        Self {
            allowed: kinds.into_iter().collect(),
        }
    }

    pub fn allows(&self, kind: GeometryKind) -> bool {
        self.allowed.contains(&kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = GeometryKind> + '_ {
        self.allowed.iter().copied()
    }
}

impl Default for GeometryTypeFilter {
    fn default() -> Self {
        Self::all()
    }
}

// =============================================================================
// Attributes
// =============================================================================

/// Scalar attribute value passed through from the query.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl AttributeValue {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            AttributeValue::String(s) => serde_json::Value::String(s.clone()),
            AttributeValue::Int(i) => serde_json::Value::from(*i),
            AttributeValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            AttributeValue::Bool(b) => serde_json::Value::Bool(*b),
        }
    }
}

/// Layer-scoped feature identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FeatureId {
    Int(i64),
    String(String),
}

impl FeatureId {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FeatureId::Int(i) => serde_json::Value::from(*i),
            FeatureId::String(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureId::Int(i) => write!(f, "{}", i),
            FeatureId::String(s) => f.write_str(s),
        }
    }
}

// =============================================================================
// GeometryRecord
// =============================================================================

/// One feature of a layer, in EPSG:3857.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryRecord {
    pub id: FeatureId,

    /// Attributes in query column order; nulls are omitted
    pub attributes: Vec<(String, AttributeValue)>,

    pub geometry: Geometry<f64>,
}

impl GeometryRecord {
    pub fn kind(&self) -> Option<GeometryKind> {
        GeometryKind::of(&self.geometry)
    }
}
