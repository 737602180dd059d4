//! Test utilities for integration tests.
//!
//! This module provides a mock data source and helpers for building WKB
//! geometry, layers and services without a database.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use vtile_streamer::catalog::{CompositeLayerConfig, Layer, LayerCatalog, LayerConfig};
use vtile_streamer::error::DataSourceError;
use vtile_streamer::geometry::{
    AttributeValue, FeatureId, GeometryKind, GeometryTypeFilter, TileCoordinate,
};
use vtile_streamer::provider::{DataSource, SourceRow};
use vtile_streamer::query::{ExecutableQuery, QueryTable, QueryTemplate};
use vtile_streamer::tile::{CompressionPolicy, TileCache, TileService};

// =============================================================================
// Mock Data Source with Request Tracking
// =============================================================================

/// A data source that serves pre-configured rows and records every query.
///
/// Clones share rows, counters and the failure switch.
#[derive(Clone)]
pub struct MockDataSource {
    name: String,
    rows: Arc<RwLock<Vec<SourceRow>>>,
    queries: Arc<RwLock<Vec<ExecutableQuery>>>,
    calls: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
    delay: Option<Duration>,
}

impl MockDataSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: Arc::new(RwLock::new(Vec::new())),
            queries: Arc::new(RwLock::new(Vec::new())),
            calls: Arc::new(AtomicUsize::new(0)),
            failing: Arc::new(AtomicBool::new(false)),
            delay: None,
        }
    }

    pub fn with_rows(self, rows: Vec<SourceRow>) -> Self {
        Self {
            rows: Arc::new(RwLock::new(rows)),
            ..self
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn queries(&self) -> Vec<ExecutableQuery> {
        self.queries.read().await.clone()
    }

    pub fn shared(&self) -> Arc<dyn DataSource> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl DataSource for MockDataSource {
    async fn execute(&self, query: &ExecutableQuery) -> Result<Vec<SourceRow>, DataSourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.write().await.push(query.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(DataSourceError::Connection(format!(
                "{}: connection refused",
                self.name
            )));
        }

        Ok(self.rows.read().await.clone())
    }

    fn describe(&self) -> String {
        format!("mock:{}", self.name)
    }
}

// =============================================================================
// WKB Builders
// =============================================================================

/// Little-endian WKB writer.
pub struct WkbBuilder {
    buf: Vec<u8>,
}

impl WkbBuilder {
    pub fn new(type_code: u32) -> Self {
        let mut buf = vec![1u8];
        buf.extend_from_slice(&type_code.to_le_bytes());
        Self { buf }
    }

    pub fn count(mut self, n: u32) -> Self {
        self.buf.extend_from_slice(&n.to_le_bytes());
        self
    }

    pub fn xy(mut self, x: f64, y: f64) -> Self {
        self.buf.extend_from_slice(&x.to_le_bytes());
        self.buf.extend_from_slice(&y.to_le_bytes());
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.buf
    }
}

pub fn point_wkb(x: f64, y: f64) -> Vec<u8> {
    WkbBuilder::new(1).xy(x, y).build()
}

pub fn line_wkb(points: &[(f64, f64)]) -> Vec<u8> {
    points
        .iter()
        .fold(WkbBuilder::new(2).count(points.len() as u32), |b, &(x, y)| b.xy(x, y))
        .build()
}

/// Axis-aligned square centred on `(cx, cy)`.
pub fn square_wkb(cx: f64, cy: f64, half: f64) -> Vec<u8> {
    WkbBuilder::new(3)
        .count(1)
        .count(5)
        .xy(cx - half, cy - half)
        .xy(cx + half, cy - half)
        .xy(cx + half, cy + half)
        .xy(cx - half, cy + half)
        .xy(cx - half, cy - half)
        .build()
}

/// Centre of a tile in EPSG:3857.
pub fn tile_center(coord: TileCoordinate) -> (f64, f64) {
    let bbox = coord.bbox();
    ((bbox.min_x + bbox.max_x) / 2.0, (bbox.min_y + bbox.max_y) / 2.0)
}

pub fn row(id: i64, wkb: Vec<u8>) -> SourceRow {
    SourceRow {
        id: Some(FeatureId::Int(id)),
        srid: Some(3857),
        wkb,
        attributes: vec![("kind".to_string(), AttributeValue::String(format!("f{}", id)))],
    }
}

// =============================================================================
// Layers and Services
// =============================================================================

pub const TEMPLATE_SQL: &str =
    "SELECT osm_id AS __id__, kind, way AS __geometry__ FROM features WHERE way && !bbox!";

/// Single layer with one query at `zoom` (and none below it).
pub fn vector_layer(
    name: &str,
    zoom: usize,
    source: &MockDataSource,
    kinds: Option<&[GeometryKind]>,
) -> Layer {
    let mut queries: Vec<Option<QueryTemplate>> = (0..=zoom).map(|_| None).collect();
    queries[zoom] = Some(QueryTemplate::parse(name, TEMPLATE_SQL).expect("valid template"));

    Layer::Single(Arc::new(LayerConfig {
        name: name.to_string(),
        allowed_origin: Some("*".to_string()),
        max_cache_age: Some(3600),
        queries: QueryTable::new(queries),
        geometry_types: kinds
            .map(|k| GeometryTypeFilter::new(k.iter().copied()))
            .unwrap_or_default(),
        clip: true,
        source: source.shared(),
    }))
}

pub fn composite_layer(name: &str, members: &[&str], ignore_cached_sublayers: bool) -> Layer {
    Layer::Composite(Arc::new(CompositeLayerConfig {
        name: name.to_string(),
        members: members.iter().map(|m| m.to_string()).collect(),
        ignore_cached_sublayers,
        allowed_origin: None,
        max_cache_age: None,
    }))
}

pub fn memory_cache() -> TileCache {
    TileCache::memory(16 * 1024 * 1024, CompressionPolicy::default())
}

/// `buildings` and `pois` with queries at zoom 8, composite `all` over both.
pub struct Fixture {
    pub buildings: MockDataSource,
    pub pois: MockDataSource,
    pub cache: TileCache,
}

pub const TILE: (u32, u32, u32) = (8, 5, 12);

impl Fixture {
    pub fn new() -> Self {
        let coord = TileCoordinate::new(TILE.0, TILE.1, TILE.2).expect("valid tile");
        let (cx, cy) = tile_center(coord);

        let buildings = MockDataSource::new("buildings").with_rows(vec![
            row(1, square_wkb(cx, cy, 1000.0)),
            row(2, line_wkb(&[(cx - 500.0, cy), (cx + 500.0, cy)])),
            row(3, point_wkb(cx, cy)),
        ]);
        let pois = MockDataSource::new("pois").with_rows(vec![row(10, point_wkb(cx + 10.0, cy + 10.0))]);

        Self {
            buildings,
            pois,
            cache: memory_cache(),
        }
    }

    pub fn catalog(&self, ignore_cached_sublayers: bool) -> LayerCatalog {
        LayerCatalog::new(
            vec![
                vector_layer(
                    "buildings",
                    8,
                    &self.buildings,
                    Some(&[
                        GeometryKind::LineString,
                        GeometryKind::Polygon,
                        GeometryKind::MultiPolygon,
                    ]),
                ),
                vector_layer("pois", 8, &self.pois, None),
                composite_layer("all", &["buildings", "pois"], ignore_cached_sublayers),
            ],
            Some("all".to_string()),
        )
        .expect("valid catalog")
    }

    pub fn service(&self, ignore_cached_sublayers: bool) -> TileService {
        TileService::new(Arc::new(self.catalog(ignore_cached_sublayers)), self.cache.clone())
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// HTTP Helpers
// =============================================================================

/// Send a GET through the router and collect the whole response.
pub async fn get(router: &Router, uri: &str) -> (StatusCode, HeaderMap, bytes::Bytes) {
    let request = Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("valid request");

    let response = router.clone().oneshot(request).await.expect("infallible");
    let status = response.status();
    let headers = response.headers().clone();
    let body = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();

    (status, headers, body)
}

pub fn json(body: &[u8]) -> serde_json::Value {
    serde_json::from_slice(body).expect("valid JSON body")
}

/// Geometry type names of a GeoJSON feature collection, in order.
pub fn feature_types(collection: &serde_json::Value) -> Vec<String> {
    collection["features"]
        .as_array()
        .map(|features| {
            features
                .iter()
                .filter_map(|f| f["geometry"]["type"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
