//! Layer provider: bound query in, typed and clipped records out.
//!
//! The database round trip lives in [`LayerProvider::fetch`]; everything
//! after the rows arrive is the synchronous [`build_records`], which can be
//! exercised without a database.

use std::sync::atomic::{AtomicU64, Ordering};

use geo_types::Geometry;
use tracing::{debug, warn};

use crate::catalog::LayerConfig;
use crate::error::DataSourceError;
use crate::geometry::{
    clip_to_bbox, decode_wkb, reproject, BoundingBox, FeatureId, GeometryKind, GeometryRecord,
    GeometryTypeFilter, TileCoordinate, WORKING_SRID,
};
use crate::query::QuerySelection;

use super::source::SourceRow;

// =============================================================================
// Counters
// =============================================================================

/// Rows dropped by one [`build_records`] call, by reason.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DropCounts {
    pub geometry_type: u64,
    pub decode: u64,
    pub crs: u64,
    pub clip: u64,
}

impl DropCounts {
    pub fn total(&self) -> u64 {
        self.geometry_type + self.decode + self.crs + self.clip
    }
}

/// Cumulative provider counters, shared across requests.
#[derive(Debug, Default)]
pub struct ProviderStats {
    fetches: AtomicU64,
    failures: AtomicU64,
    rows: AtomicU64,
    records: AtomicU64,
    dropped_geometry_type: AtomicU64,
    dropped_decode: AtomicU64,
    dropped_crs: AtomicU64,
    dropped_clip: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProviderStatsSnapshot {
    pub fetches: u64,
    pub failures: u64,
    pub rows: u64,
    pub records: u64,
    pub dropped: DropCounts,
}

impl ProviderStats {
    fn record_drops(&self, drops: &DropCounts) {
        self.dropped_geometry_type
            .fetch_add(drops.geometry_type, Ordering::Relaxed);
        self.dropped_decode.fetch_add(drops.decode, Ordering::Relaxed);
        self.dropped_crs.fetch_add(drops.crs, Ordering::Relaxed);
        self.dropped_clip.fetch_add(drops.clip, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ProviderStatsSnapshot {
        ProviderStatsSnapshot {
            fetches: self.fetches.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            rows: self.rows.load(Ordering::Relaxed),
            records: self.records.load(Ordering::Relaxed),
            dropped: DropCounts {
                geometry_type: self.dropped_geometry_type.load(Ordering::Relaxed),
                decode: self.dropped_decode.load(Ordering::Relaxed),
                crs: self.dropped_crs.load(Ordering::Relaxed),
                clip: self.dropped_clip.load(Ordering::Relaxed),
            },
        }
    }
}

// =============================================================================
// LayerProvider
// =============================================================================

/// Runs a layer's query for one tile and shapes the result.
#[derive(Debug, Default)]
pub struct LayerProvider {
    stats: ProviderStats,
}

impl LayerProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the records of `layer` that fall in `coord`.
    ///
    /// A zoom without any query at or below it yields an empty result.
    pub async fn fetch(
        &self,
        layer: &LayerConfig,
        coord: TileCoordinate,
    ) -> Result<Vec<GeometryRecord>, DataSourceError> {
        let bbox = coord.bbox();

        let selection = layer.queries.select(coord.zoom);
        let Some(template) = selection.template() else {
            debug!(layer = %layer.name, tile = %coord, "No query for zoom, empty tile");
            return Ok(Vec::new());
        };

        if let QuerySelection::Fallback { from_zoom, .. } = selection {
            debug!(layer = %layer.name, tile = %coord, from_zoom, "Reusing coarser zoom query");
        }

        let query = template.bind(&bbox);
        self.stats.fetches.fetch_add(1, Ordering::Relaxed);

        let rows = match layer.source.execute(&query).await {
            Ok(rows) => rows,
            Err(e) => {
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                warn!(layer = %layer.name, tile = %coord, error = %e, "Layer query failed");
                return Err(e);
            }
        };

        let row_count = rows.len();
        let clip = layer.clip.then_some(&bbox);
        let (records, drops) = build_records(rows, &layer.geometry_types, clip);

        self.stats.rows.fetch_add(row_count as u64, Ordering::Relaxed);
        self.stats
            .records
            .fetch_add(records.len() as u64, Ordering::Relaxed);
        self.stats.record_drops(&drops);

        debug!(
            layer = %layer.name,
            tile = %coord,
            rows = row_count,
            records = records.len(),
            dropped = drops.total(),
            "Fetched layer"
        );

        Ok(records)
    }

    pub fn stats(&self) -> ProviderStatsSnapshot {
        self.stats.snapshot()
    }
}

/// Turn raw rows into records in EPSG:3857.
///
/// Rows are dropped (and counted) when their geometry cannot be decoded,
/// their CRS is unknown, their kind is filtered out, or clipping fails.
/// Geometry that clips to nothing is dropped without being counted.
pub fn build_records(
    rows: Vec<SourceRow>,
    filter: &GeometryTypeFilter,
    clip: Option<&BoundingBox>,
) -> (Vec<GeometryRecord>, DropCounts) {
    let mut drops = DropCounts::default();
    let mut records = Vec::with_capacity(rows.len());

    for (index, row) in rows.into_iter().enumerate() {
        let decoded = match decode_wkb(&row.wkb) {
            Ok(geometry) => geometry,
            Err(e) => {
                debug!(row = index, error = %e, "Dropping undecodable geometry");
                drops.decode += 1;
                continue;
            }
        };

        let srid = row.srid.unwrap_or(WORKING_SRID);
        let geometry = match reproject(decoded, srid) {
            Ok(geometry) => geometry,
            Err(e) => {
                debug!(row = index, error = %e, "Dropping geometry in unknown CRS");
                drops.crs += 1;
                continue;
            }
        };

        if !allowed(filter, &geometry, index) {
            drops.geometry_type += 1;
            continue;
        }

        let geometry = match clip {
            None => geometry,
            Some(bbox) => match clip_to_bbox(&geometry, bbox) {
                Ok(Some(clipped)) => clipped,
                Ok(None) => continue,
                Err(e) => {
                    warn!(row = index, error = %e, "Dropping geometry that failed to clip");
                    drops.clip += 1;
                    continue;
                }
            },
        };

        // clipping can split a line or polygon into its multi kind
        if clip.is_some() && !allowed(filter, &geometry, index) {
            drops.geometry_type += 1;
            continue;
        }

        let id = row.id.unwrap_or(FeatureId::Int(index as i64 + 1));

        records.push(GeometryRecord {
            id,
            attributes: row.attributes,
            geometry,
        });
    }

    (records, drops)
}

fn allowed(filter: &GeometryTypeFilter, geometry: &Geometry<f64>, index: usize) -> bool {
    match GeometryKind::of(geometry) {
        Some(kind) if filter.allows(kind) => true,
        kind => {
            debug!(row = index, kind = ?kind, "Dropping filtered geometry type");
            false
        }
    }
}
