//! Data source abstraction for layer providers.

use async_trait::async_trait;

use crate::error::DataSourceError;
use crate::geometry::{AttributeValue, FeatureId};
use crate::query::ExecutableQuery;

// =============================================================================
// SourceRow
// =============================================================================

/// One row as returned by a data source, before any geometry handling.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRow {
    /// Value of the `__id__` column, if the query exposes one
    pub id: Option<FeatureId>,

    /// SRID of the geometry column, if known
    pub srid: Option<i32>,

    /// Geometry as (E)WKB
    pub wkb: Vec<u8>,

    /// Remaining non-null columns in select order
    pub attributes: Vec<(String, AttributeValue)>,
}

// =============================================================================
// DataSource Trait
// =============================================================================

/// A spatial database a layer runs its bound queries against.
///
/// Implementations must be cheap to share between layers; a PostGIS source
/// wraps a connection pool.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Run the query and return rows in the source's natural order.
    async fn execute(&self, query: &ExecutableQuery) -> Result<Vec<SourceRow>, DataSourceError>;

    /// Human-readable connection summary for logs (no credentials).
    fn describe(&self) -> String;
}
