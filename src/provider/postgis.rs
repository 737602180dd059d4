//! PostGIS data source on a shared `sqlx` connection pool.
//!
//! Layers with equal connection descriptors share one pool through
//! [`PoolRegistry`]. Pools connect lazily, so building the catalog never
//! touches the database.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::{Column, PgPool, Row, TypeInfo};
use tracing::{debug, info, warn};

use crate::error::DataSourceError;
use crate::geometry::{AttributeValue, FeatureId};
use crate::query::{ExecutableQuery, ID_COLUMN, RESERVED_COLUMNS, SRID_COLUMN, WKB_COLUMN};

use super::source::{DataSource, SourceRow};

/// Default PostgreSQL port.
pub const DEFAULT_PORT: u16 = 5432;

// =============================================================================
// Connection settings
// =============================================================================

/// Connection descriptor from the `dbinfo` block of a layer.
#[derive(Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct DbInfo {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    pub user: String,

    #[serde(default)]
    pub password: Option<String>,

    pub database: String,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

// Keep passwords out of logs
impl fmt::Debug for DbInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbInfo")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("database", &self.database)
            .finish()
    }
}

impl fmt::Display for DbInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "postgres://{}@{}:{}/{}",
            self.user, self.host, self.port, self.database
        )
    }
}

impl DbInfo {
    fn connect_options(&self) -> PgConnectOptions {
        let options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .database(&self.database)
            .application_name("vtile-streamer");

        match &self.password {
            Some(password) => options.password(password),
            None => options,
        }
    }
}

/// Pool sizing shared by every PostGIS source.
#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout: Duration::from_secs(10),
        }
    }
}

// =============================================================================
// PostgisSource
// =============================================================================

/// Rows and attribute columns left out because they failed to decode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeSkips {
    pub rows: u64,
    pub columns: u64,
}

/// A PostGIS database reached through a connection pool.
pub struct PostgisSource {
    pool: PgPool,
    dbinfo: DbInfo,
    skipped_rows: AtomicU64,
    skipped_columns: AtomicU64,
}

impl PostgisSource {
    /// Create a source whose pool connects on first use.
    ///
    /// Must be called inside a tokio runtime.
    pub fn connect_lazy(dbinfo: DbInfo, settings: PoolSettings) -> Self {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.acquire_timeout)
            .connect_lazy_with(dbinfo.connect_options());

        info!(
            database = %dbinfo,
            max_connections = settings.max_connections,
            "Created PostGIS connection pool"
        );

        Self {
            pool,
            dbinfo,
            skipped_rows: AtomicU64::new(0),
            skipped_columns: AtomicU64::new(0),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn dbinfo(&self) -> &DbInfo {
        &self.dbinfo
    }

    /// Totals of rows and columns skipped since the source was created.
    pub fn skipped(&self) -> DecodeSkips {
        DecodeSkips {
            rows: self.skipped_rows.load(Ordering::Relaxed),
            columns: self.skipped_columns.load(Ordering::Relaxed),
        }
    }

    fn record_skips(&self, skips: DecodeSkips) {
        if skips == DecodeSkips::default() {
            return;
        }
        self.skipped_rows.fetch_add(skips.rows, Ordering::Relaxed);
        self.skipped_columns.fetch_add(skips.columns, Ordering::Relaxed);
    }
}

#[async_trait]
impl DataSource for PostgisSource {
    async fn execute(&self, query: &ExecutableQuery) -> Result<Vec<SourceRow>, DataSourceError> {
        // Returned to the pool when dropped, on every path
        let mut conn = self.pool.acquire().await?;

        let [min_x, min_y, max_x, max_y] = query.params;
        let rows = sqlx::query(&query.sql)
            .bind(min_x)
            .bind(min_y)
            .bind(max_x)
            .bind(max_y)
            .fetch_all(&mut *conn)
            .await?;

        debug!(origin = %query.origin, rows = rows.len(), "Query returned");

        let mut skips = DecodeSkips::default();
        let decoded = rows
            .iter()
            .enumerate()
            .filter_map(|(index, row)| match decode_row(row) {
                Ok(decoded) => {
                    skips.columns += decoded.skipped_columns;
                    Some(decoded.row)
                }
                Err(e) => {
                    warn!(origin = %query.origin, row = index, error = %e, "Skipping undecodable row");
                    skips.rows += 1;
                    None
                }
            })
            .collect();

        self.record_skips(skips);
        Ok(decoded)
    }

    fn describe(&self) -> String {
        self.dbinfo.to_string()
    }
}

/// A decoded row and the number of attribute columns it lost.
struct DecodedRow {
    row: SourceRow,
    skipped_columns: u64,
}

/// Decode the geometry, SRID and id of a row, or fail the row.
///
/// A bad attribute column only loses that column.
fn decode_row(row: &PgRow) -> Result<DecodedRow, DataSourceError> {
    let wkb: Option<Vec<u8>> = row.try_get(WKB_COLUMN)?;
    let srid: Option<i32> = row.try_get(SRID_COLUMN)?;

    let columns = row.columns().iter().filter_map(|column| {
        let name = column.name();
        if name != ID_COLUMN && RESERVED_COLUMNS.contains(&name) {
            return None;
        }
        Some((
            name,
            decode_value(row, column.ordinal(), column.type_info().name()),
        ))
    });

    assemble_row(wkb, srid, columns)
}

fn assemble_row<'a>(
    wkb: Option<Vec<u8>>,
    srid: Option<i32>,
    columns: impl IntoIterator<Item = (&'a str, Result<Option<AttributeValue>, DataSourceError>)>,
) -> Result<DecodedRow, DataSourceError> {
    let mut id = None;
    let mut attributes = Vec::new();
    let mut skipped_columns = 0;

    for (name, value) in columns {
        if name == ID_COLUMN {
            id = match value? {
                Some(AttributeValue::Int(i)) => Some(FeatureId::Int(i)),
                Some(AttributeValue::String(s)) => Some(FeatureId::String(s)),
                Some(other) => Some(FeatureId::String(other.to_json().to_string())),
                None => None,
            };
            continue;
        }

        match value {
            Ok(Some(value)) => attributes.push((name.to_string(), value)),
            Ok(None) => {}
            Err(e) => {
                debug!(column = name, error = %e, "Skipping undecodable column");
                skipped_columns += 1;
            }
        }
    }

    Ok(DecodedRow {
        row: SourceRow {
            id,
            srid,
            wkb: wkb.unwrap_or_default(),
            attributes,
        },
        skipped_columns,
    })
}

/// Decode a scalar column; nulls and unsupported types yield `None`.
fn decode_value(
    row: &PgRow,
    index: usize,
    type_name: &str,
) -> Result<Option<AttributeValue>, DataSourceError> {
    let value = match type_name {
        "BOOL" => row.try_get::<Option<bool>, _>(index)?.map(AttributeValue::Bool),
        "INT2" => row
            .try_get::<Option<i16>, _>(index)?
            .map(|v| AttributeValue::Int(v as i64)),
        "INT4" => row
            .try_get::<Option<i32>, _>(index)?
            .map(|v| AttributeValue::Int(v as i64)),
        "INT8" => row.try_get::<Option<i64>, _>(index)?.map(AttributeValue::Int),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(index)?
            .map(|v| AttributeValue::Float(v as f64)),
        "FLOAT8" => row.try_get::<Option<f64>, _>(index)?.map(AttributeValue::Float),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => {
            row.try_get::<Option<String>, _>(index)?.map(AttributeValue::String)
        }
        other => {
            debug!(column = index, type_name = other, "Skipping column of unsupported type");
            None
        }
    };

    Ok(value)
}

// =============================================================================
// PoolRegistry
// =============================================================================

/// Hands out one shared source per distinct connection descriptor.
#[derive(Default)]
pub struct PoolRegistry {
    settings: PoolSettings,
    sources: HashMap<DbInfo, Arc<PostgisSource>>,
}

impl PoolRegistry {
    pub fn new(settings: PoolSettings) -> Self {
        Self {
            settings,
            sources: HashMap::new(),
        }
    }

    /// Source for `dbinfo`, creating its pool on first request.
    pub fn source_for(&mut self, dbinfo: &DbInfo) -> Arc<PostgisSource> {
        let settings = self.settings;
        self.sources
            .entry(dbinfo.clone())
            .or_insert_with(|| Arc::new(PostgisSource::connect_lazy(dbinfo.clone(), settings)))
            .clone()
    }

    /// Number of distinct pools created so far.
    pub fn pool_count(&self) -> usize {
        self.sources.len()
    }
}
