use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while loading and validating the site configuration.
///
/// These are fatal at startup and never produced while serving requests.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for the expected schema
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// A layer references something that does not exist or is malformed
    #[error("Invalid layer '{layer}': {message}")]
    InvalidLayer { layer: String, message: String },

    /// A query template violates the binding rules
    #[error("Invalid query template {path}: {message}")]
    InvalidQuery { path: String, message: String },

    /// The cache section is malformed
    #[error("Invalid cache configuration: {0}")]
    InvalidCache(String),
}

/// Errors from a spatial data source (connection or query execution).
#[derive(Debug, Clone, Error)]
pub enum DataSourceError {
    /// Could not acquire a connection from the pool
    #[error("Connection error: {0}")]
    Connection(String),

    /// The bound query failed to execute
    #[error("Query error: {0}")]
    Query(String),

    /// A returned row could not be read
    #[error("Row decode error: {0}")]
    Decode(String),
}

impl From<sqlx::Error> for DataSourceError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_) => DataSourceError::Connection(err.to_string()),
            sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::Decode(_) => DataSourceError::Decode(err.to_string()),
            _ => DataSourceError::Query(err.to_string()),
        }
    }
}

/// Errors for individual geometries. Providers drop the offending record.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    /// WKB buffer could not be decoded
    #[error("Invalid WKB: {0}")]
    Wkb(String),

    /// Geometry cannot be clipped (non-finite coordinates, collapsed rings)
    #[error("Degenerate geometry: {0}")]
    Degenerate(String),

    /// Source CRS has no known transform to web mercator
    #[error("Unsupported SRID: {0}")]
    UnsupportedSrid(i32),
}

/// Errors from the tile cache. Logged by the tile service, never surfaced.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Filesystem error while reading or publishing an artifact
    #[error("Cache I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// gzip compression or decompression failed
    #[error("Cache compression error: {0}")]
    Compression(std::io::Error),
}

/// Errors that can occur while serving a tile.
#[derive(Debug, Clone, Error)]
pub enum TileError {
    /// Layer name is not in the catalog
    #[error("\"{layer}\" is not a layer I know about. Known layers: {}", known.join(", "))]
    UnknownLayer { layer: String, known: Vec<String> },

    /// Column or row outside the tile grid at this zoom
    #[error("Invalid tile coordinate {zoom}/{column}/{row}")]
    InvalidCoordinate { zoom: u32, column: u32, row: u32 },

    /// Extension does not name an output format
    #[error("Unsupported tile format: {extension}")]
    UnsupportedFormat { extension: String },

    /// A single layer's data source failed
    #[error("Data source error in layer '{layer}': {source}")]
    DataSource {
        layer: String,
        #[source]
        source: DataSourceError,
    },

    /// Every member of a composite layer failed
    #[error("All {} members of composite layer '{layer}' failed", failures.len())]
    AllMembersFailed {
        layer: String,
        failures: Vec<(String, DataSourceError)>,
    },

    /// The request deadline expired before the tile was generated
    #[error("Tile generation exceeded {0:?}")]
    Timeout(Duration),

    /// The payload could not be serialized
    #[error("Failed to encode tile: {message}")]
    Encode { message: String },
}

impl TileError {
    /// Whether the error is caused by the client rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            TileError::UnknownLayer { .. }
                | TileError::InvalidCoordinate { .. }
                | TileError::UnsupportedFormat { .. }
        )
    }
}
