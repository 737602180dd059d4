//! # VTile Streamer
//!
//! A vector tile server that renders tiles from PostGIS queries.
//!
//! Each request `/{layer}/{z}/{x}/{y}.{ext}` runs the layer's SQL for the
//! tile's bounding box, shapes the rows into web mercator geometry and encodes
//! them as GeoJSON or Mapbox Vector Tiles.
//!
//! ## Features
//!
//! - **Zoom-indexed queries**: one SQL file per zoom, with coarser queries
//!   reused for zooms that have none
//! - **Composite layers**: several layers merged into one tile, reusing cached
//!   member tiles when allowed
//! - **Tile cache**: sharded disk layouts with atomic writes, or in-memory LRU,
//!   with gzip by extension
//!
//! ## Architecture
//!
//! - [`query`] - Query templates and the per-zoom query table
//! - [`geometry`] - Tile math, WKB decoding, reprojection and clipping
//! - [`provider`] - Data sources and the layer provider
//! - [`catalog`] - Layer catalog and site configuration
//! - [`tile`] - Encoding, compositing, caching and the tile service
//! - [`server`] - Axum-based HTTP server and routes
//! - [`config`] - CLI and process configuration
//!
//! ## Example
//!
//! ```rust,no_run
//! use vtile_streamer::{create_router, PoolRegistry, PoolSettings, RouterConfig, SiteConfig, TileService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut pools = PoolRegistry::new(PoolSettings::default());
//!     let site = SiteConfig::load("site.json")?.build(&mut pools)?;
//!
//!     let router = create_router(TileService::from_site(site), RouterConfig::new());
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//!     axum::serve(listener, router).await?;
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod geometry;
pub mod provider;
pub mod query;
pub mod server;
pub mod tile;

// Re-export commonly used types
pub use catalog::{CompositeLayerConfig, Layer, LayerCatalog, LayerConfig, Site, SiteConfig};
pub use config::{CheckConfig, Cli, Command, ServeConfig};
pub use error::{CacheError, ConfigError, DataSourceError, GeometryError, TileError};
pub use geometry::{BoundingBox, GeometryKind, GeometryRecord, GeometryTypeFilter, TileCoordinate};
pub use provider::{DataSource, DbInfo, LayerProvider, PoolRegistry, PoolSettings, PostgisSource, SourceRow};
pub use query::{ExecutableQuery, QuerySelection, QueryTable, QueryTemplate};
pub use server::{create_router, AppState, ErrorResponse, HealthResponse, RouterConfig};
pub use tile::{
    CacheLookup, Compositor, CompressionPolicy, DirectoryLayout, DiskCache, MemoryCache, TileCache,
    TileCacheKey, TileFormat, TilePayload, TileRequest, TileResponse, TileService,
};
