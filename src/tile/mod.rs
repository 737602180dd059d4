//! Tile service layer.
//!
//! This module turns layer records into encoded tiles, merges composite
//! layers and caches the results.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              HTTP Handlers              │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │              Tile Service               │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │  TileCache   │  │   Compositor    │  │
//! │  │  (disk or    │  │  (fan-out,      │  │
//! │  │   memory)    │  │   merge)        │  │
//! │  └──────────────┘  └─────────────────┘  │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │     LayerProvider → DataSource          │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`TileService`]: entry point for tile requests
//! - [`Compositor`]: renders single layers and merges composites
//! - [`TileFormat`]: GeoJSON and Mapbox Vector Tile encoding
//! - [`TileCache`]: compression policy over a [`CacheBackend`]
//! - [`TileCacheKey`]: `(layer, z, x, y, extension)`

mod cache;
mod compositor;
mod encoder;
mod service;

pub use cache::{
    CacheBackend, CacheEntry, CompressionPolicy, DirectoryLayout, DiskCache, MemoryCache, NoCache,
    StoredArtifact, TileCache, TileCacheKey, DEFAULT_GZIP_EXTENSIONS,
    DEFAULT_MEMORY_CACHE_CAPACITY, DEFAULT_UMASK,
};
pub use compositor::{CacheLookup, Compositor, TilePayload};
pub use encoder::{
    encode_geojson, encode_mvt, TileFormat, GEOJSON_CONTENT_TYPE, MVT_CONTENT_TYPE, MVT_EXTENT,
};
pub use service::{TileRequest, TileResponse, TileService};
