//! Tile Service for orchestrating tile generation.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         TileService                             │
//! │  ┌─────────────────────────────────────────────────────────┐    │
//! │  │                    get_tile()                           │    │
//! │  │  1. Resolve layer     4. Check cache                    │    │
//! │  │  2. Parse format      5. Render under deadline          │    │
//! │  │  3. Validate coord    6. Cache complete tiles & return  │    │
//! │  └─────────────────────────────────────────────────────────┘    │
//! │           │                    │                    │           │
//! │           ▼                    ▼                    ▼           │
//! │    ┌──────────────┐     ┌────────────┐      ┌────────────┐      │
//! │    │ LayerCatalog │     │ Compositor │      │ TileCache  │      │
//! │    └──────────────┘     └────────────┘      └────────────┘      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::catalog::{Layer, LayerCatalog, Site, DEFAULT_REQUEST_TIMEOUT_SECS};
use crate::error::TileError;
use crate::geometry::TileCoordinate;
use crate::provider::LayerProvider;

use super::cache::{TileCache, TileCacheKey};
use super::compositor::{CacheLookup, Compositor, TilePayload};
use super::encoder::TileFormat;

// =============================================================================
// Tile Request
// =============================================================================

/// A request for one tile of one layer.
#[derive(Debug, Clone)]
pub struct TileRequest {
    /// Layer name, or `a,b` for an ad-hoc composite
    pub layer: String,

    pub z: u32,
    pub x: u32,
    pub y: u32,

    /// Output extension (`json`, `geojson`, `mvt`, `pbf`)
    pub extension: String,

    /// Skip the cache read (and sublayer splicing)
    pub ignore_cached: bool,

    /// Do not store the rendered tile
    pub suppress_cache_write: bool,
}

impl TileRequest {
    pub fn new(layer: impl Into<String>, z: u32, x: u32, y: u32, extension: impl Into<String>) -> Self {
        Self {
            layer: layer.into(),
            z,
            x,
            y,
            extension: extension.into(),
            ignore_cached: false,
            suppress_cache_write: false,
        }
    }

    pub fn ignore_cached(mut self, ignore: bool) -> Self {
        self.ignore_cached = ignore;
        self
    }

    pub fn suppress_cache_write(mut self, suppress: bool) -> Self {
        self.suppress_cache_write = suppress;
        self
    }
}

// =============================================================================
// Tile Response
// =============================================================================

/// Response from the tile service.
#[derive(Debug, Clone)]
pub struct TileResponse {
    pub data: Bytes,
    pub content_type: &'static str,

    /// Whether this tile was served from cache
    pub cache_hit: bool,

    /// Some composite members are missing
    pub partial: bool,
    pub failed_members: Vec<String>,

    pub allowed_origin: Option<String>,
    pub max_cache_age: Option<u32>,
}

// =============================================================================
// Tile Service
// =============================================================================

/// Resolves, renders and caches tiles.
pub struct TileService {
    catalog: Arc<LayerCatalog>,
    compositor: Compositor,
    cache: TileCache,
    request_timeout: Duration,
}

impl TileService {
    /// Create a service with the default request deadline.
    pub fn new(catalog: Arc<LayerCatalog>, cache: TileCache) -> Self {
        let compositor = Compositor::new(catalog.clone(), Arc::new(LayerProvider::new()));
        Self {
            catalog,
            compositor,
            cache,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }

    pub fn from_site(site: Site) -> Self {
        Self::new(site.catalog, site.cache).with_request_timeout(site.request_timeout)
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn catalog(&self) -> &LayerCatalog {
        &self.catalog
    }

    pub fn cache(&self) -> &TileCache {
        &self.cache
    }

    pub fn provider(&self) -> &LayerProvider {
        self.compositor.provider()
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Get a tile, using the cache when allowed.
    ///
    /// The request deadline covers the cache read, rendering and the cache
    /// write. Partial composites are returned but never stored. Cache
    /// failures are logged and otherwise ignored.
    pub async fn get_tile(&self, request: TileRequest) -> Result<TileResponse, TileError> {
        let layer = self.catalog.resolve(&request.layer)?;
        let format = TileFormat::from_extension(&request.extension)?;
        let coord = TileCoordinate::new(request.z, request.x, request.y)?;
        let key = TileCacheKey::new(layer.name(), coord, &request.extension);

        tokio::time::timeout(
            self.request_timeout,
            self.serve(&layer, coord, format, &key, &request),
        )
        .await
        .map_err(|_| {
            warn!(tile = %key, timeout = ?self.request_timeout, "Tile request timed out");
            TileError::Timeout(self.request_timeout)
        })?
    }

    async fn serve(
        &self,
        layer: &Layer,
        coord: TileCoordinate,
        format: TileFormat,
        key: &TileCacheKey,
        request: &TileRequest,
    ) -> Result<TileResponse, TileError> {
        if !request.ignore_cached {
            match self.cache.get(key).await {
                Ok(Some(data)) => {
                    debug!(tile = %key, "Cache hit");
                    return Ok(respond(layer, format, data, true, Vec::new()));
                }
                Ok(None) => {}
                Err(e) => warn!(tile = %key, error = %e, "Cache read failed"),
            }
        }

        let payload = self
            .render(layer, coord, &request.extension, format, request.ignore_cached)
            .await?;

        if payload.partial {
            debug!(tile = %key, failed = ?payload.failed_members, "Not caching partial tile");
        } else if !request.suppress_cache_write && self.cache.is_enabled() {
            if let Err(e) = self.cache.put(key, payload.bytes.clone()).await {
                warn!(tile = %key, error = %e, "Cache write failed");
            }
        }

        Ok(respond(
            layer,
            format,
            payload.bytes,
            false,
            payload.failed_members,
        ))
    }

    async fn render(
        &self,
        layer: &Layer,
        coord: TileCoordinate,
        extension: &str,
        format: TileFormat,
        ignore_cached: bool,
    ) -> Result<TilePayload, TileError> {
        match layer {
            Layer::Single(config) => self.compositor.single(config, coord, format).await,
            Layer::Composite(config) => {
                let lookup = (!ignore_cached).then_some(&self.cache as &dyn CacheLookup);
                self.compositor.composite(config, coord, extension, lookup).await
            }
        }
    }
}

fn respond(
    layer: &Layer,
    format: TileFormat,
    data: Bytes,
    cache_hit: bool,
    failed_members: Vec<String>,
) -> TileResponse {
    TileResponse {
        data,
        content_type: format.content_type(),
        cache_hit,
        partial: !failed_members.is_empty(),
        failed_members,
        allowed_origin: layer.allowed_origin().map(str::to_string),
        max_cache_age: layer.max_cache_age(),
    }
}
