//! Router configuration for VTile Streamer.
//!
//! # Route Structure
//!
//! ```text
//! /                            - Greeting
//! /health                      - Health check
//! /{layer}/{z}/{x}/{y}.{ext}   - Tile endpoint
//! ```
//!
//! # Example
//!
//! ```ignore
//! use vtile_streamer::catalog::SiteConfig;
//! use vtile_streamer::provider::{PoolRegistry, PoolSettings};
//! use vtile_streamer::server::{create_router, RouterConfig};
//! use vtile_streamer::tile::TileService;
//!
//! let site = SiteConfig::load("site.json")?.build(&mut PoolRegistry::new(PoolSettings::default()))?;
//! let router = create_router(TileService::from_site(site), RouterConfig::new());
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::time::Duration;

use axum::{routing::get, Router};
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Method};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{health_handler, root_handler, tile_handler, AppState};
use crate::tile::TileService;

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Router-wide CORS origins. `None` leaves CORS to each layer's
    /// `allowed origin` setting.
    pub cors_origins: Option<Vec<String>>,

    /// Whether to enable request tracing
    pub enable_tracing: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterConfig {
    /// Create a router configuration.
    ///
    /// By default:
    /// - No router-wide CORS layer
    /// - Tracing is enabled
    pub fn new() -> Self {
        Self {
            cors_origins: None,
            enable_tracing: true,
        }
    }

    /// Set router-wide CORS origins. `"*"` allows any origin.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    /// Enable or disable request tracing.
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the main application router.
pub fn create_router(tile_service: TileService, config: RouterConfig) -> Router {
    let app_state = AppState::new(tile_service);

    let mut router = Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/{layer}/{z}/{x}/{filename}", get(tile_handler))
        .with_state(app_state);

    if let Some(cors) = build_cors_layer(&config) {
        router = router.layer(cors);
    }

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Build the CORS layer based on configuration.
fn build_cors_layer(config: &RouterConfig) -> Option<CorsLayer> {
    let origins = config.cors_origins.as_ref()?;

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(86400));

    if origins.iter().any(|o| o == "*") {
        return Some(cors.allow_origin(Any));
    }

    let parsed_origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    Some(cors.allow_origin(parsed_origins))
}

// =============================================================================
// Tests
// =============================================================================
