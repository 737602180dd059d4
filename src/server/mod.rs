//! HTTP server layer for VTile Streamer.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │               GET /{layer}/{z}/{x}/{y}.{ext}                    │
//! │                                                                 │
//! │  ┌─────────────────────────┐  ┌─────────────────────────────┐   │
//! │  │        handlers         │  │           routes            │   │
//! │  │ (requests, error JSON)  │  │  (router config, CORS)      │   │
//! │  └─────────────────────────┘  └─────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod handlers;
pub mod routes;

pub use handlers::{
    error_status, health_handler, root_handler, tile_handler, AppState, ErrorResponse,
    HandlerError, HealthResponse, TilePathParams, TileQueryParams, CACHE_HIT_HEADER,
    FAILED_LAYERS_HEADER, JSONP_CONTENT_TYPE, PARTIAL_HEADER,
};
pub use routes::{create_router, RouterConfig};
