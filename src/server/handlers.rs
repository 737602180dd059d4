//! HTTP request handlers for the vector tile API.
//!
//! # Endpoints
//!
//! - `GET /` - Greeting
//! - `GET /health` - Health check
//! - `GET /{layer}/{z}/{x}/{y}.{ext}` - Serve a tile

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::TileError;
use crate::tile::{TileRequest, TileResponse, TileService, GEOJSON_CONTENT_TYPE};

/// Set on every tile response.
pub const CACHE_HIT_HEADER: &str = "x-tile-cache-hit";

/// Set when a composite tile is missing members.
pub const PARTIAL_HEADER: &str = "x-tile-partial";

/// Comma-separated names of the missing members.
pub const FAILED_LAYERS_HEADER: &str = "x-tile-failed-layers";

/// Content type of a GeoJSON tile wrapped in a JSONP callback.
pub const JSONP_CONTENT_TYPE: &str = "text/javascript";

// =============================================================================
// Application State
// =============================================================================

/// Shared application state containing the tile service.
#[derive(Clone)]
pub struct AppState {
    pub tile_service: Arc<TileService>,
}

impl AppState {
    pub fn new(tile_service: TileService) -> Self {
        Self {
            tile_service: Arc::new(tile_service),
        }
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Path parameters for tile requests.
///
/// Extracted from: `/{layer}/{z}/{x}/{filename}` where filename is `{y}.{ext}`.
/// Numbers are parsed by hand so malformed paths get a JSON error body.
#[derive(Debug, Deserialize)]
pub struct TilePathParams {
    pub layer: String,
    pub z: String,
    pub x: String,
    pub filename: String,
}

impl TilePathParams {
    /// Split into `(z, x, y, extension)`.
    pub fn parse(&self) -> Result<(u32, u32, u32, &str), HandlerError> {
        let (y, extension) = self
            .filename
            .rsplit_once('.')
            .ok_or_else(|| HandlerError::BadPath(format!("missing extension in '{}'", self.filename)))?;

        let number = |name: &str, value: &str| {
            value
                .parse::<u32>()
                .map_err(|_| HandlerError::BadPath(format!("{} '{}' is not a tile number", name, value)))
        };

        Ok((
            number("zoom", &self.z)?,
            number("column", &self.x)?,
            number("row", y)?,
            extension,
        ))
    }
}

/// Query parameters for tile requests.
#[derive(Debug, Default, Deserialize)]
pub struct TileQueryParams {
    /// Bypass the cache read
    #[serde(default)]
    pub ignore_cached: bool,

    /// JSONP function name for GeoJSON tiles
    #[serde(default)]
    pub callback: Option<String>,
}

impl TileQueryParams {
    /// The JSONP callback, if one was given and it is a plain identifier.
    ///
    /// Dotted paths like `L.tiles.load` are accepted.
    pub fn callback(&self) -> Result<Option<&str>, HandlerError> {
        let Some(name) = self.callback.as_deref() else {
            return Ok(None);
        };

        let valid = !name.is_empty()
            && name.split('.').all(|part| {
                let mut chars = part.chars();
                matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$')
                    && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
            });

        if valid {
            Ok(Some(name))
        } else {
            Err(HandlerError::BadCallback(name.to_string()))
        }
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "unknown_layer", "invalid_coordinate")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code (included for convenience)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Status and error identifier for a tile error.
pub fn error_status(err: &TileError) -> (StatusCode, &'static str) {
    match err {
        TileError::UnknownLayer { .. } => (StatusCode::NOT_FOUND, "unknown_layer"),
        TileError::InvalidCoordinate { .. } => (StatusCode::BAD_REQUEST, "invalid_coordinate"),
        TileError::UnsupportedFormat { .. } => (StatusCode::BAD_REQUEST, "unsupported_format"),
        TileError::DataSource { .. } => (StatusCode::BAD_GATEWAY, "data_source_error"),
        TileError::AllMembersFailed { .. } => (StatusCode::BAD_GATEWAY, "all_members_failed"),
        TileError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
        TileError::Encode { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "encode_error"),
    }
}

/// Convert TileError to HTTP response.
///
/// 5xx errors are logged at ERROR level, unknown layers at DEBUG and other
/// client errors at WARN.
impl IntoResponse for TileError {
    fn into_response(self) -> Response {
        let (status, error_type) = error_status(&self);
        let message = self.to_string();

        if status.is_server_error() {
            error!(
                error_type = error_type,
                status = status.as_u16(),
                "Server error: {}",
                message
            );
        } else if status == StatusCode::NOT_FOUND {
            debug!(
                error_type = error_type,
                status = status.as_u16(),
                "Resource not found: {}",
                message
            );
        } else {
            warn!(
                error_type = error_type,
                status = status.as_u16(),
                "Client error: {}",
                message
            );
        }

        let error_response = ErrorResponse::with_status(error_type, message, status);

        (status, Json(error_response)).into_response()
    }
}

/// Errors a tile handler can return.
#[derive(Debug)]
pub enum HandlerError {
    Tile(TileError),

    /// The path does not have the `{z}/{x}/{y}.{ext}` shape
    BadPath(String),

    /// The JSONP callback is not an identifier
    BadCallback(String),
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        match self {
            HandlerError::Tile(err) => err.into_response(),
            HandlerError::BadPath(message) => {
                warn!(status = 400, "Client error: {}", message);
                let status = StatusCode::BAD_REQUEST;
                (
                    status,
                    Json(ErrorResponse::with_status("invalid_path", message, status)),
                )
                    .into_response()
            }
            HandlerError::BadCallback(name) => {
                let message = format!("callback '{}' is not a valid identifier", name);
                warn!(status = 400, "Client error: {}", message);
                let status = StatusCode::BAD_REQUEST;
                (
                    status,
                    Json(ErrorResponse::with_status("invalid_callback", message, status)),
                )
                    .into_response()
            }
        }
    }
}

impl From<TileError> for HandlerError {
    fn from(err: TileError) -> Self {
        HandlerError::Tile(err)
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle tile requests.
///
/// # Endpoint
///
/// `GET /{layer}/{z}/{x}/{y}.{ext}`
///
/// `layer` may be `a,b` for an ad-hoc composite. `ext` is `json`, `geojson`,
/// `mvt` or `pbf`.
///
/// # Query Parameters
///
/// - `ignore_cached`: skip the cache read (default: false)
/// - `callback`: wrap GeoJSON tiles as `callback(...)`; ignored for MVT
///
/// # Response
///
/// - `200 OK`: tile payload
/// - `400 Bad Request`: malformed path or callback, unknown extension, coordinate out of range
/// - `404 Not Found`: unknown layer
/// - `502 Bad Gateway`: data source failure
/// - `504 Gateway Timeout`: deadline exceeded
///
/// # Headers
///
/// - `Content-Type`
/// - `Cache-Control: public, max-age={max cache age}` and a matching
///   `Expires` when the layer sets one
/// - `Access-Control-Allow-Origin` when the layer sets one
/// - `X-Tile-Cache-Hit: true|false`
/// - `X-Tile-Partial` and `X-Tile-Failed-Layers` for partial composites
pub async fn tile_handler(
    State(state): State<AppState>,
    Path(params): Path<TilePathParams>,
    Query(query): Query<TileQueryParams>,
) -> Result<Response, HandlerError> {
    let (z, x, y, extension) = params.parse()?;
    let callback = query.callback()?;

    let request =
        TileRequest::new(&params.layer, z, x, y, extension).ignore_cached(query.ignore_cached);

    let response = state.tile_service.get_tile(request).await?;

    Ok(tile_response(response, callback))
}

fn tile_response(tile: TileResponse, callback: Option<&str>) -> Response {
    let (content_type, body) = match callback {
        Some(name) if tile.content_type == GEOJSON_CONTENT_TYPE => {
            let mut wrapped = Vec::with_capacity(tile.data.len() + name.len() + 2);
            wrapped.extend_from_slice(name.as_bytes());
            wrapped.push(b'(');
            wrapped.extend_from_slice(&tile.data);
            wrapped.push(b')');
            (JSONP_CONTENT_TYPE, Bytes::from(wrapped))
        }
        _ => (tile.content_type, tile.data),
    };

    let mut headers = vec![
        (header::CONTENT_TYPE, HeaderValue::from_static(content_type)),
        (
            HeaderName::from_static(CACHE_HIT_HEADER),
            HeaderValue::from_static(if tile.cache_hit { "true" } else { "false" }),
        ),
    ];

    if let Some(age) = tile.max_cache_age {
        if let Ok(value) = HeaderValue::from_str(&format!("public, max-age={}", age)) {
            headers.push((header::CACHE_CONTROL, value));
        }
        let expires = SystemTime::now() + Duration::from_secs(u64::from(age));
        if let Ok(value) = HeaderValue::from_str(&httpdate::fmt_http_date(expires)) {
            headers.push((header::EXPIRES, value));
        }
    }

    if let Some(origin) = &tile.allowed_origin {
        match HeaderValue::from_str(origin) {
            Ok(value) => headers.push((header::ACCESS_CONTROL_ALLOW_ORIGIN, value)),
            Err(_) => warn!(origin = %origin, "Ignoring invalid allowed origin"),
        }
    }

    if tile.partial {
        headers.push((HeaderName::from_static(PARTIAL_HEADER), HeaderValue::from_static("true")));
        if let Ok(value) = HeaderValue::from_str(&tile.failed_members.join(",")) {
            headers.push((HeaderName::from_static(FAILED_LAYERS_HEADER), value));
        }
    }

    let mut response = (StatusCode::OK, body).into_response();
    for (name, value) in headers {
        response.headers_mut().insert(name, value);
    }
    response
}

/// Handle requests to the root path.
pub async fn root_handler() -> &'static str {
    "Hello, I am a vector tile server.\n"
}

/// Handle health check requests.
///
/// # Endpoint
///
/// `GET /health`
///
/// # Response
///
/// `200 OK` with JSON body:
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0"
/// }
/// ```
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
