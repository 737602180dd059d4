//! API integration tests for tile retrieval and error handling.
//!
//! Tests verify:
//! - GeoJSON and MVT tile retrieval through the router
//! - Error cases (unknown layer, bad extension, out-of-range tile, data source failure)
//! - HTTP response codes and headers

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;

use vtile_streamer::catalog::LayerCatalog;
use vtile_streamer::server::{
    CACHE_HIT_HEADER, FAILED_LAYERS_HEADER, JSONP_CONTENT_TYPE, PARTIAL_HEADER,
};
use vtile_streamer::tile::TileService;
use vtile_streamer::{create_router, RouterConfig};

use super::test_utils::{
    feature_types, get, json, memory_cache, vector_layer, Fixture, MockDataSource,
};

fn router(fixture: &Fixture) -> axum::Router {
    create_router(fixture.service(true), RouterConfig::new().with_tracing(false))
}

// =============================================================================
// Basic Endpoints
// =============================================================================

#[tokio::test]
async fn test_health_and_root() {
    let fixture = Fixture::new();
    let router = router(&fixture);

    let (status, _, body) = get(&router, "/health").await;
    assert_eq!(status, StatusCode::OK);
    let health = json(&body);
    assert_eq!(health["status"], "healthy");
    assert!(health["version"].is_string());

    let (status, _, body) = get(&router, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(!body.is_empty());
}

// =============================================================================
// Tile Retrieval
// =============================================================================

#[tokio::test]
async fn test_geojson_tile_retrieval() {
    let fixture = Fixture::new();
    let router = router(&fixture);

    let (status, headers, body) = get(&router, "/buildings/8/5/12.json").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["content-type"], "application/json");
    assert_eq!(headers["cache-control"], "public, max-age=3600");
    assert_eq!(headers["access-control-allow-origin"], "*");
    assert_eq!(headers[CACHE_HIT_HEADER], "false");

    let collection = json(&body);
    assert_eq!(collection["type"], "FeatureCollection");
    assert_eq!(feature_types(&collection), vec!["Polygon", "LineString"]);
    assert_eq!(collection["features"][0]["properties"]["kind"], "f1");
    assert_eq!(collection["features"][0]["clipped"], true);
}

#[tokio::test]
async fn test_mvt_tile_retrieval() {
    let fixture = Fixture::new();
    let router = router(&fixture);

    let (status, headers, body) = get(&router, "/pois/8/5/12.mvt").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["content-type"], "application/vnd.mapbox-vector-tile");
    assert!(body.windows(4).any(|w| w == b"pois"));
}

#[tokio::test]
async fn test_second_request_is_cache_hit() {
    let fixture = Fixture::new();
    let router = router(&fixture);

    let (_, first_headers, first) = get(&router, "/buildings/8/5/12.json").await;
    let (_, second_headers, second) = get(&router, "/buildings/8/5/12.json").await;

    assert_eq!(first_headers[CACHE_HIT_HEADER], "false");
    assert_eq!(second_headers[CACHE_HIT_HEADER], "true");
    assert_eq!(first, second);
    assert_eq!(fixture.buildings.call_count(), 1);

    let (_, headers, _) = get(&router, "/buildings/8/5/12.json?ignore_cached=true").await;
    assert_eq!(headers[CACHE_HIT_HEADER], "false");
    assert_eq!(fixture.buildings.call_count(), 2);
}

#[tokio::test]
async fn test_jsonp_callback_over_http() {
    let fixture = Fixture::new();
    let router = router(&fixture);

    let (status, headers, body) = get(&router, "/buildings/8/5/12.json?callback=onTile").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["content-type"], JSONP_CONTENT_TYPE);
    assert!(headers.contains_key("expires"));

    let text = std::str::from_utf8(&body).unwrap();
    let inner = text.strip_prefix("onTile(").and_then(|t| t.strip_suffix(')')).unwrap();
    assert_eq!(json(inner.as_bytes())["type"], "FeatureCollection");

    let (status, _, body) = get(&router, "/buildings/8/5/12.json?callback=alert(1)").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["error"], "invalid_callback");
}

#[tokio::test]
async fn test_zoom_without_query_returns_empty_tile() {
    let fixture = Fixture::new();
    let router = router(&fixture);

    let (status, _, body) = get(&router, "/buildings/3/1/1.json").await;

    assert_eq!(status, StatusCode::OK);
    assert!(feature_types(&json(&body)).is_empty());
    assert_eq!(fixture.buildings.call_count(), 0);
}

#[tokio::test]
async fn test_higher_zoom_reuses_lower_query() {
    let fixture = Fixture::new();
    let router = router(&fixture);

    let (status, _, _) = get(&router, "/pois/12/80/200.json").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(fixture.pois.call_count(), 1);
}

// =============================================================================
// Error Handling
// =============================================================================

#[tokio::test]
async fn test_unknown_layer_lists_known_layers() {
    let fixture = Fixture::new();
    let router = router(&fixture);

    let (status, headers, body) = get(&router, "/rivers/8/5/12.json").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(headers["content-type"], "application/json");
    let error = json(&body);
    assert_eq!(error["error"], "unknown_layer");
    assert_eq!(error["status"], 404);
    let message = error["message"].as_str().unwrap();
    assert!(message.contains("rivers"));
    assert!(message.contains("buildings"));
    assert!(message.contains("pois"));
}

#[tokio::test]
async fn test_unsupported_extension() {
    let fixture = Fixture::new();
    let router = router(&fixture);

    let (status, _, body) = get(&router, "/buildings/8/5/12.png").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["error"], "unsupported_format");
}

#[tokio::test]
async fn test_out_of_range_coordinate() {
    let fixture = Fixture::new();
    let router = router(&fixture);

    let (status, _, body) = get(&router, "/buildings/2/4/0.json").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["error"], "invalid_coordinate");
}

#[tokio::test]
async fn test_malformed_path() {
    let fixture = Fixture::new();
    let router = router(&fixture);

    for uri in ["/buildings/8/5/12", "/buildings/eight/5/12.json", "/buildings/8/5/x.json"] {
        let (status, _, body) = get(&router, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(json(&body)["error"], "invalid_path", "{}", uri);
    }
}

#[tokio::test]
async fn test_data_source_failure_is_bad_gateway() {
    let fixture = Fixture::new();
    fixture.buildings.set_failing(true);
    let router = router(&fixture);

    let (status, _, body) = get(&router, "/buildings/8/5/12.mvt").await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json(&body)["error"], "data_source_error");
}

#[tokio::test]
async fn test_deadline_is_gateway_timeout() {
    let slow = MockDataSource::new("slow").with_delay(Duration::from_millis(500));
    let catalog = LayerCatalog::new(vec![vector_layer("slow", 0, &slow, None)], None).unwrap();
    let service = TileService::new(Arc::new(catalog), memory_cache())
        .with_request_timeout(Duration::from_millis(20));
    let router = create_router(service, RouterConfig::new().with_tracing(false));

    let (status, _, body) = get(&router, "/slow/0/0/0.json").await;

    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(json(&body)["error"], "timeout");
}

// =============================================================================
// Composite Layers over HTTP
// =============================================================================

#[tokio::test]
async fn test_partial_composite_headers() {
    let fixture = Fixture::new();
    fixture.pois.set_failing(true);
    let router = router(&fixture);

    let (status, headers, body) = get(&router, "/all/8/5/12.json").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[PARTIAL_HEADER], "true");
    assert_eq!(headers[FAILED_LAYERS_HEADER], "pois");

    let merged = json(&body);
    assert!(merged.get("buildings").is_some());
    assert!(merged.get("pois").is_none());
}

#[tokio::test]
async fn test_all_members_failed_is_bad_gateway() {
    let fixture = Fixture::new();
    fixture.buildings.set_failing(true);
    fixture.pois.set_failing(true);
    let router = router(&fixture);

    let (status, _, body) = get(&router, "/all/8/5/12.mvt").await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json(&body)["error"], "all_members_failed");
}

#[tokio::test]
async fn test_ad_hoc_composite() {
    let fixture = Fixture::new();
    let router = router(&fixture);

    let (status, _, body) = get(&router, "/pois,buildings/8/5/12.json").await;

    assert_eq!(status, StatusCode::OK);
    let merged = json(&body);
    let keys: Vec<&String> = merged.as_object().unwrap().keys().collect();
    assert_eq!(keys.len(), 2);
    assert_eq!(feature_types(&merged["pois"]), vec!["Point"]);

    let (status, _, _) = get(&router, "/pois,rivers/8/5/12.json").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
