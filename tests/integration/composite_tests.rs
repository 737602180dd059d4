//! Layer rendering and composite tests against mock data sources.
//!
//! These go through `TileService` directly so they can inspect the queries
//! each source received and the provider's drop counters.

use bytes::Bytes;

use vtile_streamer::geometry::TileCoordinate;
use vtile_streamer::tile::{TileCacheKey, TileRequest};

use super::test_utils::{feature_types, json, Fixture, TILE};

fn tile() -> TileCoordinate {
    TileCoordinate::new(TILE.0, TILE.1, TILE.2).unwrap()
}

fn request(layer: &str, extension: &str) -> TileRequest {
    TileRequest::new(layer, TILE.0, TILE.1, TILE.2, extension)
}

// =============================================================================
// Single Layers
// =============================================================================

#[tokio::test]
async fn test_query_bound_to_tile_bbox() {
    let fixture = Fixture::new();
    let service = fixture.service(false);

    service.get_tile(request("buildings", "json")).await.unwrap();

    let queries = fixture.buildings.queries().await;
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].params, tile().bbox().to_array());
    assert!(!queries[0].sql.contains("!bbox!"));
    assert!(queries[0].sql.contains("$1"));
}

#[tokio::test]
async fn test_geometry_type_filter_drops_points() {
    let fixture = Fixture::new();
    let service = fixture.service(false);

    let response = service.get_tile(request("buildings", "json")).await.unwrap();

    assert_eq!(
        feature_types(&json(&response.data)),
        vec!["Polygon", "LineString"]
    );
    let stats = service.provider().stats();
    assert_eq!(stats.dropped.geometry_type, 1);
    assert_eq!(stats.rows, 3);
}

#[tokio::test]
async fn test_fallback_zoom_uses_tile_bbox_of_request() {
    let fixture = Fixture::new();
    let service = fixture.service(false);
    let deeper = TileCoordinate::new(10, 20, 48).unwrap();

    service
        .get_tile(TileRequest::new("pois", 10, 20, 48, "json"))
        .await
        .unwrap();

    let queries = fixture.pois.queries().await;
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].params, deeper.bbox().to_array());
}

// =============================================================================
// Composite Layers
// =============================================================================

#[tokio::test]
async fn test_composite_merges_members_in_order() {
    let fixture = Fixture::new();
    let service = fixture.service(false);

    let response = service.get_tile(request("all", "json")).await.unwrap();

    assert!(!response.partial);
    let text = std::str::from_utf8(&response.data).unwrap();
    let buildings_at = text.find("\"buildings\":").unwrap();
    let pois_at = text.find("\"pois\":").unwrap();
    assert!(buildings_at < pois_at);

    let merged = json(&response.data);
    assert_eq!(feature_types(&merged["buildings"]), vec!["Polygon", "LineString"]);
    assert_eq!(feature_types(&merged["pois"]), vec!["Point"]);
}

#[tokio::test]
async fn test_cached_member_is_spliced_verbatim() {
    let fixture = Fixture::new();
    let sentinel = Bytes::from_static(b"{\"type\":\"FeatureCollection\",\"features\":[],\"sentinel\":true}");
    fixture
        .cache
        .put(&TileCacheKey::new("pois", tile(), "json"), sentinel.clone())
        .await
        .unwrap();

    let service = fixture.service(true);
    let response = service.get_tile(request("all", "json")).await.unwrap();

    assert_eq!(fixture.pois.call_count(), 0);
    assert_eq!(fixture.buildings.call_count(), 1);

    let text = std::str::from_utf8(&response.data).unwrap();
    let spliced = format!("\"pois\":{}", std::str::from_utf8(&sentinel).unwrap());
    assert!(text.contains(&spliced));
}

#[tokio::test]
async fn test_cached_member_ignored_without_flag() {
    let fixture = Fixture::new();
    fixture
        .cache
        .put(
            &TileCacheKey::new("pois", tile(), "json"),
            Bytes::from_static(b"{\"sentinel\":true}"),
        )
        .await
        .unwrap();

    let service = fixture.service(false);
    let response = service.get_tile(request("all", "json")).await.unwrap();

    assert_eq!(fixture.pois.call_count(), 1);
    assert!(json(&response.data)["pois"].get("sentinel").is_none());
}

#[tokio::test]
async fn test_partial_composite_is_not_cached() {
    let fixture = Fixture::new();
    fixture.pois.set_failing(true);
    let service = fixture.service(false);

    let response = service.get_tile(request("all", "mvt")).await.unwrap();

    assert!(response.partial);
    assert_eq!(response.failed_members, vec!["pois".to_string()]);
    assert!(!fixture
        .cache
        .contains(&TileCacheKey::new("all", tile(), "mvt"))
        .await
        .unwrap());

    fixture.pois.set_failing(false);
    let response = service.get_tile(request("all", "mvt")).await.unwrap();
    assert!(!response.partial);
    assert!(!response.cache_hit);
    assert!(fixture
        .cache
        .contains(&TileCacheKey::new("all", tile(), "mvt"))
        .await
        .unwrap());
}
