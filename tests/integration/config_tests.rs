//! Site configuration tests: a config file on disk, built into a serving router.

use std::collections::HashMap;
use std::path::Path;

use axum::http::StatusCode;

use vtile_streamer::catalog::{Layer, SiteConfig};
use vtile_streamer::error::ConfigError;
use vtile_streamer::provider::DbInfo;
use vtile_streamer::tile::TileService;
use vtile_streamer::{create_router, RouterConfig};

use super::test_utils::{
    feature_types, get, json, line_wkb, point_wkb, row, tile_center, MockDataSource, TILE,
};

const SITE: &str = r#"{
    "cache": {"name": "Disk", "path": "tiles", "dirs": "portable", "umask": "0022"},
    "request_timeout": 5,
    "custom_layer_name": "all",
    "layers": {
        "roads": {
            "allowed origin": "https://maps.example.com",
            "max cache age": 600,
            "provider": {
                "name": "vector",
                "kwargs": {
                    "dbinfo": {"user": "osm", "database": "gis"},
                    "queries": [null, null, null, null, null, null, null, null, "queries/roads-z8.pgsql"],
                    "geometry_types": ["LineString", "MultiLineString"]
                }
            }
        },
        "places": {
            "provider": {
                "name": "vector",
                "kwargs": {
                    "dbinfo": {"host": "replica", "user": "osm", "database": "gis"},
                    "queries": ["SELECT id AS __id__, geom AS __geometry__ FROM places WHERE geom && !bbox!"],
                    "clip": false
                }
            }
        },
        "all": {
            "max cache age": 60,
            "provider": {"name": "multi", "kwargs": {"names": ["roads", "places"], "ignore_cached_sublayers": true}}
        }
    }
}"#;

fn write_site(dir: &Path) -> std::path::PathBuf {
    std::fs::create_dir(dir.join("queries")).unwrap();
    std::fs::write(
        dir.join("queries/roads-z8.pgsql"),
        "SELECT osm_id AS __id__, kind, way AS __geometry__\nFROM planet_osm_line\nWHERE way && !bbox!",
    )
    .unwrap();

    let path = dir.join("site.json");
    std::fs::write(&path, SITE).unwrap();
    path
}

/// One mock source per distinct database host.
struct Sources {
    by_host: HashMap<String, MockDataSource>,
}

impl Sources {
    fn new() -> Self {
        let coord = vtile_streamer::TileCoordinate::new(TILE.0, TILE.1, TILE.2).unwrap();
        let (cx, cy) = tile_center(coord);

        let mut by_host = HashMap::new();
        by_host.insert(
            "localhost".to_string(),
            MockDataSource::new("localhost").with_rows(vec![
                row(1, line_wkb(&[(cx - 100.0, cy), (cx + 100.0, cy)])),
                row(2, point_wkb(cx, cy)),
            ]),
        );
        by_host.insert(
            "replica".to_string(),
            MockDataSource::new("replica").with_rows(vec![row(7, point_wkb(cx, cy))]),
        );
        Self { by_host }
    }

    fn source_for(&self, dbinfo: &DbInfo) -> std::sync::Arc<dyn vtile_streamer::DataSource> {
        self.by_host[&dbinfo.host].shared()
    }
}

#[tokio::test]
async fn test_site_file_serves_tiles() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_site(dir.path());
    let sources = Sources::new();

    let site = SiteConfig::load(&path)
        .unwrap()
        .build_with(|dbinfo| sources.source_for(dbinfo))
        .unwrap();

    assert_eq!(site.request_timeout.as_secs(), 5);
    assert_eq!(site.catalog.names(), vec!["all", "places", "roads"]);
    match site.catalog.get("roads") {
        Some(Layer::Single(roads)) => {
            assert_eq!(roads.queries.populated_zooms(), vec![8]);
            assert_eq!(roads.queries.empty_below(), Some(8));
        }
        other => panic!("unexpected layer: {:?}", other),
    }

    let router = create_router(
        TileService::from_site(site),
        RouterConfig::new().with_tracing(false),
    );

    let (status, headers, body) = get(&router, "/roads/8/5/12.json").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["access-control-allow-origin"], "https://maps.example.com");
    assert_eq!(headers["cache-control"], "public, max-age=600");
    assert_eq!(feature_types(&json(&body)), vec!["LineString"]);

    let roads_queries = sources.by_host["localhost"].queries().await;
    assert!(roads_queries[0].sql.contains("planet_osm_line"));
    assert!(dir.path().join("tiles/roads/8/5/12.json.gz").exists());

    let (status, headers, body) = get(&router, "/all/8/5/12.json").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["cache-control"], "public, max-age=60");
    assert_eq!(feature_types(&json(&body)["places"]), vec!["Point"]);
    // roads came from the cache written by the first request
    assert_eq!(sources.by_host["localhost"].call_count(), 1);

    let (status, headers, _) = get(&router, "/places,roads/8/5/12.mvt").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["cache-control"], "public, max-age=60");
}

#[test]
fn test_missing_query_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_site(dir.path());
    std::fs::remove_file(dir.path().join("queries/roads-z8.pgsql")).unwrap();
    let sources = Sources::new();

    let err = SiteConfig::load(&path)
        .unwrap()
        .build_with(|dbinfo| sources.source_for(dbinfo))
        .unwrap_err();

    match err {
        ConfigError::InvalidQuery { path, .. } => assert!(path.ends_with("roads-z8.pgsql")),
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_missing_site_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = SiteConfig::load(dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
}
