//! Tile cache integration tests.
//!
//! Tests verify:
//! - Disk cache artifacts land at the layout path, gzipped by extension
//! - Cached tiles are served without touching the data source
//! - Concurrent identical requests agree and leave no temporary files

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use axum::http::StatusCode;
use flate2::read::GzDecoder;
use futures::future::join_all;

use vtile_streamer::server::CACHE_HIT_HEADER;
use vtile_streamer::tile::{
    CompressionPolicy, DirectoryLayout, DiskCache, TileCache, TileService, DEFAULT_UMASK,
};
use vtile_streamer::{create_router, RouterConfig};

use super::test_utils::{get, Fixture};

fn disk_service(fixture: &Fixture, root: &Path, layout: DirectoryLayout) -> TileService {
    let cache = TileCache::new(
        Arc::new(DiskCache::new(root, layout, DEFAULT_UMASK)),
        CompressionPolicy::default(),
    );
    TileService::new(Arc::new(fixture.catalog(false)), cache)
}

fn files_under(root: &Path) -> Vec<String> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                pending.push(path);
            } else {
                found.push(
                    path.strip_prefix(root)
                        .unwrap()
                        .to_string_lossy()
                        .replace('\\', "/"),
                );
            }
        }
    }
    found.sort();
    found
}

// =============================================================================
// Disk Layout and Compression
// =============================================================================

#[tokio::test]
async fn test_json_tile_written_gzipped_at_safe_path() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = Fixture::new();
    let router = create_router(
        disk_service(&fixture, dir.path(), DirectoryLayout::Safe),
        RouterConfig::new().with_tracing(false),
    );

    let (status, _, body) = get(&router, "/buildings/8/5/12.json").await;
    assert_eq!(status, StatusCode::OK);

    let path = dir.path().join("buildings/8/000/005/000/012.json.gz");
    assert!(path.exists(), "{:?}", files_under(dir.path()));

    let mut decoded = Vec::new();
    GzDecoder::new(std::fs::File::open(&path).unwrap())
        .read_to_end(&mut decoded)
        .unwrap();
    assert_eq!(decoded, body.to_vec());
}

#[tokio::test]
async fn test_mvt_tile_written_uncompressed() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = Fixture::new();
    let router = create_router(
        disk_service(&fixture, dir.path(), DirectoryLayout::Portable),
        RouterConfig::new().with_tracing(false),
    );

    let (status, _, body) = get(&router, "/pois/8/5/12.mvt").await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(files_under(dir.path()), vec!["pois/8/5/12.mvt".to_string()]);
    let stored = std::fs::read(dir.path().join("pois/8/5/12.mvt")).unwrap();
    assert_eq!(stored, body.to_vec());
}

// =============================================================================
// Cache Effectiveness
// =============================================================================

#[tokio::test]
async fn test_disk_cache_hit_skips_data_source() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = Fixture::new();
    let router = create_router(
        disk_service(&fixture, dir.path(), DirectoryLayout::Safe),
        RouterConfig::new().with_tracing(false),
    );

    let (_, first_headers, first) = get(&router, "/buildings/8/5/12.json").await;
    let (_, second_headers, second) = get(&router, "/buildings/8/5/12.json").await;

    assert_eq!(first_headers[CACHE_HIT_HEADER], "false");
    assert_eq!(second_headers[CACHE_HIT_HEADER], "true");
    assert_eq!(first, second);
    assert_eq!(fixture.buildings.call_count(), 1);
}

#[tokio::test]
async fn test_cache_survives_new_service() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = Fixture::new();

    let first = create_router(
        disk_service(&fixture, dir.path(), DirectoryLayout::Hashed),
        RouterConfig::new().with_tracing(false),
    );
    get(&first, "/pois/8/5/12.json").await;

    let second = create_router(
        disk_service(&fixture, dir.path(), DirectoryLayout::Hashed),
        RouterConfig::new().with_tracing(false),
    );
    let (_, headers, _) = get(&second, "/pois/8/5/12.json").await;

    assert_eq!(headers[CACHE_HIT_HEADER], "true");
    assert_eq!(fixture.pois.call_count(), 1);
}

#[tokio::test]
async fn test_concurrent_identical_requests() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = Fixture::new();
    let router = create_router(
        disk_service(&fixture, dir.path(), DirectoryLayout::Safe),
        RouterConfig::new().with_tracing(false),
    );

    let responses = join_all((0..8).map(|_| get(&router, "/buildings/8/5/12.json"))).await;

    for (status, _, body) in &responses {
        assert_eq!(*status, StatusCode::OK);
        assert_eq!(body, &responses[0].2);
    }

    assert_eq!(
        files_under(dir.path()),
        vec!["buildings/8/000/005/000/012.json.gz".to_string()]
    );
}
