//! Filesystem backend with sharded directory layouts.
//!
//! Every artifact lives under `root/<layer>/`, followed by a layout-specific
//! path that bounds how many entries any one directory receives. Writes go
//! to a uniquely named temporary file in the destination directory and are
//! published with a rename, so readers never observe partial files.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::CacheError;
use crate::geometry::TileCoordinate;

use super::{CacheBackend, StoredArtifact, TileCacheKey};

/// Default file-creation mask.
pub const DEFAULT_UMASK: u32 = 0o022;

/// Suffix appended to compressed artifacts.
const GZIP_SUFFIX: &str = "gz";

/// Distinguishes temporary files written by this process.
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

// =============================================================================
// Directory Layout
// =============================================================================

/// How a tile key maps onto directories below the layer directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectoryLayout {
    /// `z/xxx/xxx/yyy/yyy.ext`, coordinates split into thousands
    #[default]
    Safe,

    /// `z/x/y.ext`
    Portable,

    /// `z/` followed by the quadkey in three-digit directories
    Quadtile,

    /// `ab/cd/<rest of sha256>.ext`
    Hashed,
}

impl FromStr for DirectoryLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "safe" => Ok(DirectoryLayout::Safe),
            "portable" => Ok(DirectoryLayout::Portable),
            "quadtile" => Ok(DirectoryLayout::Quadtile),
            "hashed" => Ok(DirectoryLayout::Hashed),
            other => Err(format!("unknown directory layout '{}'", other)),
        }
    }
}

impl DirectoryLayout {
    /// Path of the artifact for `key`, relative to the cache root.
    pub fn relative_path(&self, key: &TileCacheKey, compressed: bool) -> PathBuf {
        let extension = if compressed {
            format!("{}.{}", key.extension, GZIP_SUFFIX)
        } else {
            key.extension.to_string()
        };

        let mut path = PathBuf::from(key.layer.as_ref());

        match self {
            DirectoryLayout::Safe => {
                path.push(key.zoom.to_string());
                path.push(format!("{:03}", key.column / 1000));
                path.push(format!("{:03}", key.column % 1000));
                path.push(format!("{:03}", key.row / 1000));
                path.push(format!("{:03}.{}", key.row % 1000, extension));
            }
            DirectoryLayout::Portable => {
                path.push(key.zoom.to_string());
                path.push(key.column.to_string());
                path.push(format!("{}.{}", key.row, extension));
            }
            DirectoryLayout::Quadtile => {
                path.push(key.zoom.to_string());
                let coord = TileCoordinate {
                    zoom: key.zoom,
                    column: key.column,
                    row: key.row,
                };
                let quadkey = coord.quadkey();
                // zoom 0 has an empty quadkey
                let quadkey = if quadkey.is_empty() { "0".to_string() } else { quadkey };

                let chunks: Vec<&str> = quadkey
                    .as_bytes()
                    .chunks(3)
                    .filter_map(|chunk| std::str::from_utf8(chunk).ok())
                    .collect();
                if let Some((last, dirs)) = chunks.split_last() {
                    for dir in dirs {
                        path.push(dir);
                    }
                    path.push(format!("{}.{}", last, extension));
                }
            }
            DirectoryLayout::Hashed => {
                let digest = hex::encode(Sha256::digest(key.to_string().as_bytes()));
                path.push(&digest[0..2]);
                path.push(&digest[2..4]);
                path.push(format!("{}.{}", &digest[4..], extension));
            }
        }

        path
    }
}

// =============================================================================
// Disk Cache
// =============================================================================

/// Tile artifacts stored as files under a root directory.
#[derive(Debug, Clone)]
pub struct DiskCache {
    root: PathBuf,
    layout: DirectoryLayout,
    umask: u32,
}

impl DiskCache {
    pub fn new(root: impl Into<PathBuf>, layout: DirectoryLayout, umask: u32) -> Self {
        Self {
            root: root.into(),
            layout,
            umask: umask & 0o777,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn layout(&self) -> DirectoryLayout {
        self.layout
    }

    /// Absolute path of the artifact for `key`.
    pub fn path_for(&self, key: &TileCacheKey, compressed: bool) -> PathBuf {
        self.root.join(self.layout.relative_path(key, compressed))
    }

    fn file_mode(&self) -> u32 {
        0o666 & !self.umask
    }

    fn dir_mode(&self) -> u32 {
        0o777 & !self.umask
    }

    async fn create_dirs(&self, dir: &Path) -> Result<(), CacheError> {
        let mut builder = tokio::fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        builder.mode(self.dir_mode());

        builder.create(dir).await.map_err(|source| CacheError::Io {
            path: dir.to_path_buf(),
            source,
        })
    }

    async fn write_temp(&self, temp: &Path, bytes: &[u8]) -> Result<(), CacheError> {
        let io_err = |source| CacheError::Io {
            path: temp.to_path_buf(),
            source,
        };

        tokio::fs::write(temp, bytes).await.map_err(io_err)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(temp, std::fs::Permissions::from_mode(self.file_mode()))
                .await
                .map_err(io_err)?;
        }

        Ok(())
    }
}

/// Hidden sibling of `path`, unique per process and call.
fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let counter = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!(".{}.{}.{}.tmp", name, std::process::id(), counter))
}

#[async_trait]
impl CacheBackend for DiskCache {
    async fn read(
        &self,
        key: &TileCacheKey,
        compressed: bool,
    ) -> Result<Option<StoredArtifact>, CacheError> {
        let path = self.path_for(key, compressed);

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(CacheError::Io { path, source }),
        };

        let stored_at = tokio::fs::metadata(&path)
            .await
            .ok()
            .and_then(|m| m.modified().ok())
            .unwrap_or_else(SystemTime::now);

        Ok(Some(StoredArtifact {
            bytes: Bytes::from(bytes),
            stored_at,
        }))
    }

    async fn write(
        &self,
        key: &TileCacheKey,
        bytes: Bytes,
        compressed: bool,
    ) -> Result<(), CacheError> {
        let path = self.path_for(key, compressed);
        if let Some(dir) = path.parent() {
            self.create_dirs(dir).await?;
        }

        let temp = temp_path(&path);

        if let Err(e) = self.write_temp(&temp, &bytes).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e);
        }

        if let Err(source) = tokio::fs::rename(&temp, &path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(CacheError::Io { path, source });
        }

        debug!(path = %path.display(), bytes = bytes.len(), "Stored tile");
        Ok(())
    }

    async fn remove(&self, key: &TileCacheKey, compressed: bool) -> Result<bool, CacheError> {
        let path = self.path_for(key, compressed);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(CacheError::Io { path, source }),
        }
    }

    async fn contains(&self, key: &TileCacheKey, compressed: bool) -> Result<bool, CacheError> {
        let path = self.path_for(key, compressed);
        tokio::fs::try_exists(&path)
            .await
            .map_err(|source| CacheError::Io { path, source })
    }

    fn describe(&self) -> String {
        format!("disk ({}, {:?} layout)", self.root.display(), self.layout)
    }
}

// =============================================================================
// Tests
// =============================================================================
