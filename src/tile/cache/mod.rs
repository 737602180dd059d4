//! Tile cache for serialized tile payloads.
//!
//! # Cache Key
//!
//! Tiles are cached by `(layer, zoom, column, row, extension)`. The key is
//! derived from the request alone, never from the payload.
//!
//! # Compression
//!
//! Keys whose extension is in the [`CompressionPolicy`] are gzip-compressed
//! before reaching the backend and decompressed on the way out, so callers
//! always see the payload exactly as it was put.
//!
//! # Backends
//!
//! - [`DiskCache`]: sharded directory tree, atomic publication via rename
//! - [`MemoryCache`]: size-bounded LRU
//! - [`NoCache`]: caching disabled

mod disk;
mod memory;

use std::collections::BTreeSet;
use std::fmt;
use std::io::{Read, Write};
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::warn;

use crate::error::CacheError;
use crate::geometry::TileCoordinate;

pub use disk::{DirectoryLayout, DiskCache, DEFAULT_UMASK};
pub use memory::{MemoryCache, DEFAULT_MEMORY_CACHE_CAPACITY};

use super::compositor::CacheLookup;

/// Extensions compressed when the configuration does not say otherwise.
pub const DEFAULT_GZIP_EXTENSIONS: [&str; 5] = ["txt", "text", "json", "geojson", "xml"];

// =============================================================================
// Cache Key
// =============================================================================

/// Cache key for one layer's tile in one format.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileCacheKey {
    /// Layer name as requested (composites included)
    pub layer: Arc<str>,

    pub zoom: u8,
    pub column: u32,
    pub row: u32,

    /// File extension, lower-cased
    pub extension: Arc<str>,
}

impl TileCacheKey {
    pub fn new(layer: impl Into<Arc<str>>, coord: TileCoordinate, extension: &str) -> Self {
        Self {
            layer: layer.into(),
            zoom: coord.zoom,
            column: coord.column,
            row: coord.row,
            extension: extension.to_ascii_lowercase().into(),
        }
    }
}

impl fmt::Display for TileCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}.{}",
            self.layer, self.zoom, self.column, self.row, self.extension
        )
    }
}

// =============================================================================
// Compression Policy
// =============================================================================

/// Set of extensions stored gzip-compressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionPolicy {
    extensions: BTreeSet<String>,
}

impl CompressionPolicy {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    /// Store everything as-is.
    pub fn none() -> Self {
        Self {
            extensions: BTreeSet::new(),
        }
    }

    pub fn applies(&self, key: &TileCacheKey) -> bool {
        self.extensions.contains(key.extension.as_ref())
    }

    pub fn extensions(&self) -> impl Iterator<Item = &str> {
        self.extensions.iter().map(String::as_str)
    }
}

impl Default for CompressionPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_GZIP_EXTENSIONS)
    }
}

fn gzip(data: &[u8]) -> Result<Vec<u8>, CacheError> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder.write_all(data).map_err(CacheError::Compression)?;
    encoder.finish().map_err(CacheError::Compression)
}

fn gunzip(data: &[u8]) -> Result<Vec<u8>, CacheError> {
    let mut out = Vec::with_capacity(data.len() * 4);
    GzDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(CacheError::Compression)?;
    Ok(out)
}

// =============================================================================
// Backend Trait
// =============================================================================

/// Bytes as held by a backend, possibly compressed.
#[derive(Debug, Clone)]
pub struct StoredArtifact {
    pub bytes: Bytes,
    pub stored_at: SystemTime,
}

/// Storage behind a [`TileCache`].
///
/// Backends see bytes after compression; `compressed` lets them keep
/// compressed and plain artifacts apart (the disk layout adds `.gz`).
/// `write` must publish atomically: a concurrent reader sees either the old
/// artifact, the new one, or none, never a partial one.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn read(
        &self,
        key: &TileCacheKey,
        compressed: bool,
    ) -> Result<Option<StoredArtifact>, CacheError>;

    async fn write(&self, key: &TileCacheKey, bytes: Bytes, compressed: bool)
        -> Result<(), CacheError>;

    async fn remove(&self, key: &TileCacheKey, compressed: bool) -> Result<bool, CacheError>;

    async fn contains(&self, key: &TileCacheKey, compressed: bool) -> Result<bool, CacheError> {
        Ok(self.read(key, compressed).await?.is_some())
    }

    /// Short description for startup logs.
    fn describe(&self) -> String;
}

/// Backend that stores nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

#[async_trait]
impl CacheBackend for NoCache {
    async fn read(&self, _: &TileCacheKey, _: bool) -> Result<Option<StoredArtifact>, CacheError> {
        Ok(None)
    }

    async fn write(&self, _: &TileCacheKey, _: Bytes, _: bool) -> Result<(), CacheError> {
        Ok(())
    }

    async fn remove(&self, _: &TileCacheKey, _: bool) -> Result<bool, CacheError> {
        Ok(false)
    }

    fn describe(&self) -> String {
        "disabled".to_string()
    }
}

// =============================================================================
// Tile Cache
// =============================================================================

/// A cached tile with its storage metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: TileCacheKey,

    /// Payload as originally put (already decompressed)
    pub bytes: Bytes,

    /// Whether the stored artifact is gzip-compressed
    pub compressed: bool,

    pub stored_at: SystemTime,
}

/// Tile cache front: compression policy over a storage backend.
///
/// Shared across requests via `Arc`; safe for concurrent callers on the same
/// key.
#[derive(Clone)]
pub struct TileCache {
    backend: Arc<dyn CacheBackend>,
    policy: CompressionPolicy,
    enabled: bool,
}

impl TileCache {
    pub fn new(backend: Arc<dyn CacheBackend>, policy: CompressionPolicy) -> Self {
        Self {
            backend,
            policy,
            enabled: true,
        }
    }

    /// In-memory LRU cache holding up to `capacity` bytes.
    pub fn memory(capacity: usize, policy: CompressionPolicy) -> Self {
        Self::new(Arc::new(MemoryCache::with_capacity(capacity)), policy)
    }

    /// A cache that never hits and never stores.
    pub fn disabled() -> Self {
        Self {
            backend: Arc::new(NoCache),
            policy: CompressionPolicy::none(),
            enabled: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn policy(&self) -> &CompressionPolicy {
        &self.policy
    }

    pub fn describe(&self) -> String {
        self.backend.describe()
    }

    /// Cached payload for `key`, decompressed if needed.
    pub async fn get(&self, key: &TileCacheKey) -> Result<Option<Bytes>, CacheError> {
        Ok(self.entry(key).await?.map(|entry| entry.bytes))
    }

    /// Cached payload with metadata.
    pub async fn entry(&self, key: &TileCacheKey) -> Result<Option<CacheEntry>, CacheError> {
        let compressed = self.policy.applies(key);

        let Some(artifact) = self.backend.read(key, compressed).await? else {
            return Ok(None);
        };

        let bytes = if compressed {
            Bytes::from(gunzip(&artifact.bytes)?)
        } else {
            artifact.bytes
        };

        Ok(Some(CacheEntry {
            key: key.clone(),
            bytes,
            compressed,
            stored_at: artifact.stored_at,
        }))
    }

    /// Store `data` under `key`.
    ///
    /// Writing the same key again replaces the artifact; concurrent writers of
    /// the same key leave one complete artifact behind.
    pub async fn put(&self, key: &TileCacheKey, data: Bytes) -> Result<(), CacheError> {
        let compressed = self.policy.applies(key);

        let stored = if compressed {
            Bytes::from(gzip(&data)?)
        } else {
            data
        };

        self.backend.write(key, stored, compressed).await
    }

    pub async fn contains(&self, key: &TileCacheKey) -> Result<bool, CacheError> {
        self.backend.contains(key, self.policy.applies(key)).await
    }

    /// Remove the artifact for `key`; returns whether one existed.
    pub async fn remove(&self, key: &TileCacheKey) -> Result<bool, CacheError> {
        self.backend.remove(key, self.policy.applies(key)).await
    }
}

impl fmt::Debug for TileCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TileCache")
            .field("backend", &self.backend.describe())
            .field("policy", &self.policy)
            .field("enabled", &self.enabled)
            .finish()
    }
}

#[async_trait]
impl CacheLookup for TileCache {
    async fn lookup(&self, key: &TileCacheKey) -> Option<Bytes> {
        if !self.enabled {
            return None;
        }

        match self.get(key).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache lookup failed, fetching instead");
                None
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
