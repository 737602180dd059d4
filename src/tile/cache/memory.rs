//! In-process LRU backend with size-based eviction.

use std::num::NonZeroUsize;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use tokio::sync::Mutex;

use crate::error::CacheError;

use super::{CacheBackend, StoredArtifact, TileCacheKey};

/// Default capacity: 100MB
pub const DEFAULT_MEMORY_CACHE_CAPACITY: usize = 100 * 1024 * 1024;

/// Default maximum number of entries (to bound LRU overhead)
const DEFAULT_MAX_ENTRIES: usize = 10_000;

type EntryKey = (TileCacheKey, bool);

struct Inner {
    entries: LruCache<EntryKey, StoredArtifact>,
    current_size: usize,
}

/// LRU cache of stored artifacts bounded by total byte size.
///
/// Entries are evicted least-recently-used first once the stored bytes
/// exceed the capacity.
pub struct MemoryCache {
    inner: Mutex<Inner>,
    max_size: usize,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MEMORY_CACHE_CAPACITY)
    }

    /// Create a cache holding at most `max_size` bytes.
    pub fn with_capacity(max_size: usize) -> Self {
        Self::with_capacity_and_entries(max_size, DEFAULT_MAX_ENTRIES)
    }

    /// Create a cache bounded by bytes and by entry count.
    pub fn with_capacity_and_entries(max_size: usize, max_entries: usize) -> Self {
        let max_entries = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(max_entries),
                current_size: 0,
            }),
            max_size,
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.entries.is_empty()
    }

    /// Current total size of stored artifacts in bytes.
    pub async fn size(&self) -> usize {
        self.inner.lock().await.current_size
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn read(
        &self,
        key: &TileCacheKey,
        compressed: bool,
    ) -> Result<Option<StoredArtifact>, CacheError> {
        let mut inner = self.inner.lock().await;
        Ok(inner.entries.get(&(key.clone(), compressed)).cloned())
    }

    async fn write(
        &self,
        key: &TileCacheKey,
        bytes: Bytes,
        compressed: bool,
    ) -> Result<(), CacheError> {
        let size = bytes.len();
        let mut inner = self.inner.lock().await;
        let entry_key = (key.clone(), compressed);

        if let Some(old_size) = inner.entries.peek(&entry_key).map(|old| old.bytes.len()) {
            inner.current_size = inner.current_size.saturating_sub(old_size);
        }

        let artifact = StoredArtifact {
            bytes,
            stored_at: SystemTime::now(),
        };

        // Entry-count eviction happens inside the LRU
        if let Some((evicted_key, evicted)) = inner.entries.push(entry_key.clone(), artifact) {
            if evicted_key != entry_key {
                inner.current_size = inner.current_size.saturating_sub(evicted.bytes.len());
            }
        }
        inner.current_size += size;

        while inner.current_size > self.max_size {
            match inner.entries.pop_lru() {
                Some((_, evicted)) => {
                    inner.current_size = inner.current_size.saturating_sub(evicted.bytes.len());
                }
                None => break,
            }
        }

        Ok(())
    }

    async fn remove(&self, key: &TileCacheKey, compressed: bool) -> Result<bool, CacheError> {
        let mut inner = self.inner.lock().await;
        match inner.entries.pop(&(key.clone(), compressed)) {
            Some(old) => {
                inner.current_size = inner.current_size.saturating_sub(old.bytes.len());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn contains(&self, key: &TileCacheKey, compressed: bool) -> Result<bool, CacheError> {
        let inner = self.inner.lock().await;
        Ok(inner.entries.contains(&(key.clone(), compressed)))
    }

    fn describe(&self) -> String {
        format!("memory ({} bytes)", self.max_size)
    }
}

// =============================================================================
// Tests
// =============================================================================
