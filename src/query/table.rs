//! Per-zoom query lookup with nearest-lower-zoom fallback.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::debug;

use super::binder::QueryTemplate;

// =============================================================================
// QuerySelection
// =============================================================================

/// Outcome of looking up the query for one zoom level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QuerySelection<'a> {
    /// The zoom has its own query
    Exact(&'a QueryTemplate),

    /// Reusing the query of a coarser zoom
    Fallback {
        template: &'a QueryTemplate,
        from_zoom: u8,
    },

    /// No query at or below the zoom; the tile is empty
    NotAvailable,
}

impl<'a> QuerySelection<'a> {
    pub fn template(&self) -> Option<&'a QueryTemplate> {
        match *self {
            QuerySelection::Exact(template) => Some(template),
            QuerySelection::Fallback { template, .. } => Some(template),
            QuerySelection::NotAvailable => None,
        }
    }
}

// =============================================================================
// QueryStats
// =============================================================================

/// Counters for how often lookups had to fall back or came up empty.
#[derive(Debug, Default)]
pub struct QueryStats {
    exact: AtomicU64,
    fallback: AtomicU64,
    not_available: AtomicU64,
}

/// Point-in-time copy of [`QueryStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryStatsSnapshot {
    pub exact: u64,
    pub fallback: u64,
    pub not_available: u64,
}

impl QueryStats {
    pub fn snapshot(&self) -> QueryStatsSnapshot {
        QueryStatsSnapshot {
            exact: self.exact.load(Ordering::Relaxed),
            fallback: self.fallback.load(Ordering::Relaxed),
            not_available: self.not_available.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// QueryTable
// =============================================================================

/// Sparse per-zoom array of query templates for one layer.
///
/// Index `z` holds the query for zoom `z`; `None` means the zoom has no query
/// of its own. The table is built once at startup and never mutated; only
/// the lookup counters change.
#[derive(Debug, Default)]
pub struct QueryTable {
    entries: Vec<Option<Arc<QueryTemplate>>>,
    stats: QueryStats,
}

impl QueryTable {
    pub fn new(entries: Vec<Option<QueryTemplate>>) -> Self {
        Self {
            entries: entries.into_iter().map(|e| e.map(Arc::new)).collect(),
            stats: QueryStats::default(),
        }
    }

    /// Number of zoom slots, populated or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(Option::is_none)
    }

    /// Pick the query for `zoom`.
    ///
    /// Uses `entries[zoom]` when present, otherwise the nearest lower zoom
    /// with a query. Zooms past the end of the array fall back the same way.
    pub fn select(&self, zoom: u8) -> QuerySelection<'_> {
        if self.entries.is_empty() {
            return self.record_not_available(zoom);
        }

        let start = (zoom as usize).min(self.entries.len() - 1);

        for index in (0..=start).rev() {
            if let Some(template) = &self.entries[index] {
                if index == zoom as usize {
                    self.stats.exact.fetch_add(1, Ordering::Relaxed);
                    return QuerySelection::Exact(template);
                }

                self.stats.fallback.fetch_add(1, Ordering::Relaxed);
                debug!(zoom, from_zoom = index, "Using query from lower zoom");
                return QuerySelection::Fallback {
                    template,
                    from_zoom: index as u8,
                };
            }
        }

        self.record_not_available(zoom)
    }

    fn record_not_available(&self, zoom: u8) -> QuerySelection<'_> {
        self.stats.not_available.fetch_add(1, Ordering::Relaxed);
        debug!(zoom, "No query at or below zoom");
        QuerySelection::NotAvailable
    }

    /// Zoom levels that carry their own query.
    pub fn populated_zooms(&self) -> Vec<u8> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.is_some())
            .map(|(zoom, _)| zoom as u8)
            .collect()
    }

    /// Zooms below the first populated entry; tiles there are always empty.
    pub fn empty_below(&self) -> Option<u8> {
        self.populated_zooms().first().copied()
    }

    /// Zooms between populated entries that rely on fallback.
    pub fn fallback_zooms(&self) -> Vec<u8> {
        let Some(first) = self.empty_below() else {
            return Vec::new();
        };

        self.entries
            .iter()
            .enumerate()
            .skip(first as usize)
            .filter(|(_, entry)| entry.is_none())
            .map(|(zoom, _)| zoom as u8)
            .collect()
    }

    pub fn stats(&self) -> QueryStatsSnapshot {
        self.stats.snapshot()
    }
}
