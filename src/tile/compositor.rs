//! Rendering of single and composite layers into one tile payload.
//!
//! A composite fans out to its members concurrently and waits for every
//! outcome. Members whose tile is already cached can be spliced in verbatim
//! instead of being fetched again, when the composite allows it.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::join_all;
use tracing::{debug, warn};

use crate::catalog::{CompositeLayerConfig, LayerCatalog, LayerConfig};
use crate::error::{DataSourceError, TileError};
use crate::geometry::TileCoordinate;
use crate::provider::LayerProvider;

use super::cache::TileCacheKey;
use super::encoder::TileFormat;

// =============================================================================
// CacheLookup Trait
// =============================================================================

/// Read-only view of cached member tiles.
#[async_trait]
pub trait CacheLookup: Send + Sync {
    /// Cached payload for `key`, or `None` on a miss or any lookup failure.
    async fn lookup(&self, key: &TileCacheKey) -> Option<Bytes>;
}

// =============================================================================
// TilePayload
// =============================================================================

/// An encoded tile plus how it was assembled.
#[derive(Debug, Clone)]
pub struct TilePayload {
    pub bytes: Bytes,
    pub format: TileFormat,

    /// Some composite members failed and are missing
    pub partial: bool,

    /// Members omitted because their provider failed
    pub failed_members: Vec<String>,

    /// Members taken from the cache instead of their provider
    pub spliced_members: Vec<String>,
}

impl TilePayload {
    fn complete(bytes: Bytes, format: TileFormat) -> Self {
        Self {
            bytes,
            format,
            partial: false,
            failed_members: Vec::new(),
            spliced_members: Vec::new(),
        }
    }
}

enum MemberOutcome {
    Spliced(Bytes),
    Rendered(Bytes),
    Failed(DataSourceError),
}

// =============================================================================
// Compositor
// =============================================================================

/// Renders layers from the catalog through a shared provider.
pub struct Compositor {
    catalog: Arc<LayerCatalog>,
    provider: Arc<LayerProvider>,
}

impl Compositor {
    pub fn new(catalog: Arc<LayerCatalog>, provider: Arc<LayerProvider>) -> Self {
        Self { catalog, provider }
    }

    pub fn provider(&self) -> &LayerProvider {
        &self.provider
    }

    /// Render one non-composite layer.
    pub async fn single(
        &self,
        layer: &LayerConfig,
        coord: TileCoordinate,
        format: TileFormat,
    ) -> Result<TilePayload, TileError> {
        let bytes = self
            .render(layer, coord, format)
            .await?
            .map_err(|source| TileError::DataSource {
                layer: layer.name.clone(),
                source,
            })?;

        Ok(TilePayload::complete(bytes, format))
    }

    /// Render every member of `composite` and merge them in declared order.
    ///
    /// Failed members are left out and reported; the call only fails when
    /// no member succeeds. Without a lookup every member is fetched.
    pub async fn composite(
        &self,
        composite: &CompositeLayerConfig,
        coord: TileCoordinate,
        extension: &str,
        lookup: Option<&dyn CacheLookup>,
    ) -> Result<TilePayload, TileError> {
        let format = TileFormat::from_extension(extension)?;
        let lookup = lookup.filter(|_| composite.ignore_cached_sublayers);

        let outcomes = join_all(
            composite
                .members
                .iter()
                .map(|member| self.member(member, coord, format, extension, lookup)),
        )
        .await;

        let mut parts = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();
        let mut spliced = Vec::new();

        for (member, outcome) in composite.members.iter().zip(outcomes) {
            match outcome? {
                MemberOutcome::Spliced(bytes) => {
                    spliced.push(member.clone());
                    parts.push((member.clone(), bytes));
                }
                MemberOutcome::Rendered(bytes) => parts.push((member.clone(), bytes)),
                MemberOutcome::Failed(e) => failures.push((member.clone(), e)),
            }
        }

        if parts.is_empty() && !failures.is_empty() {
            return Err(TileError::AllMembersFailed {
                layer: composite.name.clone(),
                failures,
            });
        }

        if !failures.is_empty() {
            warn!(
                layer = %composite.name,
                tile = %coord,
                failed = failures.len(),
                "Serving partial composite"
            );
        }

        let bytes = format.merge(&parts)?;
        let failed_members: Vec<String> = failures.into_iter().map(|(name, _)| name).collect();

        Ok(TilePayload {
            bytes,
            format,
            partial: !failed_members.is_empty(),
            failed_members,
            spliced_members: spliced,
        })
    }

    async fn member(
        &self,
        name: &str,
        coord: TileCoordinate,
        format: TileFormat,
        extension: &str,
        lookup: Option<&dyn CacheLookup>,
    ) -> Result<MemberOutcome, TileError> {
        if let Some(lookup) = lookup {
            let key = TileCacheKey::new(name, coord, extension);
            if let Some(bytes) = lookup.lookup(&key).await {
                debug!(member = name, tile = %coord, "Splicing cached sublayer");
                return Ok(MemberOutcome::Spliced(bytes));
            }
        }

        let Some(layer) = self.catalog.single(name) else {
            return Ok(MemberOutcome::Failed(DataSourceError::Query(format!(
                "member '{}' is not a single layer",
                name
            ))));
        };

        Ok(match self.render(layer, coord, format).await? {
            Ok(bytes) => MemberOutcome::Rendered(bytes),
            Err(e) => MemberOutcome::Failed(e),
        })
    }

    /// Fetch and encode one layer. Data source errors are returned inside
    /// so composites can tolerate them; encoding errors abort.
    async fn render(
        &self,
        layer: &LayerConfig,
        coord: TileCoordinate,
        format: TileFormat,
    ) -> Result<Result<Bytes, DataSourceError>, TileError> {
        let records = match self.provider.fetch(layer, coord).await {
            Ok(records) => records,
            Err(e) => return Ok(Err(e)),
        };

        format
            .encode_layer(&layer.name, &records, coord, layer.clip)
            .map(Ok)
    }
}
