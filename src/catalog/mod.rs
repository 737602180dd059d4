//! Layer catalog: the process-wide, read-only table of configured layers.
//!
//! Built once at startup from the site configuration (see [`SiteConfig`])
//! and shared behind an `Arc`; nothing mutates it afterwards.

mod site;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{ConfigError, TileError};
use crate::geometry::GeometryTypeFilter;
use crate::provider::DataSource;
use crate::query::QueryTable;

pub use site::{
    parse_umask, CacheSection, LayerSection, ProviderSection, Site, SiteConfig,
    DEFAULT_REQUEST_TIMEOUT_SECS,
};

/// Separator for ad-hoc composites requested as `a,b`.
pub const LAYER_SEPARATOR: char = ',';

// =============================================================================
// Layer configuration
// =============================================================================

/// A layer backed directly by a spatial query.
pub struct LayerConfig {
    pub name: String,

    /// Passed through as `Access-Control-Allow-Origin`
    pub allowed_origin: Option<String>,

    /// Seconds, passed through as `Cache-Control: max-age`
    pub max_cache_age: Option<u32>,

    pub queries: QueryTable,
    pub geometry_types: GeometryTypeFilter,
    pub clip: bool,
    pub source: Arc<dyn DataSource>,
}

impl fmt::Debug for LayerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayerConfig")
            .field("name", &self.name)
            .field("allowed_origin", &self.allowed_origin)
            .field("max_cache_age", &self.max_cache_age)
            .field("zooms", &self.queries.populated_zooms())
            .field("geometry_types", &self.geometry_types)
            .field("clip", &self.clip)
            .field("source", &self.source.describe())
            .finish()
    }
}

/// A layer whose tile is the merge of other layers' tiles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeLayerConfig {
    pub name: String,

    /// Member layer names, ordered and unique
    pub members: Vec<String>,

    /// Reuse cached member tiles instead of fetching them
    pub ignore_cached_sublayers: bool,

    pub allowed_origin: Option<String>,
    pub max_cache_age: Option<u32>,
}

/// Either kind of layer.
#[derive(Debug, Clone)]
pub enum Layer {
    Single(Arc<LayerConfig>),
    Composite(Arc<CompositeLayerConfig>),
}

impl Layer {
    pub fn name(&self) -> &str {
        match self {
            Layer::Single(layer) => &layer.name,
            Layer::Composite(layer) => &layer.name,
        }
    }

    pub fn allowed_origin(&self) -> Option<&str> {
        match self {
            Layer::Single(layer) => layer.allowed_origin.as_deref(),
            Layer::Composite(layer) => layer.allowed_origin.as_deref(),
        }
    }

    pub fn max_cache_age(&self) -> Option<u32> {
        match self {
            Layer::Single(layer) => layer.max_cache_age,
            Layer::Composite(layer) => layer.max_cache_age,
        }
    }
}

// =============================================================================
// LayerCatalog
// =============================================================================

/// Validated set of layers, looked up by name.
#[derive(Debug, Default)]
pub struct LayerCatalog {
    layers: BTreeMap<String, Layer>,

    /// Composite whose settings ad-hoc composites inherit
    custom_layer_name: Option<String>,
}

impl LayerCatalog {
    /// Build the catalog, checking names and composite membership.
    pub fn new(layers: Vec<Layer>, custom_layer_name: Option<String>) -> Result<Self, ConfigError> {
        let mut map = BTreeMap::new();

        for layer in layers {
            let name = layer.name().to_string();
            // names become directories under the disk cache root
            if name.is_empty()
                || name.starts_with('.')
                || name.contains([LAYER_SEPARATOR, '/', '\\'])
            {
                return Err(ConfigError::InvalidLayer {
                    layer: name,
                    message: "layer names must be non-empty, must not start with '.' and must not contain ',', '/' or '\\'".to_string(),
                });
            }
            if map.insert(name.clone(), layer).is_some() {
                return Err(ConfigError::InvalidLayer {
                    layer: name,
                    message: "defined more than once".to_string(),
                });
            }
        }

        for layer in map.values() {
            if let Layer::Composite(composite) = layer {
                validate_members(&map, &composite.name, &composite.members)?;
            }
        }

        if let Some(custom) = &custom_layer_name {
            if !matches!(map.get(custom), Some(Layer::Composite(_))) {
                return Err(ConfigError::InvalidLayer {
                    layer: custom.clone(),
                    message: "custom_layer_name must name a composite layer".to_string(),
                });
            }
        }

        Ok(Self {
            layers: map,
            custom_layer_name,
        })
    }

    pub fn get(&self, name: &str) -> Option<&Layer> {
        self.layers.get(name)
    }

    /// A non-composite layer by name.
    pub fn single(&self, name: &str) -> Option<&LayerConfig> {
        match self.layers.get(name) {
            Some(Layer::Single(layer)) => Some(layer),
            _ => None,
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.layers.keys().cloned().collect()
    }

    pub fn layers(&self) -> impl Iterator<Item = &Layer> {
        self.layers.values()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Resolve a requested layer name.
    ///
    /// Besides configured names, accepts `a,b,...` over single layers as an
    /// ad-hoc composite using the settings of the `custom_layer_name`
    /// composite (or defaults when none is configured).
    pub fn resolve(&self, name: &str) -> Result<Layer, TileError> {
        if let Some(layer) = self.layers.get(name) {
            return Ok(layer.clone());
        }

        if name.contains(LAYER_SEPARATOR) {
            let members: Vec<String> = name.split(LAYER_SEPARATOR).map(str::to_string).collect();

            if validate_members(&self.layers, name, &members).is_ok() {
                let template = self.custom_layer_name.as_deref().and_then(|custom| {
                    match self.layers.get(custom) {
                        Some(Layer::Composite(c)) => Some(c.clone()),
                        _ => None,
                    }
                });

                return Ok(Layer::Composite(Arc::new(CompositeLayerConfig {
                    name: name.to_string(),
                    members,
                    ignore_cached_sublayers: template
                        .as_ref()
                        .is_some_and(|t| t.ignore_cached_sublayers),
                    allowed_origin: template.as_ref().and_then(|t| t.allowed_origin.clone()),
                    max_cache_age: template.as_ref().and_then(|t| t.max_cache_age),
                })));
            }
        }

        Err(TileError::UnknownLayer {
            layer: name.to_string(),
            known: self.names(),
        })
    }
}

fn validate_members(
    layers: &BTreeMap<String, Layer>,
    composite: &str,
    members: &[String],
) -> Result<(), ConfigError> {
    let invalid = |message: String| ConfigError::InvalidLayer {
        layer: composite.to_string(),
        message,
    };

    if members.is_empty() {
        return Err(invalid("composite has no members".to_string()));
    }

    for (index, member) in members.iter().enumerate() {
        if members[..index].contains(member) {
            return Err(invalid(format!("member '{}' listed twice", member)));
        }
        match layers.get(member) {
            Some(Layer::Single(_)) => {}
            Some(Layer::Composite(_)) => {
                return Err(invalid(format!("member '{}' is itself a composite", member)))
            }
            None => return Err(invalid(format!("unknown member '{}'", member))),
        }
    }

    Ok(())
}
