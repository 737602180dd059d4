//! Site configuration: the JSON document describing cache and layers.
//!
//! ```json
//! {
//!   "cache": {"name": "Disk", "path": "/tmp/stache", "umask": "0022", "dirs": "safe"},
//!   "layers": {
//!     "pois": {"provider": {"name": "vector", "kwargs": {"dbinfo": {...}, "queries": [...]}}},
//!     "all": {"provider": {"name": "multi", "kwargs": {"names": ["pois"]}}}
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::ConfigError;
use crate::geometry::{GeometryKind, GeometryTypeFilter};
use crate::provider::{DataSource, DbInfo, PoolRegistry};
use crate::query::{QueryTable, QueryTemplate, BBOX_TOKEN};
use crate::tile::{
    CompressionPolicy, DirectoryLayout, DiskCache, TileCache, DEFAULT_GZIP_EXTENSIONS,
    DEFAULT_MEMORY_CACHE_CAPACITY, DEFAULT_UMASK,
};

use super::{CompositeLayerConfig, Layer, LayerCatalog, LayerConfig};

/// Request deadline when the configuration does not set one.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// Raw configuration
// =============================================================================

/// The site configuration as written on disk.
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    #[serde(default)]
    pub cache: CacheSection,

    /// Seconds
    #[serde(default)]
    pub request_timeout: Option<u64>,

    #[serde(default)]
    pub custom_layer_name: Option<String>,

    pub layers: BTreeMap<String, LayerSection>,

    /// Directory relative query and cache paths resolve against
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    /// `Disk`, `Memory` or `None`
    pub name: String,

    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Octal string such as `"0022"`
    #[serde(default)]
    pub umask: Option<String>,

    #[serde(default)]
    pub dirs: Option<String>,

    /// Extensions stored gzip-compressed
    #[serde(default)]
    pub gzip: Option<Vec<String>>,

    /// Memory cache capacity in bytes
    #[serde(default)]
    pub size: Option<usize>,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            name: "None".to_string(),
            path: None,
            umask: None,
            dirs: None,
            gzip: None,
            size: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LayerSection {
    #[serde(default, rename = "allowed origin")]
    pub allowed_origin: Option<String>,

    #[serde(default, rename = "max cache age")]
    pub max_cache_age: Option<u32>,

    pub provider: ProviderSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSection {
    /// `vector` or `multi`
    pub name: String,

    #[serde(default)]
    pub kwargs: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct VectorKwargs {
    dbinfo: DbInfo,

    /// One entry per zoom: SQL text, a path to a query file, or null
    queries: Vec<Option<String>>,

    #[serde(default)]
    geometry_types: Option<Vec<String>>,

    #[serde(default = "default_clip")]
    clip: bool,
}

fn default_clip() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct MultiKwargs {
    names: Vec<String>,

    #[serde(default)]
    ignore_cached_sublayers: bool,
}

// =============================================================================
// Built site
// =============================================================================

/// Everything the server needs, built from a [`SiteConfig`].
#[derive(Debug)]
pub struct Site {
    pub catalog: Arc<LayerCatalog>,
    pub cache: TileCache,
    pub request_timeout: Duration,
}

impl SiteConfig {
    /// Read and parse a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        Self::from_json(&text, base_dir)
    }

    /// Parse configuration text; relative paths resolve against `base_dir`.
    pub fn from_json(text: &str, base_dir: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let mut config: SiteConfig = serde_json::from_str(text)?;
        config.base_dir = base_dir.into();
        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS))
    }

    /// Build the site with PostGIS sources from `registry`.
    pub fn build(&self, registry: &mut PoolRegistry) -> Result<Site, ConfigError> {
        self.build_with(|dbinfo| registry.source_for(dbinfo) as Arc<dyn DataSource>)
    }

    /// Build the site, asking `source_for` for each vector layer's source.
    pub fn build_with<F>(&self, mut source_for: F) -> Result<Site, ConfigError>
    where
        F: FnMut(&DbInfo) -> Arc<dyn DataSource>,
    {
        let mut layers = Vec::with_capacity(self.layers.len());

        for (name, section) in &self.layers {
            let layer = match section.provider.name.to_ascii_lowercase().as_str() {
                "vector" => Layer::Single(Arc::new(self.vector_layer(name, section, &mut source_for)?)),
                "multi" => Layer::Composite(Arc::new(multi_layer(name, section)?)),
                other => {
                    return Err(ConfigError::InvalidLayer {
                        layer: name.clone(),
                        message: format!("unknown provider '{}'", other),
                    })
                }
            };
            debug!(layer = %name, "Configured layer");
            layers.push(layer);
        }

        let catalog = LayerCatalog::new(layers, self.custom_layer_name.clone())?;
        let cache = self.build_cache()?;

        info!(
            layers = catalog.len(),
            cache = %cache.describe(),
            "Site configuration loaded"
        );

        Ok(Site {
            catalog: Arc::new(catalog),
            cache,
            request_timeout: self.request_timeout(),
        })
    }

    fn vector_layer<F>(
        &self,
        name: &str,
        section: &LayerSection,
        source_for: &mut F,
    ) -> Result<LayerConfig, ConfigError>
    where
        F: FnMut(&DbInfo) -> Arc<dyn DataSource>,
    {
        let kwargs: VectorKwargs = serde_json::from_value(section.provider.kwargs.clone())
            .map_err(|e| ConfigError::InvalidLayer {
                layer: name.to_string(),
                message: format!("bad vector provider arguments: {}", e),
            })?;

        let mut templates = Vec::with_capacity(kwargs.queries.len());
        for query in &kwargs.queries {
            templates.push(match query {
                Some(query) => Some(self.load_query(query)?),
                None => None,
            });
        }

        let geometry_types = match &kwargs.geometry_types {
            Some(kinds) => {
                let kinds = kinds
                    .iter()
                    .map(|kind| kind.parse::<GeometryKind>())
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|message| ConfigError::InvalidLayer {
                        layer: name.to_string(),
                        message,
                    })?;
                GeometryTypeFilter::new(kinds)
            }
            None => GeometryTypeFilter::all(),
        };

        Ok(LayerConfig {
            name: name.to_string(),
            allowed_origin: section.allowed_origin.clone(),
            max_cache_age: section.max_cache_age,
            queries: QueryTable::new(templates),
            geometry_types,
            clip: kwargs.clip,
            source: source_for(&kwargs.dbinfo),
        })
    }

    /// Inline SQL carries the bbox token; anything else names a file.
    fn load_query(&self, query: &str) -> Result<QueryTemplate, ConfigError> {
        if query.contains(BBOX_TOKEN) {
            return QueryTemplate::parse("<inline>", query);
        }

        let path = self.base_dir.join(query);
        let sql = std::fs::read_to_string(&path).map_err(|e| ConfigError::InvalidQuery {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        QueryTemplate::parse(path.display().to_string(), &sql)
    }

    fn build_cache(&self) -> Result<TileCache, ConfigError> {
        let section = &self.cache;

        let policy = match &section.gzip {
            Some(extensions) => CompressionPolicy::new(extensions.iter()),
            None => CompressionPolicy::new(DEFAULT_GZIP_EXTENSIONS),
        };

        match section.name.to_ascii_lowercase().as_str() {
            "none" | "test" => Ok(TileCache::disabled()),
            "memory" => Ok(TileCache::memory(
                section.size.unwrap_or(DEFAULT_MEMORY_CACHE_CAPACITY),
                policy,
            )),
            "disk" => {
                let path = section.path.as_ref().ok_or_else(|| {
                    ConfigError::InvalidCache("disk cache requires a path".to_string())
                })?;
                let umask = match &section.umask {
                    Some(umask) => parse_umask(umask)?,
                    None => DEFAULT_UMASK,
                };
                let layout = match &section.dirs {
                    Some(dirs) => dirs.parse::<DirectoryLayout>().map_err(ConfigError::InvalidCache)?,
                    None => DirectoryLayout::default(),
                };

                let disk = DiskCache::new(self.base_dir.join(path), layout, umask);
                Ok(TileCache::new(Arc::new(disk), policy))
            }
            other => Err(ConfigError::InvalidCache(format!(
                "unknown cache '{}'",
                other
            ))),
        }
    }
}

fn multi_layer(name: &str, section: &LayerSection) -> Result<CompositeLayerConfig, ConfigError> {
    let kwargs: MultiKwargs = serde_json::from_value(section.provider.kwargs.clone()).map_err(
        |e| ConfigError::InvalidLayer {
            layer: name.to_string(),
            message: format!("bad multi provider arguments: {}", e),
        },
    )?;

    Ok(CompositeLayerConfig {
        name: name.to_string(),
        members: kwargs.names,
        ignore_cached_sublayers: kwargs.ignore_cached_sublayers,
        allowed_origin: section.allowed_origin.clone(),
        max_cache_age: section.max_cache_age,
    })
}

/// Parse an octal umask such as `"0022"` or `"0o027"`.
pub fn parse_umask(value: &str) -> Result<u32, ConfigError> {
    let digits = value.trim().trim_start_matches("0o");
    match u32::from_str_radix(digits, 8) {
        Ok(umask) if umask <= 0o777 => Ok(umask),
        _ => Err(ConfigError::InvalidCache(format!("bad umask '{}'", value))),
    }
}
