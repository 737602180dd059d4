//! Layer providers and the data sources behind them.
//!
//! ```text
//! LayerConfig ──► QueryTable::select ──► QueryTemplate::bind
//!                                              │
//!                                              ▼
//!                               DataSource::execute (PostGIS pool)
//!                                              │
//!                                              ▼
//!                 build_records: decode → reproject → filter → clip
//! ```

mod layer;
mod postgis;
mod source;

pub use layer::{build_records, DropCounts, LayerProvider, ProviderStats, ProviderStatsSnapshot};
pub use postgis::{DbInfo, PoolRegistry, PoolSettings, PostgisSource, DEFAULT_PORT};
pub use source::{DataSource, SourceRow};
