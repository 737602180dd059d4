//! Per-zoom query selection and bbox binding.

mod binder;
mod table;

pub use binder::{
    ExecutableQuery, QueryTemplate, BBOX_TOKEN, GEOMETRY_COLUMN, ID_COLUMN, RESERVED_COLUMNS,
    SRID_COLUMN, WKB_COLUMN,
};
pub use table::{QuerySelection, QueryStats, QueryStatsSnapshot, QueryTable};
