//! Query templates and bounding-box binding.
//!
//! A template is plain SQL containing the reserved token `!bbox!` exactly
//! once. Binding replaces the token with a parameterised envelope so tile
//! coordinates never enter the SQL text.

use crate::error::ConfigError;
use crate::geometry::{BoundingBox, WORKING_SRID};

/// Placeholder replaced by the tile envelope.
pub const BBOX_TOKEN: &str = "!bbox!";

/// Column every template must alias its geometry to.
pub const GEOMETRY_COLUMN: &str = "__geometry__";

/// Optional column used as the feature id.
pub const ID_COLUMN: &str = "__id__";

/// Columns added by [`QueryTemplate::bind`].
pub const SRID_COLUMN: &str = "__srid__";
pub const WKB_COLUMN: &str = "__wkb__";

/// Columns never passed through as attributes.
pub const RESERVED_COLUMNS: [&str; 4] = [GEOMETRY_COLUMN, ID_COLUMN, SRID_COLUMN, WKB_COLUMN];

/// A validated spatial query with one bbox placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTemplate {
    origin: String,
    sql: String,
}

impl QueryTemplate {
    /// Validate `sql` loaded from `origin` (usually a file path).
    pub fn parse(origin: impl Into<String>, sql: &str) -> Result<Self, ConfigError> {
        let origin = origin.into();
        let invalid = |message: &str| ConfigError::InvalidQuery {
            path: origin.clone(),
            message: message.to_string(),
        };

        let sql = sql.trim().trim_end_matches(';').trim_end();

        match sql.matches(BBOX_TOKEN).count() {
            0 => return Err(invalid("missing !bbox! placeholder")),
            1 => {}
            n => {
                return Err(invalid(&format!(
                    "!bbox! must appear exactly once, found {}",
                    n
                )))
            }
        }

        if has_positional_marker(sql) {
            return Err(invalid("positional parameters ($n) are reserved for binding"));
        }

        if !sql.contains(GEOMETRY_COLUMN) {
            return Err(invalid("no column aliased to __geometry__"));
        }

        Ok(Self {
            sql: sql.to_string(),
            origin,
        })
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Bind the tile envelope into the template.
    pub fn bind(&self, bbox: &BoundingBox) -> ExecutableQuery {
        let envelope = format!("ST_MakeEnvelope($1, $2, $3, $4, {})", WORKING_SRID);
        let inner = self.sql.replacen(BBOX_TOKEN, &envelope, 1);

        let sql = format!(
            "SELECT q.*, ST_SRID(q.{geom}) AS {srid}, ST_AsBinary(q.{geom}) AS {wkb} FROM ({inner}) AS q",
            geom = GEOMETRY_COLUMN,
            srid = SRID_COLUMN,
            wkb = WKB_COLUMN,
            inner = inner,
        );

        ExecutableQuery {
            sql,
            params: bbox.to_array(),
            origin: self.origin.clone(),
        }
    }
}

/// `$` followed by a digit.
///
/// Dollar-quoted strings (`$tag$`) are allowed; only numbered markers clash
/// with the bound envelope.
fn has_positional_marker(sql: &str) -> bool {
    sql.as_bytes()
        .windows(2)
        .any(|pair| pair[0] == b'$' && pair[1].is_ascii_digit())
}

/// A bound query ready to run: SQL text plus the four envelope parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutableQuery {
    pub sql: String,

    /// `min_x, min_y, max_x, max_y` for `$1..$4`
    pub params: [f64; 4],

    /// Where the template came from, for logging
    pub origin: String,
}
