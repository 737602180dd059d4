//! Process configuration for VTile Streamer.
//!
//! Process-level settings come from the command line via clap, with
//! environment fallbacks using the `VTS_` prefix. Layers and the cache are
//! described separately in the JSON site configuration
//! (see [`crate::catalog::SiteConfig`]).
//!
//! # Environment Variables
//!
//! - `VTS_CONFIG` - Path to the site configuration (required)
//! - `VTS_HOST` - Server bind address (default: 0.0.0.0)
//! - `VTS_PORT` - Server port (default: 8080)
//! - `VTS_REQUEST_TIMEOUT` - Per-tile deadline in seconds, overrides the site file
//! - `VTS_DB_POOL_SIZE` - Maximum connections per database pool (default: 10)
//! - `VTS_DB_ACQUIRE_TIMEOUT` - Seconds to wait for a pooled connection (default: 10)
//! - `VTS_CORS_ORIGINS` - Allowed CORS origins, comma-separated

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::provider::PoolSettings;

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default maximum connections per database pool.
pub const DEFAULT_DB_POOL_SIZE: u32 = 10;

/// Default seconds to wait for a pooled connection.
pub const DEFAULT_DB_ACQUIRE_TIMEOUT: u64 = 10;

// =============================================================================
// CLI Arguments
// =============================================================================

/// VTile Streamer - A vector tile server for PostGIS layers.
///
/// Serves GeoJSON and Mapbox Vector Tiles rendered from SQL queries, with
/// composite layers and a disk or memory tile cache.
#[derive(Parser, Debug, Clone)]
#[command(name = "vtile-streamer")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the tile server.
    Serve(ServeConfig),

    /// Load the site configuration and report on every layer.
    Check(CheckConfig),
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

/// Settings for `vtile-streamer serve`.
#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    /// Path to the JSON site configuration.
    #[arg(short, long, env = "VTS_CONFIG")]
    pub config: PathBuf,

    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "VTS_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "VTS_PORT")]
    pub port: u16,

    /// Per-tile deadline in seconds. Overrides `request_timeout` in the site file.
    #[arg(long, env = "VTS_REQUEST_TIMEOUT")]
    pub request_timeout: Option<u64>,

    // =========================================================================
    // Database Configuration
    // =========================================================================
    /// Maximum connections per database pool.
    #[arg(long, default_value_t = DEFAULT_DB_POOL_SIZE, env = "VTS_DB_POOL_SIZE")]
    pub db_pool_size: u32,

    /// Seconds to wait for a pooled connection.
    #[arg(long, default_value_t = DEFAULT_DB_ACQUIRE_TIMEOUT, env = "VTS_DB_ACQUIRE_TIMEOUT")]
    pub db_acquire_timeout: u64,

    // =========================================================================
    // CORS Configuration
    // =========================================================================
    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin. Layers with an `allowed origin`
    /// setting still send their own header.
    #[arg(long, env = "VTS_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.db_pool_size == 0 {
            return Err("db_pool_size must be greater than 0".to_string());
        }

        if self.request_timeout == Some(0) {
            return Err("request_timeout must be greater than 0".to_string());
        }

        if self.db_acquire_timeout == 0 {
            return Err("db_acquire_timeout must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            max_connections: self.db_pool_size,
            acquire_timeout: Duration::from_secs(self.db_acquire_timeout),
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout.map(Duration::from_secs)
    }
}

/// Settings for `vtile-streamer check`.
#[derive(Args, Debug, Clone)]
pub struct CheckConfig {
    /// Path to the JSON site configuration.
    #[arg(short, long, env = "VTS_CONFIG")]
    pub config: PathBuf,

    /// Enable verbose logging.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

// =============================================================================
// Tests
// =============================================================================
