//! VTile Streamer - A vector tile server for PostGIS layers.
//!
//! This binary starts the HTTP server and configures all components.

use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vtile_streamer::{
    catalog::{Layer, Site, SiteConfig},
    config::{CheckConfig, Cli, Command, ServeConfig},
    provider::{PoolRegistry, PoolSettings},
    server::{create_router, RouterConfig},
    tile::TileService,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Serve(config) => run_serve(config).await,
        Command::Check(config) => run_check(config),
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let mut pools = PoolRegistry::new(config.pool_settings());
    let site = match load_site(&config.config, &mut pools) {
        Ok(site) => site,
        Err(e) => {
            error!("Failed to load {}: {}", config.config.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let mut tile_service = TileService::from_site(site);
    if let Some(timeout) = config.request_timeout() {
        tile_service = tile_service.with_request_timeout(timeout);
    }

    info!("Configuration:");
    info!("  Site: {}", config.config.display());
    info!("  Layers: {}", tile_service.catalog().names().join(", "));
    info!("  Cache: {}", tile_service.cache().describe());
    info!("  Database pools: {}", pools.pool_count());
    info!("  Request timeout: {:?}", tile_service.request_timeout());

    let router_config = build_router_config(&config);
    let router = create_router(tile_service, router_config);

    let addr = config.bind_address();
    info!("Server listening on: http://{}", addr);
    info!("  curl http://{}/health", addr);
    info!("  curl http://{}/<layer>/0/0/0.json", addr);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn load_site(
    path: &std::path::Path,
    pools: &mut PoolRegistry,
) -> Result<Site, vtile_streamer::ConfigError> {
    SiteConfig::load(path)?.build(pools)
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "vtile_streamer=debug,tower_http=debug"
    } else {
        "vtile_streamer=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build RouterConfig from the application ServeConfig.
fn build_router_config(config: &ServeConfig) -> RouterConfig {
    let mut router_config = RouterConfig::new();

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config.with_tracing(!config.no_tracing)
}

// =============================================================================
// Check Command
// =============================================================================

/// Builds the site without touching the database; pools connect lazily.
fn run_check(config: CheckConfig) -> ExitCode {
    if config.verbose {
        init_logging(true);
    }

    println!("VTile Streamer Configuration Check");
    println!("═══════════════════════════════════");
    println!();

    let mut pools = PoolRegistry::new(PoolSettings::default());
    let site = match load_site(&config.config, &mut pools) {
        Ok(site) => {
            println!("✓ Site: {}", config.config.display());
            site
        }
        Err(e) => {
            println!("✗ Site: {}", e);
            return ExitCode::FAILURE;
        }
    };

    println!("✓ Cache: {}", site.cache.describe());
    println!("✓ Request timeout: {:?}", site.request_timeout);
    println!("✓ Database pools: {}", pools.pool_count());
    println!();
    println!("Layers:");
    println!("───────");

    for layer in site.catalog.layers() {
        match layer {
            Layer::Single(config) => {
                let zooms = config.queries.populated_zooms();
                println!("  {} ({})", config.name, config.source.describe());
                println!("    queries at zooms: {:?}", zooms);
                match config.queries.empty_below() {
                    Some(0) => {}
                    Some(first) => println!("    empty tiles below zoom {}", first),
                    None => println!("    no queries, every tile is empty"),
                }
                let fallback = config.queries.fallback_zooms();
                if !fallback.is_empty() {
                    println!("    reusing coarser queries at zooms: {:?}", fallback);
                }
            }
            Layer::Composite(config) => {
                println!("  {} (composite: {})", config.name, config.members.join(", "));
                if config.ignore_cached_sublayers {
                    println!("    reuses cached member tiles");
                }
            }
        }
    }

    println!();
    println!("═══════════════════════════════════");
    println!("✓ All checks passed!");

    ExitCode::SUCCESS
}
