//! Tile Fuser - merge overlapping 3-D tiles into one TIFF volume.
//!
//! This binary loads the tile layout, plans the chunked fusion and writes
//! the output file.

use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tile_fuser::{
    BlendingEngine, Config, FileVolumeSource, FixedMemory, FuseError, FuseOrchestrator,
    FuseSummary, JsonTileTable, TiffOutput,
};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    match run(&config).await {
        Ok(summary) => {
            info!(
                "Wrote {} planes in {} chunks to {}",
                summary.planes,
                summary.chunks,
                config.output.display()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(kind = ?e.kind(), "Fusion failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: &Config) -> Result<FuseSummary, FuseError> {
    let layout_path = config.layout_path();
    let tile_root = config.tile_root();

    info!("Configuration:");
    info!("  Layout: {}", layout_path.display());
    info!("  Tiles: {}", tile_root.display());
    info!("  Output: {}", config.output.display());
    info!("  Blending: {:?}", config.blend_policy());
    match config.memory_limit {
        Some(limit) => info!("  Memory: {} bytes (fixed)", limit),
        None => info!("  Memory: live reading"),
    }

    let (table, source) =
        JsonTileTable::load_in_background(layout_path, FileVolumeSource::new(tile_root)).await?;
    let engine = BlendingEngine::new(config.blend_policy());
    let target = TiffOutput::new(&config.output);

    let fuser = FuseOrchestrator::new(table, source, engine, config.fuse_options());
    match config.memory_limit {
        Some(limit) => {
            fuser
                .with_memory_probe(FixedMemory(limit))
                .run(&target)
                .await
        }
        None => fuser.run(&target).await,
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "tile_fuser=debug"
    } else {
        "tile_fuser=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
