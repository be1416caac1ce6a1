//! Command-line configuration for the tile fuser.
//!
//! Options come from command-line arguments, with `FUSE_`-prefixed
//! environment variables as fallback for the ones that tend to be set per
//! machine rather than per run.
//!
//! # Environment Variables
//!
//! - `FUSE_OUTPUT` - Output file (default: fused.tif)
//! - `FUSE_MEMORY_LIMIT` - Memory budget in bytes instead of the live reading
//! - `FUSE_LAYOUT_NAME` - Layout file looked up inside a directory input
//!   (default: stitch.json)

use std::path::{Path, PathBuf};

use clap::Parser;

use crate::error::FuseError;
use crate::fuse::{BlendPolicy, FuseOptions};
use crate::layout::DEFAULT_LAYOUT_NAME;

// =============================================================================
// Default Values
// =============================================================================

/// Default output file.
pub const DEFAULT_OUTPUT: &str = "fused.tif";

// =============================================================================
// CLI Arguments
// =============================================================================

/// Tile Fuser - merge overlapping 3-D tiles into one TIFF volume.
///
/// Reads a layout of registered tile stacks and writes the fused volume
/// chunk by chunk, so outputs larger than memory can be produced.
#[derive(Parser, Debug, Clone)]
#[command(name = "tile-fuser")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    // =========================================================================
    // Input / Output
    // =========================================================================
    /// Layout file, or a directory containing one.
    pub input: PathBuf,

    /// Output TIFF file. Replaced if it already exists.
    #[arg(short, long, default_value = DEFAULT_OUTPUT, env = "FUSE_OUTPUT")]
    pub output: PathBuf,

    /// Name of the layout file inside a directory input.
    #[arg(long, default_value = DEFAULT_LAYOUT_NAME, env = "FUSE_LAYOUT_NAME")]
    pub layout_name: String,

    // =========================================================================
    // Fusion
    // =========================================================================
    /// Average overlapping tiles instead of keeping the highest-weight one.
    #[arg(short, long, default_value_t = false)]
    pub average: bool,

    /// Draw tile and frame numbers onto the output.
    #[arg(short, long, default_value_t = false)]
    pub debug: bool,

    /// First output plane (global Z).
    #[arg(long, default_value_t = 0)]
    pub zmin: usize,

    /// One past the last output plane; the full depth when omitted.
    #[arg(long)]
    pub zmax: Option<usize>,

    /// Memory budget in bytes for chunk sizing.
    ///
    /// When omitted, the machine's available memory is read at startup.
    #[arg(long, env = "FUSE_MEMORY_LIMIT")]
    pub memory_limit: Option<u64>,

    // =========================================================================
    // Logging
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl Config {
    /// Check option combinations that would fail the run later.
    pub fn validate(&self) -> Result<(), FuseError> {
        if let Some(zmax) = self.zmax {
            if zmax <= self.zmin {
                return Err(FuseError::Configuration(format!(
                    "zmax ({}) must be greater than zmin ({})",
                    zmax, self.zmin
                )));
            }
        }

        if self.memory_limit == Some(0) {
            return Err(FuseError::Configuration(
                "memory_limit must be greater than 0".to_string(),
            ));
        }

        if self.layout_name.is_empty() {
            return Err(FuseError::Configuration(
                "layout_name must not be empty".to_string(),
            ));
        }

        let parent = self.output_dir();
        if !parent.is_dir() {
            return Err(FuseError::NotFound(format!(
                "output directory {} does not exist",
                parent.display()
            )));
        }

        Ok(())
    }

    /// Layout file to load: the input itself, or the named file inside it.
    pub fn layout_path(&self) -> PathBuf {
        if self.input.is_dir() {
            self.input.join(&self.layout_name)
        } else {
            self.input.clone()
        }
    }

    /// Directory tile paths in the layout are relative to.
    pub fn tile_root(&self) -> PathBuf {
        match self.layout_path().parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    pub fn fuse_options(&self) -> FuseOptions {
        FuseOptions {
            zmin: self.zmin,
            zmax: self.zmax,
            debug: self.debug,
        }
    }

    pub fn blend_policy(&self) -> BlendPolicy {
        BlendPolicy::from_average_flag(self.average)
    }

    fn output_dir(&self) -> &Path {
        match self.output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
