//! # Tile Fuser
//!
//! Merges overlapping, registered 3-D microscopy tiles into a single
//! (Big)TIFF volume.
//!
//! The output is fused in chunks along Z whose thickness is derived from
//! available memory, so volumes far larger than RAM can be written. Each
//! chunk streams tile slices through a bounded channel to a blending engine
//! and is appended to the output as soon as it is complete.
//!
//! ## Features
//!
//! - **Memory-bounded chunking**: chunk thickness follows live available memory
//! - **Virtual tiles**: a tile is one multi-page TIFF or a directory of TIFFs
//! - **Blending**: weighted average or highest-weight-wins across overlaps
//! - **Large outputs**: switches to BigTIFF when the volume nears 4 GiB
//! - **Debug overlay**: tile and frame numbers drawn into the output
//!
//! ## Architecture
//!
//! - [`volume`] - Tile reading: single or multi-file frame sequences
//! - [`layout`] - Tile positions and overlaps (JSON layout file)
//! - [`fuse`] - Chunk planning, placement and blending
//! - [`output`] - Append-only TIFF writer
//! - [`config`] - CLI configuration
//!
//! ## Example
//!
//! ```rust,no_run
//! use tile_fuser::{
//!     BlendPolicy, BlendingEngine, FileVolumeSource, FuseOptions, FuseOrchestrator,
//!     JsonTileTable, TiffOutput,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tile_fuser::FuseError> {
//!     let source = FileVolumeSource::new("/data/run1");
//!     let table = JsonTileTable::load("/data/run1/stitch.json".as_ref(), &source)?;
//!
//!     let fuser = FuseOrchestrator::new(
//!         table,
//!         source,
//!         BlendingEngine::new(BlendPolicy::Average),
//!         FuseOptions::default(),
//!     );
//!     let summary = fuser.run(&TiffOutput::new("/data/run1/fused.tif")).await?;
//!     println!("wrote {} planes", summary.planes);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod fuse;
pub mod layout;
pub mod output;
pub mod volume;

// Re-export commonly used types
pub use config::Config;
pub use error::{ErrorKind, FuseError, LayoutError, OutputError, VolumeError};
pub use fuse::{
    AccumulationBuffer, BlendPolicy, BlendingEngine, ChunkWindow, FixedMemory, FuseOptions,
    FuseOrchestrator, FusePlan, FuseSummary, FusionEngine, MemoryProbe, OutputShape, Placement,
    PlacementQueue, SystemMemory,
};
pub use layout::{
    FullExtent, JsonTileTable, LayoutDocument, OverlapRegion, Tile, TilePositionTable, TileRecord,
};
pub use output::{
    OutputChunk, OutputLayout, OutputTarget, TiffOutput, TiffVariant, TiffVolumeWriter, VolumeSink,
};
pub use volume::{
    FileVolumeSource, SampleBuffer, SampleType, Slice, TileVolume, VirtualTileVolume, VolumeExtent,
    VolumeSource,
};
