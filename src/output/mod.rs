//! Fused volume output.
//!
//! Chunks are appended to a single TIFF file in increasing Z order. The
//! orchestrator only sees the [`OutputTarget`] / [`VolumeSink`] pair, which
//! lets tests record appends without touching the disk.

mod writer;

pub use writer::{
    OutputChunk, OutputLayout, OutputTarget, TiffOutput, TiffVariant, TiffVolumeWriter,
    VolumeSink, LARGE_FILE_THRESHOLD,
};
