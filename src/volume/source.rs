//! Volume access traits.
//!
//! The orchestrator reads tiles through [`VolumeSource`] so that the same
//! scheduling code runs against files on disk or in-memory test volumes.

use std::ops::Range;
use std::path::{Path, PathBuf};

use ndarray::Array4;

use crate::error::VolumeError;

use super::sample::SampleType;
use super::virtual_volume::VirtualTileVolume;

/// Extended-precision sub-volume of one tile.
///
/// Shape is `(frames, channels, height, width)`; grayscale tiles have one
/// channel.
pub type Slice = Array4<f32>;

/// Per-frame extent of a tile, identical across all of its frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeExtent {
    pub width: usize,
    pub height: usize,
    pub channels: usize,
    pub sample_type: SampleType,
}

/// A tile addressable as one logical frame sequence.
///
/// Handles are shared across chunk reads, so they must be `Sync`.
pub trait TileVolume: Send + Sync + 'static {
    /// Total logical frames.
    fn frame_count(&self) -> usize;

    /// Width, height, channels and sample type of every frame.
    fn extent(&self) -> VolumeExtent;

    /// Read frames `[frames.start, frames.end)` at `f32` precision.
    ///
    /// The returned slice owns its samples; callers may mutate it freely.
    fn read(&self, frames: Range<usize>) -> Result<Slice, VolumeError>;
}

/// Opens tile volumes by their layout path.
pub trait VolumeSource: Send + Sync + 'static {
    type Volume: TileVolume;

    /// Open the tile stored at `tile` (relative to the source's root).
    fn open(&self, tile: &Path) -> Result<Self::Volume, VolumeError>;
}

/// Opens [`VirtualTileVolume`]s relative to a root directory.
#[derive(Debug, Clone)]
pub struct FileVolumeSource {
    root: PathBuf,
}

impl FileVolumeSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl VolumeSource for FileVolumeSource {
    type Volume = VirtualTileVolume;

    fn open(&self, tile: &Path) -> Result<Self::Volume, VolumeError> {
        VirtualTileVolume::open(self.root.join(tile))
    }
}
