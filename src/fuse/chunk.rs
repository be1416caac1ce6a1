//! Output shape, memory budget and depth partitioning.
//!
//! The output volume is fused in chunks along Z. Each chunk's accumulation
//! buffer holds full XY planes at `f32`, so the chunk thickness is bounded
//! by how many such planes fit in memory with a safety margin:
//!
//! ```text
//! plane_bytes       = height * width * channels * 4
//! frames_per_chunk  = floor(available / plane_bytes / 1.5)
//! thicknesses       = [frames_per_chunk; depth / frames_per_chunk] ++ [depth % frames_per_chunk]
//! ```

use crate::error::FuseError;
use crate::volume::SampleType;

/// Bytes per accumulated sample (`f32`).
pub const ACCUMULATION_SAMPLE_SIZE: usize = 4;

/// Headroom for tile-read buffers, the consumer's working set and the rest
/// of the process.
pub const MEMORY_SAFETY_FACTOR: f64 = 1.5;

// =============================================================================
// Output Shape
// =============================================================================

/// Shape of the fused output (or of one chunk of it).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputShape {
    pub depth: usize,
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

impl OutputShape {
    /// Samples in one Z-plane, all channels included.
    pub fn plane_len(&self) -> usize {
        self.channels * self.height * self.width
    }

    /// Bytes of the whole volume at `sample_type`.
    pub fn byte_size(&self, sample_type: SampleType) -> u64 {
        self.depth as u64 * self.plane_len() as u64 * sample_type.size() as u64
    }

    /// Bytes of one plane of the accumulation buffer.
    pub fn accumulation_plane_bytes(&self) -> u64 {
        self.plane_len() as u64 * ACCUMULATION_SAMPLE_SIZE as u64
    }

    /// Accumulation-buffer dimensions `(depth, channels, height, width)`.
    pub fn accumulation_dim(&self) -> (usize, usize, usize, usize) {
        (self.depth, self.channels, self.height, self.width)
    }

    /// Same XY extent with a different depth.
    pub fn with_depth(&self, depth: usize) -> Self {
        Self { depth, ..*self }
    }
}

// =============================================================================
// Memory Budget
// =============================================================================

/// Number of full planes that fit in `available_bytes`.
///
/// # Errors
///
/// [`FuseError::Configuration`] when not even one plane fits.
pub fn frames_per_chunk(plane_bytes: u64, available_bytes: u64) -> Result<usize, FuseError> {
    if plane_bytes == 0 {
        return Err(FuseError::Configuration(
            "output plane is empty".to_string(),
        ));
    }

    let frames = (available_bytes as f64 / plane_bytes as f64 / MEMORY_SAFETY_FACTOR) as usize;
    if frames == 0 {
        return Err(FuseError::Configuration(format!(
            "a single output plane needs {} bytes ({}x safety), only {} bytes available",
            plane_bytes, MEMORY_SAFETY_FACTOR, available_bytes
        )));
    }
    Ok(frames)
}

/// Split `depth` into `frames_per_chunk` pieces plus a remainder.
pub fn partition_depth(depth: usize, frames_per_chunk: usize) -> Vec<usize> {
    if frames_per_chunk == 0 {
        return Vec::new();
    }
    let mut thicknesses = vec![frames_per_chunk; depth / frames_per_chunk];
    let remainder = depth % frames_per_chunk;
    if remainder > 0 {
        thicknesses.push(remainder);
    }
    thicknesses
}

// =============================================================================
// Chunk Window
// =============================================================================

/// Global Z window `[zmin, zmax)` of one chunk.
///
/// Windows are built once per chunk and never mutated; the orchestrator only
/// carries the next window's start between chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkWindow {
    /// Position of the chunk in write order
    pub index: usize,
    pub zmin: usize,
    pub zmax: usize,
}

impl ChunkWindow {
    pub fn new(index: usize, zmin: usize, thickness: usize) -> Self {
        Self {
            index,
            zmin,
            zmax: zmin + thickness,
        }
    }

    pub fn thickness(&self) -> usize {
        self.zmax - self.zmin
    }
}

/// Consecutive windows starting at `zmin`.
pub fn chunk_windows(zmin: usize, thicknesses: &[usize]) -> Vec<ChunkWindow> {
    let mut next = zmin;
    thicknesses
        .iter()
        .enumerate()
        .map(|(index, &thickness)| {
            let window = ChunkWindow::new(index, next, thickness);
            next = window.zmax;
            window
        })
        .collect()
}
