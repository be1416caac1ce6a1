//! Per-tile placement arithmetic.
//!
//! Three coordinate frames meet here:
//!
//! ```text
//! global   (normalized layout)         tile.zs + local z
//! tile     local frame index            0 .. tile.nfrms
//! chunk    accumulation buffer row      global z - window.zmin
//! slice    row of the frames just read  local z - z_from
//! ```
//!
//! Overlap regions arrive in tile-local coordinates and leave in slice
//! coordinates.

use std::ops::Range;

use crate::layout::{OverlapRegion, Tile};
use crate::volume::Slice;

use super::chunk::ChunkWindow;

/// One unit of work for the fusion engine.
#[derive(Debug, Clone)]
pub struct Placement {
    /// Table index of the tile the slice came from
    pub tile: usize,

    /// Frames of the tile, `(frames, channels, height, width)`
    pub slice: Slice,

    /// Position of `slice[0, .., 0, 0]` in the chunk buffer, `(z, y, x)`
    pub top_left: [usize; 3],

    /// Overlaps re-expressed relative to `slice`
    pub overlaps: Vec<OverlapRegion>,
}

/// Local frames of `tile` that fall inside `window`, if any.
///
/// `z_to = min(zmax - Zs, nfrms)`, `z_from = max(zmin - Zs, 0)`; the tile is
/// skipped when `z_to <= 0` or `z_from >= z_to`.
pub fn contributing_frames(tile: &Tile, window: &ChunkWindow) -> Option<Range<usize>> {
    let z_to = (window.zmax as i64 - tile.zs).min(tile.nfrms as i64);
    if z_to <= 0 {
        return None;
    }
    let z_from = (window.zmin as i64 - tile.zs).max(0);
    if z_from >= z_to {
        return None;
    }
    Some(z_from as usize..z_to as usize)
}

/// Chunk-buffer position of the first voxel of `frames`.
///
/// Expects normalized origins; `frames` must come from
/// [`contributing_frames`] for the same window.
pub fn top_left(tile: &Tile, frames: &Range<usize>, window: &ChunkWindow) -> [usize; 3] {
    let z = tile.zs + frames.start as i64 - window.zmin as i64;
    [z.max(0) as usize, tile.ys.max(0) as usize, tile.xs.max(0) as usize]
}

/// Keep overlaps touching `frames` and shift them to slice coordinates.
///
/// An overlap that started before the slice is clamped to begin at the
/// slice's first frame. Y and X bounds pass through unchanged: slices always
/// span the tile's full Y/X extent.
pub fn clip_overlaps(overlaps: Vec<OverlapRegion>, frames: &Range<usize>) -> Vec<OverlapRegion> {
    let z_from = frames.start as i64;
    let z_to = frames.end as i64;

    overlaps
        .into_iter()
        .filter(|o| o.z_from <= z_to && o.z_to >= z_from)
        .map(|mut o| {
            o.z_from = (o.z_from - z_from).max(0);
            o.z_to -= z_from;
            o
        })
        .collect()
}
