//! Tile position table abstraction.
//!
//! The table is the geometric collaborator of the fuser: it knows where every
//! tile sits in the global (Z, Y, X) frame and which neighbours it overlaps.

use std::path::PathBuf;

use crate::error::LayoutError;

// =============================================================================
// Tile
// =============================================================================

/// One input stack and its global placement.
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    /// Position in table order
    pub index: usize,

    /// Tile file or directory, relative to the layout root
    pub path: PathBuf,

    /// Global origin along Z
    pub zs: i64,

    /// Global origin along Y
    pub ys: i64,

    /// Global origin along X
    pub xs: i64,

    /// Number of frames (Z extent)
    pub nfrms: usize,

    /// Frame height in pixels
    pub height: usize,

    /// Frame width in pixels
    pub width: usize,

    /// Blend weight against neighbours
    pub weight: f32,
}

impl Tile {
    fn bounds(&self) -> [(i64, i64); 3] {
        [
            (self.zs, self.zs + self.nfrms as i64),
            (self.ys, self.ys + self.height as i64),
            (self.xs, self.xs + self.width as i64),
        ]
    }
}

// =============================================================================
// Overlap Region
// =============================================================================

/// Voxel box where a tile and one neighbour both contribute.
///
/// Bounds are half-open and expressed in the owning tile's local voxel
/// coordinates. Signed so that callers can shift them freely before
/// clamping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlapRegion {
    /// Table index of the neighbouring tile
    pub other: usize,

    pub z_from: i64,
    pub z_to: i64,
    pub y_from: i64,
    pub y_to: i64,
    pub x_from: i64,
    pub x_to: i64,

    /// Blend weight of the owning tile
    pub own_weight: f32,

    /// Blend weight of the neighbour
    pub other_weight: f32,
}

// =============================================================================
// Full Extent
// =============================================================================

/// Extent of the whole layout, independent of where it is translated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FullExtent {
    pub thickness: usize,
    pub height: usize,
    pub width: usize,
}

impl FullExtent {
    /// Bounding box of `tiles` (`max(origin + size) - min(origin)` per axis).
    pub fn of_tiles(tiles: &[Tile]) -> Self {
        let mut lo = [i64::MAX; 3];
        let mut hi = [i64::MIN; 3];
        for tile in tiles {
            for (axis, (from, to)) in tile.bounds().into_iter().enumerate() {
                lo[axis] = lo[axis].min(from);
                hi[axis] = hi[axis].max(to);
            }
        }
        if tiles.is_empty() {
            return Self {
                thickness: 0,
                height: 0,
                width: 0,
            };
        }
        Self {
            thickness: (hi[0] - lo[0]) as usize,
            height: (hi[1] - lo[1]) as usize,
            width: (hi[2] - lo[2]) as usize,
        }
    }
}

// =============================================================================
// TilePositionTable Trait
// =============================================================================

/// Source of tile positions and pairwise overlaps.
pub trait TilePositionTable: Send + Sync {
    /// All tiles in table order.
    fn tiles(&self) -> &[Tile];

    /// Extent of the full layout.
    fn full_extent(&self) -> FullExtent {
        FullExtent::of_tiles(self.tiles())
    }

    /// Overlaps of tile `index` with its neighbours, ordered by neighbour.
    ///
    /// Computed on every call.
    fn overlaps(&self, index: usize) -> Result<Vec<OverlapRegion>, LayoutError>;
}

/// Axis-aligned intersections of `tiles[index]` with every other tile.
pub fn box_overlaps(tiles: &[Tile], index: usize) -> Result<Vec<OverlapRegion>, LayoutError> {
    let tile = tiles.get(index).ok_or(LayoutError::UnknownTile {
        index,
        count: tiles.len(),
    })?;
    let own = tile.bounds();
    let origin = [tile.zs, tile.ys, tile.xs];

    let regions = tiles
        .iter()
        .enumerate()
        .filter(|(other, _)| *other != index)
        .filter_map(|(other, neighbour)| {
            let theirs = neighbour.bounds();
            let mut local = [(0i64, 0i64); 3];
            for axis in 0..3 {
                let from = own[axis].0.max(theirs[axis].0);
                let to = own[axis].1.min(theirs[axis].1);
                if from >= to {
                    return None;
                }
                local[axis] = (from - origin[axis], to - origin[axis]);
            }
            Some(OverlapRegion {
                other,
                z_from: local[0].0,
                z_to: local[0].1,
                y_from: local[1].0,
                y_to: local[1].1,
                x_from: local[2].0,
                x_to: local[2].1,
                own_weight: tile.weight,
                other_weight: neighbour.weight,
            })
        })
        .collect();

    Ok(regions)
}
