//! Tile layout: global positions and pairwise overlaps.
//!
//! The fuser consumes the layout only through [`TilePositionTable`]. The
//! bundled [`JsonTileTable`] reads a JSON layout file and derives overlaps
//! from the tile boxes; registration itself happens upstream.

mod json;
mod table;

pub use json::{JsonTileTable, LayoutDocument, TileRecord, DEFAULT_LAYOUT_NAME};
pub use table::{box_overlaps, FullExtent, OverlapRegion, Tile, TilePositionTable};
