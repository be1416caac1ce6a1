//! JSON layout file.
//!
//! A layout lists every tile with its global origin and frame count:
//!
//! ```json
//! {
//!   "tiles": [
//!     { "path": "tile_000_000", "Zs": 0, "Ys": 0,   "Xs": 0, "nfrms": 200 },
//!     { "path": "tile_000_001", "Zs": 3, "Ys": 460, "Xs": 2, "nfrms": 200,
//!       "height": 512, "width": 512, "weight": 0.8 }
//!   ]
//! }
//! ```
//!
//! Tile paths are relative to the directory holding the layout file. When
//! `height`/`width` are missing they are read from the tile's first frame.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{FuseError, LayoutError};
use crate::volume::{TileVolume, VolumeSource};

use super::table::{box_overlaps, FullExtent, OverlapRegion, Tile, TilePositionTable};

/// Default layout file name looked up inside an input directory.
pub const DEFAULT_LAYOUT_NAME: &str = "stitch.json";

fn default_weight() -> f32 {
    1.0
}

/// One tile entry of a layout file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileRecord {
    pub path: PathBuf,

    #[serde(rename = "Zs")]
    pub zs: i64,

    #[serde(rename = "Ys")]
    pub ys: i64,

    #[serde(rename = "Xs")]
    pub xs: i64,

    pub nfrms: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<usize>,

    #[serde(default = "default_weight")]
    pub weight: f32,
}

impl TileRecord {
    pub fn new(path: impl Into<PathBuf>, zs: i64, ys: i64, xs: i64, nfrms: usize) -> Self {
        Self {
            path: path.into(),
            zs,
            ys,
            xs,
            nfrms,
            height: None,
            width: None,
            weight: default_weight(),
        }
    }
}

/// Serialized layout document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutDocument {
    pub tiles: Vec<TileRecord>,
}

/// Tile position table backed by a JSON layout.
///
/// Overlaps are the axis-aligned intersections of the tile boxes.
#[derive(Debug, Clone)]
pub struct JsonTileTable {
    root: PathBuf,
    tiles: Vec<Tile>,
    extent: FullExtent,
}

impl JsonTileTable {
    /// Load a layout file, probing missing extents through `source`.
    pub fn load<S: VolumeSource>(path: &Path, source: &S) -> Result<Self, LayoutError> {
        let text = fs::read_to_string(path).map_err(|source| LayoutError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let document: LayoutDocument =
            serde_json::from_str(&text).map_err(|source| LayoutError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let root = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let table = Self::from_records(root, document.tiles, source)?;
        info!(
            "Loaded layout {}: {} tiles, full extent {}x{}x{}",
            path.display(),
            table.tiles.len(),
            table.extent.thickness,
            table.extent.height,
            table.extent.width
        );
        Ok(table)
    }

    /// [`JsonTileTable::load`] on the blocking pool, handing `source` back
    /// for the run that follows.
    ///
    /// Loading reads the layout file and may open tiles to fill in their
    /// extents, so it must stay off the async workers.
    pub async fn load_in_background<S: VolumeSource>(
        path: PathBuf,
        source: S,
    ) -> Result<(Self, S), FuseError> {
        let loaded = tokio::task::spawn_blocking(move || {
            Self::load(&path, &source).map(|table| (table, source))
        })
        .await??;
        Ok(loaded)
    }

    /// Build a table from in-memory records.
    pub fn from_records<S: VolumeSource>(
        root: impl Into<PathBuf>,
        records: Vec<TileRecord>,
        source: &S,
    ) -> Result<Self, LayoutError> {
        if records.is_empty() {
            return Err(LayoutError::Empty);
        }

        let mut seen = HashSet::new();
        let mut tiles = Vec::with_capacity(records.len());

        for (index, record) in records.into_iter().enumerate() {
            if !seen.insert(record.path.clone()) {
                return Err(LayoutError::DuplicateTile { path: record.path });
            }
            if record.nfrms == 0 {
                return Err(LayoutError::InvalidTile {
                    path: record.path,
                    message: "nfrms must be greater than 0".to_string(),
                });
            }
            if !record.weight.is_finite() || record.weight <= 0.0 {
                return Err(LayoutError::InvalidTile {
                    path: record.path,
                    message: format!("weight must be positive, got {}", record.weight),
                });
            }

            let (height, width) = match (record.height, record.width) {
                (Some(height), Some(width)) => (height, width),
                _ => {
                    let extent = source.open(&record.path)?.extent();
                    (extent.height, extent.width)
                }
            };
            if height == 0 || width == 0 {
                return Err(LayoutError::InvalidTile {
                    path: record.path,
                    message: format!("empty frame {}x{}", width, height),
                });
            }

            tiles.push(Tile {
                index,
                path: record.path,
                zs: record.zs,
                ys: record.ys,
                xs: record.xs,
                nfrms: record.nfrms,
                height,
                width,
                weight: record.weight,
            });
        }

        let extent = FullExtent::of_tiles(&tiles);
        Ok(Self {
            root: root.into(),
            tiles,
            extent,
        })
    }

    /// Directory tile paths are relative to.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl TilePositionTable for JsonTileTable {
    fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    fn full_extent(&self) -> FullExtent {
        self.extent
    }

    fn overlaps(&self, index: usize) -> Result<Vec<OverlapRegion>, LayoutError> {
        box_overlaps(&self.tiles, index)
    }
}
