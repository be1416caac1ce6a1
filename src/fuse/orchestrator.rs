//! Chunked fusion driver.
//!
//! # Architecture
//!
//! ```text
//!                     ┌───────────────────────────────┐
//!                     │        FuseOrchestrator       │
//!                     │  plan: shape, variant, budget │
//!                     └───────────────┬───────────────┘
//!                                     │ per chunk window [zmin, zmax)
//!            ┌────────────────────────┼─────────────────────────┐
//!            ▼                        ▼                         ▼
//!   ┌─────────────────┐     ┌───────────────────┐     ┌──────────────────┐
//!   │  tile reads     │────►│ bounded channel   │────►│  FusionEngine    │
//!   │ (spawn_blocking)│     │ capacity 20       │     │ (spawn_blocking) │
//!   └─────────────────┘     └───────────────────┘     └────────┬─────────┘
//!                                                              │ buffer
//!                                                              ▼
//!                                                   convert + append (sink)
//! ```
//!
//! Chunks run strictly one after another: the next chunk starts only once
//! the previous one has been joined, converted and appended, so the output
//! grows in Z order and at most one accumulation buffer is alive.

use std::ops::Range;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{FuseError, LayoutError};
use crate::layout::{Tile, TilePositionTable};
use crate::output::{OutputLayout, OutputTarget, TiffVariant, VolumeSink};
use crate::volume::{SampleType, Slice, TileVolume, VolumeExtent, VolumeSource};

use super::buffer::AccumulationBuffer;
use super::chunk::{chunk_windows, frames_per_chunk, partition_depth, ChunkWindow, OutputShape};
use super::debug::overlay_debug;
use super::engine::{placement_channel, FusionEngine, DEFAULT_QUEUE_CAPACITY};
use super::memory::{MemoryProbe, SystemMemory};
use super::placement::{clip_overlaps, contributing_frames, top_left, Placement};

// =============================================================================
// Options and Results
// =============================================================================

/// Per-run options that shape the output window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FuseOptions {
    /// First global plane to write
    pub zmin: usize,

    /// One past the last plane to write; the full thickness when `None`
    pub zmax: Option<usize>,

    /// Draw tile and frame numbers onto every slice
    pub debug: bool,
}

/// Everything decided before the output file is touched.
#[derive(Debug, Clone, PartialEq)]
pub struct FusePlan {
    pub shape: OutputShape,
    pub sample_type: SampleType,
    pub variant: TiffVariant,
    pub frames_per_chunk: usize,
    /// Chunk thicknesses in write order
    pub thicknesses: Vec<usize>,
}

impl FusePlan {
    pub fn output_layout(&self) -> OutputLayout {
        OutputLayout {
            variant: self.variant,
            sample_type: self.sample_type,
            channels: self.shape.channels,
            height: self.shape.height,
            width: self.shape.width,
        }
    }
}

/// What a completed run wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FuseSummary {
    pub chunks: usize,
    pub planes: usize,
    /// Placements handed to the engine across all chunks
    pub placements: usize,
    pub windows: Vec<ChunkWindow>,
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Drives a fusion run over a tile table.
pub struct FuseOrchestrator<T, S, E, M = SystemMemory> {
    table: T,
    source: Arc<S>,
    engine: Arc<E>,
    memory: M,
    options: FuseOptions,
}

impl<T, S, E> FuseOrchestrator<T, S, E, SystemMemory>
where
    T: TilePositionTable,
    S: VolumeSource,
    E: FusionEngine,
{
    /// Orchestrator budgeting against the machine's available memory.
    pub fn new(table: T, source: S, engine: E, options: FuseOptions) -> Self {
        Self {
            table,
            source: Arc::new(source),
            engine: Arc::new(engine),
            memory: SystemMemory,
            options,
        }
    }
}

impl<T, S, E, M> FuseOrchestrator<T, S, E, M>
where
    T: TilePositionTable,
    S: VolumeSource,
    E: FusionEngine,
    M: MemoryProbe,
{
    /// Replace the memory probe used for chunk sizing.
    pub fn with_memory_probe<P: MemoryProbe>(self, memory: P) -> FuseOrchestrator<T, S, E, P> {
        FuseOrchestrator {
            table: self.table,
            source: self.source,
            engine: self.engine,
            memory,
            options: self.options,
        }
    }

    pub fn options(&self) -> &FuseOptions {
        &self.options
    }

    pub fn table(&self) -> &T {
        &self.table
    }

    /// Table tiles translated so the minimum origin along each axis is zero.
    pub fn normalized_tiles(&self) -> Vec<Tile> {
        let tiles = self.table.tiles();
        let min_z = tiles.iter().map(|t| t.zs).min().unwrap_or(0);
        let min_y = tiles.iter().map(|t| t.ys).min().unwrap_or(0);
        let min_x = tiles.iter().map(|t| t.xs).min().unwrap_or(0);

        tiles
            .iter()
            .map(|tile| Tile {
                zs: tile.zs - min_z,
                ys: tile.ys - min_y,
                xs: tile.xs - min_x,
                ..tile.clone()
            })
            .collect()
    }

    /// Output shape for `channels`, limited to `[zmin, zmax)`.
    ///
    /// # Errors
    ///
    /// [`FuseError::Configuration`] when the window holds no planes.
    pub fn output_shape(&self, channels: usize) -> Result<OutputShape, FuseError> {
        let full = self.table.full_extent();
        let bound = self
            .options
            .zmax
            .map_or(full.thickness, |zmax| zmax.min(full.thickness));

        if self.options.zmin >= bound {
            return Err(FuseError::Configuration(format!(
                "zmin {} leaves no planes (output ends at {})",
                self.options.zmin, bound
            )));
        }

        Ok(OutputShape {
            depth: bound - self.options.zmin,
            channels,
            height: full.height,
            width: full.width,
        })
    }

    /// Decide shape, file variant and chunk partition without writing.
    pub async fn plan(&self) -> Result<FusePlan, FuseError> {
        let first = self
            .table
            .tiles()
            .first()
            .ok_or(FuseError::Layout(LayoutError::Empty))?;
        let volume = self.open_volume(first).await?;
        self.plan_for(volume.extent())
    }

    fn plan_for(&self, extent: VolumeExtent) -> Result<FusePlan, FuseError> {
        let shape = self.output_shape(extent.channels)?;
        let sample_type = extent.sample_type;
        let variant = TiffVariant::for_byte_size(shape.byte_size(sample_type));

        let available = self.memory.available_bytes();
        let frames_per_chunk = frames_per_chunk(shape.accumulation_plane_bytes(), available)?;
        let thicknesses = partition_depth(shape.depth, frames_per_chunk);

        Ok(FusePlan {
            shape,
            sample_type,
            variant,
            frames_per_chunk,
            thicknesses,
        })
    }

    /// Fuse the configured window into `target`.
    ///
    /// Every tile is opened once up front and its handle reused for all
    /// chunks. Any failure aborts the run; chunks already appended stay in
    /// the output.
    pub async fn run<O: OutputTarget>(&self, target: &O) -> Result<FuseSummary, FuseError> {
        let tiles = self.normalized_tiles();
        let first = tiles.first().ok_or(FuseError::Layout(LayoutError::Empty))?;
        let first = self.open_volume(first).await?;
        let plan = self.plan_for(first.extent())?;

        let mut volumes = Vec::with_capacity(tiles.len());
        volumes.push(first);
        for tile in &tiles[1..] {
            volumes.push(self.open_volume(tile).await?);
        }
        debug!(tiles = volumes.len(), "Tiles opened");

        info!(
            depth = plan.shape.depth,
            height = plan.shape.height,
            width = plan.shape.width,
            channels = plan.shape.channels,
            sample_type = ?plan.sample_type,
            variant = ?plan.variant,
            frames_per_chunk = plan.frames_per_chunk,
            chunks = plan.thicknesses.len(),
            "Fusion planned"
        );

        let mut sink = target
            .create(&plan.output_layout())
            .map_err(|source| FuseError::Output { chunk: 0, source })?;

        let mut summary = FuseSummary::default();

        for window in chunk_windows(self.options.zmin, &plan.thicknesses) {
            let (index, thickness) = (window.index, window.thickness());
            info!(
                index = window.index,
                zmin = window.zmin,
                zmax = window.zmax,
                "Fusing chunk"
            );

            let buffer = AccumulationBuffer::zeros(plan.shape.with_depth(thickness));
            let (sender, queue) = placement_channel(DEFAULT_QUEUE_CAPACITY);
            let engine = Arc::clone(&self.engine);
            let consumer = tokio::task::spawn_blocking(move || {
                let mut buffer = buffer;
                engine
                    .consume(queue, &mut buffer)
                    .map(|consumed| (buffer, consumed))
            });

            let produced = self.produce(&tiles, &volumes, &window, &sender).await;
            drop(sender);
            let (buffer, consumed) = consumer.await??;
            let sent = produced?;
            if consumed != sent {
                warn!(sent, consumed, "Engine consumed a different number of placements");
            }

            let sample_type = plan.sample_type;
            sink = tokio::task::spawn_blocking(move || {
                let chunk = buffer.to_chunk(sample_type);
                sink.append(&chunk).map(|()| sink)
            })
            .await?
            .map_err(|source| FuseError::Output {
                chunk: index,
                source,
            })?;

            summary.chunks += 1;
            summary.planes += thickness;
            summary.placements += sent;
            info!(
                index,
                zmin = window.zmin,
                zmax = window.zmax,
                placements = sent,
                planes_written = sink.planes_written(),
                "Chunk written"
            );
            summary.windows.push(window);
        }

        info!(
            chunks = summary.chunks,
            planes = summary.planes,
            placements = summary.placements,
            "Fusion complete"
        );
        Ok(summary)
    }

    /// Read every tile touching `window` and send its placement.
    ///
    /// `volumes[i]` is the open handle of `tiles[i]`. Stops early, without
    /// error, when the consumer hangs up; the consumer's own result then
    /// explains why.
    async fn produce(
        &self,
        tiles: &[Tile],
        volumes: &[Arc<S::Volume>],
        window: &ChunkWindow,
        sender: &mpsc::Sender<Placement>,
    ) -> Result<usize, FuseError> {
        let mut sent = 0;

        for (tile, volume) in tiles.iter().zip(volumes) {
            let Some(frames) = contributing_frames(tile, window) else {
                debug!(tile = %tile.path.display(), chunk = window.index, "Tile outside chunk");
                continue;
            };

            info!(
                path = %tile.path.display(),
                z_from = frames.start,
                z_to = frames.end,
                "Reading tile"
            );
            let mut slice = read_slice(volume, tile, frames.clone()).await?;
            if self.options.debug {
                overlay_debug(&mut slice, &tile.path, frames.start);
            }

            let overlaps = clip_overlaps(self.table.overlaps(tile.index)?, &frames);
            debug!(tile = tile.index, overlaps = overlaps.len(), "Overlaps clipped");

            let placement = Placement {
                tile: tile.index,
                slice,
                top_left: top_left(tile, &frames, window),
                overlaps,
            };
            if sender.send(placement).await.is_err() {
                warn!(chunk = window.index, "Fusion engine stopped before end of stream");
                break;
            }
            sent += 1;
        }

        Ok(sent)
    }

    /// Open `tile` on the blocking pool.
    async fn open_volume(&self, tile: &Tile) -> Result<Arc<S::Volume>, FuseError> {
        let source = Arc::clone(&self.source);
        let path = tile.path.clone();
        let result = tokio::task::spawn_blocking(move || source.open(&path).map(Arc::new)).await?;

        result.map_err(|source| FuseError::Volume {
            tile: tile.path.clone(),
            source,
        })
    }
}

async fn read_slice<V: TileVolume>(
    volume: &Arc<V>,
    tile: &Tile,
    frames: Range<usize>,
) -> Result<Slice, FuseError> {
    let volume = Arc::clone(volume);
    let result = tokio::task::spawn_blocking(move || volume.read(frames)).await?;

    result.map_err(|source| FuseError::Volume {
        tile: tile.path.clone(),
        source,
    })
}
