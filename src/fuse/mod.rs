//! Chunked fusion of overlapping tiles.
//!
//! The output volume is built one Z-chunk at a time. For every chunk the
//! [`FuseOrchestrator`] reads the frames each tile contributes, turns them
//! into [`Placement`]s and streams them to a [`FusionEngine`] running on a
//! blocking worker. Once the stream ends, the chunk's
//! [`AccumulationBuffer`] is converted to the output sample type and
//! appended to the output.
//!
//! # Components
//!
//! - [`chunk`](self::chunk): output shape, memory budget, depth partition
//! - [`placement`](self::placement): coordinate arithmetic between frames
//! - [`BlendingEngine`]: average / max-score blending of overlaps
//! - [`overlay_debug`]: tile and frame labels for visual checks

mod buffer;
pub mod chunk;
mod debug;
mod engine;
mod memory;
mod orchestrator;
pub mod placement;

pub use buffer::AccumulationBuffer;
pub use chunk::{
    chunk_windows, frames_per_chunk, partition_depth, ChunkWindow, OutputShape,
    ACCUMULATION_SAMPLE_SIZE, MEMORY_SAFETY_FACTOR,
};
pub use debug::{glyph_pixel, overlay_debug};
pub use engine::{
    placement_channel, BlendPolicy, BlendingEngine, FusionEngine, PlacementQueue,
    DEFAULT_QUEUE_CAPACITY,
};
pub use memory::{FixedMemory, MemoryProbe, SystemMemory};
pub use orchestrator::{FuseOptions, FuseOrchestrator, FusePlan, FuseSummary};
pub use placement::Placement;
