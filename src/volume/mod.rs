//! Tile volume access.
//!
//! This module turns a tile's on-disk representation into extended-precision
//! slices the fusion engine can blend.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            FuseOrchestrator             │
//! └────────────────────┬────────────────────┘
//!                      │  open(tile path)
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │             VolumeSource                │
//! │   (FileVolumeSource, test mocks)        │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │           VirtualTileVolume             │
//! │  one multi-page TIFF, or a sorted       │
//! │  directory of equally sized TIFFs       │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`VirtualTileVolume`]: frame addressing over one or many files
//! - [`VolumeSource`] / [`TileVolume`]: seams used by the orchestrator
//! - [`SampleType`] / [`SampleBuffer`]: element types and the final
//!   `f32` to output-type conversion

mod sample;
mod source;
mod virtual_volume;

pub use sample::{decoded_to_f32, SampleBuffer, SampleType};
pub use source::{FileVolumeSource, Slice, TileVolume, VolumeExtent, VolumeSource};
pub use virtual_volume::VirtualTileVolume;
