//! Consumer side of a chunk: the fusion engine.
//!
//! The orchestrator feeds [`Placement`]s through a bounded channel; the
//! engine drains them on a blocking worker and accumulates every slice into
//! the chunk's [`AccumulationBuffer`]. Closing the channel (dropping the
//! sender) is the end-of-stream signal.
//!
//! # Blending
//!
//! [`BlendingEngine`] adds `value * scale` into the zeroed buffer, with a
//! per-voxel scale derived from the placement's overlaps:
//!
//! | voxel                 | `Average`                     | `MaxScore`                   |
//! |-----------------------|-------------------------------|------------------------------|
//! | outside all overlaps  | 1                             | 1                            |
//! | inside overlaps       | `w_own / (w_own + Σ w_other)` | 1 if own weight wins, else 0 |
//!
//! Every tile covering a voxel sees the same set of neighbours, so the
//! contributions sum to the weighted average (or to the single winner)
//! whatever order the placements arrive in.

use std::ops::Range;

use ndarray::{s, Array3, Axis, Zip};
use tokio::sync::mpsc;
use tracing::trace;

use crate::error::FuseError;
use crate::layout::OverlapRegion;

use super::buffer::AccumulationBuffer;
use super::placement::Placement;

/// Placements that may be in flight between producer and consumer.
pub const DEFAULT_QUEUE_CAPACITY: usize = 20;

// =============================================================================
// Placement Queue
// =============================================================================

/// Receiving half of the placement channel, for use on a blocking thread.
///
/// Iterating yields placements in send order and ends once the sender is
/// dropped and the channel is drained.
#[derive(Debug)]
pub struct PlacementQueue {
    receiver: mpsc::Receiver<Placement>,
}

impl PlacementQueue {
    /// Block until the next placement, or `None` at end of stream.
    ///
    /// Must not be called from an async context.
    pub fn recv(&mut self) -> Option<Placement> {
        self.receiver.blocking_recv()
    }
}

impl Iterator for PlacementQueue {
    type Item = Placement;

    fn next(&mut self) -> Option<Placement> {
        self.recv()
    }
}

/// Bounded placement channel; `send` waits while `capacity` items are pending.
pub fn placement_channel(capacity: usize) -> (mpsc::Sender<Placement>, PlacementQueue) {
    let (sender, receiver) = mpsc::channel(capacity);
    (sender, PlacementQueue { receiver })
}

// =============================================================================
// FusionEngine Trait
// =============================================================================

/// Accumulates placements into a chunk buffer.
pub trait FusionEngine: Send + Sync + 'static {
    /// Drain `queue` to end of stream, writing every placement into `buffer`.
    ///
    /// Returns the number of placements consumed.
    fn consume(
        &self,
        queue: PlacementQueue,
        buffer: &mut AccumulationBuffer,
    ) -> Result<usize, FuseError>;
}

// =============================================================================
// Blending Engine
// =============================================================================

/// How overlapping tiles are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlendPolicy {
    /// Weighted average of all covering tiles
    Average,
    /// Highest-weight tile wins, ties to the lower table index
    #[default]
    MaxScore,
}

impl BlendPolicy {
    pub fn from_average_flag(compute_average: bool) -> Self {
        if compute_average {
            BlendPolicy::Average
        } else {
            BlendPolicy::MaxScore
        }
    }
}

/// The bundled fusion engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlendingEngine {
    policy: BlendPolicy,
}

impl BlendingEngine {
    pub fn new(policy: BlendPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> BlendPolicy {
        self.policy
    }

    /// Add one placement into `buffer`, clipped to the buffer's extent.
    pub fn blend(&self, buffer: &mut AccumulationBuffer, placement: &Placement) {
        let (frames, _, height, width) = placement.slice.dim();
        let (depth, _, buffer_height, buffer_width) = buffer.data().dim();
        let [z0, y0, x0] = placement.top_left;

        let z1 = (z0 + frames).min(depth);
        let y1 = (y0 + height).min(buffer_height);
        let x1 = (x0 + width).min(buffer_width);
        if z0 >= z1 || y0 >= y1 || x0 >= x1 {
            return;
        }
        let dims = (z1 - z0, y1 - y0, x1 - x0);

        let scale = self
            .contribution_scale(placement, dims)
            .insert_axis(Axis(1));
        let source = placement.slice.slice(s![..dims.0, .., ..dims.1, ..dims.2]);
        let mut target = buffer.data_mut().slice_mut(s![z0..z1, .., y0..y1, x0..x1]);

        Zip::from(&mut target)
            .and(&source)
            .and_broadcast(&scale)
            .for_each(|out, &value, &weight| *out += value * weight);
    }

    /// Per-voxel scale of a placement, shape `(frames, height, width)`.
    fn contribution_scale(
        &self,
        placement: &Placement,
        dims: (usize, usize, usize),
    ) -> Array3<f32> {
        let Some(own_weight) = placement.overlaps.first().map(|o| o.own_weight) else {
            return Array3::ones(dims);
        };

        match self.policy {
            BlendPolicy::Average => {
                let mut others = Array3::<f32>::zeros(dims);
                for overlap in &placement.overlaps {
                    if let Some((z, y, x)) = region_within(overlap, dims) {
                        others
                            .slice_mut(s![z, y, x])
                            .mapv_inplace(|sum| sum + overlap.other_weight);
                    }
                }
                others.mapv_inplace(|sum| {
                    if sum > 0.0 {
                        own_weight / (own_weight + sum)
                    } else {
                        1.0
                    }
                });
                others
            }
            BlendPolicy::MaxScore => {
                let mut scale = Array3::<f32>::ones(dims);
                for overlap in &placement.overlaps {
                    let neighbour_wins = overlap.other_weight > overlap.own_weight
                        || (overlap.other_weight == overlap.own_weight
                            && overlap.other < placement.tile);
                    if !neighbour_wins {
                        continue;
                    }
                    if let Some((z, y, x)) = region_within(overlap, dims) {
                        scale.slice_mut(s![z, y, x]).fill(0.0);
                    }
                }
                scale
            }
        }
    }
}

impl FusionEngine for BlendingEngine {
    fn consume(
        &self,
        queue: PlacementQueue,
        buffer: &mut AccumulationBuffer,
    ) -> Result<usize, FuseError> {
        let mut consumed = 0;
        for placement in queue {
            trace!(
                tile = placement.tile,
                frames = placement.slice.dim().0,
                overlaps = placement.overlaps.len(),
                "Blending placement"
            );
            self.blend(buffer, &placement);
            consumed += 1;
        }
        Ok(consumed)
    }
}

/// Overlap bounds clamped to `dims`, or `None` if nothing remains.
fn region_within(
    overlap: &OverlapRegion,
    (frames, height, width): (usize, usize, usize),
) -> Option<(Range<usize>, Range<usize>, Range<usize>)> {
    fn clamp(from: i64, to: i64, len: usize) -> Option<Range<usize>> {
        let from = from.clamp(0, len as i64) as usize;
        let to = to.clamp(0, len as i64) as usize;
        (from < to).then_some(from..to)
    }

    Some((
        clamp(overlap.z_from, overlap.z_to, frames)?,
        clamp(overlap.y_from, overlap.y_to, height)?,
        clamp(overlap.x_from, overlap.x_to, width)?,
    ))
}
