//! Per-chunk accumulation buffer.

use ndarray::Array4;

use crate::output::OutputChunk;
use crate::volume::{SampleBuffer, SampleType};

use super::chunk::OutputShape;

/// Extended-precision working buffer for one chunk.
///
/// Laid out `(depth, channels, height, width)`. The buffer is moved into the
/// consumer for the chunk's active window and moved back when the consumer
/// is joined, so only one side can touch it at a time.
#[derive(Debug, Clone, PartialEq)]
pub struct AccumulationBuffer {
    data: Array4<f32>,
}

impl AccumulationBuffer {
    /// Zero-filled buffer for a chunk of `shape`.
    pub fn zeros(shape: OutputShape) -> Self {
        Self {
            data: Array4::zeros(shape.accumulation_dim()),
        }
    }

    pub fn shape(&self) -> OutputShape {
        let (depth, channels, height, width) = self.data.dim();
        OutputShape {
            depth,
            channels,
            height,
            width,
        }
    }

    pub fn data(&self) -> &Array4<f32> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Array4<f32> {
        &mut self.data
    }

    /// Convert to `sample_type` with the channel axis moved last.
    ///
    /// Samples come out interleaved plane by plane, which is the order TIFF
    /// pages store them in.
    pub fn to_chunk(&self, sample_type: SampleType) -> OutputChunk {
        let shape = self.shape();
        let channel_last = self.data.view().permuted_axes([0, 2, 3, 1]);
        OutputChunk {
            planes: shape.depth,
            channels: shape.channels,
            height: shape.height,
            width: shape.width,
            samples: SampleBuffer::from_f32(sample_type, channel_last.iter().copied()),
        }
    }
}
