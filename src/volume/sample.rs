//! Sample types and extended-precision conversion.
//!
//! Tiles are read into `f32` regardless of their stored type so that
//! overlapping contributions accumulate without repeated rounding. The fused
//! chunk is converted back to the tile's type only once, right before it is
//! written.
//!
//! Integer conversion rounds to nearest (ties to even) and saturates at the
//! type bounds; float conversion is a plain cast.

use tiff::decoder::DecodingResult;

/// Numeric element type of a tile or of the fused output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleType {
    U8,
    U16,
    U32,
    I8,
    I16,
    I32,
    F32,
    F64,
}

impl SampleType {
    /// Size of one sample in bytes.
    pub fn size(self) -> usize {
        match self {
            SampleType::U8 | SampleType::I8 => 1,
            SampleType::U16 | SampleType::I16 => 2,
            SampleType::U32 | SampleType::I32 | SampleType::F32 => 4,
            SampleType::F64 => 8,
        }
    }

    pub fn is_integer(self) -> bool {
        !matches!(self, SampleType::F32 | SampleType::F64)
    }

    /// Sample type stored as `bits` per sample with TIFF `SampleFormat`
    /// code `format` (1 unsigned, 2 signed, 3 IEEE float).
    pub fn from_tiff_format(bits: u8, format: u16) -> Option<Self> {
        match (format, bits) {
            (1, 8) => Some(SampleType::U8),
            (1, 16) => Some(SampleType::U16),
            (1, 32) => Some(SampleType::U32),
            (2, 8) => Some(SampleType::I8),
            (2, 16) => Some(SampleType::I16),
            (2, 32) => Some(SampleType::I32),
            (3, 32) => Some(SampleType::F32),
            (3, 64) => Some(SampleType::F64),
            _ => None,
        }
    }

    /// Sample type of a decoded frame, `None` for types with no
    /// representation here (64-bit integers).
    pub fn of_decoded(result: &DecodingResult) -> Option<Self> {
        match result {
            DecodingResult::U8(_) => Some(SampleType::U8),
            DecodingResult::U16(_) => Some(SampleType::U16),
            DecodingResult::U32(_) => Some(SampleType::U32),
            DecodingResult::I8(_) => Some(SampleType::I8),
            DecodingResult::I16(_) => Some(SampleType::I16),
            DecodingResult::I32(_) => Some(SampleType::I32),
            DecodingResult::F32(_) => Some(SampleType::F32),
            DecodingResult::F64(_) => Some(SampleType::F64),
            _ => None,
        }
    }
}

/// Widen a decoded frame to `f32` samples, keeping the interleaved order.
///
/// Returns `None` for decoded types [`SampleType::of_decoded`] rejects.
pub fn decoded_to_f32(result: DecodingResult) -> Option<Vec<f32>> {
    let samples = match result {
        DecodingResult::U8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(|s| s as f32).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(|s| s as f32).collect(),
        DecodingResult::F32(v) => v,
        DecodingResult::F64(v) => v.into_iter().map(|s| s as f32).collect(),
        _ => return None,
    };
    Some(samples)
}

/// Typed sample storage for one converted chunk.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleBuffer {
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    I8(Vec<i8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl SampleBuffer {
    /// Convert extended-precision samples to `sample_type`.
    pub fn from_f32<I>(sample_type: SampleType, values: I) -> Self
    where
        I: IntoIterator<Item = f32>,
    {
        let values = values.into_iter();
        // `as` from a float saturates at the integer bounds and maps NaN to 0
        match sample_type {
            SampleType::U8 => SampleBuffer::U8(values.map(|v| v.round_ties_even() as u8).collect()),
            SampleType::U16 => {
                SampleBuffer::U16(values.map(|v| v.round_ties_even() as u16).collect())
            }
            SampleType::U32 => {
                SampleBuffer::U32(values.map(|v| v.round_ties_even() as u32).collect())
            }
            SampleType::I8 => SampleBuffer::I8(values.map(|v| v.round_ties_even() as i8).collect()),
            SampleType::I16 => {
                SampleBuffer::I16(values.map(|v| v.round_ties_even() as i16).collect())
            }
            SampleType::I32 => {
                SampleBuffer::I32(values.map(|v| v.round_ties_even() as i32).collect())
            }
            SampleType::F32 => SampleBuffer::F32(values.collect()),
            SampleType::F64 => SampleBuffer::F64(values.map(f64::from).collect()),
        }
    }

    pub fn sample_type(&self) -> SampleType {
        match self {
            SampleBuffer::U8(_) => SampleType::U8,
            SampleBuffer::U16(_) => SampleType::U16,
            SampleBuffer::U32(_) => SampleType::U32,
            SampleBuffer::I8(_) => SampleType::I8,
            SampleBuffer::I16(_) => SampleType::I16,
            SampleBuffer::I32(_) => SampleType::I32,
            SampleBuffer::F32(_) => SampleType::F32,
            SampleBuffer::F64(_) => SampleType::F64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            SampleBuffer::U8(v) => v.len(),
            SampleBuffer::U16(v) => v.len(),
            SampleBuffer::U32(v) => v.len(),
            SampleBuffer::I8(v) => v.len(),
            SampleBuffer::I16(v) => v.len(),
            SampleBuffer::I32(v) => v.len(),
            SampleBuffer::F32(v) => v.len(),
            SampleBuffer::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
