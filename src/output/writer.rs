//! Append-only (Big)TIFF writer for fused chunks.
//!
//! The encoder is opened once per run and every converted chunk is written
//! as consecutive pages, one page per Z-plane, so the file grows strictly in
//! Z order. Classic TIFF offsets are 32-bit; when the whole volume would
//! come close to 4 GiB the run switches to BigTIFF up front.

use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Seek, Write};
use std::path::{Path, PathBuf};

use tiff::encoder::colortype::{self, ColorType};
use tiff::encoder::{TiffEncoder, TiffKind, TiffKindBig, TiffKindStandard, TiffValue};
use tiff::TiffResult;
use tracing::debug;

use crate::error::OutputError;
use crate::volume::{SampleBuffer, SampleType};

/// Volumes larger than this many bytes are written as BigTIFF.
pub const LARGE_FILE_THRESHOLD: f64 = 0.95 * 4_294_967_296.0;

// =============================================================================
// Layout Types
// =============================================================================

/// Offset width of the output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TiffVariant {
    /// 32-bit offsets
    Classic,
    /// 64-bit offsets
    Big,
}

impl TiffVariant {
    /// Pick the variant for a volume of `total_bytes`.
    pub fn for_byte_size(total_bytes: u64) -> Self {
        if total_bytes as f64 > LARGE_FILE_THRESHOLD {
            TiffVariant::Big
        } else {
            TiffVariant::Classic
        }
    }
}

/// Everything the output needs to know before the first chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputLayout {
    pub variant: TiffVariant,
    pub sample_type: SampleType,
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

impl OutputLayout {
    pub fn is_supported(&self) -> bool {
        use SampleType::*;
        matches!(
            (self.sample_type, self.channels),
            (U8 | U16 | U32 | F32 | F64, 1 | 3 | 4) | (I8 | I16 | I32, 1)
        )
    }
}

/// One converted chunk, channel-last and interleaved plane by plane.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputChunk {
    pub planes: usize,
    pub channels: usize,
    pub height: usize,
    pub width: usize,
    pub samples: SampleBuffer,
}

impl OutputChunk {
    pub fn plane_len(&self) -> usize {
        self.channels * self.height * self.width
    }

    fn describe(&self) -> String {
        format!(
            "{} planes of {}x{}x{} {:?}",
            self.planes,
            self.height,
            self.width,
            self.channels,
            self.samples.sample_type()
        )
    }
}

// =============================================================================
// Sink Traits
// =============================================================================

/// Destination that accepts chunks in increasing Z order.
pub trait VolumeSink: Send + 'static {
    /// Append `chunk` after everything written so far.
    fn append(&mut self, chunk: &OutputChunk) -> Result<(), OutputError>;

    /// Planes appended so far.
    fn planes_written(&self) -> usize;
}

/// Creates the sink for a run once the output layout is known.
pub trait OutputTarget {
    type Sink: VolumeSink;

    /// Replace whatever exists at the target and open a fresh sink.
    fn create(&self, layout: &OutputLayout) -> Result<Self::Sink, OutputError>;
}

// =============================================================================
// TIFF Output
// =============================================================================

/// Output target writing a TIFF file at `path`.
#[derive(Debug, Clone)]
pub struct TiffOutput {
    path: PathBuf,
}

impl TiffOutput {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl OutputTarget for TiffOutput {
    type Sink = TiffVolumeWriter;

    fn create(&self, layout: &OutputLayout) -> Result<TiffVolumeWriter, OutputError> {
        TiffVolumeWriter::create(&self.path, *layout)
    }
}

enum PageEncoder {
    Classic(TiffEncoder<BufWriter<File>, TiffKindStandard>),
    Big(TiffEncoder<BufWriter<File>, TiffKindBig>),
}

/// Open TIFF file receiving chunk pages.
///
/// The file is flushed and closed when the writer is dropped.
pub struct TiffVolumeWriter {
    path: PathBuf,
    layout: OutputLayout,
    encoder: PageEncoder,
    planes_written: usize,
}

impl fmt::Debug for TiffVolumeWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TiffVolumeWriter")
            .field("path", &self.path)
            .field("layout", &self.layout)
            .field("planes_written", &self.planes_written)
            .finish_non_exhaustive()
    }
}

impl TiffVolumeWriter {
    /// Delete any existing file at `path` and start a new one.
    pub fn create(path: &Path, layout: OutputLayout) -> Result<Self, OutputError> {
        if !layout.is_supported() {
            return Err(OutputError::UnsupportedLayout {
                sample_type: layout.sample_type,
                channels: layout.channels,
            });
        }

        match fs::remove_file(path) {
            Ok(()) => debug!("Removed existing output {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(OutputError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        }

        let file = File::create(path).map_err(|source| OutputError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let writer = BufWriter::new(file);
        let tiff_err = |source| OutputError::Tiff {
            path: path.to_path_buf(),
            source,
        };

        let encoder = match layout.variant {
            TiffVariant::Classic => PageEncoder::Classic(TiffEncoder::new(writer).map_err(tiff_err)?),
            TiffVariant::Big => PageEncoder::Big(TiffEncoder::new_big(writer).map_err(tiff_err)?),
        };

        Ok(Self {
            path: path.to_path_buf(),
            layout,
            encoder,
            planes_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }
}

impl VolumeSink for TiffVolumeWriter {
    fn append(&mut self, chunk: &OutputChunk) -> Result<(), OutputError> {
        let layout = &self.layout;
        if chunk.channels != layout.channels
            || chunk.height != layout.height
            || chunk.width != layout.width
            || chunk.samples.sample_type() != layout.sample_type
            || chunk.samples.len() != chunk.planes * chunk.plane_len()
        {
            return Err(OutputError::LayoutMismatch {
                expected: format!(
                    "{}x{}x{} {:?}",
                    layout.height, layout.width, layout.channels, layout.sample_type
                ),
                actual: chunk.describe(),
            });
        }

        match &mut self.encoder {
            PageEncoder::Classic(encoder) => write_chunk(encoder, chunk, &self.path)?,
            PageEncoder::Big(encoder) => write_chunk(encoder, chunk, &self.path)?,
        }

        self.planes_written += chunk.planes;
        Ok(())
    }

    fn planes_written(&self) -> usize {
        self.planes_written
    }
}

fn write_chunk<W, K>(
    encoder: &mut TiffEncoder<W, K>,
    chunk: &OutputChunk,
    path: &Path,
) -> Result<(), OutputError>
where
    W: Write + Seek,
    K: TiffKind,
{
    let width = chunk.width as u32;
    let height = chunk.height as u32;
    let plane = chunk.plane_len();

    macro_rules! pages {
        ($data:expr, $color:ty) => {
            write_pages::<$color, W, K>(encoder, width, height, plane, $data)
        };
    }

    let result = match (&chunk.samples, chunk.channels) {
        (SampleBuffer::U8(d), 1) => pages!(d, colortype::Gray8),
        (SampleBuffer::U8(d), 3) => pages!(d, colortype::RGB8),
        (SampleBuffer::U8(d), 4) => pages!(d, colortype::RGBA8),
        (SampleBuffer::U16(d), 1) => pages!(d, colortype::Gray16),
        (SampleBuffer::U16(d), 3) => pages!(d, colortype::RGB16),
        (SampleBuffer::U16(d), 4) => pages!(d, colortype::RGBA16),
        (SampleBuffer::U32(d), 1) => pages!(d, colortype::Gray32),
        (SampleBuffer::U32(d), 3) => pages!(d, colortype::RGB32),
        (SampleBuffer::U32(d), 4) => pages!(d, colortype::RGBA32),
        (SampleBuffer::I8(d), 1) => pages!(d, colortype::GrayI8),
        (SampleBuffer::I16(d), 1) => pages!(d, colortype::GrayI16),
        (SampleBuffer::I32(d), 1) => pages!(d, colortype::GrayI32),
        (SampleBuffer::F32(d), 1) => pages!(d, colortype::Gray32Float),
        (SampleBuffer::F32(d), 3) => pages!(d, colortype::RGB32Float),
        (SampleBuffer::F32(d), 4) => pages!(d, colortype::RGBA32Float),
        (SampleBuffer::F64(d), 1) => pages!(d, colortype::Gray64Float),
        (SampleBuffer::F64(d), 3) => pages!(d, colortype::RGB64Float),
        (SampleBuffer::F64(d), 4) => pages!(d, colortype::RGBA64Float),
        (samples, channels) => {
            return Err(OutputError::UnsupportedLayout {
                sample_type: samples.sample_type(),
                channels,
            })
        }
    };

    result.map_err(|source| OutputError::Tiff {
        path: path.to_path_buf(),
        source,
    })
}

fn write_pages<C, W, K>(
    encoder: &mut TiffEncoder<W, K>,
    width: u32,
    height: u32,
    plane_len: usize,
    data: &[C::Inner],
) -> TiffResult<()>
where
    C: ColorType,
    W: Write + Seek,
    K: TiffKind,
    [C::Inner]: TiffValue,
{
    for plane in data.chunks_exact(plane_len) {
        encoder.write_image::<C>(width, height, plane)?;
    }
    Ok(())
}
