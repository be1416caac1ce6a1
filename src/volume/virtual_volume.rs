//! Virtual tile volume over one or many TIFF files.
//!
//! A tile is stored either as one multi-page TIFF or as a directory holding
//! a sorted sequence of TIFF files that all have the same page count. Both
//! are exposed as a single logical frame sequence.
//!
//! # Frame addressing
//!
//! ```text
//! single container:   frame f  ->  page f of the file
//! multi-file:         frame f  ->  file f / pages_per_file,
//!                                  page f % pages_per_file
//! ```
//!
//! In multi-file mode the selected files are always decoded whole; only the
//! requested frames are copied into the returned slice.

use std::fs::{self, File};
use std::io::BufReader;
use std::ops::Range;
use std::path::{Path, PathBuf};

use ndarray::{Array3, Array4, Axis};
use tiff::decoder::{Decoder, Limits};
use tiff::tags::Tag;
use tiff::ColorType;
use tracing::debug;

use crate::error::VolumeError;

use super::sample::{decoded_to_f32, SampleType};
use super::source::{Slice, TileVolume, VolumeExtent};

type TiffDecoder = Decoder<BufReader<File>>;

/// Backing storage of a tile.
#[derive(Debug, Clone)]
enum Storage {
    /// One multi-page container
    Single(PathBuf),
    /// Sorted single- or multi-page files
    Files(Vec<PathBuf>),
}

impl Storage {
    fn first(&self) -> &Path {
        match self {
            Storage::Single(path) => path,
            // open() never builds an empty list
            Storage::Files(files) => &files[0],
        }
    }
}

/// A tile addressed as one logical 3-D array.
///
/// Metadata (extent, sample type, pages per file) is read once in
/// [`VirtualTileVolume::open`]; every [`read`](Self::read) opens its own
/// decoder and releases it before returning.
#[derive(Debug, Clone)]
pub struct VirtualTileVolume {
    path: PathBuf,
    storage: Storage,
    pages_per_file: usize,
    extent: VolumeExtent,
}

impl VirtualTileVolume {
    /// Open a tile file or a directory of tile files.
    ///
    /// # Errors
    ///
    /// - [`VolumeError::NotFound`] if `path` does not exist
    /// - [`VolumeError::NoFiles`] if a directory holds no `*.tif*` files
    /// - decoder errors from the first physical frame
    pub fn open(path: impl AsRef<Path>) -> Result<Self, VolumeError> {
        let path = path.as_ref().to_path_buf();

        let metadata = fs::metadata(&path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                VolumeError::NotFound { path: path.clone() }
            } else {
                VolumeError::Io {
                    path: path.clone(),
                    source,
                }
            }
        })?;

        let storage = if metadata.is_dir() {
            Storage::Files(list_tiff_files(&path)?)
        } else {
            Storage::Single(path.clone())
        };

        let first = storage.first().to_path_buf();
        let mut decoder = open_decoder(&first)?;

        let (width, height) = decoder.dimensions().map_err(|source| VolumeError::Tiff {
            path: first.clone(),
            source,
        })?;
        let (channels, sample_type) = frame_layout(&mut decoder)
            .map_err(|source| VolumeError::Tiff {
                path: first.clone(),
                source,
            })?
            .ok_or_else(|| VolumeError::UnsupportedSamples {
                path: first.clone(),
                message: "palette or 64-bit integer samples".to_string(),
            })?;
        if width == 0 || height == 0 {
            return Err(VolumeError::Inconsistent {
                path: first,
                message: format!("empty {}x{} frame", width, height),
            });
        }

        let mut pages_per_file = 1;
        while decoder.more_images() {
            decoder.next_image().map_err(|source| VolumeError::Tiff {
                path: first.clone(),
                source,
            })?;
            pages_per_file += 1;
        }

        let extent = VolumeExtent {
            width: width as usize,
            height: height as usize,
            channels,
            sample_type,
        };

        debug!(
            path = %path.display(),
            pages_per_file,
            files = match &storage {
                Storage::Single(_) => 1,
                Storage::Files(files) => files.len(),
            },
            "Opened tile volume"
        );

        Ok(Self {
            path,
            storage,
            pages_per_file,
            extent,
        })
    }

    /// Path the volume was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the tile is a directory of files.
    pub fn is_multi_file(&self) -> bool {
        matches!(self.storage, Storage::Files(_))
    }

    pub fn frame_count(&self) -> usize {
        match &self.storage {
            Storage::Single(_) => self.pages_per_file,
            Storage::Files(files) => self.pages_per_file * files.len(),
        }
    }

    pub fn extent(&self) -> VolumeExtent {
        self.extent
    }

    /// Read logical frames `[frames.start, frames.end)` as `f32`.
    ///
    /// The slice has shape `(frames, channels, height, width)`; a one-frame
    /// request still carries a frame axis of length 1.
    pub fn read(&self, frames: Range<usize>) -> Result<Slice, VolumeError> {
        if frames.start >= frames.end {
            return Err(VolumeError::InvalidRange {
                path: self.path.clone(),
                start: frames.start,
                end: frames.end,
            });
        }
        let frame_count = self.frame_count();
        if frames.end > frame_count {
            return Err(VolumeError::FrameOutOfRange {
                path: self.path.clone(),
                frame: frames.end - 1,
                frame_count,
            });
        }

        let VolumeExtent {
            width,
            height,
            channels,
            ..
        } = self.extent;
        let mut slice = Array4::<f32>::zeros((frames.len(), channels, height, width));

        match &self.storage {
            Storage::Single(file) => {
                let mut decoder = open_decoder(file)?;
                for (index, frame) in frames.clone().enumerate() {
                    decoder
                        .seek_to_image(frame)
                        .map_err(|source| VolumeError::Tiff {
                            path: file.clone(),
                            source,
                        })?;
                    self.decode_into(&mut decoder, file, &mut slice, index)?;
                }
            }
            Storage::Files(files) => {
                let per_file = self.pages_per_file;
                let first_file = frames.start / per_file;
                let end_file = frames.end.div_ceil(per_file);

                for (file_no, file) in files
                    .iter()
                    .enumerate()
                    .take(end_file)
                    .skip(first_file)
                {
                    let mut decoder = open_decoder(file)?;
                    for page in 0..per_file {
                        if page > 0 {
                            if !decoder.more_images() {
                                return Err(VolumeError::Inconsistent {
                                    path: file.clone(),
                                    message: format!(
                                        "{} pages, expected {}",
                                        page, per_file
                                    ),
                                });
                            }
                            decoder.next_image().map_err(|source| VolumeError::Tiff {
                                path: file.clone(),
                                source,
                            })?;
                        }

                        let frame = file_no * per_file + page;
                        if frames.contains(&frame) {
                            self.decode_into(&mut decoder, file, &mut slice, frame - frames.start)?;
                        } else {
                            // whole-file read: decode but discard
                            decoder.read_image().map_err(|source| VolumeError::Tiff {
                                path: file.clone(),
                                source,
                            })?;
                        }
                    }
                }
            }
        }

        Ok(slice)
    }

    /// Decode the decoder's current page into `slice[index]`.
    fn decode_into(
        &self,
        decoder: &mut TiffDecoder,
        file: &Path,
        slice: &mut Slice,
        index: usize,
    ) -> Result<(), VolumeError> {
        let VolumeExtent {
            width,
            height,
            channels,
            sample_type,
        } = self.extent;

        let (w, h) = decoder.dimensions().map_err(|source| VolumeError::Tiff {
            path: file.to_path_buf(),
            source,
        })?;
        if (w as usize, h as usize) != (width, height) {
            return Err(VolumeError::Inconsistent {
                path: file.to_path_buf(),
                message: format!("frame is {}x{}, tile is {}x{}", w, h, width, height),
            });
        }

        let result = decoder.read_image().map_err(|source| VolumeError::Tiff {
            path: file.to_path_buf(),
            source,
        })?;
        if SampleType::of_decoded(&result) != Some(sample_type) {
            return Err(VolumeError::Inconsistent {
                path: file.to_path_buf(),
                message: format!("sample type differs from {:?}", sample_type),
            });
        }
        let samples = decoded_to_f32(result).ok_or_else(|| VolumeError::UnsupportedSamples {
            path: file.to_path_buf(),
            message: format!("{:?}", sample_type),
        })?;

        let frame = Array3::from_shape_vec((height, width, channels), samples).map_err(|e| {
            VolumeError::Inconsistent {
                path: file.to_path_buf(),
                message: e.to_string(),
            }
        })?;

        // interleaved (y, x, c) -> channel axis second-to-last
        slice
            .index_axis_mut(Axis(0), index)
            .assign(&frame.permuted_axes([2, 0, 1]));

        Ok(())
    }
}

impl TileVolume for VirtualTileVolume {
    fn frame_count(&self) -> usize {
        VirtualTileVolume::frame_count(self)
    }

    fn extent(&self) -> VolumeExtent {
        VirtualTileVolume::extent(self)
    }

    fn read(&self, frames: Range<usize>) -> Result<Slice, VolumeError> {
        VirtualTileVolume::read(self, frames)
    }
}

/// List `*.tif*` / `*.TIF*` files of a directory, sorted.
fn list_tiff_files(dir: &Path) -> Result<Vec<PathBuf>, VolumeError> {
    let escaped = glob::Pattern::escape(&dir.to_string_lossy());
    let mut files = Vec::new();

    for suffix in ["*.tif*", "*.TIF*"] {
        let pattern = format!("{}/{}", escaped, suffix);
        let entries = glob::glob(&pattern).map_err(|e| VolumeError::Io {
            path: dir.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()),
        })?;
        for entry in entries {
            let entry = entry.map_err(|e| VolumeError::Io {
                path: e.path().to_path_buf(),
                source: e.into(),
            })?;
            if entry.is_file() {
                files.push(entry);
            }
        }
    }

    files.sort();
    files.dedup();

    if files.is_empty() {
        return Err(VolumeError::NoFiles {
            path: dir.to_path_buf(),
        });
    }
    Ok(files)
}

fn open_decoder(file: &Path) -> Result<TiffDecoder, VolumeError> {
    let handle = File::open(file).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            VolumeError::NotFound {
                path: file.to_path_buf(),
            }
        } else {
            VolumeError::Io {
                path: file.to_path_buf(),
                source,
            }
        }
    })?;

    let decoder = Decoder::new(BufReader::new(handle)).map_err(|source| VolumeError::Tiff {
        path: file.to_path_buf(),
        source,
    })?;
    Ok(decoder.with_limits(Limits::unlimited()))
}

/// Channel count and sample type of the current page, read from its tags
/// without decoding pixel data.
///
/// `None` for layouts that have no representation here (palette images,
/// 64-bit integers).
fn frame_layout(decoder: &mut TiffDecoder) -> tiff::TiffResult<Option<(usize, SampleType)>> {
    let (channels, bits) = match decoder.colortype()? {
        ColorType::Gray(bits) => (1, bits),
        ColorType::GrayA(bits) => (2, bits),
        ColorType::RGB(bits) | ColorType::YCbCr(bits) => (3, bits),
        ColorType::RGBA(bits) | ColorType::CMYK(bits) => (4, bits),
        _ => return Ok(None),
    };
    // absent tag means unsigned integers
    let format = decoder
        .find_tag_unsigned_vec::<u16>(Tag::SampleFormat)?
        .and_then(|formats| formats.first().copied())
        .unwrap_or(1);

    Ok(SampleType::from_tiff_format(bits, format).map(|sample_type| (channels, sample_type)))
}
