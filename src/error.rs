use std::path::PathBuf;

use thiserror::Error;

use crate::volume::SampleType;

/// Coarse classification of every failure the fuser can report.
///
/// All kinds abort a run; the kind only decides how the failure is
/// described to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Degenerate memory budget, malformed layout, bad options
    Configuration,
    /// Missing tile files or output directory
    NotFound,
    /// Frame index out of range, inconsistent tile extents
    CorruptData,
    /// Read or write failure mid-chunk
    Io,
}

/// Errors raised while opening or reading a tile volume
#[derive(Debug, Error)]
pub enum VolumeError {
    /// Directory mode found no TIFF files
    #[error("No TIFF files found in {path}")]
    NoFiles { path: PathBuf },

    /// Tile file or directory does not exist
    #[error("Tile not found: {path}")]
    NotFound { path: PathBuf },

    /// Requested frame lies past the end of the volume
    #[error("Frame {frame} out of range for {path}: volume has {frame_count} frames")]
    FrameOutOfRange {
        path: PathBuf,
        frame: usize,
        frame_count: usize,
    },

    /// Empty or inverted frame range
    #[error("Invalid frame range {start}..{end} for {path}")]
    InvalidRange {
        path: PathBuf,
        start: usize,
        end: usize,
    },

    /// A frame disagrees with the extent recorded when the volume was opened
    #[error("Inconsistent frame in {path}: {message}")]
    Inconsistent { path: PathBuf, message: String },

    /// Sample layout the fuser cannot represent
    #[error("Unsupported samples in {path}: {message}")]
    UnsupportedSamples { path: PathBuf, message: String },

    /// Operating-system I/O failure
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Decoder failure
    #[error("TIFF error in {path}: {source}")]
    Tiff {
        path: PathBuf,
        #[source]
        source: tiff::TiffError,
    },
}

impl VolumeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VolumeError::NoFiles { .. } | VolumeError::NotFound { .. } => ErrorKind::NotFound,
            VolumeError::FrameOutOfRange { .. }
            | VolumeError::InvalidRange { .. }
            | VolumeError::Inconsistent { .. }
            | VolumeError::UnsupportedSamples { .. } => ErrorKind::CorruptData,
            VolumeError::Io { source, .. } => io_kind(source),
            VolumeError::Tiff { source, .. } => match source {
                tiff::TiffError::IoError(e) => io_kind(e),
                _ => ErrorKind::CorruptData,
            },
        }
    }
}

/// Errors raised while loading or querying the tile position table
#[derive(Debug, Error)]
pub enum LayoutError {
    /// Layout file could not be read
    #[error("Cannot read layout {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Layout file is not valid JSON for the expected schema
    #[error("Malformed layout {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Layout lists no tiles
    #[error("Layout contains no tiles")]
    Empty,

    /// Same tile path listed twice
    #[error("Tile listed more than once: {path}")]
    DuplicateTile { path: PathBuf },

    /// Tile record with a degenerate extent or weight
    #[error("Invalid tile {path}: {message}")]
    InvalidTile { path: PathBuf, message: String },

    /// Overlap lookup for an index the table does not hold
    #[error("Unknown tile index {index} (table has {count} tiles)")]
    UnknownTile { index: usize, count: usize },

    /// Probing a tile's extent failed
    #[error(transparent)]
    Volume(#[from] VolumeError),
}

impl LayoutError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LayoutError::Io { source, .. } => io_kind(source),
            LayoutError::Volume(e) => e.kind(),
            LayoutError::Parse { .. }
            | LayoutError::Empty
            | LayoutError::DuplicateTile { .. }
            | LayoutError::InvalidTile { .. }
            | LayoutError::UnknownTile { .. } => ErrorKind::Configuration,
        }
    }
}

/// Errors raised while writing the fused volume
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("I/O error writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TIFF error writing {path}: {source}")]
    Tiff {
        path: PathBuf,
        #[source]
        source: tiff::TiffError,
    },

    /// No TIFF color type for this sample type and channel count
    #[error("Cannot write {channels}-channel {sample_type:?} samples")]
    UnsupportedLayout {
        sample_type: SampleType,
        channels: usize,
    },

    /// Chunk does not match the layout the output was created with
    #[error("Chunk layout mismatch: expected {expected}, got {actual}")]
    LayoutMismatch { expected: String, actual: String },
}

impl OutputError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OutputError::Io { source, .. } => io_kind(source),
            OutputError::Tiff { .. } => ErrorKind::Io,
            OutputError::UnsupportedLayout { .. } => ErrorKind::Configuration,
            OutputError::LayoutMismatch { .. } => ErrorKind::CorruptData,
        }
    }
}

/// Top-level error of a fusion run.
///
/// Tile and chunk failures carry the responsible tile path or chunk index
/// so the fatal message identifies where the run stopped.
#[derive(Debug, Error)]
pub enum FuseError {
    /// Options or budget that make the run impossible
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Output directory or similar prerequisite missing
    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Layout(#[from] LayoutError),

    /// Reading a tile failed
    #[error("Tile {tile}: {source}")]
    Volume {
        tile: PathBuf,
        #[source]
        source: VolumeError,
    },

    /// Writing a chunk failed
    #[error("Chunk {chunk}: {source}")]
    Output {
        chunk: usize,
        #[source]
        source: OutputError,
    },

    /// A blocking worker panicked or was cancelled
    #[error("Worker failed: {0}")]
    Worker(String),
}

impl FuseError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FuseError::Configuration(_) => ErrorKind::Configuration,
            FuseError::NotFound(_) => ErrorKind::NotFound,
            FuseError::Layout(e) => e.kind(),
            FuseError::Volume { source, .. } => source.kind(),
            FuseError::Output { source, .. } => source.kind(),
            FuseError::Worker(_) => ErrorKind::Io,
        }
    }
}

impl From<tokio::task::JoinError> for FuseError {
    fn from(err: tokio::task::JoinError) -> Self {
        FuseError::Worker(err.to_string())
    }
}

fn io_kind(err: &std::io::Error) -> ErrorKind {
    if err.kind() == std::io::ErrorKind::NotFound {
        ErrorKind::NotFound
    } else {
        ErrorKind::Io
    }
}
