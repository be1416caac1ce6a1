//! Full runs over real TIFF tiles and a JSON layout.

use std::ffi::OsStr;
use std::fs;

use clap::Parser;

use tile_fuser::error::ErrorKind;
use tile_fuser::fuse::{BlendingEngine, FixedMemory, FuseOrchestrator};
use tile_fuser::layout::{JsonTileTable, LayoutDocument, TileRecord, DEFAULT_LAYOUT_NAME};
use tile_fuser::output::TiffOutput;
use tile_fuser::volume::FileVolumeSource;
use tile_fuser::{Config, TilePositionTable};

use super::test_utils::{read_gray16_pages, write_gray16_directory, write_gray16_stack};

const HEIGHT: u32 = 16;
const WIDTH: u32 = 16;

/// Two 6-frame tiles: a multi-page stack at the origin and a directory of
/// single-frame files shifted by (3, 0, 8).
fn write_run(dir: &std::path::Path) {
    write_gray16_stack(&dir.join("tile_000.tif"), 6, WIDTH, HEIGHT, 100);
    write_gray16_directory(&dir.join("tile_001"), 6, WIDTH, HEIGHT, 300);

    let layout = LayoutDocument {
        tiles: vec![
            TileRecord::new("tile_000.tif", 0, 0, 0, 6),
            TileRecord::new("tile_001", 3, 0, 8, 6),
        ],
    };
    fs::write(
        dir.join(DEFAULT_LAYOUT_NAME),
        serde_json::to_string_pretty(&layout).unwrap(),
    )
    .unwrap();
}

/// Pixel `(row, col)` of a 24-wide fused plane.
fn at(plane: &[u16], row: usize, col: usize) -> u16 {
    plane[row * 24 + col]
}

#[tokio::test]
async fn test_fuse_directory_layout_to_tiff() {
    let dir = tempfile::tempdir().unwrap();
    write_run(dir.path());
    let output = dir.path().join("fused.tif");

    let config = Config::try_parse_from([
        OsStr::new("tile-fuser"),
        dir.path().as_os_str(),
        OsStr::new("-a"),
        OsStr::new("-o"),
        output.as_os_str(),
    ])
    .unwrap();
    config.validate().unwrap();

    let source = FileVolumeSource::new(config.tile_root());
    let (table, source) = JsonTileTable::load_in_background(config.layout_path(), source)
        .await
        .unwrap();
    assert_eq!(table.tiles()[1].width, WIDTH as usize);

    // 16 x 24 f32 planes are 1536 bytes: budget two planes per chunk
    let summary = FuseOrchestrator::new(
        table,
        source,
        BlendingEngine::new(config.blend_policy()),
        config.fuse_options(),
    )
    .with_memory_probe(FixedMemory(1536 * 3))
    .run(&TiffOutput::new(&output))
    .await
    .unwrap();

    assert_eq!(summary.planes, 9);
    assert_eq!(summary.chunks, 5);

    let pages = read_gray16_pages(&output);
    assert_eq!(pages.len(), 9);
    assert!(pages.iter().all(|p| p.len() == 16 * 24));

    // before tile_001 starts
    assert_eq!(at(&pages[0], 0, 0), 100);
    assert_eq!(at(&pages[0], 5, 20), 0);
    // both tiles: averaged where they overlap in X
    assert_eq!(at(&pages[4], 7, 4), 100);
    assert_eq!(at(&pages[4], 7, 12), 200);
    assert_eq!(at(&pages[4], 7, 20), 300);
    // after tile_000 ends
    assert_eq!(at(&pages[8], 0, 0), 0);
    assert_eq!(at(&pages[8], 15, 23), 300);
}

#[tokio::test]
async fn test_rerun_replaces_output() {
    let dir = tempfile::tempdir().unwrap();
    write_run(dir.path());
    let output = dir.path().join("fused.tif");
    fs::write(&output, vec![0u8; 4096]).unwrap();

    let source = FileVolumeSource::new(dir.path());
    let table = JsonTileTable::load(&dir.path().join(DEFAULT_LAYOUT_NAME), &source).unwrap();
    let options = tile_fuser::FuseOptions {
        zmin: 2,
        zmax: Some(5),
        debug: false,
    };

    FuseOrchestrator::new(table, source, BlendingEngine::default(), options)
        .with_memory_probe(FixedMemory(1 << 24))
        .run(&TiffOutput::new(&output))
        .await
        .unwrap();

    let pages = read_gray16_pages(&output);
    assert_eq!(pages.len(), 3);
    // max-score with equal weights keeps tile_000 in the overlap
    assert_eq!(at(&pages[2], 7, 12), 100);
    assert_eq!(at(&pages[2], 7, 20), 300);
}

#[tokio::test]
async fn test_missing_tile_file_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    write_run(dir.path());
    fs::remove_dir_all(dir.path().join("tile_001")).unwrap();

    let source = FileVolumeSource::new(dir.path());
    // extents are probed at load time, so the missing tile surfaces here
    let err = JsonTileTable::load(&dir.path().join(DEFAULT_LAYOUT_NAME), &source).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}
