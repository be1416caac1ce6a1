//! Orchestrator scheduling tests against in-memory tiles.

use std::path::PathBuf;
use std::time::Duration;

use tile_fuser::error::ErrorKind;
use tile_fuser::fuse::{
    BlendPolicy, FixedMemory, FuseOptions, FuseOrchestrator, FusionEngine, DEFAULT_QUEUE_CAPACITY,
};
use tile_fuser::output::TiffVariant;
use tile_fuser::FuseError;

use super::test_utils::{
    tile, GatedEngine, LogCapture, MockVolumeSource, RecordingEngine, RecordingTarget, StaticTable,
};

/// Budget large enough for any test volume to fit in one chunk.
const ABUNDANT: u64 = 1 << 30;

/// Budget giving exactly 4 frames per chunk for 8x8 single-channel planes.
const FOUR_FRAMES_OF_8X8: u64 = 8 * 8 * 4 * 6;

/// Budget giving a single frame per chunk for 8x8 single-channel planes.
const ONE_FRAME_OF_8X8: u64 = 8 * 8 * 4 * 3 / 2;

fn fuser<E: FusionEngine>(
    table: StaticTable,
    source: MockVolumeSource,
    engine: E,
    options: FuseOptions,
    memory: u64,
) -> FuseOrchestrator<StaticTable, MockVolumeSource, E, FixedMemory> {
    FuseOrchestrator::new(table, source, engine, options).with_memory_probe(FixedMemory(memory))
}

/// Tile A at Z 0 and tile B at Z 5, both 10 frames of 4x4.
fn z_stacked_pair() -> (StaticTable, MockVolumeSource) {
    let table = StaticTable::new(vec![
        tile(0, "tile_a", 0, 0, 0, 10, 4),
        tile(1, "tile_b", 5, 0, 0, 10, 4),
    ]);
    let source = MockVolumeSource::new()
        .with_tile("tile_a", 10, 4, 10.0)
        .with_tile("tile_b", 10, 4, 30.0);
    (table, source)
}

#[tokio::test]
async fn test_two_tiles_single_chunk() {
    let (table, source) = z_stacked_pair();
    let engine = RecordingEngine::new(BlendPolicy::Average);
    let target = RecordingTarget::new();

    let summary = fuser(
        table,
        source.clone(),
        engine.clone(),
        FuseOptions::default(),
        ABUNDANT,
    )
    .run(&target)
    .await
    .unwrap();

    assert_eq!(summary.chunks, 1);
    assert_eq!(summary.planes, 15);
    assert_eq!(summary.placements, 2);
    assert_eq!(engine.lifecycles(), 1);

    assert_eq!(
        source.reads(),
        vec![
            (PathBuf::from("tile_a"), 0..10),
            (PathBuf::from("tile_b"), 0..10),
        ]
    );

    let consumed = engine.consumed();
    assert_eq!(consumed.len(), 2);
    assert_eq!((consumed[0].tile, consumed[0].top_left), (0, [0, 0, 0]));
    assert_eq!((consumed[1].tile, consumed[1].top_left), (1, [5, 0, 0]));

    let a_overlap = &consumed[0].overlaps[0];
    assert_eq!((a_overlap.other, a_overlap.z_from, a_overlap.z_to), (1, 5, 10));
    let b_overlap = &consumed[1].overlaps[0];
    assert_eq!((b_overlap.other, b_overlap.z_from, b_overlap.z_to), (0, 0, 5));

    let layout = target.layout().unwrap();
    assert_eq!(layout.variant, TiffVariant::Classic);
    assert_eq!((layout.height, layout.width, layout.channels), (4, 4, 1));
}

#[tokio::test]
async fn test_average_blends_overlapping_planes() {
    let (table, source) = z_stacked_pair();
    let target = RecordingTarget::new();

    fuser(
        table,
        source,
        RecordingEngine::new(BlendPolicy::Average),
        FuseOptions::default(),
        ABUNDANT,
    )
    .run(&target)
    .await
    .unwrap();

    let planes = target.u16_planes();
    assert_eq!(planes.len(), 15);
    assert!(planes[..5].iter().all(|p| p.iter().all(|&v| v == 10)));
    assert!(planes[5..10].iter().all(|p| p.iter().all(|&v| v == 20)));
    assert!(planes[10..].iter().all(|p| p.iter().all(|&v| v == 30)));
}

#[tokio::test]
async fn test_max_score_tie_keeps_lower_index() {
    let (table, source) = z_stacked_pair();
    let target = RecordingTarget::new();

    fuser(
        table,
        source,
        RecordingEngine::new(BlendPolicy::MaxScore),
        FuseOptions::default(),
        ABUNDANT,
    )
    .run(&target)
    .await
    .unwrap();

    let planes = target.u16_planes();
    assert!(planes[..10].iter().all(|p| p.iter().all(|&v| v == 10)));
    assert!(planes[10..].iter().all(|p| p.iter().all(|&v| v == 30)));
}

#[tokio::test]
async fn test_depth_partitioned_into_chunks() {
    let table = StaticTable::new(vec![tile(0, "tile_a", 0, 0, 0, 10, 8)]);
    let source = MockVolumeSource::new().with_tile("tile_a", 10, 8, 1.0);
    let engine = RecordingEngine::new(BlendPolicy::MaxScore);
    let target = RecordingTarget::new();

    let summary = fuser(
        table,
        source.clone(),
        engine.clone(),
        FuseOptions::default(),
        FOUR_FRAMES_OF_8X8,
    )
    .run(&target)
    .await
    .unwrap();

    assert_eq!(summary.chunks, 3);
    assert_eq!(summary.planes, 10);
    assert_eq!(engine.lifecycles(), 3);

    let windows: Vec<(usize, usize)> = summary.windows.iter().map(|w| (w.zmin, w.zmax)).collect();
    assert_eq!(windows, vec![(0, 4), (4, 8), (8, 10)]);

    let appended: Vec<usize> = target.chunks().iter().map(|c| c.planes).collect();
    assert_eq!(appended, vec![4, 4, 2]);

    let reads: Vec<_> = source.reads().into_iter().map(|(_, r)| r).collect();
    assert_eq!(reads, vec![0..4, 4..8, 8..10]);
}

#[tokio::test]
async fn test_tiles_opened_once_per_run() {
    let table = StaticTable::new(vec![
        tile(0, "tile_a", 0, 0, 0, 10, 8),
        tile(1, "tile_b", 5, 0, 0, 10, 8),
    ]);
    let source = MockVolumeSource::new()
        .with_tile("tile_a", 10, 8, 1.0)
        .with_tile("tile_b", 10, 8, 2.0);
    let target = RecordingTarget::new();

    let summary = fuser(
        table,
        source.clone(),
        RecordingEngine::new(BlendPolicy::MaxScore),
        FuseOptions::default(),
        ONE_FRAME_OF_8X8,
    )
    .run(&target)
    .await
    .unwrap();

    assert_eq!(summary.chunks, 15);
    assert_eq!(source.reads().len(), 20);
    assert_eq!(source.opens(), 2);
}

#[tokio::test]
async fn test_producer_waits_on_full_queue() {
    let count = DEFAULT_QUEUE_CAPACITY + 10;
    let names: Vec<String> = (0..count).map(|i| format!("tile_{:02}", i)).collect();
    let table = StaticTable::new(
        names
            .iter()
            .enumerate()
            .map(|(i, name)| tile(i, name, 0, 0, 0, 2, 4))
            .collect(),
    );
    let source = names
        .iter()
        .fold(MockVolumeSource::new(), |source, name| source.with_tile(name, 2, 4, 1.0));
    let recorder = RecordingEngine::new(BlendPolicy::Average);
    let (engine, release) = GatedEngine::new(recorder.clone());
    let target = RecordingTarget::new();
    let orchestrator = fuser(table, source.clone(), engine, FuseOptions::default(), ABUNDANT);

    let watch = async {
        // a full queue plus the placement waiting on `send`
        let stalled = DEFAULT_QUEUE_CAPACITY + 1;
        for _ in 0..1000 {
            if source.reads().len() >= stalled {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        // room for a producer that ignores the bound to overshoot
        tokio::time::sleep(Duration::from_millis(100)).await;
        let before_release = (source.reads().len(), recorder.consumed().len());
        release.send(()).unwrap();
        before_release
    };
    let (summary, before_release) = tokio::join!(orchestrator.run(&target), watch);

    assert_eq!(before_release, (DEFAULT_QUEUE_CAPACITY + 1, 0));
    assert_eq!(summary.unwrap().placements, count);

    let arrival: Vec<usize> = recorder.consumed().iter().map(|p| p.tile).collect();
    assert_eq!(arrival, (0..count).collect::<Vec<_>>());
    assert!(target.u16_planes().iter().all(|p| p.iter().all(|&v| v == 1)));
}

#[tokio::test]
async fn test_each_chunk_logs_completion() {
    let table = StaticTable::new(vec![tile(0, "tile_a", 0, 0, 0, 10, 8)]);
    let source = MockVolumeSource::new().with_tile("tile_a", 10, 8, 1.0);
    let capture = LogCapture::new();
    let _guard = tracing::subscriber::set_default(capture.subscriber());

    fuser(
        table,
        source,
        RecordingEngine::new(BlendPolicy::MaxScore),
        FuseOptions::default(),
        FOUR_FRAMES_OF_8X8,
    )
    .run(&RecordingTarget::new())
    .await
    .unwrap();

    let written: Vec<String> = capture
        .lines()
        .into_iter()
        .filter(|line| line.contains("Chunk written"))
        .collect();
    assert_eq!(written.len(), 3);
    assert!(written[0].contains("index=0 zmin=0 zmax=4"));
    assert!(written[1].contains("index=1 zmin=4 zmax=8"));
    assert!(written[2].contains("index=2 zmin=8 zmax=10"));
    assert!(written[2].contains("planes_written=10"));
}

#[tokio::test]
async fn test_tiles_outside_window_are_skipped() {
    // A covers Z [0, 4), B covers Z [6, 10); chunks are [0,4) [4,8) [8,10)
    let table = StaticTable::new(vec![
        tile(0, "tile_a", 0, 0, 0, 4, 8),
        tile(1, "tile_b", 6, 0, 0, 4, 8),
    ]);
    let source = MockVolumeSource::new()
        .with_tile("tile_a", 4, 8, 1.0)
        .with_tile("tile_b", 4, 8, 2.0);
    let engine = RecordingEngine::new(BlendPolicy::MaxScore);
    let target = RecordingTarget::new();

    let summary = fuser(
        table,
        source.clone(),
        engine.clone(),
        FuseOptions::default(),
        FOUR_FRAMES_OF_8X8,
    )
    .run(&target)
    .await
    .unwrap();

    assert_eq!(summary.placements, 3);
    assert_eq!(
        source.reads(),
        vec![
            (PathBuf::from("tile_a"), 0..4),
            (PathBuf::from("tile_b"), 0..2),
            (PathBuf::from("tile_b"), 2..4),
        ]
    );

    let placed: Vec<(usize, usize, [usize; 3])> = engine
        .consumed()
        .iter()
        .map(|p| (p.lifecycle, p.tile, p.top_left))
        .collect();
    assert_eq!(
        placed,
        vec![(0, 0, [0, 0, 0]), (1, 1, [2, 0, 0]), (2, 1, [0, 0, 0])]
    );

    // the gap between the tiles stays empty
    let planes = target.u16_planes();
    assert!(planes[4..6].iter().all(|p| p.iter().all(|&v| v == 0)));
    assert!(planes[6..].iter().all(|p| p.iter().all(|&v| v == 2)));
}

#[tokio::test]
async fn test_z_window_limits_output() {
    let (table, source) = z_stacked_pair();
    let engine = RecordingEngine::new(BlendPolicy::Average);
    let target = RecordingTarget::new();
    let options = FuseOptions {
        zmin: 3,
        zmax: Some(12),
        debug: false,
    };

    let summary = fuser(table, source.clone(), engine.clone(), options, ABUNDANT)
        .run(&target)
        .await
        .unwrap();

    assert_eq!(summary.planes, 9);
    assert_eq!((summary.windows[0].zmin, summary.windows[0].zmax), (3, 12));
    assert_eq!(
        source.reads(),
        vec![
            (PathBuf::from("tile_a"), 3..10),
            (PathBuf::from("tile_b"), 0..7),
        ]
    );

    let consumed = engine.consumed();
    assert_eq!(consumed[0].top_left, [0, 0, 0]);
    assert_eq!(consumed[1].top_left, [2, 0, 0]);
    // A's overlap [5, 10) re-expressed against a slice starting at frame 3
    assert_eq!((consumed[0].overlaps[0].z_from, consumed[0].overlaps[0].z_to), (2, 7));
}

#[tokio::test]
async fn test_insufficient_memory_fails_before_output() {
    let (table, source) = z_stacked_pair();
    let engine = RecordingEngine::new(BlendPolicy::Average);
    let target = RecordingTarget::new();

    let err = fuser(table, source.clone(), engine.clone(), FuseOptions::default(), 64)
        .run(&target)
        .await
        .unwrap_err();

    assert!(matches!(err, FuseError::Configuration(_)));
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(target.layout().is_none());
    assert!(source.reads().is_empty());
    assert_eq!(engine.lifecycles(), 0);
}

#[tokio::test]
async fn test_missing_tile_aborts_run() {
    let table = StaticTable::new(vec![
        tile(0, "tile_a", 0, 0, 0, 10, 4),
        tile(1, "tile_gone", 5, 0, 0, 10, 4),
    ]);
    let source = MockVolumeSource::new().with_tile("tile_a", 10, 4, 1.0);
    let target = RecordingTarget::new();

    let err = fuser(
        table,
        source,
        RecordingEngine::new(BlendPolicy::Average),
        FuseOptions::default(),
        ABUNDANT,
    )
    .run(&target)
    .await
    .unwrap_err();

    match &err {
        FuseError::Volume { tile, .. } => assert_eq!(tile, &PathBuf::from("tile_gone")),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(target.chunks().is_empty());
}

#[tokio::test]
async fn test_failure_keeps_earlier_chunks() {
    // tile_b only exists for its first two frames, so the second chunk fails
    let table = StaticTable::new(vec![
        tile(0, "tile_a", 0, 0, 0, 4, 8),
        tile(1, "tile_b", 2, 0, 0, 6, 8),
    ]);
    let source = MockVolumeSource::new()
        .with_tile("tile_a", 4, 8, 1.0)
        .with_tile("tile_b", 2, 8, 2.0);
    let target = RecordingTarget::new();

    let err = fuser(
        table,
        source,
        RecordingEngine::new(BlendPolicy::MaxScore),
        FuseOptions::default(),
        FOUR_FRAMES_OF_8X8,
    )
    .run(&target)
    .await
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::CorruptData);
    assert_eq!(target.chunks().len(), 1);
    assert_eq!(target.chunks()[0].planes, 4);
}

#[tokio::test]
async fn test_debug_overlay_leaves_small_tiles_alone() {
    let (table, source) = z_stacked_pair();
    let target = RecordingTarget::new();
    let options = FuseOptions {
        debug: true,
        ..FuseOptions::default()
    };

    fuser(
        table,
        source,
        RecordingEngine::new(BlendPolicy::MaxScore),
        options,
        ABUNDANT,
    )
    .run(&target)
    .await
    .unwrap();

    // 4x4 tiles are too small for any glyph
    let planes = target.u16_planes();
    assert!(planes[0].iter().all(|&v| v == 10));
}
