//! Debug overlay: tile and frame numbers drawn onto slices.
//!
//! Digits are 30x50 seven-segment glyphs. The digits of the tile path are
//! drawn once per frame on one row, the global frame index below them. Each
//! glyph box is overwritten completely (background 0, segments at the
//! slice's brightest value) so the labels stay readable on any content.
//! Glyphs that would leave the frame stop the row they are on.

use std::path::Path;

use ndarray::s;

use crate::volume::Slice;

const GLYPH_WIDTH: usize = 30;
const GLYPH_HEIGHT: usize = 50;
const STROKE: usize = 5;
const DIGIT_GAP: usize = 5;
const GROUP_GAP: usize = 15;

/// Segments lit per digit, in `a b c d e f g` order.
const SEGMENTS: [[bool; 7]; 10] = [
    [true, true, true, true, true, true, false],
    [false, true, true, false, false, false, false],
    [true, true, false, true, true, false, true],
    [true, true, true, true, false, false, true],
    [false, true, true, false, false, true, true],
    [true, false, true, true, false, true, true],
    [true, false, true, true, true, true, true],
    [true, true, true, false, false, false, false],
    [true, true, true, true, true, true, true],
    [true, true, true, true, false, true, true],
];

/// Whether pixel `(row, col)` of the glyph for `digit` is lit.
pub fn glyph_pixel(digit: u8, row: usize, col: usize) -> bool {
    let lit = SEGMENTS[usize::from(digit % 10)];
    let mid = GLYPH_HEIGHT / 2;
    let top_half = row < mid;
    let left = col < STROKE;
    let right = col >= GLYPH_WIDTH - STROKE;

    (lit[0] && row < STROKE)
        || (lit[1] && right && top_half)
        || (lit[2] && right && !top_half)
        || (lit[3] && row >= GLYPH_HEIGHT - STROKE)
        || (lit[4] && left && !top_half)
        || (lit[5] && left && top_half)
        || (lit[6] && row + STROKE / 2 >= mid && row < mid + STROKE - STROKE / 2)
}

/// Draw the tile's digit groups and each frame's global index onto `slice`.
///
/// `first_frame` is the tile-local index of `slice[0]`.
pub fn overlay_debug(slice: &mut Slice, tile: &Path, first_frame: usize) {
    let (frames, _, height, width) = slice.dim();
    if frames == 0 {
        return;
    }
    let ink = slice.iter().copied().fold(1.0f32, f32::max);

    let cx = width / 2;
    let cy = height / 2 + 10;

    // tile label, all frames at once
    let label = tile.to_string_lossy();
    let mut x = cx as i64 - 100;
    for group in label
        .split(|c: char| !c.is_ascii_digit())
        .filter(|group| !group.is_empty())
    {
        let mut drawn_all = true;
        for digit in group.bytes().map(|b| b - b'0') {
            if !draw_glyph(slice, None, digit, cy as i64, x, ink) {
                drawn_all = false;
                break;
            }
            x += (GLYPH_WIDTH + DIGIT_GAP) as i64;
        }
        if !drawn_all {
            break;
        }
        x += (GROUP_GAP - DIGIT_GAP) as i64;
    }

    // frame index, one per frame
    for frame in 0..frames {
        let mut x = cx as i64 - 120;
        for digit in (first_frame + frame).to_string().bytes().map(|b| b - b'0') {
            if !draw_glyph(slice, Some(frame), digit, cy as i64 + 55, x, ink) {
                break;
            }
            x += (GLYPH_WIDTH + DIGIT_GAP) as i64;
        }
    }
}

/// Draw one glyph with its top-left corner at `(top, left)`.
///
/// Returns `false` without drawing when the glyph does not fit.
fn draw_glyph(
    slice: &mut Slice,
    frame: Option<usize>,
    digit: u8,
    top: i64,
    left: i64,
    ink: f32,
) -> bool {
    let (_, _, height, width) = slice.dim();
    if top < 0
        || left < 0
        || top as usize + GLYPH_HEIGHT > height
        || left as usize + GLYPH_WIDTH > width
    {
        return false;
    }
    let (top, left) = (top as usize, left as usize);

    let frames = match frame {
        Some(f) => f..f + 1,
        None => 0..slice.dim().0,
    };
    let mut region = slice.slice_mut(s![
        frames,
        ..,
        top..top + GLYPH_HEIGHT,
        left..left + GLYPH_WIDTH
    ]);

    for ((_, _, row, col), value) in region.indexed_iter_mut() {
        *value = if glyph_pixel(digit, row, col) { ink } else { 0.0 };
    }
    true
}
