//! Coordinate mapper properties, through the public API only.

use panel_matrix_controller::layout::{GridLayout, PixelIndex};
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::collections::BTreeSet;

fn mapped_indices(layout: &GridLayout) -> Vec<usize> {
    layout
        .coordinates()
        .filter_map(|(x, y)| layout.index_of(x, y))
        .collect()
}

#[rstest]
#[case(1, 1)]
#[case(2, 1)]
#[case(4, 1)]
#[case(4, 2)]
#[case(3, 2)]
#[case(6, 3)]
#[case(16, 16)]
fn every_wire_index_is_hit_exactly_once(#[case] panels: u16, #[case] wide: u16) {
    let layout = GridLayout::tiled(panels, wide).unwrap();
    let indices = mapped_indices(&layout);
    let unique: BTreeSet<_> = indices.iter().copied().collect();

    assert_eq!(unique.len(), indices.len(), "mapper is not injective");
    assert_eq!(indices.len(), layout.pixel_count());
    assert_eq!(unique.last().copied(), Some(layout.pixel_count() - 1));
}

#[rstest]
#[case(-1, 0)]
#[case(0, -1)]
#[case(64, 0)]
#[case(0, 16)]
#[case(i32::MAX, i32::MAX)]
#[case(i32::MIN, 3)]
fn out_of_range_is_off_grid(#[case] x: i32, #[case] y: i32) {
    let layout = GridLayout::tiled(4, 2).unwrap();
    assert_eq!(layout.map(x, y), PixelIndex::OffGrid);
}

#[test]
fn columns_alternate_direction_within_a_panel() {
    let layout = GridLayout::tiled(1, 1).unwrap();
    assert_eq!(layout.index_of(0, 0), Some(0));
    assert_eq!(layout.index_of(0, 7), Some(7));
    assert_eq!(layout.index_of(1, 7), Some(8));
    assert_eq!(layout.index_of(1, 0), Some(15));
    assert_eq!(layout.index_of(31, 0), Some(255));
}

#[test]
fn odd_panel_rows_are_rotated() {
    let layout = GridLayout::tiled(2, 1).unwrap();
    // Top-left of the second panel row is the far end of its panel.
    assert_eq!(layout.index_of(0, 8), Some(256 + 31 * 8));
    assert_eq!(layout.index_of(31, 15), Some(256));
}

#[test]
fn panel_rows_snake_left_and_right() {
    let layout = GridLayout::tiled(4, 2).unwrap();
    let panel_at = |x, y| layout.index_of(x, y).map(|i| i / 256);
    assert_eq!(panel_at(0, 0), Some(0));
    assert_eq!(panel_at(32, 0), Some(1));
    assert_eq!(panel_at(32, 8), Some(2));
    assert_eq!(panel_at(0, 8), Some(3));
}

#[test]
fn missing_panels_in_last_row_are_off_grid() {
    let layout = GridLayout::tiled(3, 2).unwrap();
    assert_eq!((layout.width(), layout.height()), (64, 16));
    // The third panel fills the right-hand cell of the reversed second row.
    assert_eq!(layout.index_of(40, 10).map(|i| i / 256), Some(2));
    assert_eq!(layout.map(5, 10), PixelIndex::OffGrid);
}

#[test]
fn grid_constructor_matches_tiling() {
    let layout = GridLayout::from_grid(3, 5).unwrap();
    assert_eq!(layout, GridLayout::tiled(15, 5).unwrap());
    assert_eq!(layout.panel_rows(), 3);
    assert!(GridLayout::from_grid(0, 5).is_err());
    assert!(GridLayout::from_grid(3, 17).is_err());
}
