//! PNG preview of the last pushed frame.
//!
//! Each pixel of the logical grid becomes a round dot in a `cell_size`
//! square cell, so the picture looks like the panels rather than a blurry
//! upscale. Unlit LEDs are drawn dim grey to show where the panels are.

use crate::Rgb;
use crate::error::Result;
use crate::render::FrameSnapshot;
use image::{ImageFormat, RgbImage};
use std::io::Cursor;

/// Cell size used by the HTTP preview.
pub const DEFAULT_CELL_SIZE: u32 = 8;

const UNLIT: Rgb = Rgb::new(24, 24, 24);

/// Draw the snapshot onto a new image.
pub fn frame_image(snapshot: &FrameSnapshot, cell_size: u32) -> RgbImage {
    assert!(cell_size > 0, "cell_size must be positive");
    let layout = &snapshot.layout;
    let width = u32::from(layout.width()) * cell_size;
    let height = u32::from(layout.height()) * cell_size;
    let mut image = RgbImage::new(width, height);

    let margin = (cell_size / 8).max(1).min(cell_size / 2);
    let radius = ((cell_size - margin * 2) / 2).max(1) as i32;
    let radius_sq = radius * radius;
    let center = (cell_size as i32 - 1) / 2;

    for (x, y) in layout.coordinates() {
        let color = layout
            .index_of(x, y)
            .and_then(|index| snapshot.pixels.get(index).copied())
            .filter(|color| !color.is_black())
            .unwrap_or(UNLIT);
        let dot = image::Rgb([color.r, color.g, color.b]);

        let origin_x = x as u32 * cell_size;
        let origin_y = y as u32 * cell_size;
        for local_y in 0..cell_size {
            let dy = local_y as i32 - center;
            for local_x in 0..cell_size {
                let dx = local_x as i32 - center;
                if dx * dx + dy * dy <= radius_sq {
                    image.put_pixel(origin_x + local_x, origin_y + local_y, dot);
                }
            }
        }
    }

    image
}

/// Encode the snapshot as PNG bytes.
pub fn render_png(snapshot: &FrameSnapshot, cell_size: u32) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    frame_image(snapshot, cell_size).write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

// ── Tests ──────────────────────────────────────────────────────────
