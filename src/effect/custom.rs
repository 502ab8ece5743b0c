use super::{Canvas, Effect, step_due};
use crate::dispatch::RenderState;
use std::time::Instant;

/// The uploaded custom pattern.
///
/// The custom buffer is in wire order. Without a scroll speed it is copied
/// straight into the frame; with one, the picture shifts left one column
/// every `scroll_speed_ms`, re-addressed through the mapper.
#[derive(Debug, Clone, Default)]
pub struct CustomPattern {
    offset: i32,
    last_step: Option<Instant>,
}

impl Effect for CustomPattern {
    fn render(&mut self, canvas: &mut Canvas<'_>, state: &mut RenderState) {
        if !state.has_custom_pattern {
            return;
        }
        let source = state.custom_pattern.pixels();

        if !state.custom_pattern_scrolls {
            let len = canvas.len().min(source.len());
            canvas.pixels_mut()[..len].copy_from_slice(&source[..len]);
            return;
        }

        let width = canvas.width().max(1);
        if step_due(&mut self.last_step, canvas.now(), state.scroll_speed_ms) {
            self.offset = (self.offset + 1) % width;
        }

        let layout = *canvas.layout();
        for (x, y) in layout.coordinates() {
            let src_x = (x + self.offset) % width;
            let color = layout
                .index_of(src_x, y)
                .and_then(|index| source.get(index).copied());
            if let Some(color) = color {
                canvas.set(x, y, color);
            }
        }
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}
