use super::{Canvas, Effect, TEXT_HEIGHT, step_due, text_width};
use crate::dispatch::RenderState;
use crate::Rgb;
use std::time::Instant;

/// The configured scroll text, right to left in a rainbow gradient.
///
/// Text that fits the grid is centered and stays still.
#[derive(Debug, Clone, Default)]
pub struct ScrollingText {
    last_step: Option<Instant>,
}

impl Effect for ScrollingText {
    fn render(&mut self, canvas: &mut Canvas<'_>, state: &mut RenderState) {
        let width = canvas.width();
        let span = text_width(&state.scroll_text);
        let y = (canvas.height() - TEXT_HEIGHT) / 2;

        let x = if span <= width {
            (width - span) / 2
        } else {
            if step_due(&mut self.last_step, canvas.now(), state.scroll_speed_ms) {
                state.scroll_offset += 1;
                if state.scroll_offset > span + width {
                    state.scroll_offset = 0;
                }
            }
            width - state.scroll_offset
        };

        let hue = state.hue_cursor;
        canvas.draw_text(&state.scroll_text, x, y, |px, _| {
            Rgb::from_hue(hue.wrapping_add((px * 4) as u8))
        });
        state.hue_cursor = state.hue_cursor.wrapping_add(1);
    }

    fn reset(&mut self) {
        self.last_step = None;
    }
}

/// Each panel shows its wire-order number, for checking the physical
/// layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnumeratePanels;

impl Effect for EnumeratePanels {
    fn render(&mut self, canvas: &mut Canvas<'_>, _state: &mut RenderState) {
        let layout = *canvas.layout();
        let pw = i32::from(layout.panel_width());
        let ph = i32::from(layout.panel_height());
        let wide = i32::from(layout.panels_wide());

        for panel_row in 0..i32::from(layout.panel_rows()) {
            for panel_col in 0..wide {
                let (x0, y0) = (panel_col * pw, panel_row * ph);
                // Any pixel of the panel tells us its wire index.
                let Some(index) = layout.index_of(x0, y0) else {
                    continue;
                };
                let panel = index / (pw * ph) as usize;
                let label = panel.to_string();
                let x = x0 + (pw - text_width(&label)) / 2;
                let y = y0 + (ph - TEXT_HEIGHT) / 2;
                let color = Rgb::from_hue((panel * 32) as u8);
                canvas.draw_text(&label, x, y, |_, _| color);
            }
        }
    }
}
