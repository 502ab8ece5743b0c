use super::{Canvas, Effect, TEXT_HEIGHT, step_due, text_width};
use crate::dispatch::RenderState;
use crate::Rgb;
use std::time::Instant;
use time::OffsetDateTime;

/// Colon blinks on for the first half of every second.
fn colon_visible(wall: OffsetDateTime) -> bool {
    wall.millisecond() < 500
}

fn hh_mm(wall: OffsetDateTime, colon: bool) -> String {
    let separator = if colon { ':' } else { ' ' };
    format!("{:02}{separator}{:02}", wall.hour(), wall.minute())
}

/// Wall clock. Shows seconds when the grid is wide enough, otherwise a
/// seconds bar under `HH:MM`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DigitalClock;

impl Effect for DigitalClock {
    fn render(&mut self, canvas: &mut Canvas<'_>, state: &mut RenderState) {
        canvas.fade(96);

        let wall = canvas.wall_clock();
        let width = canvas.width();
        let color = Rgb::from_hue(state.hue_cursor);
        let full = format!("{:02}:{:02}:{:02}", wall.hour(), wall.minute(), wall.second());

        if text_width(&full) <= width {
            let x = (width - text_width(&full)) / 2;
            let y = (canvas.height() - TEXT_HEIGHT) / 2;
            canvas.draw_text(&full, x, y, |_, _| color);
        } else {
            let text = hh_mm(wall, true);
            let x = (width - text_width(&text)) / 2;
            let y = if canvas.height() <= 8 { 0 } else { (canvas.height() - 8) / 2 };
            canvas.draw_text(&text, x, y, |_, _| color);

            let bar = i32::from(wall.second()) * width / 60;
            for bx in 0..bar {
                canvas.set(bx, y + TEXT_HEIGHT, color.scale(128));
            }
        }
        state.hue_cursor = state.hue_cursor.wrapping_add(1);
    }

    fn persists_trailing_pixels(&self) -> bool {
        true
    }
}

/// Default-mode display: a scrolling status line on the first panel row
/// and an `HH:MM` clock with a blinking colon on the second.
#[derive(Debug, Clone, Default)]
pub struct StatusClock {
    offset: i32,
    last_step: Option<Instant>,
}

impl Effect for StatusClock {
    fn render(&mut self, canvas: &mut Canvas<'_>, state: &mut RenderState) {
        let width = canvas.width();
        let line = state.status_line.as_str();
        let line_width = text_width(line);

        let x = if line_width <= width {
            (width - line_width) / 2
        } else {
            if step_due(&mut self.last_step, canvas.now(), state.scroll_speed_ms) {
                self.offset += 1;
                if self.offset > line_width + width {
                    self.offset = 0;
                }
            }
            width - self.offset
        };
        canvas.draw_text(line, x, 0, |_, _| Rgb::new(0, 160, 255));

        let wall = canvas.wall_clock();
        let clock = hh_mm(wall, colon_visible(wall));
        let clock_x = (width - text_width(&clock)) / 2;
        canvas.draw_text(&clock, clock_x, 8, |_, _| Rgb::WHITE);
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}
