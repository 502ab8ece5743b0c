use super::{Canvas, Effect};
use crate::dispatch::RenderState;
use crate::Rgb;

/// Red and white stripes marching along the wire.
#[derive(Debug, Clone, Copy, Default)]
pub struct CandyCane;

impl Effect for CandyCane {
    fn render(&mut self, canvas: &mut Canvas<'_>, state: &mut RenderState) {
        let shift = usize::from(state.hue_cursor / 4);
        for (i, pixel) in canvas.pixels_mut().iter_mut().enumerate() {
            *pixel = if (i + shift) % 4 < 2 { Rgb::RED } else { Rgb::WHITE };
        }
        state.hue_cursor = state.hue_cursor.wrapping_add(1);
    }
}

/// Every third pixel lit, stepping along the wire.
#[derive(Debug, Clone, Copy, Default)]
pub struct TheaterChase;

impl Effect for TheaterChase {
    fn render(&mut self, canvas: &mut Canvas<'_>, state: &mut RenderState) {
        let shift = usize::from(state.hue_cursor / 10);
        let color = Rgb::from_hue(state.hue_cursor);
        for (i, pixel) in canvas.pixels_mut().iter_mut().enumerate() {
            if (i + shift) % 3 == 0 {
                *pixel = color;
            }
        }
        state.hue_cursor = state.hue_cursor.wrapping_add(1);
    }
}

/// A bright column bouncing between the left and right edges, leaving a
/// fading trail.
#[derive(Debug, Clone, Copy)]
pub struct Cylon {
    position: i32,
    direction: i32,
}

impl Default for Cylon {
    fn default() -> Self {
        Self {
            position: 0,
            direction: 1,
        }
    }
}

impl Effect for Cylon {
    fn render(&mut self, canvas: &mut Canvas<'_>, state: &mut RenderState) {
        canvas.fade(20);

        let width = canvas.width();
        if width <= 1 {
            self.position = 0;
        } else {
            let next = self.position + self.direction;
            if !(0..width).contains(&next) {
                self.direction = -self.direction;
            }
            self.position = (self.position + self.direction).clamp(0, width - 1);
        }

        let color = Rgb::from_hue(state.hue_cursor);
        for y in 0..canvas.height() {
            canvas.set(self.position, y, color);
        }
        state.hue_cursor = state.hue_cursor.wrapping_add(1);
    }

    fn persists_trailing_pixels(&self) -> bool {
        true
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}
