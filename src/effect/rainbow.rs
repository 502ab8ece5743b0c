use super::{Canvas, Effect, step_due};
use crate::dispatch::RenderState;
use crate::Rgb;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::time::Instant;

/// Hue distance between neighbouring wire pixels.
const RAINBOW_DELTA: u8 = 7;

fn fill_rainbow(pixels: &mut [Rgb], start_hue: u8) {
    let mut hue = start_hue;
    for pixel in pixels {
        *pixel = Rgb::from_hue(hue);
        hue = hue.wrapping_add(RAINBOW_DELTA);
    }
}

/// Rainbow along the data wire, rotating one hue step per frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct Rainbow;

impl Effect for Rainbow {
    fn render(&mut self, canvas: &mut Canvas<'_>, state: &mut RenderState) {
        fill_rainbow(canvas.pixels_mut(), state.hue_cursor);
        state.hue_cursor = state.hue_cursor.wrapping_add(1);
    }

    // Paints every active pixel, so the pre-clear would be wasted work.
    fn persists_trailing_pixels(&self) -> bool {
        true
    }
}

/// Rainbow with white sparkles.
pub struct RainbowGlitter {
    rng: SmallRng,
}

impl Default for RainbowGlitter {
    fn default() -> Self {
        Self {
            rng: SmallRng::seed_from_u64(0x5EED_0010),
        }
    }
}

impl Effect for RainbowGlitter {
    fn render(&mut self, canvas: &mut Canvas<'_>, state: &mut RenderState) {
        fill_rainbow(canvas.pixels_mut(), state.hue_cursor);
        state.hue_cursor = state.hue_cursor.wrapping_add(1);

        // 80 in 256 frames get a sparkle.
        if !canvas.is_empty() && self.rng.gen_range(0..256) < 80 {
            let index = self.rng.gen_range(0..canvas.len());
            let pixels = canvas.pixels_mut();
            pixels[index] = pixels[index].saturating_add(Rgb::WHITE);
        }
    }

    fn persists_trailing_pixels(&self) -> bool {
        true
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Horizontal rainbow bands sliding left across the grid.
#[derive(Debug, Clone, Default)]
pub struct ScrollingRainbow {
    offset: u32,
    last_step: Option<Instant>,
}

/// Milliseconds between one-column steps.
const SCROLL_STEP_MS: u16 = 30;

impl Effect for ScrollingRainbow {
    fn render(&mut self, canvas: &mut Canvas<'_>, _state: &mut RenderState) {
        let width = canvas.width().max(1) as u32;
        if step_due(&mut self.last_step, canvas.now(), SCROLL_STEP_MS) {
            self.offset = (self.offset + 1) % width;
        }

        for y in 0..canvas.height() {
            for x in 0..canvas.width() {
                let column = (x as u32 + self.offset) % width;
                let hue = (column * 256 / width) as u8;
                canvas.set(x, y, Rgb::from_hue(hue.wrapping_add((y * 20) as u8)));
            }
        }
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}
