use super::{Canvas, Effect};
use crate::dispatch::RenderState;
use crate::Rgb;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Random colored speckles that blink in and fade out.
pub struct Confetti {
    rng: SmallRng,
}

impl Default for Confetti {
    fn default() -> Self {
        Self {
            rng: SmallRng::seed_from_u64(0x5EED_0138),
        }
    }
}

impl Effect for Confetti {
    fn render(&mut self, canvas: &mut Canvas<'_>, state: &mut RenderState) {
        canvas.fade(10);
        if !canvas.is_empty() {
            let index = self.rng.gen_range(0..canvas.len());
            let hue = state.hue_cursor.wrapping_add(self.rng.gen_range(0..64));
            let pixels = canvas.pixels_mut();
            pixels[index] = pixels[index].saturating_add(Rgb::from_hsv(hue, 200, 255));
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
