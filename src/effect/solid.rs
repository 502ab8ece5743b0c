use super::{Canvas, Effect};
use crate::dispatch::RenderState;
use crate::Rgb;

/// One color over every active pixel.
#[derive(Debug, Clone, Copy)]
pub struct Solid {
    color: Rgb,
}

impl Solid {
    pub fn new(color: Rgb) -> Self {
        Self { color }
    }
}

impl Effect for Solid {
    fn render(&mut self, canvas: &mut Canvas<'_>, _state: &mut RenderState) {
        canvas.fill(self.color);
    }
}

/// Fallback for unknown pattern ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct Blank;

impl Effect for Blank {
    fn render(&mut self, canvas: &mut Canvas<'_>, _state: &mut RenderState) {
        canvas.fill(Rgb::BLACK);
    }
}
