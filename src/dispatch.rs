//! Render dispatch: run the effect for a pattern id on the live frame.
//!
//! Clearing happens on both sides of the effect. Before it runs, the
//! active region is blanked unless the effect declares that it builds on
//! the previous frame. After it runs, everything past the active count is
//! forced black. Effects therefore always see a canvas of exactly the
//! active size.

use crate::effect::{Canvas, EffectRegistry, FrameClock, PatternId, ids};
use crate::frame::{FrameBuffer, PixelBuffer};
use crate::layout::GridLayout;
use crate::upload::SCROLL_SPEED_DEFAULT_MS;
use crate::DEFAULT_CAPACITY;

/// Mutable per-controller render state, threaded through every effect.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderState {
    pub pattern_id: PatternId,
    /// Wrapping hue, advanced by the color-cycling effects.
    pub hue_cursor: u8,
    pub scroll_offset: i32,
    pub scroll_speed_ms: u16,
    pub scroll_text: String,
    /// Line shown by the status display.
    pub status_line: String,
    /// Wire-order pixels of the last successful upload.
    pub custom_pattern: PixelBuffer,
    pub has_custom_pattern: bool,
    /// Whether the custom pattern scrolls at `scroll_speed_ms`.
    pub custom_pattern_scrolls: bool,
}

impl RenderState {
    pub fn new(capacity: usize) -> Self {
        Self {
            pattern_id: ids::STATUS_CLOCK,
            hue_cursor: 0,
            scroll_offset: 0,
            scroll_speed_ms: SCROLL_SPEED_DEFAULT_MS,
            scroll_text: "HELLO".to_string(),
            status_line: String::new(),
            custom_pattern: PixelBuffer::new(capacity),
            has_custom_pattern: false,
            custom_pattern_scrolls: false,
        }
    }
}

impl Default for RenderState {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Fill `frame` with one frame of `pattern_id`.
///
/// Unknown ids render the blank effect.
pub fn dispatch(
    registry: &mut EffectRegistry,
    pattern_id: PatternId,
    frame: &mut FrameBuffer,
    state: &mut RenderState,
    layout: &GridLayout,
    clock: FrameClock,
) {
    let effect = registry.resolve(pattern_id);
    if !effect.persists_trailing_pixels() {
        frame.clear_active();
    }

    let mut canvas = Canvas::new(frame.active_mut(), layout, clock);
    effect.render(&mut canvas, state);

    frame.blank_inactive();
}

// ── Tests ──────────────────────────────────────────────────────────
