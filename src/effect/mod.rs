//! Visual effects and the pattern registry.
//!
//! Every pattern id resolves to one boxed [`Effect`] held in the
//! [`EffectRegistry`]. Effects keep their own state (scroll positions, RNG,
//! particle positions) in their struct, so each one can be reset and tested
//! on its own.
//!
//! ## Rust concepts
//! - **Trait objects**: `Box<dyn Effect>` lets the registry hold effects of
//!   different concrete types in one map.
//! - **Lifetimes**: [`Canvas`] borrows the frame and layout for one render
//!   call only, so an effect cannot hold on to the live buffer.
//! - **Foreign traits on local types**: [`Canvas`] implements the
//!   embedded-graphics `DrawTarget`, so text and primitives draw straight
//!   into wire order.

mod chase;
mod clock;
mod custom;
mod rainbow;
mod solid;
mod sparkle;
mod text;

pub use chase::{CandyCane, Cylon, TheaterChase};
pub use clock::{DigitalClock, StatusClock};
pub use custom::CustomPattern;
pub use rainbow::{Rainbow, RainbowGlitter, ScrollingRainbow};
pub use solid::{Blank, Solid};
pub use sparkle::Confetti;
pub use text::{EnumeratePanels, ScrollingText};

use crate::dispatch::RenderState;
use crate::layout::GridLayout;
use crate::Rgb;
use embedded_graphics::mono_font::ascii::FONT_5X7;
use embedded_graphics::mono_font::{MonoFont, MonoTextStyle};
use embedded_graphics::pixelcolor::{BinaryColor, Rgb888};
use embedded_graphics::prelude::*;
use embedded_graphics::text::{Baseline, Text};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::time::Instant;
use time::OffsetDateTime;

/// Numeric pattern identifier used by the control plane.
pub type PatternId = u8;

/// Built-in pattern ids.
pub mod ids {
    use super::PatternId;

    pub const RAINBOW: PatternId = 0;
    pub const RED: PatternId = 1;
    pub const GREEN: PatternId = 2;
    pub const BLUE: PatternId = 3;
    pub const OFF: PatternId = 4;
    pub const RAINBOW_GLITTER: PatternId = 10;
    pub const CANDY_CANE: PatternId = 11;
    pub const THEATER_CHASE: PatternId = 12;
    pub const SCROLLING_RAINBOW: PatternId = 118;
    pub const SCROLLING_TEXT: PatternId = 120;
    pub const CUSTOM_PATTERN: PatternId = 122;
    pub const DIGITAL_CLOCK: PatternId = 125;
    pub const ENUMERATE_PANELS: PatternId = 126;
    pub const CONFETTI: PatternId = 138;
    pub const CYLON: PatternId = 153;
    /// Status line plus clock, shown in the default mode.
    pub const STATUS_CLOCK: PatternId = 200;
    /// Reserved: the frame is driven by the pixel stream.
    pub const STREAMING: PatternId = 255;
}

// ── Catalogue ──────────────────────────────────────────────────────

/// Catalogue entry for one selectable pattern.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PatternInfo {
    pub id: PatternId,
    pub name: &'static str,
    pub category: &'static str,
}

const fn info(id: PatternId, name: &'static str, category: &'static str) -> PatternInfo {
    PatternInfo { id, name, category }
}

/// Every selectable pattern, in id order.
pub const CATALOGUE: &[PatternInfo] = &[
    info(ids::RAINBOW, "Rainbow", "Basic"),
    info(ids::RED, "Red", "Basic"),
    info(ids::GREEN, "Green", "Basic"),
    info(ids::BLUE, "Blue", "Basic"),
    info(ids::OFF, "Off", "Basic"),
    info(ids::RAINBOW_GLITTER, "Rainbow Glitter", "Rainbow"),
    info(ids::CANDY_CANE, "Candy Cane", "Holiday"),
    info(ids::THEATER_CHASE, "Theater Chase", "Chase"),
    info(ids::SCROLLING_RAINBOW, "Scrolling Rainbow", "Matrix"),
    info(ids::SCROLLING_TEXT, "Scrolling Text", "Text"),
    info(ids::CUSTOM_PATTERN, "Custom Pattern", "Custom"),
    info(ids::DIGITAL_CLOCK, "Digital Clock", "Clock"),
    info(ids::ENUMERATE_PANELS, "Enumerate Panels", "Utility"),
    info(ids::CONFETTI, "Confetti", "Sparkle"),
    info(ids::CYLON, "Cylon Scanner", "Chase"),
    info(ids::STATUS_CLOCK, "Status + Clock", "Clock"),
];

/// Catalogue entry for `id`, if it is selectable.
pub fn pattern_info(id: PatternId) -> Option<&'static PatternInfo> {
    CATALOGUE.iter().find(|info| info.id == id)
}

// ── Render contract ────────────────────────────────────────────────

/// Time inputs for one frame.
#[derive(Clone, Copy, Debug)]
pub struct FrameClock {
    /// Monotonic time, for animation cadence.
    pub now: Instant,
    /// Local wall-clock time, for clock faces.
    pub wall: OffsetDateTime,
}

impl FrameClock {
    pub fn new(now: Instant, wall: OffsetDateTime) -> Self {
        Self { now, wall }
    }
}

/// Drawing surface handed to an effect for one render call.
///
/// `pixels` is the active prefix of the frame in wire order; the `(x, y)`
/// helpers go through the layout mapper and silently skip anything that is
/// off-grid or past the active count.
pub struct Canvas<'a> {
    pixels: &'a mut [Rgb],
    layout: &'a GridLayout,
    clock: FrameClock,
}

impl<'a> Canvas<'a> {
    pub fn new(pixels: &'a mut [Rgb], layout: &'a GridLayout, clock: FrameClock) -> Self {
        Self {
            pixels,
            layout,
            clock,
        }
    }

    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    pub fn pixels(&self) -> &[Rgb] {
        &*self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [Rgb] {
        &mut *self.pixels
    }

    pub fn layout(&self) -> &GridLayout {
        self.layout
    }

    pub fn width(&self) -> i32 {
        i32::from(self.layout.width())
    }

    pub fn height(&self) -> i32 {
        i32::from(self.layout.height())
    }

    pub fn now(&self) -> Instant {
        self.clock.now
    }

    pub fn wall_clock(&self) -> OffsetDateTime {
        self.clock.wall
    }

    /// Wire index of `(x, y)` if it lands on an active pixel.
    pub fn index(&self, x: i32, y: i32) -> Option<usize> {
        self.layout
            .index_of(x, y)
            .filter(|&index| index < self.pixels.len())
    }

    pub fn get(&self, x: i32, y: i32) -> Option<Rgb> {
        self.index(x, y).map(|index| self.pixels[index])
    }

    pub fn set(&mut self, x: i32, y: i32, color: Rgb) {
        if let Some(index) = self.index(x, y) {
            self.pixels[index] = color;
        }
    }

    pub fn add(&mut self, x: i32, y: i32, color: Rgb) {
        if let Some(index) = self.index(x, y) {
            self.pixels[index] = self.pixels[index].saturating_add(color);
        }
    }

    pub fn fill(&mut self, color: Rgb) {
        self.pixels.fill(color);
    }

    /// Fade every active pixel toward black.
    pub fn fade(&mut self, amount: u8) {
        for pixel in self.pixels.iter_mut() {
            *pixel = pixel.fade_to_black_by(amount);
        }
    }

    /// Draw `text` in [`FONT_5X7`] with its top-left corner at `(x, y)`.
    ///
    /// `color` is asked for the color of every lit pixel, so callers can
    /// paint gradients across the text.
    pub fn draw_text(&mut self, text: &str, x: i32, y: i32, color: impl FnMut(i32, i32) -> Rgb) {
        let style = MonoTextStyle::new(TEXT_FONT, BinaryColor::On);
        let mut target = Tinted { canvas: self, color };
        let Ok(_) = Text::with_baseline(text, Point::new(x, y), style, Baseline::Top).draw(&mut target);
    }
}

impl OriginDimensions for Canvas<'_> {
    fn size(&self) -> Size {
        Size::new(u32::from(self.layout.width()), u32::from(self.layout.height()))
    }
}

/// Any embedded-graphics drawable can target the canvas; points go through
/// the layout mapper like [`Canvas::set`].
impl DrawTarget for Canvas<'_> {
    type Color = Rgb888;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> core::result::Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            self.set(point.x, point.y, Rgb::from(color));
        }
        Ok(())
    }
}

/// Monochrome glyph pixels recolored per position on their way to the
/// canvas.
struct Tinted<'c, 'a, F> {
    canvas: &'c mut Canvas<'a>,
    color: F,
}

impl<F> OriginDimensions for Tinted<'_, '_, F> {
    fn size(&self) -> Size {
        self.canvas.size()
    }
}

impl<F: FnMut(i32, i32) -> Rgb> DrawTarget for Tinted<'_, '_, F> {
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> core::result::Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, on) in pixels {
            if on.is_on() {
                let color = (self.color)(point.x, point.y);
                self.canvas.set(point.x, point.y, color);
            }
        }
        Ok(())
    }
}

// ── Text metrics ───────────────────────────────────────────────────

/// Font used by every text-bearing effect.
pub const TEXT_FONT: &MonoFont<'static> = &FONT_5X7;

/// Glyph cell height in pixels.
pub const TEXT_HEIGHT: i32 = FONT_5X7.character_size.height as i32;

const TEXT_ADVANCE: i32 = (FONT_5X7.character_size.width + FONT_5X7.character_spacing) as i32;

/// Width of `text` in pixels when drawn with [`TEXT_FONT`].
pub fn text_width(text: &str) -> i32 {
    let chars = text.chars().count() as i32;
    if chars == 0 {
        0
    } else {
        chars * TEXT_ADVANCE - FONT_5X7.character_spacing as i32
    }
}

/// A visual effect bound to one pattern id.
pub trait Effect: Send {
    /// Draw one frame.
    fn render(&mut self, canvas: &mut Canvas<'_>, state: &mut RenderState);

    /// Effects that fade or build on the previous frame return true so
    /// dispatch skips the pre-clear.
    fn persists_trailing_pixels(&self) -> bool {
        false
    }

    /// Drop any per-effect state, called when the pattern is (re)selected.
    fn reset(&mut self) {}
}

// ── Registry ───────────────────────────────────────────────────────

struct RegistryEntry {
    info: PatternInfo,
    effect: Box<dyn Effect>,
}

/// Pattern id → effect, resolved once at startup.
pub struct EffectRegistry {
    entries: BTreeMap<PatternId, RegistryEntry>,
    fallback: Blank,
}

impl EffectRegistry {
    /// Registry with no patterns; every id falls back to blank.
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
            fallback: Blank,
        }
    }

    /// Registry holding every pattern in [`CATALOGUE`].
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        for info in CATALOGUE {
            registry.register(*info, builtin_effect(info.id));
        }
        registry
    }

    pub fn register(&mut self, info: PatternInfo, effect: Box<dyn Effect>) {
        self.entries.insert(info.id, RegistryEntry { info, effect });
    }

    pub fn contains(&self, id: PatternId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn info(&self, id: PatternId) -> Option<PatternInfo> {
        self.entries.get(&id).map(|entry| entry.info)
    }

    /// Registered patterns in id order.
    pub fn catalogue(&self) -> Vec<PatternInfo> {
        self.entries.values().map(|entry| entry.info).collect()
    }

    /// Effect for `id`, or the blank effect for unknown ids.
    pub fn resolve(&mut self, id: PatternId) -> &mut dyn Effect {
        match self.entries.get_mut(&id) {
            Some(entry) => entry.effect.as_mut(),
            None => &mut self.fallback,
        }
    }

    /// Reset the effect behind `id`, if any.
    pub fn reset(&mut self, id: PatternId) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.effect.reset();
        }
    }
}

impl Default for EffectRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn builtin_effect(id: PatternId) -> Box<dyn Effect> {
    match id {
        ids::RAINBOW => Box::new(Rainbow),
        ids::RED => Box::new(Solid::new(Rgb::RED)),
        ids::GREEN => Box::new(Solid::new(Rgb::GREEN)),
        ids::BLUE => Box::new(Solid::new(Rgb::BLUE)),
        ids::OFF => Box::new(Solid::new(Rgb::BLACK)),
        ids::RAINBOW_GLITTER => Box::new(RainbowGlitter::default()),
        ids::CANDY_CANE => Box::new(CandyCane),
        ids::THEATER_CHASE => Box::new(TheaterChase),
        ids::SCROLLING_RAINBOW => Box::new(ScrollingRainbow::default()),
        ids::SCROLLING_TEXT => Box::new(ScrollingText::default()),
        ids::CUSTOM_PATTERN => Box::new(CustomPattern::default()),
        ids::DIGITAL_CLOCK => Box::new(DigitalClock),
        ids::ENUMERATE_PANELS => Box::new(EnumeratePanels),
        ids::CONFETTI => Box::new(Confetti::default()),
        ids::CYLON => Box::new(Cylon::default()),
        ids::STATUS_CLOCK => Box::new(StatusClock::default()),
        _ => Box::new(Blank),
    }
}

/// Whether `step` has elapsed since `last`, advancing `last` if so.
///
/// The first call always fires.
pub(crate) fn step_due(last: &mut Option<Instant>, now: Instant, step_ms: u16) -> bool {
    let due = match *last {
        None => true,
        Some(previous) => now.saturating_duration_since(previous).as_millis() >= u128::from(step_ms),
    };
    if due {
        *last = Some(now);
    }
    due
}

// ── Tests ──────────────────────────────────────────────────────────
