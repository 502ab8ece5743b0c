//! Core of the panel matrix controller.
//!
//! This crate drives a grid of tiled, serpentine-wired 32x8 LED panels:
//! - [`layout`] maps logical `(x, y)` to the physical wire index
//! - [`dispatch`] and [`effect`] fill the frame buffer for the selected pattern
//! - [`mode`] decides between animation, the idle status display and streaming
//! - [`stream`] ingests real-time UDP pixel frames
//! - [`upload`] decodes custom-pattern uploads
//! - [`scheduler`] interleaves all of the above in a cooperative tick
//!
//! The binary wires these to an HTTP control plane ([`server`]) and a
//! dedicated render thread ([`render`]).

pub mod config;
pub mod dispatch;
pub mod effect;
pub mod error;
pub mod frame;
pub mod layout;
pub mod mode;
pub mod output;
pub mod preview;
pub mod render;
pub mod scheduler;
pub mod server;
pub mod stream;
pub mod upload;

pub use error::{Error, Result};

use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

// ── Hardware limits ────────────────────────────────────────────────

/// Width of one physical panel, in pixels.
pub const PANEL_WIDTH: u16 = 32;

/// Height of one physical panel, in pixels.
pub const PANEL_HEIGHT: u16 = 8;

/// Pixel budget of the single hardware push channel (8 panels).
pub const DEFAULT_CAPACITY: usize = 2048;

// ── Color ──────────────────────────────────────────────────────────

/// One RGB pixel, laid out in wire byte order (R, G, B).
///
/// # Rust concept: derive macros
/// `Copy` makes this behave like a plain value: three bytes are cheaper to
/// copy than to borrow. `Default` gives us black for free.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Self = Self::new(0, 0, 0);
    pub const WHITE: Self = Self::new(255, 255, 255);
    pub const RED: Self = Self::new(255, 0, 0);
    pub const GREEN: Self = Self::new(0, 255, 0);
    pub const BLUE: Self = Self::new(0, 0, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Fully saturated color from a byte hue wheel (0-255 is one full turn).
    ///
    /// The wheel is split into six sectors of 43 steps each; one channel
    /// rises or falls linearly within a sector.
    pub fn from_hue(hue: u8) -> Self {
        let sector = hue / 43;
        let step = u16::from(hue - sector * 43) * 6;
        let rising = step.min(255) as u8;
        let falling = 255 - rising;

        match sector {
            0 => Self::new(255, rising, 0),  // Red → Yellow
            1 => Self::new(falling, 255, 0), // Yellow → Green
            2 => Self::new(0, 255, rising),  // Green → Cyan
            3 => Self::new(0, falling, 255), // Cyan → Blue
            4 => Self::new(rising, 0, 255),  // Blue → Magenta
            _ => Self::new(255, 0, falling), // Magenta → Red
        }
    }

    /// Hue/saturation/value color, all three on a 0-255 scale.
    pub fn from_hsv(hue: u8, saturation: u8, value: u8) -> Self {
        let desaturate = |c: u8| {
            let missing = u16::from(255 - c) * u16::from(saturation) / 255;
            255 - missing as u8
        };
        let pure = Self::from_hue(hue);
        Self::new(desaturate(pure.r), desaturate(pure.g), desaturate(pure.b)).scale(value)
    }

    /// Apply brightness scaling (0-100) to this color.
    pub fn apply_brightness(self, brightness: u8) -> Self {
        if brightness >= 100 {
            return self;
        }
        Self {
            r: ((self.r as u16 * brightness as u16) / 100) as u8,
            g: ((self.g as u16 * brightness as u16) / 100) as u8,
            b: ((self.b as u16 * brightness as u16) / 100) as u8,
        }
    }

    /// Scale every channel by `factor / 256`, with 255 treated as identity.
    pub fn scale(self, factor: u8) -> Self {
        let scale = |c: u8| ((u16::from(c) * (u16::from(factor) + 1)) >> 8) as u8;
        Self::new(scale(self.r), scale(self.g), scale(self.b))
    }

    /// Dim toward black by `amount` (0 = unchanged, 255 = black).
    pub fn fade_to_black_by(self, amount: u8) -> Self {
        if amount == 255 {
            return Self::BLACK;
        }
        self.scale(255 - amount)
    }

    /// Channel-wise saturating add, used for additive sparkles.
    pub fn saturating_add(self, other: Self) -> Self {
        Self::new(
            self.r.saturating_add(other.r),
            self.g.saturating_add(other.g),
            self.b.saturating_add(other.b),
        )
    }

    pub fn is_black(self) -> bool {
        self == Self::BLACK
    }
}

/// Colors coming back from embedded-graphics drawables.
impl From<embedded_graphics::pixelcolor::Rgb888> for Rgb {
    fn from(c: embedded_graphics::pixelcolor::Rgb888) -> Self {
        use embedded_graphics::pixelcolor::RgbColor;
        Self::new(c.r(), c.g(), c.b())
    }
}

/// Convert our Rgb to the hardware crate's LedColor at the boundary.
#[cfg(feature = "hardware")]
impl From<Rgb> for rpi_led_matrix::LedColor {
    fn from(c: Rgb) -> Self {
        rpi_led_matrix::LedColor {
            red: c.r,
            green: c.g,
            blue: c.b,
        }
    }
}

// ── Shutdown ───────────────────────────────────────────────────────

/// Set up a Ctrl+C handler that sets `running` to false.
///
/// # Rust concept: Arc and AtomicBool
/// The flag is shared between the render thread, the HTTP shutdown future
/// and the signal handler. `AtomicBool` needs no mutex for a single bool.
pub fn setup_signal_handler() -> Arc<AtomicBool> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    }) {
        tracing::warn!("Could not install Ctrl-C handler: {}", e);
    }

    running
}

/// Check if the main loop should keep running.
pub fn is_running(running: &AtomicBool) -> bool {
    running.load(Ordering::SeqCst)
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn rgb_default_is_black() {
        assert_eq!(Rgb::default(), Rgb::BLACK);
        assert!(Rgb::default().is_black());
    }

    #[rstest]
    #[case(0, 255, 0, 0)] // Red
    #[case(43, 255, 255, 0)] // Yellow
    #[case(86, 0, 255, 0)] // Green
    #[case(129, 0, 255, 255)] // Cyan
    #[case(172, 0, 0, 255)] // Blue
    #[case(215, 255, 0, 255)] // Magenta
    fn from_hue_sector_starts(#[case] hue: u8, #[case] r: u8, #[case] g: u8, #[case] b: u8) {
        assert_eq!(Rgb::from_hue(hue), Rgb::new(r, g, b));
    }

    #[test]
    fn from_hue_end_of_wheel_approaches_red() {
        let c = Rgb::from_hue(255);
        assert_eq!(c.r, 255);
        assert_eq!(c.g, 0);
        assert!(c.b < 20);
    }

    #[test]
    fn from_hsv_full_saturation_and_value_matches_hue() {
        assert_eq!(Rgb::from_hsv(86, 255, 255), Rgb::from_hue(86));
    }

    #[test]
    fn from_hsv_zero_saturation_is_grey() {
        assert_eq!(Rgb::from_hsv(10, 0, 255), Rgb::WHITE);
    }

    #[test]
    fn from_hsv_zero_value_is_black() {
        assert_eq!(Rgb::from_hsv(10, 255, 0), Rgb::BLACK);
    }

    #[test]
    fn apply_brightness_100_is_identity() {
        let c = Rgb::new(100, 200, 50);
        assert_eq!(c.apply_brightness(100), c);
    }

    #[test]
    fn apply_brightness_50_halves() {
        let c = Rgb::new(200, 100, 50);
        assert_eq!(c.apply_brightness(50), Rgb::new(100, 50, 25));
    }

    #[test]
    fn scale_255_is_identity() {
        let c = Rgb::new(1, 128, 255);
        assert_eq!(c.scale(255), c);
    }

    #[rstest]
    #[case(0, Rgb::new(200, 100, 50))]
    #[case(255, Rgb::BLACK)]
    fn fade_to_black_by_extremes(#[case] amount: u8, #[case] expected: Rgb) {
        assert_eq!(Rgb::new(200, 100, 50).fade_to_black_by(amount), expected);
    }

    #[test]
    fn fade_to_black_by_dims() {
        let faded = Rgb::new(200, 100, 50).fade_to_black_by(128);
        assert_eq!(faded, Rgb::new(100, 50, 25));
    }

    #[test]
    fn saturating_add_clamps() {
        let sum = Rgb::new(250, 10, 0).saturating_add(Rgb::new(10, 10, 0));
        assert_eq!(sum, Rgb::new(255, 20, 0));
    }
}
